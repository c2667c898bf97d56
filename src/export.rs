//! XML table dumps that accumulate across runs.
//!
//! Saving to a seekable destination first reads back whatever dump is already
//! there, appends the new tables and rewrites the whole file. A destination
//! that cannot be read back as a dump is replaced by a fresh document.

use std::borrow::Cow;
use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::str::FromStr;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::provider::{RowProvider, TableProvider};
use crate::row::Row;

pub const NAMESPACE: &str = "urn:dbpeek:dump:1";

/// Rows pulled from a provider per call while exporting.
const FETCH_BATCH: usize = 500;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportDocument {
    pub tables: Vec<ExportTable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub name: String,
    pub row_count: usize,
    pub rows: Vec<ExportRow>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportRow {
    pub columns: Vec<ExportColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportColumn {
    pub name: String,
    /// `None` is written as a missing `Value` attribute.
    pub value: Option<String>,
}

impl ExportRow {
    pub fn from_row(row: &Row) -> Self {
        ExportRow {
            columns: row
                .iter()
                .map(|(name, value)| ExportColumn {
                    name: name.to_string(),
                    value: value.map(|v| strip_terminator(v.to_string())),
                })
                .collect(),
        }
    }
}

/// Drop one trailing NUL, if present. Interior NULs stay.
fn strip_terminator(mut text: String) -> String {
    if text.ends_with('\0') {
        text.pop();
    }
    text
}

/// `table` or `table/index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSelector {
    pub table: String,
    pub index: Option<String>,
}

impl FromStr for TableSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (table, index) = match s.split_once('/') {
            Some((table, index)) => (table, Some(index).filter(|i| !i.is_empty())),
            None => (s, None),
        };
        if table.is_empty() {
            return Err(Error::InvalidSelector(s.to_string()));
        }
        Ok(TableSelector {
            table: table.to_string(),
            index: index.map(str::to_string),
        })
    }
}

impl fmt::Display for TableSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.index {
            Some(index) => write!(f, "{}/{}", self.table, index),
            None => f.write_str(&self.table),
        }
    }
}

/// A destination that can be emptied before it is rewritten.
pub trait Truncate {
    fn truncate(&mut self) -> std::io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self) -> std::io::Result<()> {
        self.set_len(0)
    }
}

impl Truncate for Cursor<Vec<u8>> {
    fn truncate(&mut self) -> std::io::Result<()> {
        self.get_mut().clear();
        Ok(())
    }
}

impl ExportDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read back an existing dump from the start of `source`. Anything that
    /// cannot be read or parsed yields an empty document.
    pub fn load_or_empty<R: Read + Seek>(source: &mut R) -> Self {
        let mut content = String::new();
        let loaded = source
            .seek(SeekFrom::Start(0))
            .and_then(|_| source.read_to_string(&mut content))
            .map_err(Error::from)
            .and_then(|_| {
                if content.trim().is_empty() {
                    Ok(ExportDocument::new())
                } else {
                    ExportDocument::parse(&content)
                }
            });
        match loaded {
            Ok(document) => document,
            Err(e) => {
                debug!(error = %e, "existing destination is not a dump, starting fresh");
                ExportDocument::new()
            }
        }
    }

    /// Append every row `provider` serves as one table.
    pub fn add_table<P: RowProvider>(&mut self, name: &str, mut provider: P) -> Result<&ExportTable> {
        let row_count = provider.count()?;
        let mut rows = Vec::with_capacity(row_count);
        while rows.len() < row_count {
            let wanted = FETCH_BATCH.min(row_count - rows.len());
            let batch = provider.fetch_range(rows.len(), wanted)?;
            if batch.is_empty() {
                break;
            }
            rows.extend(batch.iter().map(ExportRow::from_row));
        }
        debug!(table = name, rows = rows.len(), "exported table");

        self.tables.push(ExportTable {
            name: name.to_string(),
            row_count,
            rows,
        });
        Ok(&self.tables[self.tables.len() - 1])
    }

    /// Add the selected tables of `db`, or every table when none are selected.
    pub fn append_tables(&mut self, db: &Database, selectors: &[TableSelector]) -> Result<()> {
        let all;
        let selectors = if selectors.is_empty() {
            all = db
                .table_names()?
                .into_iter()
                .map(|table| TableSelector { table, index: None })
                .collect::<Vec<_>>();
            &all
        } else {
            selectors
        };

        for selector in selectors {
            let provider = TableProvider::new(db, &selector.table, selector.index.as_deref())?;
            self.add_table(&selector.table, provider)?;
        }
        Ok(())
    }

    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = Writer::new_with_indent(out, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut root = BytesStart::new("TableDump");
        root.push_attribute(("xmlns", NAMESPACE));
        writer.write_event(Event::Start(root))?;

        for table in &self.tables {
            let mut element = BytesStart::new("Table");
            element.push_attribute(escaped("Name", &table.name));
            element.push_attribute(escaped("RowCount", &table.row_count.to_string()));
            if table.rows.is_empty() {
                writer.write_event(Event::Empty(element))?;
                continue;
            }
            writer.write_event(Event::Start(element))?;

            for row in &table.rows {
                if row.columns.is_empty() {
                    writer.write_event(Event::Empty(BytesStart::new("Row")))?;
                    continue;
                }
                writer.write_event(Event::Start(BytesStart::new("Row")))?;
                for column in &row.columns {
                    let mut element = BytesStart::new("Column");
                    element.push_attribute(escaped("Name", &column.name));
                    if let Some(value) = &column.value {
                        element.push_attribute(escaped("Value", value));
                    }
                    writer.write_event(Event::Empty(element))?;
                }
                writer.write_event(Event::End(BytesEnd::new("Row")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("Table")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("TableDump")))?;
        let mut out = writer.into_inner();
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }

    /// Empty `dest` and write the whole document from its start.
    pub fn rewrite<D: Write + Seek + Truncate>(&self, dest: &mut D) -> Result<()> {
        dest.truncate()?;
        dest.seek(SeekFrom::Start(0))?;
        self.write_to(&mut *dest)
    }

    pub fn to_xml_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::Malformed(e.to_string()))
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut document = ExportDocument::new();
        let mut in_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(element) | Event::Empty(element) => {
                    let name = element.local_name();
                    match (in_root, name.as_ref()) {
                        (false, b"TableDump") => {
                            let namespace = attribute(&element, b"xmlns")?;
                            if namespace.as_deref() != Some(NAMESPACE) {
                                return Err(Error::Malformed(format!(
                                    "unexpected namespace {:?}",
                                    namespace
                                )));
                            }
                            in_root = true;
                        }
                        (true, b"Table") => {
                            let name = required(&element, b"Name")?;
                            let row_count = required(&element, b"RowCount")?
                                .parse()
                                .map_err(|_| Error::Malformed("bad RowCount".into()))?;
                            document.tables.push(ExportTable {
                                name,
                                row_count,
                                rows: Vec::new(),
                            });
                        }
                        (true, b"Row") => document
                            .tables
                            .last_mut()
                            .ok_or_else(|| Error::Malformed("Row outside Table".into()))?
                            .rows
                            .push(ExportRow::default()),
                        (true, b"Column") => {
                            let column = ExportColumn {
                                name: required(&element, b"Name")?,
                                value: attribute(&element, b"Value")?,
                            };
                            document
                                .tables
                                .last_mut()
                                .and_then(|table| table.rows.last_mut())
                                .ok_or_else(|| Error::Malformed("Column outside Row".into()))?
                                .columns
                                .push(column);
                        }
                        (_, other) => {
                            return Err(Error::Malformed(format!(
                                "unexpected element <{}>",
                                String::from_utf8_lossy(other)
                            )))
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !in_root {
            return Err(Error::Malformed("no TableDump root element".into()));
        }
        Ok(document)
    }
}

fn escaped<'a>(key: &'a str, value: &str) -> Attribute<'a> {
    Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escape_attribute(value).into_bytes()),
    }
}

/// Escape for a double-quoted attribute. Control characters, line endings
/// included, become character references so they survive a reload.
fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c if c.is_control() => {
                let _ = write!(out, "&#x{:X};", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Resolve entity and character references. Unlike a strict XML reader this
/// accepts references to any code point, `&#x0;` included.
fn unescape_attribute(raw: &[u8]) -> Result<String> {
    let raw = std::str::from_utf8(raw).map_err(|e| Error::Malformed(e.to_string()))?;
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| Error::Malformed(format!("unterminated reference in {:?}", raw)))?;
        let entity = &after[..semi];
        let c = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32).ok_or_else(|| {
                    Error::Malformed(format!("unknown reference &{};", entity))
                })?
            }
        };
        out.push(c);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn attribute(element: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == name {
            return unescape_attribute(&attr.value).map(Some);
        }
    }
    Ok(None)
}

fn required(element: &BytesStart, name: &[u8]) -> Result<String> {
    attribute(element, name)?.ok_or_else(|| {
        Error::Malformed(format!(
            "<{}> without {}",
            String::from_utf8_lossy(element.local_name().as_ref()),
            String::from_utf8_lossy(name)
        ))
    })
}
