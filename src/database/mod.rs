//! Read-only access to SQLite 3 database files.
//!
//! `Database` walks table and index b-trees directly from the file. It never
//! writes, never replays a journal and keeps its memoised schema and subtree
//! counts for as long as it lives.

mod btree;
mod cell;
mod page;
pub mod record;
pub mod schema;
mod varint;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::{Buf, Bytes};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::row::{ColumnDescriptor, ColumnSet};
use page::DB_HEADER_SIZE;

pub use record::{Record, RecordValue, TextEncoding};
pub use schema::{ColumnInfo, IndexSchema, SchemaObject, TableSchema};

const MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Read the main file even if a hot journal or WAL says it was not
    /// shut down cleanly. The journal is never replayed.
    pub recover: bool,
}

/// Fields of the 100-byte file header this reader relies on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbHeader {
    pub page_size: usize,
    pub usable_size: usize,
    pub page_count: u32,
    pub write_version: u8,
    pub read_version: u8,
    pub encoding: TextEncoding,
}

impl DbHeader {
    pub fn parse(raw: &[u8], file_len: u64) -> Result<Self> {
        if raw.len() < DB_HEADER_SIZE || &raw[..16] != MAGIC {
            return Err(Error::NotADatabase("missing SQLite header".into()));
        }

        let mut header = &raw[16..DB_HEADER_SIZE];
        let page_size = match header.get_u16() {
            1 => 65536,
            n => n as usize,
        };
        if !page_size.is_power_of_two() || !(512..=65536).contains(&page_size) {
            return Err(Error::NotADatabase(format!("invalid page size {}", page_size)));
        }
        let write_version = header.get_u8();
        let read_version = header.get_u8();
        if read_version > 2 {
            return Err(Error::Unsupported(format!("file format read version {}", read_version)));
        }
        let reserved = header.get_u8() as usize;
        let usable_size = page_size - reserved;
        if usable_size < 480 {
            return Err(Error::NotADatabase(format!("usable page size {} too small", usable_size)));
        }

        // offset 28: size of the database in pages
        header.advance(28 - 21);
        let in_header = header.get_u32();
        let from_len = (file_len / page_size as u64) as u32;
        let page_count = if in_header == 0 || in_header > from_len {
            from_len
        } else {
            in_header
        };

        // offset 56: text encoding
        header.advance(56 - 32);
        let encoding = TextEncoding::from_header(header.get_u32())?;

        Ok(DbHeader {
            page_size,
            usable_size,
            page_count,
            write_version,
            read_version,
            encoding,
        })
    }
}

/// Root page, parsed definition and shared column descriptors of one table.
#[derive(Debug)]
struct TableDef {
    name: String,
    root: u32,
    schema: TableSchema,
    columns: Arc<ColumnSet>,
}

/// Descriptor of one index, as listed by `Database::index_info`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub entries: usize,
    pub unique_keys: usize,
    /// Text encoding code of the file (1 = UTF-8, 2 = UTF-16le, 3 = UTF-16be).
    pub code_page: u32,
    pub unique: bool,
    pub partial: bool,
    /// Created implicitly for a UNIQUE or PRIMARY KEY constraint.
    pub automatic: bool,
}

pub struct Database {
    file: File,
    path: PathBuf,
    header: DbHeader,
    recovered: bool,
    schema: RefCell<Option<Arc<Vec<SchemaObject>>>>,
    tables: RefCell<HashMap<String, Arc<TableDef>>>,
    subtree_counts: RefCell<HashMap<u32, usize>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl Database {
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref();

        let hot = ["-journal", "-wal"]
            .iter()
            .map(|suffix| sidecar(path, suffix))
            .find(|p| has_content(p));
        let recovered = match hot {
            Some(_) if !options.recover => return Err(Error::DirtyShutdown),
            Some(journal) => {
                warn!(
                    journal = %journal.display(),
                    "database was not shut down cleanly; reading the main file only"
                );
                true
            }
            None => false,
        };

        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut raw = [0u8; DB_HEADER_SIZE];
        file.read_exact(&mut raw).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                Error::NotADatabase(format!("{} is too short", path.display()))
            }
            _ => Error::Io(e),
        })?;
        let header = DbHeader::parse(&raw, file_len)?;

        debug!(
            path = %path.display(),
            page_size = header.page_size,
            pages = header.page_count,
            encoding = header.encoding.name(),
            "opened database"
        );

        Ok(Database {
            file,
            path: path.to_path_buf(),
            header,
            recovered,
            schema: RefCell::new(None),
            tables: RefCell::new(HashMap::new()),
            subtree_counts: RefCell::new(HashMap::new()),
        })
    }

    /// Open on a worker thread so an interactive caller can keep drawing.
    pub fn open_in_background(
        path: impl Into<PathBuf>,
        options: OpenOptions,
    ) -> JoinHandle<Result<Database>> {
        let path = path.into();
        thread::spawn(move || Database::open(&path, options))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &DbHeader {
        &self.header
    }

    pub fn page_size(&self) -> usize {
        self.header.page_size
    }

    pub fn page_count(&self) -> u32 {
        self.header.page_count
    }

    pub fn encoding(&self) -> TextEncoding {
        self.header.encoding
    }

    /// True when the file was opened despite a hot journal or WAL.
    pub fn recovered(&self) -> bool {
        self.recovered
    }

    fn read_raw_page(&self, page_number: u32) -> Result<Bytes> {
        if page_number == 0 || page_number > self.header.page_count {
            return Err(Error::Corrupt(format!(
                "page {} out of range (1..={})",
                page_number, self.header.page_count
            )));
        }
        let offset = (page_number as u64 - 1) * self.header.page_size as u64;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0; self.header.page_size];
        file.read_exact(&mut data)?;
        Ok(Bytes::from(data))
    }

    /// Every row of `sqlite_master`, read once.
    pub fn schema_objects(&self) -> Result<Arc<Vec<SchemaObject>>> {
        if let Some(objects) = self.schema.borrow().as_ref() {
            return Ok(objects.clone());
        }

        let mut entries = Vec::new();
        self.collect_range(1, &mut 0, usize::MAX, &mut entries, 0)?;
        let mut objects = Vec::with_capacity(entries.len());
        for entry in entries {
            let record = Record::from_bytes(&entry.payload, self.header.encoding)?;
            if let Some(object) = SchemaObject::from_record(&record) {
                objects.push(object);
            }
        }
        debug!(objects = objects.len(), "loaded schema");

        let objects = Arc::new(objects);
        *self.schema.borrow_mut() = Some(objects.clone());
        Ok(objects)
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        Ok(self
            .schema_objects()?
            .iter()
            .filter(|o| o.is_table() && o.rootpage != 0)
            .map(|o| o.name.clone())
            .collect())
    }

    pub fn index_names(&self, table: &str) -> Result<Vec<String>> {
        let def = self.table_def(table)?;
        Ok(self
            .indexes_of(&def.name)?
            .into_iter()
            .map(|o| o.name)
            .collect())
    }

    pub fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        Ok(self.table_def(table)?.schema.columns.clone())
    }

    /// Column descriptors with decoders bound, shared by every row of `table`.
    pub fn column_set(&self, table: &str) -> Result<Arc<ColumnSet>> {
        Ok(self.table_def(table)?.columns.clone())
    }

    pub fn row_count(&self, table: &str, index: Option<&str>) -> Result<usize> {
        let def = self.table_def(table)?;
        match index {
            None => self.entry_count(def.root, 0),
            Some(index) => {
                let object = self.index_object(&def.name, index)?;
                self.entry_count(object.rootpage, 0)
            }
        }
    }

    pub fn index_info(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let def = self.table_def(table)?;
        // index entries end with the rowid, or with the whole key of a WITHOUT ROWID table
        let suffix = if def.schema.without_rowid {
            def.schema.primary_key.len()
        } else {
            1
        };
        let mut infos = Vec::new();
        for object in self.indexes_of(&def.name)? {
            let parsed = match &object.sql {
                Some(sql) => IndexSchema::from_create_sql(sql)?,
                None => IndexSchema {
                    unique: true,
                    ..IndexSchema::default()
                },
            };
            infos.push(IndexInfo {
                entries: self.entry_count(object.rootpage, 0)?,
                unique_keys: self.distinct_keys(object.rootpage, suffix)?,
                code_page: self.header.encoding.code(),
                columns: parsed.columns,
                unique: parsed.unique,
                partial: parsed.partial,
                automatic: object.sql.is_none(),
                name: object.name,
            });
        }
        Ok(infos)
    }

    /// Raw values of up to `count` rows starting at position `start`, in rowid
    /// order or in the key order of `index`. One value per declared column.
    pub fn fetch_records(
        &self,
        table: &str,
        index: Option<&str>,
        start: usize,
        count: usize,
    ) -> Result<Vec<Vec<RecordValue>>> {
        let def = self.table_def(table)?;
        if def.schema.without_rowid {
            return self.fetch_without_rowid(&def, index, start, count);
        }

        let root = match index {
            None => def.root,
            Some(index) => self.index_object(&def.name, index)?.rootpage,
        };
        let mut skip = start;
        let mut entries = Vec::with_capacity(count.min(1024));
        self.collect_range(root, &mut skip, count, &mut entries, 0)?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let (row_id, payload) = match (entry.row_id, index) {
                (Some(row_id), None) => (row_id, entry.payload),
                _ => {
                    let key = Record::from_bytes(&entry.payload, self.header.encoding)?;
                    let row_id = match key.values.last() {
                        Some(RecordValue::Int(row_id)) => *row_id,
                        _ => return Err(Error::Corrupt("index entry without rowid".into())),
                    };
                    let payload = self.find_row(def.root, row_id)?.ok_or_else(|| {
                        Error::Corrupt(format!(
                            "index entry points at missing row {} of '{}'",
                            row_id, def.name
                        ))
                    })?;
                    (row_id, payload)
                }
            };
            let record = Record::from_bytes(&payload, self.header.encoding)?;
            rows.push(align(&def.schema.columns, row_id, record.values));
        }
        Ok(rows)
    }

    /// A WITHOUT ROWID table is an index b-tree keyed on its primary key.
    /// Only primary key order is readable; its secondary indexes end in key
    /// columns rather than a rowid and are not followed.
    fn fetch_without_rowid(
        &self,
        def: &TableDef,
        index: Option<&str>,
        start: usize,
        count: usize,
    ) -> Result<Vec<Vec<RecordValue>>> {
        if let Some(index) = index {
            self.index_object(&def.name, index)?;
            return Err(Error::Unsupported(format!(
                "index order on WITHOUT ROWID table '{}'",
                def.name
            )));
        }

        let mut skip = start;
        let mut entries = Vec::with_capacity(count.min(1024));
        self.collect_range(def.root, &mut skip, count, &mut entries, 0)?;
        entries
            .into_iter()
            .map(|entry| {
                let record = Record::from_bytes(&entry.payload, self.header.encoding)?;
                Ok(unpack_keyed(&def.schema, record.values))
            })
            .collect()
    }

    fn table_def(&self, table: &str) -> Result<Arc<TableDef>> {
        if let Some(def) = self.tables.borrow().get(table) {
            return Ok(def.clone());
        }

        let objects = self.schema_objects()?;
        let object = objects
            .iter()
            .find(|o| o.is_table() && o.rootpage != 0 && o.name.eq_ignore_ascii_case(table))
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        let sql = object.sql.as_deref().ok_or_else(|| {
            Error::Corrupt(format!("no CREATE statement for table '{}'", object.name))
        })?;
        let schema = TableSchema::from_create_sql(sql)?;
        let columns = Arc::new(ColumnSet::new(
            schema
                .columns
                .iter()
                .map(|c| ColumnDescriptor::new(c.name.clone(), c.column_type, c.column_id))
                .collect(),
        ));

        let def = Arc::new(TableDef {
            name: object.name.clone(),
            root: object.rootpage,
            schema,
            columns,
        });
        self.tables
            .borrow_mut()
            .insert(table.to_string(), def.clone());
        Ok(def)
    }

    fn indexes_of(&self, table: &str) -> Result<Vec<SchemaObject>> {
        Ok(self
            .schema_objects()?
            .iter()
            .filter(|o| o.is_index() && o.rootpage != 0 && o.tbl_name.eq_ignore_ascii_case(table))
            .cloned()
            .collect())
    }

    fn index_object(&self, table: &str, index: &str) -> Result<SchemaObject> {
        self.indexes_of(table)?
            .into_iter()
            .find(|o| o.name.eq_ignore_ascii_case(index))
            .ok_or_else(|| Error::IndexNotFound {
                table: table.to_string(),
                index: index.to_string(),
            })
    }
}

/// Line stored values up with declared columns. A rowid alias reads the
/// rowid, columns added after the row was written read as NULL.
fn align(columns: &[ColumnInfo], row_id: i64, values: Vec<RecordValue>) -> Vec<RecordValue> {
    let mut values = values.into_iter();
    columns
        .iter()
        .map(|column| {
            let stored = values.next();
            if column.is_rowid_alias {
                RecordValue::Int(row_id)
            } else {
                stored.unwrap_or(RecordValue::Null)
            }
        })
        .collect()
}

/// Put a WITHOUT ROWID record, stored key columns first, back in declared
/// column order.
fn unpack_keyed(schema: &TableSchema, values: Vec<RecordValue>) -> Vec<RecordValue> {
    let mut columns = vec![RecordValue::Null; schema.columns.len()];
    let mut values = values.into_iter();
    for &position in &schema.primary_key {
        if let Some(value) = values.next() {
            columns[position] = value;
        }
    }
    for (position, slot) in columns.iter_mut().enumerate() {
        if schema.primary_key.contains(&position) {
            continue;
        }
        match values.next() {
            Some(value) => *slot = value,
            None => break,
        }
    }
    columns
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
