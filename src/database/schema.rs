use crate::catalog::ColumnType;
use crate::error::{Error, Result};
use super::record::Record;

/// One row of `sqlite_master`.
#[derive(Debug, Clone)]
pub struct SchemaObject {
    pub object_type: String, // "table", "index", "view", etc.
    pub name: String,
    pub tbl_name: String,
    pub rootpage: u32,
    pub sql: Option<String>,
}

impl SchemaObject {
    pub fn from_record(record: &Record) -> Option<Self> {
        // Schema records have: type, name, tbl_name, rootpage, sql
        Some(SchemaObject {
            object_type: record.text(0)?.to_string(),
            name: record.text(1)?.to_string(),
            tbl_name: record.text(2)?.to_string(),
            // views and triggers have rootpage 0
            rootpage: record.int(3).unwrap_or(0) as u32,
            sql: record.text(4).map(str::to_string),
        })
    }

    pub fn is_table(&self) -> bool {
        self.object_type == "table"
    }

    pub fn is_index(&self) -> bool {
        self.object_type == "index"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub column_type: ColumnType,
    /// 1-based position in the table definition.
    pub column_id: u32,
    /// `INTEGER PRIMARY KEY`: the value lives in the rowid, the record holds NULL.
    pub is_rowid_alias: bool,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<ColumnInfo>,
    /// Positions in `columns` of the PRIMARY KEY, in key order.
    pub primary_key: Vec<usize>,
    pub without_rowid: bool,
}

const COLUMN_CONSTRAINTS: &[&str] = &[
    "CONSTRAINT", "PRIMARY", "NOT", "NULL", "UNIQUE", "CHECK", "DEFAULT", "COLLATE",
    "REFERENCES", "GENERATED", "AS",
];

const TABLE_CONSTRAINTS: &[&str] = &["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"];

impl TableSchema {
    pub fn from_create_sql(sql: &str) -> Result<Self> {
        let (start, end) = outer_parens(sql).ok_or_else(|| {
            Error::Corrupt(format!("no column list in CREATE TABLE statement: {}", sql))
        })?;

        let mut columns = Vec::new();
        let mut primary_key = Vec::new();
        let mut table_pk: Vec<String> = Vec::new();
        for part in split_top_level(&sql[start + 1..end]) {
            let first = first_word(part);
            let keyword = first.split('(').next().unwrap_or(first);
            if TABLE_CONSTRAINTS.iter().any(|kw| keyword.eq_ignore_ascii_case(kw)) {
                if let Some(cols) = table_primary_key(part) {
                    table_pk = cols;
                }
                continue;
            }
            if first.is_empty() {
                continue;
            }

            let name = unquote(first);
            let rest = part[first.len()..].trim();
            let declared_type = declared_type(rest);
            let is_pk = contains_words(rest, "PRIMARY KEY");
            if is_pk {
                primary_key.push(columns.len());
            }
            columns.push(ColumnInfo {
                column_type: column_type_for(&declared_type),
                is_rowid_alias: false,
                declared_type,
                name,
                column_id: columns.len() as u32 + 1,
            });
        }

        if !table_pk.is_empty() {
            primary_key = table_pk
                .iter()
                .filter_map(|pk| columns.iter().position(|c| c.name.eq_ignore_ascii_case(pk)))
                .collect();
        }
        if let [pk] = primary_key.as_slice() {
            let col = &mut columns[*pk];
            col.is_rowid_alias = col.declared_type.eq_ignore_ascii_case("INTEGER");
        }

        // a WITHOUT ROWID table stores every column, its key included, in the record
        let without_rowid = contains_words(&sql[end + 1..], "WITHOUT ROWID");
        if without_rowid {
            for col in &mut columns {
                col.is_rowid_alias = false;
            }
        }
        Ok(TableSchema {
            columns,
            primary_key,
            without_rowid,
        })
    }
}

/// Key columns and flags parsed from `CREATE [UNIQUE] INDEX`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSchema {
    pub columns: Vec<String>,
    pub unique: bool,
    pub partial: bool,
}

impl IndexSchema {
    pub fn from_create_sql(sql: &str) -> Result<Self> {
        let head_end = sql.find('(').ok_or_else(|| {
            Error::Corrupt(format!("no key list in CREATE INDEX statement: {}", sql))
        })?;
        let end = matching_paren(sql, head_end).ok_or_else(|| {
            Error::Corrupt(format!("unbalanced CREATE INDEX statement: {}", sql))
        })?;

        let columns = split_top_level(&sql[head_end + 1..end])
            .into_iter()
            .map(|part| unquote(first_word(part)))
            .filter(|name| !name.is_empty())
            .collect();

        Ok(IndexSchema {
            columns,
            unique: contains_words(&sql[..head_end], "UNIQUE"),
            partial: contains_words(&sql[end + 1..], "WHERE"),
        })
    }
}

/// Map a declared SQL column type to a physical column type.
///
/// Never returns `ColumnType::Other`: a declared type outside the keyword
/// table gets the type of its SQLite affinity instead.
pub fn column_type_for(declared: &str) -> ColumnType {
    let upper = declared.to_ascii_uppercase();
    let base = upper.split('(').next().unwrap_or("").trim();

    match base {
        "BIT" | "BOOL" | "BOOLEAN" => ColumnType::Bit,
        "TINYINT" | "UNSIGNED TINYINT" => ColumnType::UnsignedByte,
        "SMALLINT" | "INT2" => ColumnType::Short,
        "UNSIGNED SMALLINT" => ColumnType::UnsignedShort,
        "INT" | "INT4" | "MEDIUMINT" => ColumnType::Long,
        "UNSIGNED INT" | "UNSIGNED INTEGER" => ColumnType::UnsignedLong,
        "INTEGER" | "BIGINT" | "INT8" => ColumnType::LongLong,
        "UNSIGNED BIG INT" | "UNSIGNED BIGINT" => ColumnType::UnsignedLongLong,
        "FLOAT" | "SINGLE" => ColumnType::IeeeSingle,
        "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "NUMERIC" | "DECIMAL" => ColumnType::IeeeDouble,
        "MONEY" | "CURRENCY" => ColumnType::Currency,
        "DATE" | "DATETIME" | "TIMESTAMP" => ColumnType::DateTime,
        "GUID" | "UUID" | "UNIQUEIDENTIFIER" => ColumnType::Guid,
        "BINARY" | "VARBINARY" => ColumnType::Binary,
        "BLOB" | "" => ColumnType::LongBinary,
        "CHAR" | "VARCHAR" | "NCHAR" | "NVARCHAR" => ColumnType::Text,
        "TEXT" | "CLOB" => ColumnType::LongText,
        _ if upper.contains("INT") => ColumnType::LongLong,
        _ if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") => {
            ColumnType::LongText
        }
        _ if upper.contains("BLOB") => ColumnType::LongBinary,
        _ => ColumnType::IeeeDouble,
    }
}

fn declared_type(rest: &str) -> String {
    let mut words = Vec::new();
    let mut remaining = rest;
    while !remaining.is_empty() {
        let word = first_word(remaining);
        if word.is_empty() || COLUMN_CONSTRAINTS.iter().any(|kw| word.eq_ignore_ascii_case(kw)) {
            break;
        }
        words.push(word);
        remaining = remaining[word.len()..].trim_start();
    }
    words.join(" ")
}

fn table_primary_key(part: &str) -> Option<Vec<String>> {
    if !contains_words(part, "PRIMARY KEY") {
        return None;
    }
    let open = part.find('(')?;
    let close = matching_paren(part, open)?;
    Some(
        split_top_level(&part[open + 1..close])
            .into_iter()
            .map(|col| unquote(first_word(col)))
            .collect(),
    )
}

/// First token: a quoted identifier, a word with an attached `(...)` group, or a bare word.
fn first_word(s: &str) -> &str {
    let s = s.trim_start();
    let Some(first) = s.chars().next() else {
        return s;
    };
    let close = match first {
        '"' => Some('"'),
        '`' => Some('`'),
        '[' => Some(']'),
        '\'' => Some('\''),
        _ => None,
    };
    if let Some(close) = close {
        return match s[1..].find(close) {
            Some(i) => &s[..i + 2],
            None => s,
        };
    }

    let mut end = s.len();
    for (i, c) in s.char_indices() {
        if c.is_whitespace() || c == ',' {
            end = i;
            break;
        }
        if c == '(' {
            end = matching_paren(s, i).map_or(s.len(), |j| j + 1);
            break;
        }
    }
    &s[..end]
}

fn unquote(word: &str) -> String {
    let trimmed = word.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next_back()) {
        (Some('"'), Some('"')) | (Some('`'), Some('`')) | (Some('['), Some(']'))
        | (Some('\''), Some('\'')) => trimmed[1..trimmed.len() - 1].to_string(),
        _ => trimmed.to_string(),
    }
}

/// Case-insensitive search for a whitespace-separated phrase.
fn contains_words(haystack: &str, phrase: &str) -> bool {
    let words: Vec<String> = haystack
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')' || c == ',')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase())
        .collect();
    let wanted: Vec<&str> = phrase.split_whitespace().collect();
    words.windows(wanted.len()).any(|window| window.iter().zip(&wanted).all(|(a, b)| a == b))
}

fn outer_parens(sql: &str) -> Option<(usize, usize)> {
    let start = sql.find('(')?;
    let end = matching_paren(sql, start)?;
    Some((start, end))
}

fn matching_paren(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s[open..].char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(open + i);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    parts.push(s[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    parts.push(s[start..].trim());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_columns_with_types_and_constraints() {
        let schema = TableSchema::from_create_sql(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, \"full name\" VARCHAR(40) NOT NULL, \
             price DECIMAL(10, 2) DEFAULT 0, blob, CHECK (price >= 0))",
        )
        .unwrap();

        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "full name", "price", "blob"]);
        assert!(schema.columns[0].is_rowid_alias);
        assert_eq!(schema.columns[1].declared_type, "VARCHAR(40)");
        assert_eq!(schema.columns[1].column_type, ColumnType::Text);
        assert_eq!(schema.columns[2].declared_type, "DECIMAL(10, 2)");
        assert_eq!(schema.columns[3].column_type, ColumnType::LongBinary);
        assert_eq!(schema.columns[3].column_id, 4);
        assert!(!schema.without_rowid);
    }

    #[test]
    fn table_level_primary_key_marks_alias() {
        let schema =
            TableSchema::from_create_sql("CREATE TABLE t (k INTEGER, v TEXT, PRIMARY KEY (k))")
                .unwrap();
        assert!(schema.columns[0].is_rowid_alias);
        assert_eq!(schema.columns.len(), 2);
    }

    #[test]
    fn bigint_primary_key_is_not_an_alias() {
        let schema =
            TableSchema::from_create_sql("CREATE TABLE t (k BIGINT PRIMARY KEY, v)").unwrap();
        assert!(!schema.columns[0].is_rowid_alias);
    }

    #[test]
    fn detects_without_rowid() {
        let schema =
            TableSchema::from_create_sql("CREATE TABLE t (k TEXT PRIMARY KEY) WITHOUT ROWID")
                .unwrap();
        assert!(schema.without_rowid);
        assert_eq!(schema.primary_key, [0]);
    }

    #[test]
    fn without_rowid_key_is_never_an_alias() {
        let schema = TableSchema::from_create_sql(
            "CREATE TABLE t (a, id INTEGER, c TEXT, PRIMARY KEY (c, id)) WITHOUT ROWID",
        )
        .unwrap();
        assert_eq!(schema.primary_key, [2, 1]);
        assert!(schema.columns.iter().all(|c| !c.is_rowid_alias));

        let single = TableSchema::from_create_sql(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v) WITHOUT ROWID",
        )
        .unwrap();
        assert!(!single.columns[0].is_rowid_alias);
    }

    #[test]
    fn parses_partial_unique_index() {
        let index = IndexSchema::from_create_sql(
            "CREATE UNIQUE INDEX by_email ON users (email COLLATE NOCASE, id DESC) WHERE email IS NOT NULL",
        )
        .unwrap();
        assert_eq!(index.columns, ["email", "id"]);
        assert!(index.unique);
        assert!(index.partial);
    }

    #[test]
    fn declared_types_follow_affinity_fallback() {
        assert_eq!(column_type_for("integer"), ColumnType::LongLong);
        assert_eq!(column_type_for("UNSIGNED SMALLINT"), ColumnType::UnsignedShort);
        assert_eq!(column_type_for("NATIVE CHARACTER(70)"), ColumnType::LongText);
        assert_eq!(column_type_for("BIGSERIALINT"), ColumnType::LongLong);
        assert_eq!(column_type_for("MONEY"), ColumnType::Currency);
        assert_eq!(column_type_for("GEOMETRY"), ColumnType::IeeeDouble);
        for declared in ["", "WHATEVER", "JSONB", "VARIANT(3)"] {
            assert!(
                !matches!(column_type_for(declared), ColumnType::Other(_)),
                "{:?}",
                declared
            );
        }
    }
}
