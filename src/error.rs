use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a SQLite database: {0}")]
    NotADatabase(String),
    #[error("Corrupt database: {0}")]
    Corrupt(String),
    #[error("The database was not shut down cleanly")]
    DirtyShutdown,
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error("Index '{index}' not found on table '{table}'")]
    IndexNotFound { table: String, index: String },
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),
    #[error("Column {index} out of range ({len} columns)")]
    ColumnOutOfRange { index: usize, len: usize },
    #[error("Row {index} out of range ({count} rows)")]
    RowOutOfRange { index: usize, count: usize },
    #[error("'{0}' is not supported on a read-only row list")]
    ReadOnly(&'static str),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Invalid table selector '{0}', expected TABLE or TABLE/INDEX")]
    InvalidSelector(String),
    #[error("Malformed dump document: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
