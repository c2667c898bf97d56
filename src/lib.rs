pub mod catalog;
pub mod commands;
pub mod database;
pub mod error;
pub mod export;
pub mod paged;
pub mod provider;
pub mod row;
pub mod ui;

// Re-export main types for convenience
pub use catalog::{resolve, ColumnType, Decoder, SemanticType};
pub use database::{Database, IndexInfo, OpenOptions, RecordValue};
pub use error::{Error, Result};
pub use export::{ExportDocument, TableSelector, Truncate};
pub use paged::{PagedCache, MAX_PAGES_CACHED, PAGE_SIZE};
pub use provider::{RowProvider, TableProvider};
pub use row::{ColumnDescriptor, ColumnSet, Row, Value};
