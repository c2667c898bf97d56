use std::sync::Arc;

use tracing::trace;

use crate::database::Database;
use crate::error::Result;
use crate::row::{ColumnSet, Row};

/// A virtual, positionally addressed sequence of decoded rows.
pub trait RowProvider {
    /// Rows addressable under the current ordering.
    fn count(&mut self) -> Result<usize>;

    /// Up to `count` rows beginning at `start`. Fewer are returned when the
    /// range runs past the end, none when `start` is at or past it.
    fn fetch_range(&mut self, start: usize, count: usize) -> Result<Vec<Row>>;
}

impl<P: RowProvider + ?Sized> RowProvider for &mut P {
    fn count(&mut self) -> Result<usize> {
        (**self).count()
    }

    fn fetch_range(&mut self, start: usize, count: usize) -> Result<Vec<Row>> {
        (**self).fetch_range(start, count)
    }
}

/// Rows of one table, in rowid order or in the key order of one index.
#[derive(Debug)]
pub struct TableProvider<'db> {
    db: &'db Database,
    table: String,
    index: Option<String>,
    columns: Arc<ColumnSet>,
    count: Option<usize>,
}

impl<'db> TableProvider<'db> {
    pub fn new(db: &'db Database, table: &str, index: Option<&str>) -> Result<Self> {
        let columns = db.column_set(table)?;
        if let Some(index) = index {
            // fail on a bad index name here rather than on first fetch
            db.row_count(table, Some(index))?;
        }
        Ok(Self {
            db,
            table: table.to_string(),
            index: index.map(str::to_string),
            columns,
            count: None,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }
}

impl RowProvider for TableProvider<'_> {
    fn count(&mut self) -> Result<usize> {
        if let Some(count) = self.count {
            return Ok(count);
        }
        let count = self.db.row_count(&self.table, self.index.as_deref())?;
        self.count = Some(count);
        Ok(count)
    }

    fn fetch_range(&mut self, start: usize, count: usize) -> Result<Vec<Row>> {
        trace!(table = %self.table, index = ?self.index, start, count, "fetching rows");
        let records = self
            .db
            .fetch_records(&self.table, self.index.as_deref(), start, count)?;
        Ok(records
            .into_iter()
            .enumerate()
            .map(|(i, raw)| Row::new(self.columns.clone(), self.columns.decode(&raw), start + i))
            .collect())
    }
}
