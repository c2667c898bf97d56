use tracing::trace;

use crate::error::{Error, Result};
use super::cell::{Cell, Payload};
use super::page::{read_u32, BTreePage, PageKind};
use super::{Database, Record};

/// Deeper than any real b-tree; hitting it means a page cycle.
const MAX_DEPTH: usize = 64;

/// How many keys `distinct_keys` pulls per pass.
const KEY_BATCH: usize = 1024;

/// One entry of a table or index b-tree with its payload fully assembled.
#[derive(Debug)]
pub(super) struct Entry {
    /// Set for table entries. Index entries carry the rowid inside the payload.
    pub row_id: Option<i64>,
    pub payload: Vec<u8>,
}

impl Database {
    fn read_page(&self, page_number: u32) -> Result<BTreePage> {
        BTreePage::parse(page_number, self.read_raw_page(page_number)?)
    }

    fn check_depth(depth: usize, page_number: u32) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::Corrupt(format!(
                "b-tree deeper than {} levels at page {}",
                MAX_DEPTH, page_number
            )));
        }
        Ok(())
    }

    /// Number of entries in the subtree rooted at `page_number`. Interior
    /// index cells are entries themselves, interior table cells are not.
    pub(super) fn entry_count(&self, page_number: u32, depth: usize) -> Result<usize> {
        if let Some(&count) = self.subtree_counts.borrow().get(&page_number) {
            return Ok(count);
        }
        Self::check_depth(depth, page_number)?;

        let page = self.read_page(page_number)?;
        let mut count = match page.kind {
            PageKind::LeafTable | PageKind::LeafIndex | PageKind::InteriorIndex => {
                page.cell_count()
            }
            PageKind::InteriorTable => 0,
        };
        if !page.kind.is_leaf() {
            for child in page.children()? {
                count += self.entry_count(child, depth + 1)?;
            }
        }

        self.subtree_counts.borrow_mut().insert(page_number, count);
        Ok(count)
    }

    /// Append entries to `out`, in key order, until it holds `limit` entries.
    /// The first `skip` entries are passed over; whole subtrees are skipped
    /// by their memoised count without being read.
    pub(super) fn collect_range(
        &self,
        page_number: u32,
        skip: &mut usize,
        limit: usize,
        out: &mut Vec<Entry>,
        depth: usize,
    ) -> Result<()> {
        if out.len() >= limit {
            return Ok(());
        }
        Self::check_depth(depth, page_number)?;

        let page = self.read_page(page_number)?;
        match page.kind {
            PageKind::LeafTable | PageKind::LeafIndex => {
                let cells = page.cell_count();
                if *skip >= cells {
                    *skip -= cells;
                    return Ok(());
                }
                for i in *skip..cells {
                    if out.len() >= limit {
                        break;
                    }
                    out.push(self.entry(Cell::parse(&page, i, self.header.usable_size)?)?);
                }
                *skip = 0;
            }
            PageKind::InteriorTable => {
                for child in page.children()? {
                    if out.len() >= limit {
                        break;
                    }
                    self.visit_child(child, skip, limit, out, depth)?;
                }
            }
            PageKind::InteriorIndex => {
                for i in 0..page.cell_count() {
                    if out.len() >= limit {
                        return Ok(());
                    }
                    let cell = Cell::parse(&page, i, self.header.usable_size)?;
                    let Cell::IndexInterior { left_child, .. } = cell else {
                        return Err(Error::Corrupt(format!(
                            "unexpected cell on interior index page {}",
                            page_number
                        )));
                    };
                    self.visit_child(left_child, skip, limit, out, depth)?;
                    if out.len() >= limit {
                        return Ok(());
                    }
                    // the separator key sits between its left subtree and the next one
                    if *skip > 0 {
                        *skip -= 1;
                    } else {
                        out.push(self.entry(cell)?);
                    }
                }
                if let Some(right) = page.right_most {
                    self.visit_child(right, skip, limit, out, depth)?;
                }
            }
        }
        Ok(())
    }

    fn visit_child(
        &self,
        child: u32,
        skip: &mut usize,
        limit: usize,
        out: &mut Vec<Entry>,
        depth: usize,
    ) -> Result<()> {
        if *skip > 0 {
            let count = self.entry_count(child, depth + 1)?;
            if *skip >= count {
                *skip -= count;
                return Ok(());
            }
        }
        self.collect_range(child, skip, limit, out, depth + 1)
    }

    fn entry(&self, cell: Cell) -> Result<Entry> {
        match cell {
            Cell::TableLeaf { row_id, payload } => Ok(Entry {
                row_id: Some(row_id),
                payload: self.assemble(&payload)?,
            }),
            Cell::IndexLeaf { payload } | Cell::IndexInterior { payload, .. } => Ok(Entry {
                row_id: None,
                payload: self.assemble(&payload)?,
            }),
            Cell::TableInterior { .. } => {
                Err(Error::Corrupt("interior table cell has no payload".into()))
            }
        }
    }

    /// Payload of the row with `row_id`, found by keyed descent from `root`.
    pub(super) fn find_row(&self, root: u32, row_id: i64) -> Result<Option<Vec<u8>>> {
        let mut page_number = root;
        for _ in 0..=MAX_DEPTH {
            let page = self.read_page(page_number)?;
            match page.kind {
                PageKind::LeafTable => {
                    for i in 0..page.cell_count() {
                        if let Cell::TableLeaf {
                            row_id: found,
                            payload,
                        } = Cell::parse(&page, i, self.header.usable_size)?
                        {
                            if found == row_id {
                                return self.assemble(&payload).map(Some);
                            }
                        }
                    }
                    return Ok(None);
                }
                PageKind::InteriorTable => {
                    let mut next = page.right_most;
                    for i in 0..page.cell_count() {
                        if let Cell::TableInterior {
                            left_child,
                            row_id: key,
                        } = Cell::parse(&page, i, self.header.usable_size)?
                        {
                            if row_id <= key {
                                next = Some(left_child);
                                break;
                            }
                        }
                    }
                    page_number = next.ok_or_else(|| {
                        Error::Corrupt(format!("interior page {} has no right child", page.number))
                    })?;
                }
                _ => {
                    return Err(Error::Corrupt(format!(
                        "page {} is not a table b-tree page",
                        page_number
                    )))
                }
            }
        }
        Err(Error::Corrupt(format!("b-tree deeper than {} levels", MAX_DEPTH)))
    }

    /// Local bytes plus the overflow chain, if any.
    fn assemble(&self, payload: &Payload) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(payload.total);
        data.extend_from_slice(&payload.local);

        let mut next = payload.overflow;
        let mut hops = 0u32;
        while let Some(page_number) = next {
            if data.len() >= payload.total {
                break;
            }
            hops += 1;
            if hops > self.header.page_count {
                return Err(Error::Corrupt("overflow chain loops".into()));
            }
            trace!(page = page_number, "following overflow page");

            let page = self.read_raw_page(page_number)?;
            let following = read_u32(&page, 0)?;
            let content = &page[4..self.header.usable_size];
            let take = content.len().min(payload.total - data.len());
            data.extend_from_slice(&content[..take]);
            next = (following != 0).then_some(following);
        }

        if data.len() < payload.total {
            return Err(Error::Corrupt(format!(
                "payload of {} bytes truncated at {}",
                payload.total,
                data.len()
            )));
        }
        Ok(data)
    }

    /// Distinct keys of the index at `root`, ignoring the trailing `suffix`
    /// values that point back at the table row.
    pub(super) fn distinct_keys(&self, root: u32, suffix: usize) -> Result<usize> {
        let mut distinct = 0;
        let mut previous: Option<Vec<_>> = None;
        let mut position = 0;
        loop {
            let mut entries = Vec::with_capacity(KEY_BATCH);
            let mut skip = position;
            self.collect_range(root, &mut skip, KEY_BATCH, &mut entries, 0)?;
            if entries.is_empty() {
                break;
            }
            position += entries.len();

            for entry in &entries {
                let mut key = Record::from_bytes(&entry.payload, self.header.encoding)?.values;
                key.truncate(key.len().saturating_sub(suffix));
                if previous.as_ref() != Some(&key) {
                    distinct += 1;
                    previous = Some(key);
                }
            }
            if entries.len() < KEY_BATCH {
                break;
            }
        }
        Ok(distinct)
    }
}
