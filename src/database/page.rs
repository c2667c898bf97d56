use bytes::{Buf, Bytes};

use crate::error::{Error, Result};

pub const DB_HEADER_SIZE: usize = 100;

// B-tree page types
const INTERIOR_INDEX_PAGE: u8 = 2;
const INTERIOR_TABLE_PAGE: u8 = 5;
const LEAF_INDEX_PAGE: u8 = 10;
const LEAF_TABLE_PAGE: u8 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    InteriorIndex,
    InteriorTable,
    LeafIndex,
    LeafTable,
}

impl PageKind {
    fn from_byte(byte: u8, page_number: u32) -> Result<Self> {
        match byte {
            INTERIOR_INDEX_PAGE => Ok(PageKind::InteriorIndex),
            INTERIOR_TABLE_PAGE => Ok(PageKind::InteriorTable),
            LEAF_INDEX_PAGE => Ok(PageKind::LeafIndex),
            LEAF_TABLE_PAGE => Ok(PageKind::LeafTable),
            other => Err(Error::Corrupt(format!(
                "page {} has unknown b-tree page type {}",
                page_number, other
            ))),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, PageKind::LeafIndex | PageKind::LeafTable)
    }
}

/// A parsed b-tree page: header fields plus the raw page bytes.
#[derive(Debug, Clone)]
pub struct BTreePage {
    pub number: u32,
    pub kind: PageKind,
    pub right_most: Option<u32>,
    pub cell_offsets: Vec<usize>,
    pub data: Bytes,
}

impl BTreePage {
    pub fn parse(number: u32, data: Bytes) -> Result<Self> {
        // page 1 starts with the database header
        let header_offset = if number == 1 { DB_HEADER_SIZE } else { 0 };
        let corrupt = || Error::Corrupt(format!("page {} too small for b-tree header", number));

        let mut header: &[u8] = data.get(header_offset..).ok_or_else(corrupt)?;
        if header.remaining() < 8 {
            return Err(corrupt());
        }
        let kind = PageKind::from_byte(header.get_u8(), number)?;
        let _first_freeblock = header.get_u16();
        let cell_count = header.get_u16() as usize;
        let _content_start = header.get_u16();
        let _fragmented_bytes = header.get_u8();

        let right_most = if kind.is_leaf() {
            None
        } else {
            if header.remaining() < 4 {
                return Err(corrupt());
            }
            Some(header.get_u32())
        };

        if header.remaining() < cell_count * 2 {
            return Err(Error::Corrupt(format!(
                "page {} too small to contain {} cell pointers",
                number, cell_count
            )));
        }
        let cell_offsets = (0..cell_count).map(|_| header.get_u16() as usize).collect();

        Ok(BTreePage {
            number,
            kind,
            right_most,
            cell_offsets,
            data,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.cell_offsets.len()
    }

    /// Left child pointers of every cell, then the right-most pointer.
    pub fn children(&self) -> Result<Vec<u32>> {
        let mut children = Vec::with_capacity(self.cell_count() + 1);
        for &offset in &self.cell_offsets {
            children.push(read_u32(&self.data, offset)?);
        }
        children.extend(self.right_most);
        Ok(children)
    }
}

/// Read a 4-byte big-endian page number at the given offset
pub fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    let mut bytes = data
        .get(offset..offset + 4)
        .ok_or_else(|| Error::Corrupt("not enough data to read page number".into()))?;
    Ok(bytes.get_u32())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interior_table_header() {
        let mut raw = vec![0u8; 512];
        raw[0] = INTERIOR_TABLE_PAGE;
        raw[3..5].copy_from_slice(&1u16.to_be_bytes()); // one cell
        raw[8..12].copy_from_slice(&9u32.to_be_bytes()); // right-most child
        raw[12..14].copy_from_slice(&500u16.to_be_bytes()); // cell pointer
        raw[500..504].copy_from_slice(&4u32.to_be_bytes()); // left child

        let page = BTreePage::parse(3, Bytes::from(raw)).unwrap();
        assert_eq!(page.kind, PageKind::InteriorTable);
        assert_eq!(page.cell_offsets, vec![500]);
        assert_eq!(page.children().unwrap(), vec![4, 9]);
    }

    #[test]
    fn rejects_unknown_page_type() {
        let raw = vec![7u8; 64];
        assert!(matches!(BTreePage::parse(2, Bytes::from(raw)), Err(Error::Corrupt(_))));
    }
}
