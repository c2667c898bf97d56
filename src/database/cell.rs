use bytes::Bytes;

use crate::error::{Error, Result};
use super::page::{read_u32, BTreePage, PageKind};
use super::varint::read_varint;

/// The part of a payload stored on the b-tree page, plus where the rest continues.
#[derive(Debug, Clone)]
pub struct Payload {
    pub total: usize,
    pub local: Bytes,
    pub overflow: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum Cell {
    TableLeaf { row_id: i64, payload: Payload },
    TableInterior { left_child: u32, row_id: i64 },
    IndexLeaf { payload: Payload },
    IndexInterior { left_child: u32, payload: Payload },
}

impl Cell {
    pub fn parse(page: &BTreePage, index: usize, usable_size: usize) -> Result<Self> {
        let offset = *page.cell_offsets.get(index).ok_or_else(|| {
            Error::Corrupt(format!("cell {} out of range on page {}", index, page.number))
        })?;
        let data = &page.data;

        match page.kind {
            PageKind::InteriorTable => {
                let left_child = read_u32(data, offset)?;
                let (row_id, _) = read_varint(data, offset + 4)?;
                Ok(Cell::TableInterior {
                    left_child,
                    row_id: row_id as i64,
                })
            }
            PageKind::LeafTable => {
                let mut pos = offset;
                let (total, bytes_read) = read_varint(data, pos)?;
                pos += bytes_read;
                let (row_id, bytes_read) = read_varint(data, pos)?;
                pos += bytes_read;
                let payload =
                    Payload::parse(data, pos, total as usize, usable_size - 35, usable_size)?;
                Ok(Cell::TableLeaf {
                    row_id: row_id as i64,
                    payload,
                })
            }
            PageKind::LeafIndex => {
                let (total, bytes_read) = read_varint(data, offset)?;
                let payload = Payload::parse(
                    data,
                    offset + bytes_read,
                    total as usize,
                    max_index_local(usable_size),
                    usable_size,
                )?;
                Ok(Cell::IndexLeaf { payload })
            }
            PageKind::InteriorIndex => {
                let left_child = read_u32(data, offset)?;
                let (total, bytes_read) = read_varint(data, offset + 4)?;
                let payload = Payload::parse(
                    data,
                    offset + 4 + bytes_read,
                    total as usize,
                    max_index_local(usable_size),
                    usable_size,
                )?;
                Ok(Cell::IndexInterior {
                    left_child,
                    payload,
                })
            }
        }
    }
}

impl Payload {
    fn parse(
        data: &Bytes,
        start: usize,
        total: usize,
        max_local: usize,
        usable_size: usize,
    ) -> Result<Self> {
        let local_len = local_size(total, max_local, usable_size);
        if start + local_len > data.len() {
            return Err(Error::Corrupt("cell payload extends beyond page".into()));
        }
        let local = data.slice(start..start + local_len);
        let overflow = if local_len < total {
            Some(read_u32(data, start + local_len)?)
        } else {
            None
        };
        Ok(Payload {
            total,
            local,
            overflow,
        })
    }
}

fn max_index_local(usable_size: usize) -> usize {
    ((usable_size - 12) * 64 / 255) - 23
}

/// Bytes of a `total`-byte payload kept on the page itself.
fn local_size(total: usize, max_local: usize, usable_size: usize) -> usize {
    if total <= max_local {
        return total;
    }
    let min_local = ((usable_size - 12) * 32 / 255) - 23;
    let k = min_local + (total - min_local) % (usable_size - 4);
    if k <= max_local {
        k
    } else {
        min_local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payloads_stay_local() {
        assert_eq!(local_size(100, 989, 1024), 100);
    }

    #[test]
    fn large_payloads_spill() {
        // usable 1024: min_local = 103, spill unit = 1020
        let total = 3000;
        let expected = 103 + (3000 - 103) % 1020;
        assert_eq!(local_size(total, 989, 1024), expected);
    }

    #[test]
    fn parses_table_leaf_cell() {
        let mut raw = vec![0u8; 512];
        raw[0] = 13;
        raw[3..5].copy_from_slice(&1u16.to_be_bytes());
        raw[8..10].copy_from_slice(&400u16.to_be_bytes());
        // payload 3 bytes, rowid 7, record [2, 1, 42]
        raw[400..405].copy_from_slice(&[3, 7, 2, 1, 42]);

        let page = BTreePage::parse(2, Bytes::from(raw)).unwrap();
        match Cell::parse(&page, 0, 512).unwrap() {
            Cell::TableLeaf { row_id, payload } => {
                assert_eq!(row_id, 7);
                assert_eq!(&payload.local[..], &[2, 1, 42]);
                assert!(payload.overflow.is_none());
            }
            other => panic!("unexpected cell {:?}", other),
        }
    }
}
