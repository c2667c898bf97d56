use crate::error::{Error, Result};
use super::varint::read_varint;

/// How TEXT values are stored in the file (header offset 56).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    pub fn from_header(code: u32) -> Result<Self> {
        match code {
            // 0 only shows up in a freshly created, still empty file
            0 | 1 => Ok(TextEncoding::Utf8),
            2 => Ok(TextEncoding::Utf16Le),
            3 => Ok(TextEncoding::Utf16Be),
            other => Err(Error::NotADatabase(format!("unknown text encoding {}", other))),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            TextEncoding::Utf8 => 1,
            TextEncoding::Utf16Le => 2,
            TextEncoding::Utf16Be => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16Le => "UTF-16le",
            TextEncoding::Utf16Be => "UTF-16be",
        }
    }

    /// Text as stored, or the raw bytes as a blob when they are not valid
    /// text in this encoding.
    fn decode(&self, bytes: &[u8]) -> RecordValue {
        let text = match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).ok(),
            TextEncoding::Utf16Le | TextEncoding::Utf16Be if bytes.len() % 2 == 0 => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| match self {
                        TextEncoding::Utf16Le => u16::from_le_bytes([pair[0], pair[1]]),
                        _ => u16::from_be_bytes([pair[0], pair[1]]),
                    })
                    .collect();
                String::from_utf16(&units).ok()
            }
            _ => None,
        };
        text.map_or_else(|| RecordValue::Blob(bytes.to_vec()), RecordValue::Text)
    }
}

/// A value exactly as stored in a record, before any column typing.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Null,
    Int(i64),
    Float(f64),
    Blob(Vec<u8>),
    Text(String),
}

impl RecordValue {
    /// Decode one value of the given serial type. Returns the value and the bytes consumed.
    pub fn from_type_and_data(
        col_type: u64,
        data: &[u8],
        offset: usize,
        encoding: TextEncoding,
    ) -> Result<(Self, usize)> {
        match col_type {
            0 => Ok((RecordValue::Null, 0)),
            1 => Self::read_int(data, offset, 1), // 8-bit twos-complement
            2 => Self::read_int(data, offset, 2), // 16-bit twos-complement
            3 => Self::read_int(data, offset, 3), // 24-bit twos-complement
            4 => Self::read_int(data, offset, 4), // 32-bit twos-complement
            5 => Self::read_int(data, offset, 6), // 48-bit twos-complement
            6 => Self::read_int(data, offset, 8), // 64-bit twos-complement
            7 => {
                let bytes = Self::slice(data, offset, 8, "float")?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                Ok((RecordValue::Float(f64::from_be_bytes(raw)), 8))
            }
            8 => Ok((RecordValue::Int(0), 0)),
            9 => Ok((RecordValue::Int(1), 0)),
            n if n >= 12 && n % 2 == 0 => {
                let len = ((n - 12) / 2) as usize;
                let bytes = Self::slice(data, offset, len, "blob")?;
                Ok((RecordValue::Blob(bytes.to_vec()), len))
            }
            n if n >= 13 => {
                let len = ((n - 13) / 2) as usize;
                let bytes = Self::slice(data, offset, len, "text")?;
                Ok((encoding.decode(bytes), len))
            }
            // 10 and 11 are reserved for internal use
            _ => Err(Error::Corrupt(format!("invalid serial type {}", col_type))),
        }
    }

    fn slice<'a>(data: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
        data.get(offset..offset + len)
            .ok_or_else(|| Error::Corrupt(format!("not enough data for {}", what)))
    }

    fn read_int(data: &[u8], offset: usize, size: usize) -> Result<(Self, usize)> {
        let bytes = Self::slice(data, offset, size, "integer")?;
        let mut padded = [0; 8];

        padded[8 - size..].copy_from_slice(bytes);

        // sign-extend
        if bytes[0] & 0x80 != 0 {
            for byte in padded.iter_mut().take(8 - size) {
                *byte = 0xFF;
            }
        }

        Ok((RecordValue::Int(i64::from_be_bytes(padded)), size))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RecordValue::Null)
    }
}

#[derive(Debug, Clone)]
pub struct Record {
    pub values: Vec<RecordValue>,
}

impl Record {
    pub fn from_bytes(data: &[u8], encoding: TextEncoding) -> Result<Self> {
        let (header_size, mut pos) = read_varint(data, 0)?;
        let header_size = header_size as usize;
        if header_size > data.len() {
            return Err(Error::Corrupt("record header runs past payload".into()));
        }

        let mut column_types = Vec::new();
        while pos < header_size {
            let (col_type, bytes_read) = read_varint(data, pos)?;
            pos += bytes_read;
            column_types.push(col_type);
        }

        let mut values = Vec::with_capacity(column_types.len());
        let mut data_offset = header_size;
        for col_type in column_types {
            let (value, bytes_read) =
                RecordValue::from_type_and_data(col_type, data, data_offset, encoding)?;
            values.push(value);
            data_offset += bytes_read;
        }

        Ok(Record { values })
    }

    pub fn text(&self, i: usize) -> Option<&str> {
        match self.values.get(i) {
            Some(RecordValue::Text(t)) => Some(t),
            _ => None,
        }
    }

    pub fn int(&self, i: usize) -> Option<i64> {
        match self.values.get(i) {
            Some(RecordValue::Int(n)) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_mixed_record() {
        // header: size 5, types [1 (i8), 0 (null), 19 (3-char text), 9 (one)]
        let data = [5, 1, 0, 19, 9, 0xFE, b'a', b'b', b'c'];
        let record = Record::from_bytes(&data, TextEncoding::Utf8).unwrap();
        assert_eq!(
            record.values,
            vec![
                RecordValue::Int(-2),
                RecordValue::Null,
                RecordValue::Text("abc".into()),
                RecordValue::Int(1),
            ]
        );
    }

    #[test]
    fn sign_extends_24_bit_integers() {
        let (value, used) =
            RecordValue::from_type_and_data(3, &[0xFF, 0xFF, 0xFE], 0, TextEncoding::Utf8).unwrap();
        assert_eq!(value, RecordValue::Int(-2));
        assert_eq!(used, 3);
    }

    #[test]
    fn decodes_utf16_text() {
        let (value, _) =
            RecordValue::from_type_and_data(21, &[b'h', 0, b'i', 0], 0, TextEncoding::Utf16Le)
                .unwrap();
        assert_eq!(value, RecordValue::Text("hi".into()));
    }

    #[test]
    fn invalid_text_keeps_its_bytes() {
        // text of 2 bytes that are not UTF-8
        let (value, used) =
            RecordValue::from_type_and_data(17, &[0xC3, 0x28], 0, TextEncoding::Utf8).unwrap();
        assert_eq!(value, RecordValue::Blob(vec![0xC3, 0x28]));
        assert_eq!(used, 2);

        // lone high surrogate
        let (value, _) =
            RecordValue::from_type_and_data(17, &[0x00, 0xD8], 0, TextEncoding::Utf16Le).unwrap();
        assert_eq!(value, RecordValue::Blob(vec![0x00, 0xD8]));

        // odd length cannot be UTF-16
        let (value, _) =
            RecordValue::from_type_and_data(19, &[b'a', 0, b'b'], 0, TextEncoding::Utf16Le)
                .unwrap();
        assert_eq!(value, RecordValue::Blob(vec![b'a', 0, b'b']));
    }

    #[test]
    fn reserved_serial_type_is_corrupt() {
        assert!(RecordValue::from_type_and_data(10, &[], 0, TextEncoding::Utf8).is_err());
    }

    #[test]
    fn short_blob_is_corrupt() {
        // blob of 2 bytes but only one present
        assert!(RecordValue::from_type_and_data(16, &[1], 0, TextEncoding::Utf8).is_err());
    }
}
