//! Physical column types and their resolution to semantic value types.
//!
//! [`resolve`] is total: every [`ColumnType`] maps to a [`SemanticType`] and a
//! [`Decoder`]. Types without a dedicated decoder resolve to text carrying a
//! diagnostic, so a schema using types this crate does not know still reads.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::database::RecordValue;
use crate::row::Value;

/// Julian day number of 1970-01-01T00:00:00.
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Storage-level column type tag with a stable numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Bit,
    UnsignedByte,
    Short,
    Long,
    Currency,
    IeeeSingle,
    IeeeDouble,
    DateTime,
    Binary,
    Text,
    LongBinary,
    LongText,
    UnsignedLong,
    LongLong,
    Guid,
    UnsignedShort,
    UnsignedLongLong,
    Other(u32),
}

impl ColumnType {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ColumnType::Bit,
            2 => ColumnType::UnsignedByte,
            3 => ColumnType::Short,
            4 => ColumnType::Long,
            5 => ColumnType::Currency,
            6 => ColumnType::IeeeSingle,
            7 => ColumnType::IeeeDouble,
            8 => ColumnType::DateTime,
            9 => ColumnType::Binary,
            10 => ColumnType::Text,
            11 => ColumnType::LongBinary,
            12 => ColumnType::LongText,
            14 => ColumnType::UnsignedLong,
            15 => ColumnType::LongLong,
            16 => ColumnType::Guid,
            17 => ColumnType::UnsignedShort,
            18 => ColumnType::UnsignedLongLong,
            other => ColumnType::Other(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            ColumnType::Bit => 1,
            ColumnType::UnsignedByte => 2,
            ColumnType::Short => 3,
            ColumnType::Long => 4,
            ColumnType::Currency => 5,
            ColumnType::IeeeSingle => 6,
            ColumnType::IeeeDouble => 7,
            ColumnType::DateTime => 8,
            ColumnType::Binary => 9,
            ColumnType::Text => 10,
            ColumnType::LongBinary => 11,
            ColumnType::LongText => 12,
            ColumnType::UnsignedLong => 14,
            ColumnType::LongLong => 15,
            ColumnType::Guid => 16,
            ColumnType::UnsignedShort => 17,
            ColumnType::UnsignedLongLong => 18,
            ColumnType::Other(code) => *code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Bit => "Bit",
            ColumnType::UnsignedByte => "UnsignedByte",
            ColumnType::Short => "Short",
            ColumnType::Long => "Long",
            ColumnType::Currency => "Currency",
            ColumnType::IeeeSingle => "IEEESingle",
            ColumnType::IeeeDouble => "IEEEDouble",
            ColumnType::DateTime => "DateTime",
            ColumnType::Binary => "Binary",
            ColumnType::Text => "Text",
            ColumnType::LongBinary => "LongBinary",
            ColumnType::LongText => "LongText",
            ColumnType::UnsignedLong => "UnsignedLong",
            ColumnType::LongLong => "LongLong",
            ColumnType::Guid => "GUID",
            ColumnType::UnsignedShort => "UnsignedShort",
            ColumnType::UnsignedLongLong => "UnsignedLongLong",
            ColumnType::Other(_) => "Unknown",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// Logical type of the values a column decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Text,
    Int16,
    Int32,
    Int64,
    UInt16,
    UInt32,
    UInt64,
    Byte,
    Bool,
    Double,
    Float,
    DateTime,
    Guid,
    /// Binary data carried as base64 text.
    Binary,
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Text => "Text",
            SemanticType::Int16 => "Int16",
            SemanticType::Int32 => "Int32",
            SemanticType::Int64 => "Int64",
            SemanticType::UInt16 => "UInt16",
            SemanticType::UInt32 => "UInt32",
            SemanticType::UInt64 => "UInt64",
            SemanticType::Byte => "Byte",
            SemanticType::Bool => "Bool",
            SemanticType::Double => "Double",
            SemanticType::Float => "Float",
            SemanticType::DateTime => "DateTime",
            SemanticType::Guid => "Guid",
            SemanticType::Binary => "Binary",
        };
        f.write_str(name)
    }
}

/// Decode strategy bound to a column once, when its table is first described.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoder {
    Typed(SemanticType),
    /// Column type without a decoder: every row reads as this diagnostic text.
    Unhandled(String),
}

/// Resolve a physical column type. Never fails.
pub fn resolve(column_type: ColumnType) -> (SemanticType, Decoder) {
    let semantic = match column_type {
        ColumnType::Text | ColumnType::LongText => SemanticType::Text,
        ColumnType::Short => SemanticType::Int16,
        ColumnType::Long => SemanticType::Int32,
        ColumnType::LongLong => SemanticType::Int64,
        ColumnType::UnsignedShort => SemanticType::UInt16,
        ColumnType::UnsignedLong => SemanticType::UInt32,
        ColumnType::UnsignedLongLong => SemanticType::UInt64,
        ColumnType::UnsignedByte => SemanticType::Byte,
        ColumnType::Bit => SemanticType::Bool,
        ColumnType::IeeeDouble => SemanticType::Double,
        ColumnType::IeeeSingle => SemanticType::Float,
        ColumnType::DateTime => SemanticType::DateTime,
        ColumnType::Guid => SemanticType::Guid,
        ColumnType::Binary | ColumnType::LongBinary => SemanticType::Binary,
        ColumnType::Currency | ColumnType::Other(_) => {
            let message = format!(
                "ERROR: unhandled type {}({})",
                column_type.name(),
                column_type.code()
            );
            return (SemanticType::Text, Decoder::Unhandled(message));
        }
    };
    (semantic, Decoder::Typed(semantic))
}

impl Decoder {
    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Decoder::Typed(semantic) => *semantic,
            Decoder::Unhandled(_) => SemanticType::Text,
        }
    }

    /// `None` is the "no value" marker. A stored value that does not fit the
    /// column type comes back as its text rendering.
    pub fn decode(&self, raw: &RecordValue) -> Option<Value> {
        let semantic = match self {
            Decoder::Unhandled(message) => return Some(Value::Text(message.clone())),
            Decoder::Typed(semantic) => *semantic,
        };
        if raw.is_null() {
            return None;
        }

        let decoded = match semantic {
            SemanticType::Text => Some(Value::Text(raw_text(raw))),
            SemanticType::Int16 => integral(raw).map(Value::Int16),
            SemanticType::Int32 => integral(raw).map(Value::Int32),
            SemanticType::Int64 => integral(raw).map(Value::Int64),
            SemanticType::UInt16 => integral(raw).map(Value::UInt16),
            SemanticType::UInt32 => integral(raw).map(Value::UInt32),
            SemanticType::UInt64 => integral(raw).map(Value::UInt64),
            SemanticType::Byte => integral(raw).map(Value::Byte),
            SemanticType::Bool => boolean(raw).map(Value::Bool),
            SemanticType::Double => real(raw).map(Value::Double),
            SemanticType::Float => real(raw).map(|f| Value::Float(f as f32)),
            SemanticType::DateTime => datetime(raw).map(Value::DateTime),
            SemanticType::Guid => guid(raw).map(Value::Guid),
            // only blobs are encoded; text and numbers in an untyped column read as stored
            SemanticType::Binary => match raw {
                RecordValue::Blob(bytes) => Some(Value::Text(BASE64.encode(bytes))),
                _ => None,
            },
        };

        Some(decoded.unwrap_or_else(|| Value::Text(raw_text(raw))))
    }
}

fn raw_text(raw: &RecordValue) -> String {
    match raw {
        RecordValue::Null => String::new(),
        RecordValue::Int(n) => n.to_string(),
        RecordValue::Float(f) => f.to_string(),
        RecordValue::Text(text) => text.clone(),
        RecordValue::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => BASE64.encode(bytes),
        },
    }
}

fn integral<T: TryFrom<i64>>(raw: &RecordValue) -> Option<T> {
    let n = match raw {
        RecordValue::Int(n) => *n,
        RecordValue::Text(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    T::try_from(n).ok()
}

fn boolean(raw: &RecordValue) -> Option<bool> {
    match raw {
        RecordValue::Int(n) => Some(*n != 0),
        RecordValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn real(raw: &RecordValue) -> Option<f64> {
    match raw {
        RecordValue::Float(f) => Some(*f),
        RecordValue::Int(n) => Some(*n as f64),
        RecordValue::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn datetime(raw: &RecordValue) -> Option<NaiveDateTime> {
    match raw {
        RecordValue::Int(secs) => DateTime::from_timestamp(*secs, 0).map(|dt| dt.naive_utc()),
        RecordValue::Float(julian_day) => {
            let millis = ((julian_day - UNIX_EPOCH_JULIAN_DAY) * 86_400_000.0).round();
            if !millis.is_finite() {
                return None;
            }
            DateTime::from_timestamp_millis(millis as i64).map(|dt| dt.naive_utc())
        }
        RecordValue::Text(text) => {
            let text = text.trim();
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .ok()
                        .and_then(|date| date.and_hms_opt(0, 0, 0))
                })
        }
        _ => None,
    }
}

fn guid(raw: &RecordValue) -> Option<Uuid> {
    match raw {
        RecordValue::Blob(bytes) => Uuid::from_slice(bytes).ok(),
        RecordValue::Text(text) => Uuid::parse_str(text.trim()).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(column_type: ColumnType, raw: RecordValue) -> Option<Value> {
        resolve(column_type).1.decode(&raw)
    }

    #[test]
    fn known_types_resolve_to_their_semantic_type() {
        assert_eq!(resolve(ColumnType::Short).0, SemanticType::Int16);
        assert_eq!(resolve(ColumnType::UnsignedLongLong).0, SemanticType::UInt64);
        assert_eq!(resolve(ColumnType::LongBinary).0, SemanticType::Binary);
        assert_eq!(resolve(ColumnType::LongText).1, Decoder::Typed(SemanticType::Text));
    }

    #[test]
    fn unknown_type_yields_diagnostic_text() {
        let (semantic, decoder) = resolve(ColumnType::from_code(42));
        assert_eq!(semantic, SemanticType::Text);

        let text = match decoder.decode(&RecordValue::Int(7)) {
            Some(Value::Text(text)) => text,
            other => panic!("expected text, got {:?}", other),
        };
        assert!(text.contains("Unknown"));
        assert!(text.contains("42"));
    }

    #[test]
    fn currency_is_known_but_unhandled() {
        let (_, decoder) = resolve(ColumnType::Currency);
        assert_eq!(
            decoder.decode(&RecordValue::Null),
            Some(Value::Text("ERROR: unhandled type Currency(5)".into()))
        );
    }

    #[test]
    fn null_decodes_to_no_value_for_every_typed_column() {
        for code in [1, 2, 3, 4, 6, 7, 8, 9, 10, 11, 12, 14, 15, 16, 17, 18] {
            assert_eq!(decode(ColumnType::from_code(code), RecordValue::Null), None);
        }
    }

    #[test]
    fn empty_text_is_not_null() {
        assert_eq!(
            decode(ColumnType::Text, RecordValue::Text(String::new())),
            Some(Value::Text(String::new()))
        );
    }

    #[test]
    fn integers_decode_to_their_width() {
        assert_eq!(decode(ColumnType::Short, RecordValue::Int(-3)), Some(Value::Int16(-3)));
        assert_eq!(decode(ColumnType::UnsignedByte, RecordValue::Int(255)), Some(Value::Byte(255)));
        assert_eq!(decode(ColumnType::Bit, RecordValue::Int(1)), Some(Value::Bool(true)));
        assert_eq!(decode(ColumnType::IeeeSingle, RecordValue::Int(2)), Some(Value::Float(2.0)));
    }

    #[test]
    fn out_of_range_value_falls_back_to_text() {
        assert_eq!(
            decode(ColumnType::UnsignedShort, RecordValue::Int(-1)),
            Some(Value::Text("-1".into()))
        );
        assert_eq!(
            decode(ColumnType::Long, RecordValue::Text("abc".into())),
            Some(Value::Text("abc".into()))
        );
    }

    #[test]
    fn binary_becomes_base64() {
        assert_eq!(
            decode(ColumnType::Binary, RecordValue::Blob(b"hello".to_vec())),
            Some(Value::Text("aGVsbG8=".into()))
        );
    }

    #[test]
    fn untyped_column_keeps_text_and_numbers_readable() {
        // a column declared without a type resolves to LongBinary
        assert_eq!(
            decode(ColumnType::LongBinary, RecordValue::Text("hello".into())),
            Some(Value::Text("hello".into()))
        );
        assert_eq!(
            decode(ColumnType::LongBinary, RecordValue::Int(5)),
            Some(Value::Text("5".into()))
        );
        assert_eq!(
            decode(ColumnType::LongBinary, RecordValue::Blob(vec![0xff, 0x00])),
            Some(Value::Text("/wA=".into()))
        );
    }

    #[test]
    fn datetime_accepts_text_unix_and_julian() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 4)
            .unwrap()
            .and_hms_opt(5, 6, 7)
            .unwrap();
        assert_eq!(
            decode(ColumnType::DateTime, RecordValue::Text("2021-03-04 05:06:07".into())),
            Some(Value::DateTime(expected))
        );
        assert_eq!(
            decode(ColumnType::DateTime, RecordValue::Int(expected.and_utc().timestamp())),
            Some(Value::DateTime(expected))
        );
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(
            decode(ColumnType::DateTime, RecordValue::Float(UNIX_EPOCH_JULIAN_DAY)),
            Some(Value::DateTime(epoch))
        );
    }

    #[test]
    fn guid_from_blob_and_text() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            decode(ColumnType::Guid, RecordValue::Blob(id.as_bytes().to_vec())),
            Some(Value::Guid(id))
        );
        assert_eq!(
            decode(ColumnType::Guid, RecordValue::Text(id.to_string())),
            Some(Value::Guid(id))
        );
    }

    #[test]
    fn codes_round_trip_through_column_type() {
        for code in 0..20 {
            assert_eq!(ColumnType::from_code(code).code(), code);
        }
    }
}
