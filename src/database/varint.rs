use crate::error::{Error, Result};

/// Decode the big-endian varint starting at `offset`.
///
/// Returns the value and the number of bytes it occupied (1 to 9). The ninth
/// byte, when reached, contributes all eight bits.
pub fn read_varint(data: &[u8], offset: usize) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (len, &byte) in data.iter().skip(offset).take(9).enumerate() {
        if len == 8 {
            return Ok(((value << 8) | u64::from(byte), 9));
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value, len + 1));
        }
    }
    Err(Error::Corrupt(format!("truncated varint at offset {}", offset)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte() {
        assert_eq!(read_varint(&[0x05], 0).unwrap(), (5, 1));
    }

    #[test]
    fn two_bytes_at_offset() {
        // 0x81 0x00 = 128
        assert_eq!(read_varint(&[0xFF, 0x81, 0x00], 1).unwrap(), (128, 2));
    }

    #[test]
    fn nine_bytes_use_full_last_byte() {
        let data = [0xFF; 9];
        assert_eq!(read_varint(&data, 0).unwrap(), (u64::MAX, 9));
    }

    #[test]
    fn truncated_input_is_corrupt() {
        assert!(matches!(read_varint(&[0x81], 0), Err(Error::Corrupt(_))));
    }
}
