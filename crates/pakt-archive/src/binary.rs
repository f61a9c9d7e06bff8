//! Offset-addressed reads over an in-memory archive buffer.
//!
//! There is no cursor: every read names its absolute offset, and every read
//! that would run past the end of the buffer is a [`Error::CorruptData`].

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                Error::corrupt(format!(
                    "truncated: need {len} bytes at offset {offset}, buffer has {}",
                    self.data.len()
                ))
            })
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.bytes(offset, 1)?[0])
    }

    pub fn u16_le(&self, offset: usize) -> Result<u16> {
        let b = self.bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32_le(&self, offset: usize) -> Result<u32> {
        let b = self.bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a fixed-width field and cut it at the first NUL.
    pub fn fixed_str(&self, offset: usize, width: usize) -> Result<&'a [u8]> {
        let field = self.bytes(offset, width)?;
        Ok(until_nul(field))
    }

    /// Read a NUL-terminated string starting at `offset`.
    ///
    /// Returns the string without its terminator and the offset just past it.
    pub fn cstr_at(&self, offset: usize) -> Result<(&'a [u8], usize)> {
        let rest = self
            .data
            .get(offset..)
            .ok_or_else(|| Error::corrupt(format!("string offset {offset} out of range")))?;
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::corrupt(format!("unterminated string at offset {offset}")))?;
        Ok((&rest[..end], offset + end + 1))
    }

    pub fn has_signature(&self, offset: usize, signature: &[u8]) -> bool {
        self.bytes(offset, signature.len())
            .is_ok_and(|found| found == signature)
    }

    /// Offset of the last occurrence of `signature` in the buffer.
    pub fn rfind(&self, signature: &[u8]) -> Option<usize> {
        if signature.is_empty() || self.data.len() < signature.len() {
            return None;
        }
        self.data
            .windows(signature.len())
            .rposition(|window| window == signature)
    }
}

pub fn until_nul(field: &[u8]) -> &[u8] {
    match field.iter().position(|&b| b == 0) {
        Some(end) => &field[..end],
        None => field,
    }
}

pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian() {
        let r = BinaryReader::new(&[0x34, 0x12, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(r.u16_le(0).unwrap(), 0x1234);
        assert_eq!(r.u32_le(2).unwrap(), 0x1234_5678);
        assert_eq!(r.u8_at(5).unwrap(), 0x12);
    }

    #[test]
    fn out_of_range_is_corrupt() {
        let r = BinaryReader::new(&[1, 2, 3]);
        assert!(matches!(r.u32_le(0), Err(Error::CorruptData(_))));
        assert!(matches!(r.bytes(usize::MAX, 2), Err(Error::CorruptData(_))));
    }

    #[test]
    fn fixed_and_c_strings() {
        let r = BinaryReader::new(b"abc\0\0\0def\0tail");
        assert_eq!(r.fixed_str(0, 6).unwrap(), b"abc");
        assert_eq!(r.fixed_str(6, 3).unwrap(), b"def");
        assert_eq!(r.cstr_at(6).unwrap(), (&b"def"[..], 10));
        assert!(r.cstr_at(10).is_err());
    }

    #[test]
    fn rfind_keeps_last_match() {
        let r = BinaryReader::new(b"PK56..PK56..");
        assert_eq!(r.rfind(b"PK56"), Some(6));
        assert_eq!(r.rfind(b"nope"), None);
        assert!(r.has_signature(6, b"PK56"));
        assert!(!r.has_signature(10, b"PK56"));
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }
}
