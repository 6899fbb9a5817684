//! Little-endian byte access and fixed-width legacy name fields.
//!
//! Every lump container in this workspace stores integers little-endian and
//! names as NUL-padded fixed-width fields in a single-byte code page. Reads
//! are bounds-checked so a truncated container surfaces as
//! [`ArchiveError::UnexpectedEof`] instead of a panic.

use crate::error::{ArchiveError, Result};
use encoding_rs::WINDOWS_1252;

/// Bounds-checked reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Create a reader positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Take the next `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = slice(self.data, self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    /// Read a little-endian `u16`.
    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian `u32`.
    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a fixed-width NUL-padded name field.
    pub fn name(&mut self, width: usize) -> Result<String> {
        Ok(decode_name(self.take(width)?))
    }
}

/// Borrow `len` bytes at `offset`, failing if the data is too short.
pub fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| ArchiveError::corrupted(offset as u64, "length overflow"))?;
    if end > data.len() {
        return Err(ArchiveError::unexpected_eof(
            offset,
            end - data.len().max(offset),
        ));
    }
    Ok(&data[offset..end])
}

/// Read a little-endian `u32` at `offset`.
pub fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    ByteReader::at(data, offset).u32()
}

/// Decode a NUL-terminated single-byte name.
pub fn decode_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let (decoded, _, _) = WINDOWS_1252.decode(&bytes[..end]);
    decoded.into_owned()
}

/// Encode a name into a NUL-padded field of exactly `width` bytes.
///
/// Characters outside the code page are replaced, and names longer than the
/// field are truncated.
pub fn encode_name(name: &str, width: usize) -> Vec<u8> {
    let (encoded, _, _) = WINDOWS_1252.encode(name);
    let mut field = vec![0u8; width];
    let len = encoded.len().min(width);
    field[..len].copy_from_slice(&encoded[..len]);
    field
}

/// Byte length of `name` once encoded for a legacy name field.
pub fn encoded_len(name: &str) -> usize {
    WINDOWS_1252.encode(name).0.len()
}

/// Reject names the legacy code page cannot represent.
pub fn check_name(name: &str) -> Result<()> {
    let (_, _, unmappable) = WINDOWS_1252.encode(name);
    if unmappable {
        return Err(ArchiveError::invalid_name(
            name,
            "not representable in Windows-1252",
        ));
    }
    Ok(())
}

/// Append a little-endian `u16`.
pub fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append a little-endian `u32`.
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Convert a length to a `u32` header field.
pub fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ArchiveError::invalid_header(format!("{} too large: {}", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_bounds() {
        let data = [0x01, 0x00, 0x00, 0x00, 0xFF];
        let mut reader = ByteReader::at(&data, 0);
        assert_eq!(reader.u32().unwrap(), 1);
        assert!(matches!(
            reader.u32(),
            Err(ArchiveError::UnexpectedEof { offset: 4, .. })
        ));
    }

    #[test]
    fn test_check_name() {
        assert!(check_name("PLAYPAL").is_ok());
        assert!(check_name("caf\u{e9}.txt").is_ok());
        assert!(matches!(
            check_name("\u{65e5}\u{672c}"),
            Err(ArchiveError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_name_field() {
        let field = encode_name("PLAYPAL", 8);
        assert_eq!(field, b"PLAYPAL\0");
        assert_eq!(decode_name(&field), "PLAYPAL");

        let truncated = encode_name("TOOLONGNAME", 8);
        assert_eq!(decode_name(&truncated), "TOOLONGN");
    }

    #[test]
    fn test_name_high_bytes_survive() {
        let raw = [b'V', b'I', b'L', b'E', 0x9D, 0, 0, 0];
        let name = decode_name(&raw);
        assert_eq!(encode_name(&name, 8), raw);
    }
}
