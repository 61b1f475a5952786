//! Byte codec: bounds-checked reader, growable writer and VarInt
//!
//! VarInt layout:
//! - value < 0xfd: single byte
//! - value <= 0xffff: 0xfd prefix + 2 bytes (little-endian)
//! - value <= 0xffffffff: 0xfe prefix + 4 bytes (little-endian)
//! - otherwise: 0xff prefix + 8 bytes (little-endian)
//!
//! The writer always emits the shortest form. The reader accepts every form,
//! so `fd 01 00` and `01` both decode to 1.

use crate::error::CodecError;

/// Bounds-checked cursor over an immutable byte buffer.
///
/// A failed read leaves the position untouched and invalidates the cursor:
/// every later read returns [`CodecError::InvalidCursor`].
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
    valid: bool,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            valid: true,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Remaining bytes without consuming them.
    pub fn peek(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if !self.valid {
            return Err(CodecError::InvalidCursor);
        }
        if n > self.remaining() {
            self.valid = false;
            return Err(CodecError::Exhausted);
        }
        let start = self.position;
        self.position += n;
        Ok(&self.data[start..self.position])
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_hash(&mut self) -> Result<[u8; 32], CodecError> {
        self.read_array::<32>()
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16_be(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64_be(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Read a VarInt in any of its four encodings.
    ///
    /// The prefix byte and the payload are consumed together: a truncated
    /// payload rewinds nothing and invalidates the cursor.
    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        if !self.valid {
            return Err(CodecError::InvalidCursor);
        }
        let prefix = match self.data.get(self.position) {
            Some(b) => *b,
            None => {
                self.valid = false;
                return Err(CodecError::Exhausted);
            }
        };
        let width = match prefix {
            0xfd => 2,
            0xfe => 4,
            0xff => 8,
            _ => {
                self.position += 1;
                return Ok(u64::from(prefix));
            }
        };
        if self.remaining() < 1 + width {
            self.valid = false;
            return Err(CodecError::Exhausted);
        }
        self.position += 1;
        let value = match width {
            2 => u64::from(self.read_u16_le()?),
            4 => u64::from(self.read_u32_le()?),
            _ => self.read_u64_le()?,
        };
        Ok(value)
    }

    /// Read a VarInt used as a length and make sure that many bytes could exist.
    pub fn read_length(&mut self) -> Result<usize, CodecError> {
        let len = self.read_varint()?;
        let len = usize::try_from(len).map_err(|_| {
            self.valid = false;
            CodecError::LengthOverflow
        })?;
        if len > self.remaining() {
            self.valid = false;
            return Err(CodecError::Exhausted);
        }
        Ok(len)
    }

    /// Read a VarInt length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.read_length()?;
        self.read_bytes(len)
    }
}

/// Growable output buffer. All writes are total.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16_le(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32_le(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i32_le(&mut self, value: i32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i64_le(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u16_be(&mut self, value: u16) {
        self.write_bytes(&value.to_be_bytes());
    }

    pub fn write_u32_be(&mut self, value: u32) {
        self.write_bytes(&value.to_be_bytes());
    }

    pub fn write_u64_be(&mut self, value: u64) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Write the minimal VarInt encoding of `value`.
    pub fn write_varint(&mut self, value: u64) {
        if value < 0xfd {
            self.write_u8(value as u8);
        } else if value <= 0xffff {
            self.write_u8(0xfd);
            self.write_u16_le(value as u16);
        } else if value <= 0xffff_ffff {
            self.write_u8(0xfe);
            self.write_u32_le(value as u32);
        } else {
            self.write_u8(0xff);
            self.write_u64_le(value);
        }
    }

    /// Write a VarInt length prefix followed by the bytes.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_bytes(bytes);
    }
}

/// Size in bytes of the minimal VarInt encoding of `value`.
pub fn varint_size(value: u64) -> usize {
    if value < 0xfd {
        1
    } else if value <= 0xffff {
        3
    } else if value <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Encode a VarInt into a fresh vector.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut writer = ByteWriter::with_capacity(varint_size(value));
    writer.write_varint(value);
    writer.into_bytes()
}

/// Types with a canonical wire encoding.
pub trait Encodable {
    /// Append the encoding to `writer`.
    fn encode(&self, writer: &mut ByteWriter);

    /// Exact number of bytes [`Encodable::encode`] appends.
    fn serialized_size(&self) -> usize;

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(self.serialized_size());
        self.encode(&mut writer);
        writer.into_bytes()
    }
}

/// Types decodable from the wire encoding.
pub trait Decodable: Sized {
    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, CodecError>;

    /// Decode from a complete buffer. `strict` rejects trailing bytes.
    fn from_bytes(data: &[u8], strict: bool) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(data);
        let value = Self::decode(&mut reader)?;
        if strict && !reader.is_exhausted() {
            return Err(CodecError::TrailingBytes(reader.remaining()));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_integers_le_and_be() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u16_le().unwrap(), 0x0201);
        assert_eq!(reader.read_u16_be().unwrap(), 0x0304);
        assert_eq!(reader.read_u32_le().unwrap(), 0x08070605);
        assert!(reader.is_exhausted());

        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u64_be().unwrap(), 0x0102030405060708);
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u64_le().unwrap(), 0x0807060504030201);
    }

    #[test]
    fn test_failed_read_invalidates_cursor() {
        let data = [0xaa, 0xbb, 0xcc];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0xaa);
        assert_eq!(reader.read_u32_le(), Err(CodecError::Exhausted));
        // Position did not move on failure
        assert_eq!(reader.position(), 1);
        assert!(!reader.is_valid());
        // Two bytes remain but the cursor is dead
        assert_eq!(reader.read_u8(), Err(CodecError::InvalidCursor));
        assert_eq!(reader.read_varint(), Err(CodecError::InvalidCursor));
    }

    #[test]
    fn test_varint_minimal_write() {
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(252), vec![0xfc]);
        assert_eq!(encode_varint(253), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(encode_varint(0xffff), vec![0xfd, 0xff, 0xff]);
        assert_eq!(encode_varint(0x10000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(encode_varint(0xffff_ffff), vec![0xfe, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(
            encode_varint(0x1_0000_0000),
            vec![0xff, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_varint_non_minimal_read() {
        let forms: [&[u8]; 4] = [
            &[0x05],
            &[0xfd, 0x05, 0x00],
            &[0xfe, 0x05, 0x00, 0x00, 0x00],
            &[0xff, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        ];
        for form in forms {
            let mut reader = ByteReader::new(form);
            assert_eq!(reader.read_varint().unwrap(), 5);
            assert!(reader.is_exhausted());
        }
    }

    #[test]
    fn test_varint_truncated_payload() {
        let data = [0xfe, 0x01, 0x02];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_varint(), Err(CodecError::Exhausted));
        assert_eq!(reader.position(), 0);
        assert!(!reader.is_valid());
    }

    #[test]
    fn test_varint_size_matches_encoding() {
        for value in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, u64::MAX] {
            assert_eq!(varint_size(value), encode_varint(value).len());
        }
    }

    #[test]
    fn test_read_length_rejects_overlong() {
        // Claims 5 bytes, only 2 follow
        let data = [0x05, 0x01, 0x02];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_var_bytes(), Err(CodecError::Exhausted));
        assert!(!reader.is_valid());
    }

    #[test]
    fn test_writer_round_trip() {
        let mut writer = ByteWriter::new();
        writer.write_u32_le(0xdeadbeef);
        writer.write_u16_be(0x0102);
        writer.write_i64_le(-1);
        writer.write_var_bytes(&[0xab; 300]);
        let bytes = writer.into_bytes();

        let mut reader = ByteReader::new(&bytes);
        assert_eq!(reader.read_u32_le().unwrap(), 0xdeadbeef);
        assert_eq!(reader.read_u16_be().unwrap(), 0x0102);
        assert_eq!(reader.read_i64_le().unwrap(), -1);
        assert_eq!(reader.read_var_bytes().unwrap(), &[0xab; 300][..]);
        assert!(reader.is_exhausted());
    }
}
