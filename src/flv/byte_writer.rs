use crate::error::BufferError;
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};

/// Fixed-capacity serialization buffer with backpatch support.
///
/// The buffer never grows past the capacity it was created with: a write
/// that does not fit fails with [`BufferError::Overflow`] and leaves the
/// buffer untouched.
pub struct ByteWriter {
    bytes: BytesMut,
    capacity: usize,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    fn reserve(&self, additional: usize) -> Result<(), BufferError> {
        let position = self.bytes.len();
        if position.saturating_add(additional) > self.capacity {
            return Err(BufferError::Overflow {
                position,
                additional,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn put_byte(&mut self, value: u8) -> Result<(), BufferError> {
        self.reserve(1)?;
        self.bytes.put_u8(value);
        Ok(())
    }

    pub fn put_be16(&mut self, value: u16) -> Result<(), BufferError> {
        self.reserve(2)?;
        self.bytes.put_u16(value);
        Ok(())
    }

    pub fn put_be24(&mut self, value: u32) -> Result<(), BufferError> {
        if value > 0x00FF_FFFF {
            return Err(BufferError::ValueTooLarge(value));
        }
        self.reserve(3)?;
        self.bytes.put_uint(value as u64, 3);
        Ok(())
    }

    pub fn put_be32(&mut self, value: u32) -> Result<(), BufferError> {
        self.reserve(4)?;
        self.bytes.put_u32(value);
        Ok(())
    }

    pub fn put_be64(&mut self, value: u64) -> Result<(), BufferError> {
        self.reserve(8)?;
        self.bytes.put_u64(value);
        Ok(())
    }

    /// Appends raw bytes.
    pub fn put_tag(&mut self, data: &[u8]) -> Result<(), BufferError> {
        self.reserve(data.len())?;
        self.bytes.put_slice(data);
        Ok(())
    }

    /// Current write position.
    pub fn tell(&self) -> usize {
        self.bytes.len()
    }

    /// Overwrites the 3 bytes at `offset` without moving the write position.
    pub fn update_be24(&mut self, value: u32, offset: usize) -> Result<(), BufferError> {
        if value > 0x00FF_FFFF {
            return Err(BufferError::ValueTooLarge(value));
        }
        let position = self.bytes.len();
        if offset.saturating_add(3) > position {
            return Err(BufferError::InvalidOffset { offset, position });
        }
        BigEndian::write_u24(&mut self.bytes[offset..offset + 3], value);
        Ok(())
    }

    /// Drops everything written after `position`.
    pub fn truncate(&mut self, position: usize) {
        self.bytes.truncate(position);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_writes() {
        let mut writer = ByteWriter::with_capacity(64);
        writer.put_byte(0x01).unwrap();
        writer.put_be16(0x0203).unwrap();
        writer.put_be24(0x040506).unwrap();
        writer.put_be32(0x0708090A).unwrap();
        writer.put_tag(b"FLV").unwrap();
        assert_eq!(
            writer.as_slice(),
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, b'F', b'L', b'V']
        );
        assert_eq!(writer.tell(), 13);
    }

    #[test]
    fn test_backpatch_keeps_position() {
        let mut writer = ByteWriter::with_capacity(64);
        writer.put_byte(0x12).unwrap();
        let size_pos = writer.tell();
        writer.put_be24(0).unwrap();
        writer.put_tag(&[0xAA; 5]).unwrap();
        let end = writer.tell();

        writer.update_be24(0x00ABCDEF, size_pos).unwrap();
        assert_eq!(writer.tell(), end);
        assert_eq!(&writer.as_slice()[1..4], &[0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn test_backpatch_unvisited_offset() {
        let mut writer = ByteWriter::with_capacity(16);
        writer.put_be16(0).unwrap();
        let result = writer.update_be24(1, 0);
        assert_eq!(result, Err(BufferError::InvalidOffset { offset: 0, position: 2 }));
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut writer = ByteWriter::with_capacity(4);
        writer.put_be24(1).unwrap();
        let result = writer.put_be16(2);
        assert_eq!(
            result,
            Err(BufferError::Overflow {
                position: 3,
                additional: 2,
                capacity: 4
            })
        );
        // Nothing partial was written.
        assert_eq!(writer.tell(), 3);
        writer.put_byte(9).unwrap();
        assert_eq!(writer.remaining(), 0);
    }

    #[test]
    fn test_be24_range() {
        let mut writer = ByteWriter::with_capacity(8);
        assert_eq!(
            writer.put_be24(0x0100_0000),
            Err(BufferError::ValueTooLarge(0x0100_0000))
        );
    }

    #[test]
    fn test_truncate() {
        let mut writer = ByteWriter::with_capacity(8);
        writer.put_be32(1).unwrap();
        let mark = writer.tell();
        writer.put_be32(2).unwrap();
        writer.truncate(mark);
        assert_eq!(writer.as_slice(), &[0, 0, 0, 1]);
    }
}
