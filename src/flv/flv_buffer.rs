// src/flv/flv_buffer.rs - Incremental FLV stream splitter
//
// Bytes arrive in arbitrary chunks (one muxer flush at a time); tags are
// handed out only once complete, including their previous-tag-size trailer.

use crate::flv::flv_tag::{FlvTag, FlvTagHeader, FLV_TAG_HEADER_SIZE};
use crate::flv::{FLV_HEADER_SIZE, FLV_SIGNATURE};
use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BytesMut};

/// FLV file header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvFileHeader {
    pub version: u8,
    pub flags: u8,
    pub data_offset: u32,
}

pub struct FlvBuffer {
    buffer: BytesMut,
    file_header: Option<FlvFileHeader>,
    header_checked: bool,
}

impl Default for FlvBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FlvBuffer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            file_header: None,
            header_checked: false,
        }
    }

    pub fn write_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// The file header, once it has been seen.
    pub fn file_header(&self) -> Option<FlvFileHeader> {
        self.file_header
    }

    /// Bytes received but not yet returned as part of a tag.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete tag, or `None` until more data arrives.
    pub fn get_flv_tag(&mut self) -> Option<FlvTag> {
        if !self.header_checked && !self.consume_file_header() {
            return None;
        }

        if self.buffer.len() < FLV_TAG_HEADER_SIZE {
            return None;
        }
        let data_size = BigEndian::read_u24(&self.buffer[1..4]);
        let total = FLV_TAG_HEADER_SIZE + data_size as usize + 4;
        if self.buffer.len() < total {
            return None;
        }

        let header = FlvTagHeader {
            tag_type: self.buffer[0],
            data_size,
            timestamp: BigEndian::read_u24(&self.buffer[4..7]),
            timestamp_ext: self.buffer[7],
            stream_id: BigEndian::read_u24(&self.buffer[8..11]),
        };
        self.buffer.advance(FLV_TAG_HEADER_SIZE);
        let data = self.buffer.split_to(data_size as usize).freeze();
        let previous_tag_size = self.buffer.get_u32();

        Some(FlvTag {
            header,
            data,
            previous_tag_size,
        })
    }

    // Skips the 9-byte file header and PreviousTagSize0 when the stream
    // starts with one. Returns false while more bytes are needed to decide.
    fn consume_file_header(&mut self) -> bool {
        if self.buffer.len() < FLV_SIGNATURE.len() {
            return false;
        }
        if &self.buffer[..FLV_SIGNATURE.len()] != FLV_SIGNATURE {
            self.header_checked = true;
            return true;
        }
        if self.buffer.len() < FLV_HEADER_SIZE + 4 {
            return false;
        }
        self.file_header = Some(FlvFileHeader {
            version: self.buffer[3],
            flags: self.buffer[4],
            data_offset: BigEndian::read_u32(&self.buffer[5..9]),
        });
        self.buffer.advance(FLV_HEADER_SIZE + 4);
        self.header_checked = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_bytes(tag_type: u8, timestamp: u32, body: &[u8]) -> Vec<u8> {
        let mut out = vec![tag_type];
        out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&(timestamp & 0xFFFFFF).to_be_bytes()[1..]);
        out.push((timestamp >> 24) as u8);
        out.extend_from_slice(&[0, 0, 0]);
        out.extend_from_slice(body);
        out.extend_from_slice(&(body.len() as u32 + 11).to_be_bytes());
        out
    }

    #[test]
    fn test_file_header_then_tags() {
        let mut stream = b"FLV\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00".to_vec();
        stream.extend(tag_bytes(9, 40, b"video"));
        stream.extend(tag_bytes(8, 0x0100_0002, b"aud"));

        let mut buffer = FlvBuffer::new();
        buffer.write_data(&stream);

        let first = buffer.get_flv_tag().unwrap();
        assert_eq!(first.header.tag_type, 9);
        assert_eq!(first.header.full_timestamp(), 40);
        assert_eq!(&first.data[..], b"video");
        assert!(first.trailer_is_consistent());

        let second = buffer.get_flv_tag().unwrap();
        assert_eq!(second.header.full_timestamp(), 0x0100_0002);
        assert_eq!(&second.data[..], b"aud");

        assert!(buffer.get_flv_tag().is_none());
        assert_eq!(
            buffer.file_header(),
            Some(FlvFileHeader {
                version: 1,
                flags: 5,
                data_offset: 9
            })
        );
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut stream = b"FLV\x01\x01\x00\x00\x00\x09\x00\x00\x00\x00".to_vec();
        stream.extend(tag_bytes(9, 0, &[1, 2, 3, 4]));

        let mut buffer = FlvBuffer::new();
        let mut tags = Vec::new();
        for byte in &stream {
            buffer.write_data(std::slice::from_ref(byte));
            if let Some(tag) = buffer.get_flv_tag() {
                tags.push(tag);
            }
        }
        assert_eq!(tags.len(), 1);
        assert_eq!(&tags[0].data[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_headerless_stream() {
        let mut buffer = FlvBuffer::new();
        buffer.write_data(&tag_bytes(18, 0, b"meta"));
        let tag = buffer.get_flv_tag().unwrap();
        assert_eq!(tag.header.tag_type, 18);
        assert!(buffer.file_header().is_none());
    }
}
