use bytes::Bytes;

/// Size of an FLV tag header (type, data size, timestamp, extension, stream id).
pub const FLV_TAG_HEADER_SIZE: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvTagHeader {
    pub tag_type: u8,
    pub data_size: u32,
    /// Lower 24 bits of the timestamp.
    pub timestamp: u32,
    pub timestamp_ext: u8,
    pub stream_id: u32,
}

impl FlvTagHeader {
    /// Full 32-bit timestamp in milliseconds.
    pub fn full_timestamp(&self) -> u32 {
        self.timestamp | ((self.timestamp_ext as u32) << 24)
    }
}

/// One parsed FLV tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlvTag {
    pub header: FlvTagHeader,
    pub data: Bytes,
    /// The previous-tag-size trailer that followed this tag.
    pub previous_tag_size: u32,
}

impl FlvTag {
    /// Whether the trailer matches `data_size + 11`.
    pub fn trailer_is_consistent(&self) -> bool {
        self.previous_tag_size == self.header.data_size + FLV_TAG_HEADER_SIZE as u32
    }
}
