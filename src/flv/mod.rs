//! The **FLV** module holds everything that produces or inspects the FLV byte
//! stream: the fixed-capacity [`ByteWriter`](byte_writer::ByteWriter), the
//! AMF0 value writers, the [`FlvMuxer`](muxer::FlvMuxer) and the incremental
//! [`FlvBuffer`](flv_buffer::FlvBuffer) tag reader.
//!
//! ```text
//! +---------------------+---------------------------------------------------------+
//! | FLV header(9 bytes) | PreviousTagSize0(4) | Tag1 | PreviousTagSize1 | Tag2 ... |
//! +---------------------+---------------------------------------------------------+
//!
//! Tag: | Type(1) | DataSize(3) | Timestamp(3) | TimestampExt(1) | StreamID(3) | Data |
//! ```
//!
//! Every tag is followed by a 4-byte PreviousTagSize equal to `DataSize + 11`.

pub mod amf0;
pub mod byte_writer;
pub mod flv_buffer;
pub mod flv_tag;
pub mod muxer;

pub const FLV_SIGNATURE: &[u8; 3] = b"FLV";
pub const FLV_VERSION: u8 = 1;
/// Length of the FLV file header, also the value of its data offset field.
pub const FLV_HEADER_SIZE: usize = 9;

pub const FLV_HEADER_FLAG_HASVIDEO: u8 = 0x01;
pub const FLV_HEADER_FLAG_HASAUDIO: u8 = 0x04;

pub const FLV_TAG_TYPE_AUDIO: u8 = 0x08;
pub const FLV_TAG_TYPE_VIDEO: u8 = 0x09;
pub const FLV_TAG_TYPE_META: u8 = 0x12;

pub const FLV_CODECID_H264: u8 = 7;

pub const FLV_FRAME_KEY: u8 = 1;
pub const FLV_FRAME_INTER: u8 = 2;

pub const AVC_SEQUENCE_HEADER: u8 = 0;
pub const AVC_NALU: u8 = 1;

pub const AAC_SEQUENCE_HEADER: u8 = 0;
pub const AAC_RAW: u8 = 1;
