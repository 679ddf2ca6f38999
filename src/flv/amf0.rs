//! AMF0 value writers for the `onMetaData` script tag.
//!
//! These are plain serializers: the caller decides which marker a value
//! needs and in which order keys and values go.

use crate::error::BufferError;
use crate::flv::byte_writer::ByteWriter;

pub const AMF_DATA_TYPE_NUMBER: u8 = 0x00;
pub const AMF_DATA_TYPE_BOOL: u8 = 0x01;
pub const AMF_DATA_TYPE_STRING: u8 = 0x02;
pub const AMF_DATA_TYPE_MIXEDARRAY: u8 = 0x08;
pub const AMF_END_OF_OBJECT: u8 = 0x09;

/// Length-prefixed string without a type marker (keys, or a value after an
/// explicit [`AMF_DATA_TYPE_STRING`]).
pub fn put_amf_string(writer: &mut ByteWriter, s: &str) -> Result<(), BufferError> {
    let len = s.len();
    if len > u16::MAX as usize {
        return Err(BufferError::StringTooLong(len));
    }
    writer.put_be16(len as u16)?;
    writer.put_tag(s.as_bytes())
}

pub fn put_amf_double(writer: &mut ByteWriter, d: f64) -> Result<(), BufferError> {
    writer.put_byte(AMF_DATA_TYPE_NUMBER)?;
    writer.put_be64(d.to_bits())
}

pub fn put_amf_bool(writer: &mut ByteWriter, b: bool) -> Result<(), BufferError> {
    writer.put_byte(AMF_DATA_TYPE_BOOL)?;
    writer.put_byte(b as u8)
}

/// Empty key followed by the end marker.
pub fn put_amf_end_of_object(writer: &mut ByteWriter) -> Result<(), BufferError> {
    put_amf_string(writer, "")?;
    writer.put_byte(AMF_END_OF_OBJECT)
}
