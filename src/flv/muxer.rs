// src/flv/muxer.rs - FLV header/metadata writer and per-frame dispatch
//
// - Header and onMetaData are written at most once per muxer
// - Tag sizes are backpatched after the body is written
// - Codec framing is delegated to the video/audio packetizers
// - Every write ends with a flush of the serialization buffer to the transport

use crate::core::config::SessionConfig;
use crate::core::media_packet::{AudioFormat, AudioPacket, MediaPacket, VideoFormat, VideoPacket};
use crate::error::{BufferError, Error, PacketizerError, Result};
use crate::flv::amf0::{
    put_amf_bool, put_amf_double, put_amf_end_of_object, put_amf_string, AMF_DATA_TYPE_MIXEDARRAY,
    AMF_DATA_TYPE_STRING,
};
use crate::flv::byte_writer::ByteWriter;
use crate::flv::flv_tag::FLV_TAG_HEADER_SIZE;
use crate::flv::{
    FLV_CODECID_H264, FLV_HEADER_FLAG_HASAUDIO, FLV_HEADER_FLAG_HASVIDEO, FLV_HEADER_SIZE,
    FLV_SIGNATURE, FLV_TAG_TYPE_META, FLV_VERSION,
};
use crate::packetizer::{default_audio_packetizer, AvcPacketizer, Packetizer};
use crate::transport::Transport;
use bytes::{BufMut, BytesMut};
use log::{debug, info, warn};
use std::time::Instant;

pub type VideoPacketizer = Box<dyn Packetizer<Frame = VideoPacket>>;
pub type AudioPacketizer = Box<dyn Packetizer<Frame = AudioPacket>>;

/// Per-stream state carried from one frame to the next.
#[derive(Debug, Default)]
pub struct StreamState {
    pub headers_sent: bool,
    pub keyframe_seen: bool,
    prev_instant: Option<Instant>,
    prev_pts: Option<u64>,
    elapsed_us: u64,
}

impl StreamState {
    /// Timestamp in milliseconds for the next tag.
    ///
    /// Advances by the presentation timestamp delta since the previous frame,
    /// or by wall-clock time when the frame has no pts. Never goes backwards.
    ///
    /// Wall-clock steps also move the pts reference forward, so frames with
    /// and without a pts can be mixed without counting an interval twice.
    pub fn next_timestamp(&mut self, pts: Option<u64>) -> u32 {
        let now = Instant::now();
        let mut delta_us = 0;
        if let Some(prev_instant) = self.prev_instant {
            delta_us = match (pts, self.prev_pts) {
                (Some(pts), Some(prev_pts)) => pts.saturating_sub(prev_pts),
                _ => now.duration_since(prev_instant).as_micros() as u64,
            };
            self.elapsed_us = self.elapsed_us.saturating_add(delta_us);
        }
        self.prev_instant = Some(now);
        self.prev_pts = match (pts, self.prev_pts) {
            (Some(pts), prev) => Some(prev.map_or(pts, |prev| prev.max(pts))),
            (None, prev) => prev.map(|prev| prev.saturating_add(delta_us)),
        };
        (self.elapsed_us / 1000) as u32
    }

    /// Timestamp of the most recent tag, in milliseconds.
    pub fn current_timestamp(&self) -> u32 {
        (self.elapsed_us / 1000) as u32
    }
}

/// Position of an open tag in the serialization buffer.
#[derive(Debug, Clone, Copy)]
pub struct TagMark {
    size_pos: usize,
}

/// What packetizers write into: the serialization buffer, the per-frame
/// scratch buffer and the stream state.
pub struct MuxContext {
    pub writer: ByteWriter,
    pub state: StreamState,
    scratch: BytesMut,
    scratch_capacity: usize,
}

impl MuxContext {
    pub fn new(buffer_capacity: usize, scratch_capacity: usize) -> Self {
        Self {
            writer: ByteWriter::with_capacity(buffer_capacity),
            state: StreamState::default(),
            scratch: BytesMut::with_capacity(scratch_capacity),
            scratch_capacity,
        }
    }

    /// Writes a tag header with a zero data size and returns its mark.
    pub fn begin_tag(&mut self, tag_type: u8, timestamp: u32) -> Result<TagMark, BufferError> {
        self.writer.put_byte(tag_type)?;
        let size_pos = self.writer.tell();
        self.writer.put_be24(0)?; // data size, patched by end_tag
        self.writer.put_be24(timestamp & 0x00FF_FFFF)?;
        self.writer.put_byte((timestamp >> 24) as u8)?;
        self.writer.put_be24(0)?; // stream id
        Ok(TagMark { size_pos })
    }

    /// Patches the data size of the tag opened by `mark` and appends its
    /// previous-tag-size trailer. Returns the data size.
    pub fn end_tag(&mut self, mark: TagMark) -> Result<u32, BufferError> {
        let data_size = (self.writer.tell() - mark.size_pos - (FLV_TAG_HEADER_SIZE - 1)) as u32;
        self.writer.update_be24(data_size, mark.size_pos)?;
        self.writer.put_be32(data_size + FLV_TAG_HEADER_SIZE as u32)?;
        Ok(data_size)
    }

    /// Writes a complete tag whose body is the concatenation of `parts`.
    pub fn write_tag(&mut self, tag_type: u8, timestamp: u32, parts: &[&[u8]]) -> Result<(), BufferError> {
        let mark = self.begin_tag(tag_type, timestamp)?;
        for part in parts {
            self.writer.put_tag(part)?;
        }
        self.end_tag(mark)?;
        Ok(())
    }

    /// Appends to the scratch buffer, bounded by its capacity.
    pub fn scratch_put(&mut self, data: &[u8]) -> Result<(), BufferError> {
        let position = self.scratch.len();
        if position.saturating_add(data.len()) > self.scratch_capacity {
            return Err(BufferError::Overflow {
                position,
                additional: data.len(),
                capacity: self.scratch_capacity,
            });
        }
        self.scratch.put_slice(data);
        Ok(())
    }

    pub fn scratch(&self) -> &[u8] {
        &self.scratch
    }

    pub fn clear_scratch(&mut self) {
        self.scratch.clear();
    }

    /// Writes a tag whose body is `prefix` followed by the scratch buffer,
    /// then clears the scratch buffer.
    pub fn write_scratch_tag(&mut self, tag_type: u8, timestamp: u32, prefix: &[u8]) -> Result<(), BufferError> {
        let mark = self.begin_tag(tag_type, timestamp)?;
        self.writer.put_tag(prefix)?;
        self.writer.put_tag(&self.scratch)?;
        self.end_tag(mark)?;
        self.scratch.clear();
        Ok(())
    }
}

pub struct FlvMuxer {
    ctx: MuxContext,
    video_format: Option<VideoFormat>,
    audio_format: Option<AudioFormat>,
    video_packetizer: Option<VideoPacketizer>,
    audio_packetizer: Option<AudioPacketizer>,
    transport: Box<dyn Transport>,
    closed: bool,
}

impl FlvMuxer {
    pub fn new(transport: Box<dyn Transport>, config: &SessionConfig) -> Self {
        Self {
            ctx: MuxContext::new(config.buffer_capacity, config.scratch_capacity),
            video_format: None,
            audio_format: None,
            video_packetizer: None,
            audio_packetizer: None,
            transport,
            closed: false,
        }
    }

    pub fn set_video_packetizer(&mut self, packetizer: VideoPacketizer) {
        self.video_packetizer = Some(packetizer);
    }

    pub fn set_audio_packetizer(&mut self, packetizer: AudioPacketizer) {
        self.audio_packetizer = Some(packetizer);
    }

    fn set_video_format(&mut self, format: VideoFormat) {
        self.video_format = Some(format);
        if self.video_packetizer.is_none() {
            self.video_packetizer = Some(Box::new(AvcPacketizer::new()));
        }
    }

    fn set_audio_format(&mut self, format: AudioFormat) -> Result<()> {
        if self.audio_packetizer.is_none() {
            self.audio_packetizer = Some(default_audio_packetizer(format.codec)?);
        }
        self.audio_format = Some(format);
        Ok(())
    }

    /// Declares a stream from a sample packet and lets its packetizer learn
    /// the codec configuration carried in it.
    ///
    /// Fails with [`Error::HeaderAlreadySent`] once the header is out, since
    /// its flags and `onMetaData` can no longer change.
    pub fn add_stream(&mut self, packet: &MediaPacket) -> Result<()> {
        if self.headers_sent() {
            return Err(Error::HeaderAlreadySent);
        }
        match packet {
            MediaPacket::Video(video) => {
                self.set_video_format(video.format);
                if let Some(packetizer) = self.video_packetizer.as_mut() {
                    packetizer.configure(video)?;
                }
            }
            MediaPacket::Audio(audio) => {
                self.set_audio_format(audio.format)?;
                if let Some(packetizer) = self.audio_packetizer.as_mut() {
                    packetizer.configure(audio)?;
                }
            }
        }
        info!("Added {} stream.", packet.kind());
        Ok(())
    }

    pub fn has_video(&self) -> bool {
        self.video_format.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_format.is_some()
    }

    pub fn headers_sent(&self) -> bool {
        self.ctx.state.headers_sent
    }

    pub fn state(&self) -> &StreamState {
        &self.ctx.state
    }

    /// Number of key/value pairs the `onMetaData` mixed array declares.
    pub fn metadata_field_count(&self) -> u32 {
        5 * self.has_video() as u32 + 5 * self.has_audio() as u32 + 2
    }

    /// Writes the FLV header, the `onMetaData` tag and the packetizer headers,
    /// then flushes them. Does nothing once the header has been sent.
    pub fn write_header(&mut self) -> Result<()> {
        if self.ctx.state.headers_sent {
            return Ok(());
        }
        let start = self.ctx.writer.tell();
        if let Err(e) = self.serialize_header() {
            self.ctx.writer.truncate(start);
            return Err(e);
        }
        self.flush()?;
        self.ctx.state.headers_sent = true;
        debug!(
            "FLV header sent (video: {}, audio: {}).",
            self.has_video(),
            self.has_audio()
        );
        Ok(())
    }

    fn serialize_header(&mut self) -> Result<()> {
        let writer = &mut self.ctx.writer;
        writer.put_tag(FLV_SIGNATURE)?;
        writer.put_byte(FLV_VERSION)?;
        let mut flags = 0;
        if self.audio_format.is_some() {
            flags |= FLV_HEADER_FLAG_HASAUDIO;
        }
        if self.video_format.is_some() {
            flags |= FLV_HEADER_FLAG_HASVIDEO;
        }
        writer.put_byte(flags)?;
        writer.put_be32(FLV_HEADER_SIZE as u32)?; // data offset
        writer.put_be32(0)?; // PreviousTagSize0

        self.write_metadata()?;

        if let Some(packetizer) = self.video_packetizer.as_mut() {
            if self.video_format.is_some() {
                packetizer.write_header(&mut self.ctx)?;
            }
        }
        if let Some(packetizer) = self.audio_packetizer.as_mut() {
            if self.audio_format.is_some() {
                packetizer.write_header(&mut self.ctx)?;
            }
        }
        Ok(())
    }

    fn write_metadata(&mut self) -> Result<(), BufferError> {
        let field_count = self.metadata_field_count();
        let mark = self.ctx.begin_tag(FLV_TAG_TYPE_META, 0)?;
        let writer = &mut self.ctx.writer;

        writer.put_byte(AMF_DATA_TYPE_STRING)?;
        put_amf_string(writer, "onMetaData")?;

        writer.put_byte(AMF_DATA_TYPE_MIXEDARRAY)?;
        writer.put_be32(field_count)?;

        put_amf_string(writer, "duration")?;
        put_amf_double(writer, 0.0)?; // live stream

        if let Some(video) = &self.video_format {
            put_amf_string(writer, "width")?;
            put_amf_double(writer, video.width as f64)?;

            put_amf_string(writer, "height")?;
            put_amf_double(writer, video.height as f64)?;

            put_amf_string(writer, "videodatarate")?;
            put_amf_double(writer, video.bitrate as f64 / 1024.0)?;

            put_amf_string(writer, "framerate")?;
            put_amf_double(writer, video.framerate.unwrap_or(0.0))?;

            put_amf_string(writer, "videocodecid")?;
            put_amf_double(writer, FLV_CODECID_H264 as f64)?;
        }

        if let Some(audio) = &self.audio_format {
            put_amf_string(writer, "audiodatarate")?;
            put_amf_double(writer, audio.bitrate as f64 / 1024.0)?;

            put_amf_string(writer, "audiosamplerate")?;
            put_amf_double(writer, audio.sample_rate as f64)?;

            put_amf_string(writer, "audiosamplesize")?;
            put_amf_double(writer, audio.sample_size as f64)?;

            put_amf_string(writer, "stereo")?;
            put_amf_bool(writer, audio.is_stereo())?;

            // Unknown codecs are written as 0, the key never goes without a value.
            put_amf_string(writer, "audiocodecid")?;
            put_amf_double(writer, audio.codec.flv_codec_id() as f64)?;
        }

        put_amf_string(writer, "filesize")?;
        put_amf_double(writer, 0.0)?;

        put_amf_end_of_object(writer)?;

        self.ctx.end_tag(mark)?;
        Ok(())
    }

    /// Serializes one packet through its packetizer and flushes the result.
    ///
    /// A frame that fails to serialize is discarded and the buffer is rolled
    /// back to where it started. Fails with [`Error::NotStarted`] until the
    /// header has been written.
    pub(crate) fn write_packet(&mut self, packet: &MediaPacket) -> Result<()> {
        if !self.headers_sent() {
            return Err(Error::NotStarted);
        }
        let start = self.ctx.writer.tell();
        if let Err(e) = self.serialize_packet(packet) {
            self.ctx.writer.truncate(start);
            self.ctx.clear_scratch();
            return Err(e);
        }
        self.flush()
    }

    fn serialize_packet(&mut self, packet: &MediaPacket) -> Result<()> {
        match packet {
            MediaPacket::Video(video) => {
                if self.video_format.is_none() {
                    return Err(PacketizerError::StreamNotDeclared("video").into());
                }
                match self.video_packetizer.as_mut() {
                    Some(packetizer) => packetizer.write_packet(&mut self.ctx, video),
                    None => Err(PacketizerError::StreamNotDeclared("video").into()),
                }
            }
            MediaPacket::Audio(audio) => {
                let format = self
                    .audio_format
                    .ok_or(PacketizerError::StreamNotDeclared("audio"))?;
                match self.audio_packetizer.as_mut() {
                    Some(packetizer) => packetizer.write_packet(&mut self.ctx, audio),
                    None => Err(PacketizerError::UnsupportedCodec(format.codec).into()),
                }
            }
        }
    }

    /// Writes the header if needed, then the packet, on the calling thread.
    pub fn send_packet(&mut self, packet: &MediaPacket) -> Result<()> {
        self.write_header()?;
        self.write_packet(packet)
    }

    /// Hands everything buffered so far to the transport.
    pub fn flush(&mut self) -> Result<()> {
        if self.ctx.writer.is_empty() {
            return Ok(());
        }
        let result = self.transport.write(self.ctx.writer.as_slice());
        self.ctx.writer.clear();
        result.map_err(Error::TransportWrite)
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !self.ctx.writer.is_empty() {
            warn!(
                "Closing transport with {} unflushed bytes.",
                self.ctx.writer.tell()
            );
        }
        self.transport.close();
    }
}

impl Drop for FlvMuxer {
    fn drop(&mut self) {
        self.close();
    }
}
