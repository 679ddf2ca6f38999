//! Codec-specific FLV framing.
//!
//! A packetizer turns one encoded frame into the body of an FLV tag and owns
//! whatever sequence header its codec needs ahead of the first frame. The
//! muxer only decides which packetizer a packet goes to.

mod aac;
mod avc;
mod g711;

pub use aac::AacPacketizer;
pub use avc::AvcPacketizer;
pub use g711::G711Packetizer;

use crate::core::media_packet::{AudioCodec, AudioPacket};
use crate::error::{PacketizerError, Result};
use crate::flv::muxer::MuxContext;

pub trait Packetizer: Send {
    type Frame;

    /// Learns codec configuration from a sample frame before the header is written.
    fn configure(&mut self, _frame: &Self::Frame) -> Result<()> {
        Ok(())
    }

    /// Writes the codec's sequence header tag, if it has one and it is known yet.
    fn write_header(&mut self, ctx: &mut MuxContext) -> Result<()>;

    /// Writes the tag(s) for one frame.
    fn write_packet(&mut self, ctx: &mut MuxContext, frame: &Self::Frame) -> Result<()>;
}

/// Picks the built-in packetizer for an audio codec.
pub fn default_audio_packetizer(
    codec: AudioCodec,
) -> Result<Box<dyn Packetizer<Frame = AudioPacket>>> {
    match codec {
        AudioCodec::Aac => Ok(Box::new(AacPacketizer::new())),
        AudioCodec::G711A | AudioCodec::G711U => Ok(Box::new(G711Packetizer::new())),
        AudioCodec::Other(_) => Err(PacketizerError::UnsupportedCodec(codec).into()),
    }
}
