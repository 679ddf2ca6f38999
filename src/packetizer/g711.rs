use crate::core::media_packet::{AudioFormat, AudioPacket};
use crate::error::{PacketizerError, Result};
use crate::flv::muxer::MuxContext;
use crate::flv::FLV_TAG_TYPE_AUDIO;
use crate::packetizer::Packetizer;

/// FLV `SoundRate` field; anything not listed is written as 5.5 kHz.
fn sound_rate_bits(sample_rate: u32) -> u8 {
    match sample_rate {
        44100 => 3,
        22050 => 2,
        11025 => 1,
        _ => 0,
    }
}

fn sound_byte(format: &AudioFormat) -> u8 {
    let size_bit = (format.sample_size == 16) as u8;
    let stereo_bit = format.is_stereo() as u8;
    (format.codec.flv_codec_id() << 4)
        | (sound_rate_bits(format.sample_rate) << 2)
        | (size_bit << 1)
        | stereo_bit
}

/// G.711 A-law / µ-law: no sequence header, each frame is a single tag.
#[derive(Debug, Default)]
pub struct G711Packetizer;

impl G711Packetizer {
    pub fn new() -> Self {
        Self
    }
}

impl Packetizer for G711Packetizer {
    type Frame = AudioPacket;

    fn write_header(&mut self, _ctx: &mut MuxContext) -> Result<()> {
        Ok(())
    }

    fn write_packet(&mut self, ctx: &mut MuxContext, frame: &AudioPacket) -> Result<()> {
        if frame.data.is_empty() {
            return Err(PacketizerError::EmptyFrame.into());
        }
        let timestamp = ctx.state.next_timestamp(frame.pts);
        ctx.write_tag(
            FLV_TAG_TYPE_AUDIO,
            timestamp,
            &[&[sound_byte(&frame.format)], &frame.data],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media_packet::AudioCodec;

    #[test]
    fn test_sound_byte() {
        let alaw = AudioFormat::new(AudioCodec::G711A, 8000, 1);
        assert_eq!(sound_byte(&alaw), 0x72);
        let ulaw = AudioFormat::new(AudioCodec::G711U, 44100, 2).set_sample_size(8);
        assert_eq!(sound_byte(&ulaw), 0x8D);
    }

    #[test]
    fn test_one_tag_per_frame() {
        let mut packetizer = G711Packetizer::new();
        let mut ctx = MuxContext::new(256, 256);
        packetizer.write_header(&mut ctx).unwrap();
        assert!(ctx.writer.is_empty());

        let frame = AudioPacket {
            data: vec![0xD5; 160],
            format: AudioFormat::new(AudioCodec::G711A, 8000, 1),
            pts: Some(0),
        };
        packetizer.write_packet(&mut ctx, &frame).unwrap();
        // 11-byte header, sound byte, payload, 4-byte trailer
        assert_eq!(ctx.writer.tell(), 11 + 1 + 160 + 4);
        assert_eq!(ctx.writer.as_slice()[11], 0x72);
    }
}
