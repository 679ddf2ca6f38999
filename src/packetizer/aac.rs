use crate::core::media_packet::AudioPacket;
use crate::error::{PacketizerError, Result};
use crate::flv::muxer::MuxContext;
use crate::flv::{AAC_RAW, AAC_SEQUENCE_HEADER, FLV_TAG_TYPE_AUDIO};
use crate::packetizer::Packetizer;

/// AAC, 44 kHz, 16-bit, stereo. FLV readers ignore everything but the
/// format nibble for AAC.
const AAC_SOUND_BYTE: u8 = 0xAF;
const AAC_OBJECT_TYPE_LC: u8 = 2;

const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

fn sample_rate_index(sample_rate: u32) -> Result<u8> {
    SAMPLE_RATES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|index| index as u8)
        .ok_or_else(|| PacketizerError::UnsupportedSampleRate(sample_rate).into())
}

fn audio_specific_config(object_type: u8, rate_index: u8, channels: u8) -> [u8; 2] {
    [
        (object_type << 3) | (rate_index >> 1),
        ((rate_index & 0x01) << 7) | ((channels & 0x0F) << 3),
    ]
}

struct AdtsHeader {
    header_len: usize,
    object_type: u8,
    rate_index: u8,
    channels: u8,
}

fn parse_adts(data: &[u8]) -> Result<Option<AdtsHeader>> {
    if data.len() < 2 || data[0] != 0xFF || data[1] & 0xF0 != 0xF0 {
        return Ok(None);
    }
    let protection_absent = data[1] & 0x01 == 1;
    let header_len = if protection_absent { 7 } else { 9 };
    if data.len() < header_len {
        return Err(PacketizerError::TruncatedAdtsHeader.into());
    }
    Ok(Some(AdtsHeader {
        header_len,
        object_type: ((data[2] >> 6) & 0x03) + 1,
        rate_index: (data[2] >> 2) & 0x0F,
        channels: ((data[2] & 0x01) << 2) | (data[3] >> 6),
    }))
}

/// AAC in FLV: one AudioSpecificConfig tag, then raw access units with any
/// ADTS header stripped.
#[derive(Debug, Default)]
pub struct AacPacketizer {
    config: Option<[u8; 2]>,
    sequence_header_sent: bool,
}

impl AacPacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The AudioSpecificConfig this packetizer announces, once known.
    pub fn audio_specific_config(&self) -> Option<[u8; 2]> {
        self.config
    }

    fn learn_config(&mut self, frame: &AudioPacket) -> Result<()> {
        if self.config.is_some() {
            return Ok(());
        }
        let config = match parse_adts(&frame.data)? {
            Some(adts) => audio_specific_config(adts.object_type, adts.rate_index, adts.channels),
            None => audio_specific_config(
                AAC_OBJECT_TYPE_LC,
                sample_rate_index(frame.format.sample_rate)?,
                frame.format.channels as u8,
            ),
        };
        self.config = Some(config);
        Ok(())
    }

    fn write_sequence_header(&self, ctx: &mut MuxContext, timestamp: u32) -> Result<bool> {
        let Some(config) = self.config else {
            return Ok(false);
        };
        ctx.write_tag(
            FLV_TAG_TYPE_AUDIO,
            timestamp,
            &[&[AAC_SOUND_BYTE, AAC_SEQUENCE_HEADER], &config],
        )?;
        Ok(true)
    }
}

impl Packetizer for AacPacketizer {
    type Frame = AudioPacket;

    fn configure(&mut self, frame: &AudioPacket) -> Result<()> {
        self.learn_config(frame)
    }

    fn write_header(&mut self, ctx: &mut MuxContext) -> Result<()> {
        if self.write_sequence_header(ctx, 0)? {
            self.sequence_header_sent = true;
        }
        Ok(())
    }

    fn write_packet(&mut self, ctx: &mut MuxContext, frame: &AudioPacket) -> Result<()> {
        let payload = match parse_adts(&frame.data)? {
            Some(adts) => &frame.data[adts.header_len..],
            None => &frame.data[..],
        };
        if payload.is_empty() {
            return Err(PacketizerError::EmptyFrame.into());
        }
        self.learn_config(frame)?;

        let timestamp = ctx.state.next_timestamp(frame.pts);
        let header_written =
            !self.sequence_header_sent && self.write_sequence_header(ctx, timestamp)?;
        ctx.write_tag(
            FLV_TAG_TYPE_AUDIO,
            timestamp,
            &[&[AAC_SOUND_BYTE, AAC_RAW], payload],
        )?;
        if header_written {
            self.sequence_header_sent = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media_packet::{AudioCodec, AudioFormat};
    use crate::flv::flv_buffer::FlvBuffer;

    fn frame(data: Vec<u8>) -> AudioPacket {
        AudioPacket {
            data,
            format: AudioFormat::new(AudioCodec::Aac, 44100, 2),
            pts: None,
        }
    }

    #[test]
    fn test_config_from_format() {
        let mut packetizer = AacPacketizer::new();
        packetizer.configure(&frame(Vec::new())).unwrap();
        // AAC-LC, 44.1 kHz (index 4), 2 channels
        assert_eq!(packetizer.audio_specific_config(), Some([0x12, 0x10]));
    }

    #[test]
    fn test_unsupported_sample_rate() {
        let mut packetizer = AacPacketizer::new();
        let mut packet = frame(Vec::new());
        packet.format.sample_rate = 44000;
        assert!(matches!(
            packetizer.configure(&packet),
            Err(crate::error::Error::Packetizer(PacketizerError::UnsupportedSampleRate(44000)))
        ));
    }

    #[test]
    fn test_adts_is_stripped() {
        // ADTS: LC, 48 kHz (index 3), mono, no CRC
        let mut data = vec![0xFF, 0xF1, 0x4C, 0x40, 0x01, 0x7F, 0xFC];
        data.extend_from_slice(&[0x21, 0x10, 0x05]);

        let mut packetizer = AacPacketizer::new();
        let mut ctx = MuxContext::new(256, 256);
        packetizer.write_packet(&mut ctx, &frame(data)).unwrap();

        let mut buffer = FlvBuffer::new();
        buffer.write_data(ctx.writer.as_slice());
        let header = buffer.get_flv_tag().unwrap();
        assert_eq!(&header.data[..], &[0xAF, 0x00, 0x11, 0x88]);
        let raw = buffer.get_flv_tag().unwrap();
        assert_eq!(&raw.data[..], &[0xAF, 0x01, 0x21, 0x10, 0x05]);
        assert!(buffer.get_flv_tag().is_none());
    }

    #[test]
    fn test_truncated_adts() {
        let mut packetizer = AacPacketizer::new();
        let mut ctx = MuxContext::new(256, 256);
        assert!(packetizer
            .write_packet(&mut ctx, &frame(vec![0xFF, 0xF1, 0x50]))
            .is_err());
    }
}
