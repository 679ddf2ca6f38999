use crate::core::media_packet::VideoPacket;
use crate::error::{PacketizerError, Result};
use crate::flv::muxer::MuxContext;
use crate::flv::{
    AVC_NALU, AVC_SEQUENCE_HEADER, FLV_CODECID_H264, FLV_FRAME_INTER, FLV_FRAME_KEY,
    FLV_TAG_TYPE_VIDEO,
};
use crate::packetizer::Packetizer;
use log::{debug, trace};

const NAL_TYPE_IDR: u8 = 5;
const NAL_TYPE_SPS: u8 = 7;
const NAL_TYPE_PPS: u8 = 8;
const NAL_TYPE_AUD: u8 = 9;

fn nal_type(nalu: &[u8]) -> u8 {
    nalu.first().map_or(0, |b| b & 0x1F)
}

/// Splits an Annex-B byte stream on `00 00 01` / `00 00 00 01` start codes.
/// Input without any start code is returned as a single NAL unit.
pub(crate) fn split_annexb(data: &[u8]) -> Vec<&[u8]> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push((i, i + 3));
            i += 3;
        } else {
            i += 1;
        }
    }
    if starts.is_empty() {
        return if data.is_empty() { Vec::new() } else { vec![data] };
    }

    let mut nalus = Vec::with_capacity(starts.len());
    for (n, &(_, payload_start)) in starts.iter().enumerate() {
        let mut end = starts.get(n + 1).map_or(data.len(), |&(code_start, _)| code_start);
        // trailing zero belongs to a 4-byte start code
        while end > payload_start && data[end - 1] == 0 {
            end -= 1;
        }
        if end > payload_start {
            nalus.push(&data[payload_start..end]);
        }
    }
    nalus
}

/// H.264 in FLV: an AVCDecoderConfigurationRecord followed by length-prefixed
/// NAL units, one tag per access unit.
#[derive(Debug, Default)]
pub struct AvcPacketizer {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    sequence_header_sent: bool,
}

impl AvcPacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records parameter sets; returns true if either changed.
    fn collect_parameter_sets(&mut self, nalus: &[&[u8]]) -> bool {
        let mut changed = false;
        for nalu in nalus {
            match nal_type(nalu) {
                // profile, compatibility and level bytes follow the NAL header
                NAL_TYPE_SPS if nalu.len() >= 4 => {
                    if self.sps.as_deref() != Some(*nalu) {
                        self.sps = Some(nalu.to_vec());
                        changed = true;
                    }
                }
                NAL_TYPE_PPS => {
                    if self.pps.as_deref() != Some(*nalu) {
                        self.pps = Some(nalu.to_vec());
                        changed = true;
                    }
                }
                _ => {}
            }
        }
        changed
    }

    fn decoder_configuration_record(&self) -> Option<Vec<u8>> {
        let (sps, pps) = (self.sps.as_ref()?, self.pps.as_ref()?);
        let mut record = Vec::with_capacity(11 + sps.len() + pps.len());
        record.push(1); // configurationVersion
        record.extend_from_slice(&sps[1..4]); // profile, compatibility, level
        record.push(0xFF); // 4-byte NALU lengths
        record.push(0xE1); // one SPS
        record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        record.extend_from_slice(sps);
        record.push(1); // one PPS
        record.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        record.extend_from_slice(pps);
        Some(record)
    }

    fn write_sequence_header(&self, ctx: &mut MuxContext, timestamp: u32) -> Result<bool> {
        let Some(record) = self.decoder_configuration_record() else {
            return Ok(false);
        };
        let prefix = [
            (FLV_FRAME_KEY << 4) | FLV_CODECID_H264,
            AVC_SEQUENCE_HEADER,
            0,
            0,
            0,
        ];
        ctx.write_tag(FLV_TAG_TYPE_VIDEO, timestamp, &[&prefix, &record])?;
        Ok(true)
    }
}

impl Packetizer for AvcPacketizer {
    type Frame = VideoPacket;

    fn configure(&mut self, frame: &VideoPacket) -> Result<()> {
        let nalus = split_annexb(&frame.data);
        self.collect_parameter_sets(&nalus);
        Ok(())
    }

    fn write_header(&mut self, ctx: &mut MuxContext) -> Result<()> {
        if self.write_sequence_header(ctx, 0)? {
            self.sequence_header_sent = true;
        } else {
            debug!("No SPS/PPS yet, AVC sequence header deferred to the first keyframe.");
        }
        Ok(())
    }

    fn write_packet(&mut self, ctx: &mut MuxContext, frame: &VideoPacket) -> Result<()> {
        let nalus = split_annexb(&frame.data);
        if nalus.is_empty() {
            return Err(PacketizerError::EmptyFrame.into());
        }
        let mut header_pending = !self.sequence_header_sent;
        if self.collect_parameter_sets(&nalus) {
            header_pending = true;
        }

        let key_frame = frame.key_frame || nalus.iter().any(|n| nal_type(n) == NAL_TYPE_IDR);
        if !key_frame && !ctx.state.keyframe_seen {
            trace!("Dropping inter frame before the first keyframe.");
            return Ok(());
        }

        for nalu in &nalus {
            if matches!(nal_type(nalu), NAL_TYPE_SPS | NAL_TYPE_PPS | NAL_TYPE_AUD) {
                continue;
            }
            ctx.scratch_put(&(nalu.len() as u32).to_be_bytes())?;
            ctx.scratch_put(nalu)?;
        }
        if ctx.scratch().is_empty() {
            // parameter sets only
            return Ok(());
        }

        let timestamp = ctx.state.next_timestamp(frame.pts);
        let header_written = header_pending && self.write_sequence_header(ctx, timestamp)?;

        let frame_type = if key_frame { FLV_FRAME_KEY } else { FLV_FRAME_INTER };
        let prefix = [(frame_type << 4) | FLV_CODECID_H264, AVC_NALU, 0, 0, 0];
        ctx.write_scratch_tag(FLV_TAG_TYPE_VIDEO, timestamp, &prefix)?;

        if header_written {
            self.sequence_header_sent = true;
        }
        if key_frame {
            ctx.state.keyframe_seen = true;
        }
        Ok(())
    }
}
