//! Writes a few seconds of synthetic H.264 + G.711 frames to `demo.flv`.
//!
//! The payloads are not decodable video; the point is the container layout,
//! which `ffprobe demo.flv` or any FLV inspector will show.

use ez_rtmp_push::{
    AudioCodec, AudioFormat, MediaPacket, Session, VideoFormat, WriterTransport,
};
use std::fs::File;
use std::time::Duration;

const SPS: &[u8] = &[0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16];
const PPS: &[u8] = &[0x68, 0xCE, 0x3C, 0x80];

fn annexb(nalus: &[&[u8]]) -> Vec<u8> {
    nalus
        .iter()
        .flat_map(|nalu| [&[0u8, 0, 0, 1][..], nalu].concat())
        .collect()
}

fn main() -> ez_rtmp_push::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let video = VideoFormat::new(640, 360, 500_000).set_framerate(25.0);
    let audio = AudioFormat::new(AudioCodec::G711A, 8000, 1).set_bitrate(64_000);

    let file = File::create("demo.flv").map_err(|e| ez_rtmp_push::Error::Setup(e.into()))?;
    let mut session = Session::builder()
        .transport(WriterTransport::new(file))
        .video(video)
        .audio(audio)
        .log_level(log::LevelFilter::Debug)
        .build()?;
    session.add_stream(&MediaPacket::video(annexb(&[SPS, PPS]), video))?;
    session.start()?;

    // 25 fps video, 20 ms audio frames, three seconds of each
    for frame in 0..75u64 {
        let pts = frame * 40_000;
        let nalu: &[u8] = if frame % 25 == 0 {
            &[0x65, 0x88, 0x84, 0x00]
        } else {
            &[0x41, 0x9A, 0x00, 0x00]
        };
        session.push(&MediaPacket::video(annexb(&[nalu]), video).set_pts(pts))?;
        for half in 0..2 {
            let audio_pts = pts + half * 20_000;
            session.push(&MediaPacket::audio(vec![0xD5; 160], audio).set_pts(audio_pts))?;
        }
    }

    while !session.queue().is_empty() {
        std::thread::sleep(Duration::from_millis(10));
    }
    session.destroy()?;
    Ok(())
}
