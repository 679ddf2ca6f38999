//! # ez-rtmp-push
//!
//! Queue encoded audio/video frames from any number of threads, mux them into
//! FLV on a background thread and push the result to a byte sink: a live
//! RTMP connection, a file, or a channel.
//!
//! ## Pieces
//!
//! - [`Session`]: owns one stream. Declares its audio/video streams, starts
//!   and stops the send pipeline and exposes the producer queue.
//! - [`PacketQueue`]: bounded FIFO shared by producers and the pipeline.
//!   Every pushed packet is deep-copied, so callers can reuse their buffers.
//! - [`flv`]: the FLV header, the AMF0 `onMetaData` tag and the tag writer,
//!   plus [`FlvBuffer`](flv::flv_buffer::FlvBuffer) for reading the stream back.
//! - [`packetizer`]: codec framing for H.264, AAC and G.711.
//! - [`transport`]: where the bytes go. [`RtmpTransport`](rtmp::RtmpTransport)
//!   lives behind the `rtmp` feature.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ez_rtmp_push::{AudioCodec, AudioFormat, MediaPacket, Session, VideoFormat, WriterTransport};
//!
//! let video = VideoFormat::new(1280, 720, 2_000_000).set_framerate(30.0);
//! let audio = AudioFormat::new(AudioCodec::Aac, 44100, 2).set_bitrate(128_000);
//!
//! let mut session = Session::builder()
//!     .transport(WriterTransport::new(std::fs::File::create("out.flv")?))
//!     .video(video)
//!     .audio(audio)
//!     .build()?;
//!
//! // SPS/PPS in the first keyframe become the AVC sequence header.
//! session.add_stream(&MediaPacket::video(first_keyframe.clone(), video))?;
//! session.start()?;
//!
//! let queue = session.queue().clone();
//! std::thread::spawn(move || {
//!     for (pts, frame) in encoded_frames {
//!         let _ = queue.push(&MediaPacket::video(frame, video).set_pts(pts));
//!     }
//! });
//!
//! // ...
//! session.destroy()?;
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade and never installs a logger.
//! Per-packet output of a session is additionally limited by
//! [`SessionConfig::log_level`].

pub mod core;
pub mod error;
pub mod flv;
pub mod packetizer;
#[cfg(feature = "rtmp")]
pub mod rtmp;
pub mod transport;

pub use crate::core::config::SessionConfig;
pub use crate::core::media_packet::{
    AudioCodec, AudioFormat, AudioPacket, MediaPacket, VideoFormat, VideoPacket,
};
pub use crate::core::packet_queue::{PacketQueue, QueueItem};
pub use crate::core::session::{Session, SessionBuilder, SessionState};
pub use crate::error::{Error, Result};
pub use crate::transport::{ChannelTransport, Transport, WriterTransport};

#[cfg(feature = "rtmp")]
pub use crate::rtmp::RtmpTransport;
