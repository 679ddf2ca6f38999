//! The **RTMP** module publishes the muxed FLV stream to an RTMP server using
//! `rml_rtmp` for the handshake and chunk framing.
//!
//! # Connection sequence
//!
//! 1. TCP connect and client handshake (C0/C1, C2)
//! 2. `connect` (transaction 1) with `app` and `tcUrl`
//! 3. `createStream` (transaction 2), the `_result` carries the stream id
//! 4. `publish` (transaction 3) with the stream key in `live` mode, then wait
//!    for `NetStream.Publish.Start`
//!
//! After that every FLV tag becomes one RTMP message on the published stream,
//! with the tag type as the message type id and the tag timestamp as the
//! message timestamp. `deleteStream` is sent when the transport is closed.
//!
//! # Example
//!
//! ```rust,ignore
//! use ez_rtmp_push::{Session, SessionConfig};
//!
//! let mut session = Session::create("rtmp://localhost:1935/live/stream1", SessionConfig::default())?;
//! session.add_stream(&sample_video_packet)?;
//! session.start()?;
//! ```
//!
//! **Feature Flag**: Only available when the `rtmp` feature is enabled.

mod rtmp_transport;
mod url;

pub use rtmp_transport::{flv_tag_to_message_payload, RtmpTransport};
pub use url::{RtmpUrl, DEFAULT_RTMP_PORT};
