//! Session lifecycle, the packet queue and the send pipeline.

pub mod config;
pub mod media_packet;
pub mod packet_queue;
mod pipeline;
pub mod session;
