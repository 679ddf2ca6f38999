// src/core/pipeline.rs - Background consumer draining the packet queue
//
// The muxer is moved into the thread on start and handed back through the
// JoinHandle on stop, so nothing it owns is ever shared.

use crate::core::config::SessionConfig;
use crate::core::packet_queue::PacketQueue;
use crate::flv::muxer::FlvMuxer;
use log::{debug, error, info, trace, warn, Level};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

pub(crate) const STATUS_INIT: usize = 0;
pub(crate) const STATUS_RUN: usize = 1;
pub(crate) const STATUS_END: usize = 2;

const THREAD_NAME: &str = "flv-send-pipeline";

/// Spawns the send pipeline. `status` must already be `STATUS_RUN`.
pub(crate) fn spawn(
    muxer: FlvMuxer,
    queue: PacketQueue,
    status: Arc<AtomicUsize>,
    config: SessionConfig,
) -> std::io::Result<JoinHandle<FlvMuxer>> {
    std::thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || run(muxer, queue, status, config))
}

fn run(
    mut muxer: FlvMuxer,
    queue: PacketQueue,
    status: Arc<AtomicUsize>,
    config: SessionConfig,
) -> FlvMuxer {
    if config.log_enabled(Level::Debug) {
        debug!("Thread[{THREAD_NAME}] started.");
    }
    let mut sent = 0usize;
    let mut dropped = 0usize;

    while status.load(Ordering::Acquire) == STATUS_RUN {
        let Some(item) = queue.pop_timeout(config.poll_interval) else {
            continue;
        };
        let packet = item.into_packet();

        if !muxer.headers_sent() {
            if let Err(e) = muxer.write_header() {
                error!("Failed to write FLV header: {e}");
                status.store(STATUS_END, Ordering::Release);
                break;
            }
        }

        match muxer.write_packet(&packet) {
            Ok(()) => {
                sent += 1;
                if config.log_enabled(Level::Trace) {
                    trace!(
                        "Sent {} packet ({} bytes, pts {:?}).",
                        packet.kind(),
                        packet.size(),
                        packet.pts()
                    );
                }
            }
            Err(e) if !e.is_fatal() => {
                dropped += 1;
                if config.log_enabled(Level::Warn) {
                    warn!("Dropped {} packet: {e}", packet.kind());
                }
            }
            Err(e) => {
                error!("Send pipeline stopped: {e}");
                status.store(STATUS_END, Ordering::Release);
                break;
            }
        }
    }

    if config.log_enabled(Level::Info) {
        info!("Send pipeline exited ({sent} packets sent, {dropped} dropped).");
    }
    muxer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media_packet::{MediaPacket, VideoFormat};
    use crate::error::TransportError;
    use crate::transport::Transport;
    use std::time::Duration;

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn write(&mut self, _data: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    #[test]
    fn test_transport_failure_ends_pipeline() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let config = SessionConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let mut muxer = FlvMuxer::new(Box::new(FailingTransport), &config);
        let sample = MediaPacket::video(Vec::new(), VideoFormat::new(320, 240, 100_000));
        muxer.add_stream(&sample).unwrap();

        let queue = PacketQueue::new(8);
        queue
            .push(&MediaPacket::video(vec![0, 0, 1, 0x65, 0x80], VideoFormat::default()))
            .unwrap();
        let status = Arc::new(AtomicUsize::new(STATUS_RUN));
        let handle = spawn(muxer, queue, status.clone(), config).unwrap();

        let muxer = handle.join().unwrap();
        assert_eq!(status.load(Ordering::Acquire), STATUS_END);
        assert!(!muxer.headers_sent());
    }

    #[test]
    fn test_exits_within_poll_interval() {
        let config = SessionConfig {
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let (transport, _receiver) = crate::transport::ChannelTransport::unbounded();
        let muxer = FlvMuxer::new(Box::new(transport), &config);
        let status = Arc::new(AtomicUsize::new(STATUS_RUN));
        let handle = spawn(muxer, PacketQueue::new(8), status.clone(), config).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        status.store(STATUS_END, Ordering::Release);
        let started = std::time::Instant::now();
        handle.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
