use crate::core::config::SessionConfig;
use crate::core::media_packet::{AudioFormat, MediaPacket, VideoFormat};
use crate::core::packet_queue::PacketQueue;
use crate::core::pipeline::{self, STATUS_END, STATUS_INIT, STATUS_RUN};
use crate::error::{Error, Result};
use crate::flv::muxer::{AudioPacketizer, FlvMuxer, VideoPacketizer};
use crate::transport::Transport;
use log::{debug, error, info, warn, LevelFilter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Lifecycle of a [`Session`]'s send pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, pipeline never started.
    Idle,
    /// The pipeline thread is draining the queue.
    Running,
    /// The pipeline was stopped, or exited on a transport failure.
    Stopped,
}

/// One outgoing FLV stream: a packet queue, the muxer and the background
/// send pipeline that connects them.
///
/// While the pipeline is running the muxer belongs to the pipeline thread;
/// producers only ever touch the [`PacketQueue`].
///
/// # Example
/// ```rust,ignore
/// use ez_rtmp_push::{MediaPacket, Session, VideoFormat, WriterTransport};
///
/// let file = std::fs::File::create("out.flv")?;
/// let mut session = Session::builder()
///     .transport(WriterTransport::new(file))
///     .video(VideoFormat::new(1920, 1080, 4_000_000))
///     .build()?;
///
/// session.start()?;
/// session.push(&MediaPacket::video(frame, format).set_pts(pts))?;
/// session.stop()?;
/// ```
pub struct Session {
    config: SessionConfig,
    queue: PacketQueue,
    status: Arc<AtomicUsize>,
    muxer: Option<FlvMuxer>,
    pipeline: Option<JoinHandle<FlvMuxer>>,
}

impl Session {
    /// Creates a new [`SessionBuilder`].
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Connects to an RTMP server and creates a session publishing to it.
    ///
    /// # Parameters
    ///
    /// * `url` - `rtmp://host[:port]/app/stream_key`
    /// * `config` - buffer sizes, queue capacity, poll interval and log level
    ///
    /// # Errors
    ///
    /// * [`Error::Allocation`] if the configuration is invalid
    /// * [`Error::Setup`] if the connection or handshake fails
    #[cfg(feature = "rtmp")]
    pub fn create(url: impl Into<String>, config: SessionConfig) -> Result<Session> {
        SessionBuilder::new().url(url).config(config).build()
    }

    /// Creates a session writing to an already connected transport.
    pub fn with_transport(
        transport: impl Transport + 'static,
        config: SessionConfig,
    ) -> Result<Session> {
        SessionBuilder::new()
            .transport(transport)
            .config(config)
            .build()
    }

    /// Declares a stream from a sample packet.
    ///
    /// The packet's format goes into the `onMetaData` tag and its payload may
    /// carry codec configuration (e.g. H.264 SPS/PPS) for the packetizer.
    /// Must be called before the header is written.
    ///
    /// # Errors
    ///
    /// * [`Error::AlreadyStarted`] while the pipeline is running
    /// * [`Error::HeaderAlreadySent`] once the FLV header is out
    /// * [`Error::Packetizer`] if no packetizer is available for the codec
    pub fn add_stream(&mut self, packet: &MediaPacket) -> Result<()> {
        self.idle_muxer()?.add_stream(packet)
    }

    /// Starts the send pipeline.
    ///
    /// Packets queued before this call are discarded. Packets pushed after it
    /// returns are sent in order; the FLV header goes out ahead of the first one.
    ///
    /// # Errors
    ///
    /// * [`Error::AlreadyStarted`] if the pipeline is already running
    /// * [`Error::PipelineThreadExited`] if the thread could not be spawned
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyStarted);
        }
        // reclaims the muxer from a pipeline that ended on its own
        self.stop()?;
        let muxer = self.muxer.take().ok_or(Error::PipelineThreadExited)?;

        let stale = self.queue.flush();
        if stale > 0 && self.config.log_enabled(log::Level::Debug) {
            debug!("Discarded {stale} stale packets.");
        }

        self.status.store(STATUS_RUN, Ordering::Release);
        match pipeline::spawn(
            muxer,
            self.queue.clone(),
            self.status.clone(),
            self.config.clone(),
        ) {
            Ok(handle) => {
                self.pipeline = Some(handle);
                if self.config.log_enabled(log::Level::Info) {
                    info!("Send pipeline started.");
                }
                Ok(())
            }
            Err(e) => {
                self.status.store(STATUS_END, Ordering::Release);
                error!("Failed to spawn send pipeline: {e}");
                Err(Error::PipelineThreadExited)
            }
        }
    }

    /// Stops the send pipeline and waits for it to exit.
    ///
    /// The thread notices within one poll interval; a packet being written
    /// when the stop is signalled is finished first. Queued packets stay in
    /// the queue. Safe to call at any time, including before [`start`](Session::start).
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.pipeline.take() else {
            return Ok(());
        };
        self.status.store(STATUS_END, Ordering::Release);
        match handle.join() {
            Ok(muxer) => {
                self.muxer = Some(muxer);
                Ok(())
            }
            Err(_) => {
                error!("Thread[flv-send-pipeline] panicked.");
                Err(Error::PipelineThreadExited)
            }
        }
    }

    /// Queues a deep copy of `packet` for the send pipeline.
    ///
    /// May be called from any thread holding a clone of [`queue`](Session::queue).
    pub fn push(&self, packet: &MediaPacket) -> Result<()> {
        self.queue.push(packet)?;
        Ok(())
    }

    /// The producer side of this session.
    pub fn queue(&self) -> &PacketQueue {
        &self.queue
    }

    /// Writes the FLV header and `onMetaData` tag on the calling thread.
    /// Does nothing if they were already sent.
    pub fn write_header(&mut self) -> Result<()> {
        self.idle_muxer()?.write_header()
    }

    /// Serializes and flushes one packet on the calling thread. The header
    /// must already be out, see [`write_header`](Session::write_header) and
    /// [`send_packet`](Session::send_packet).
    ///
    /// # Errors
    ///
    /// * [`Error::AlreadyStarted`] while the pipeline owns the muxer
    /// * [`Error::NotStarted`] if the FLV header has not been written
    pub fn write_packet(&mut self, packet: &MediaPacket) -> Result<()> {
        self.idle_muxer()?.write_packet(packet)
    }

    /// Serializes and flushes one packet on the calling thread, bypassing the
    /// queue. Writes the header first if it has not been sent.
    ///
    /// # Errors
    ///
    /// * [`Error::AlreadyStarted`] while the pipeline owns the muxer
    pub fn send_packet(&mut self, packet: &MediaPacket) -> Result<()> {
        self.idle_muxer()?.send_packet(packet)
    }

    /// Whether the send pipeline is running. Becomes `false` on its own when
    /// the transport fails.
    pub fn is_running(&self) -> bool {
        self.status.load(Ordering::Acquire) == STATUS_RUN
    }

    pub fn state(&self) -> SessionState {
        match self.status.load(Ordering::Acquire) {
            STATUS_RUN => SessionState::Running,
            STATUS_END => SessionState::Stopped,
            _ => SessionState::Idle,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stops the pipeline, then closes the transport and releases the queue.
    pub fn destroy(mut self) -> Result<()> {
        let result = self.stop();
        if let Some(mut muxer) = self.muxer.take() {
            muxer.close();
        }
        let discarded = self.queue.flush();
        if discarded > 0 {
            debug!("Released {discarded} queued packets.");
        }
        result
    }

    fn idle_muxer(&mut self) -> Result<&mut FlvMuxer> {
        if self.is_running() {
            return Err(Error::AlreadyStarted);
        }
        self.stop()?;
        self.muxer.as_mut().ok_or(Error::PipelineThreadExited)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop send pipeline on drop: {e}");
        }
    }
}

/// A builder for [`Session`].
///
/// Either a [`transport`](SessionBuilder::transport) or, with the `rtmp`
/// feature, a [`url`](SessionBuilder::url) is required. Everything else has
/// a default.
pub struct SessionBuilder {
    #[cfg(feature = "rtmp")]
    url: Option<String>,
    transport: Option<Box<dyn Transport>>,
    video: Option<VideoFormat>,
    audio: Option<AudioFormat>,
    video_packetizer: Option<VideoPacketizer>,
    audio_packetizer: Option<AudioPacketizer>,
    config: SessionConfig,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "rtmp")]
            url: None,
            transport: None,
            video: None,
            audio: None,
            video_packetizer: None,
            audio_packetizer: None,
            config: SessionConfig::default(),
        }
    }

    /// Sets the RTMP publish URL (`rtmp://host[:port]/app/stream_key`).
    /// Ignored when a transport is set.
    #[cfg(feature = "rtmp")]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the byte sink the FLV stream is written to.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Declares a video stream.
    pub fn video(mut self, format: VideoFormat) -> Self {
        self.video = Some(format);
        self
    }

    /// Declares an audio stream.
    pub fn audio(mut self, format: AudioFormat) -> Self {
        self.audio = Some(format);
        self
    }

    /// Replaces the built-in H.264 packetizer.
    pub fn video_packetizer(mut self, packetizer: VideoPacketizer) -> Self {
        self.video_packetizer = Some(packetizer);
        self
    }

    /// Replaces the built-in packetizer picked from the audio codec. Required
    /// for [`AudioCodec::Other`](crate::core::media_packet::AudioCodec::Other).
    pub fn audio_packetizer(mut self, packetizer: AudioPacketizer) -> Self {
        self.audio_packetizer = Some(packetizer);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    pub fn scratch_capacity(mut self, capacity: usize) -> Self {
        self.config.scratch_capacity = capacity;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// How long the pipeline waits on an empty queue before rechecking
    /// whether it was stopped.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn log_level(mut self, level: LevelFilter) -> Self {
        self.config.log_level = level;
        self
    }

    /// Validates the configuration, connects the transport if needed and
    /// declares the configured streams.
    ///
    /// Nothing is returned unless every step succeeds; a transport that was
    /// already connected is closed on failure.
    ///
    /// # Errors
    ///
    /// * [`Error::Allocation`] if a capacity or the poll interval is zero
    /// * [`Error::MissingParameter`] if no transport (or url) was given
    /// * [`Error::Setup`] if connecting to the url fails
    /// * [`Error::Packetizer`] if an audio codec has no packetizer
    pub fn build(mut self) -> Result<Session> {
        self.config.validate()?;
        let transport = self.take_transport()?;

        let mut muxer = FlvMuxer::new(transport, &self.config);
        if let Some(packetizer) = self.video_packetizer {
            muxer.set_video_packetizer(packetizer);
        }
        if let Some(packetizer) = self.audio_packetizer {
            muxer.set_audio_packetizer(packetizer);
        }
        if let Some(format) = self.video {
            muxer.add_stream(&MediaPacket::video(Vec::new(), format))?;
        }
        if let Some(format) = self.audio {
            muxer.add_stream(&MediaPacket::audio(Vec::new(), format))?;
        }

        Ok(Session {
            queue: PacketQueue::new(self.config.queue_capacity),
            status: Arc::new(AtomicUsize::new(STATUS_INIT)),
            muxer: Some(muxer),
            pipeline: None,
            config: self.config,
        })
    }

    fn take_transport(&mut self) -> Result<Box<dyn Transport>> {
        if let Some(transport) = self.transport.take() {
            return Ok(transport);
        }
        #[cfg(feature = "rtmp")]
        {
            if let Some(url) = self.url.take() {
                let transport = crate::rtmp::RtmpTransport::connect(&url).map_err(Error::Setup)?;
                return Ok(Box::new(transport));
            }
        }
        Err(Error::MissingParameter("transport"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::media_packet::AudioCodec;
    use crate::error::{PacketizerError, SessionCreateError};
    use crate::transport::ChannelTransport;

    fn session() -> (Session, crossbeam_channel::Receiver<Vec<u8>>) {
        let (transport, receiver) = ChannelTransport::unbounded();
        let session = Session::builder()
            .transport(transport)
            .audio(AudioFormat::new(AudioCodec::G711U, 8000, 1))
            .poll_interval(Duration::from_millis(10))
            .build()
            .unwrap();
        (session, receiver)
    }

    #[test]
    fn test_missing_transport() {
        assert!(matches!(
            Session::builder().build(),
            Err(Error::MissingParameter("transport"))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (transport, _receiver) = ChannelTransport::unbounded();
        let result = Session::builder()
            .transport(transport)
            .buffer_capacity(0)
            .build();
        assert!(matches!(
            result,
            Err(Error::Allocation(SessionCreateError::ZeroBufferCapacity))
        ));
    }

    #[test]
    fn test_unknown_codec_needs_packetizer() {
        let (transport, receiver) = ChannelTransport::unbounded();
        let result = Session::builder()
            .transport(transport)
            .audio(AudioFormat::new(AudioCodec::Other(5), 16000, 1))
            .build();
        assert!(matches!(
            result,
            Err(Error::Packetizer(PacketizerError::UnsupportedCodec(_)))
        ));
        // transport was closed when the partial muxer was dropped
        assert!(receiver.recv().is_err());
    }

    #[test]
    fn test_lifecycle() {
        let (mut session, _receiver) = session();
        assert_eq!(session.state(), SessionState::Idle);
        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Idle);

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert!(matches!(session.start(), Err(Error::AlreadyStarted)));
        let packet = MediaPacket::audio(vec![1], AudioFormat::new(AudioCodec::G711U, 8000, 1));
        assert!(matches!(
            session.send_packet(&packet),
            Err(Error::AlreadyStarted)
        ));

        session.stop().unwrap();
        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.is_running());
        session.destroy().unwrap();
    }

    #[test]
    fn test_start_discards_stale_packets() {
        let (mut session, receiver) = session();
        let format = AudioFormat::new(AudioCodec::G711U, 8000, 1);
        session.push(&MediaPacket::audio(vec![0xFF; 80], format)).unwrap();
        assert_eq!(session.queue().len(), 1);

        session.start().unwrap();
        assert!(session.queue().is_empty());
        session.stop().unwrap();
        // nothing reached the pipeline, so not even the header was sent
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_send_packet_when_idle() {
        let (mut session, receiver) = session();
        let format = AudioFormat::new(AudioCodec::G711U, 8000, 1);
        session
            .send_packet(&MediaPacket::audio(vec![0xFF; 80], format))
            .unwrap();
        // header flush, then the frame flush
        assert_eq!(receiver.try_iter().count(), 2);
    }

    #[test]
    fn test_write_packet_before_header_is_rejected() {
        let (mut session, receiver) = session();
        let format = AudioFormat::new(AudioCodec::G711U, 8000, 1);
        let packet = MediaPacket::audio(vec![0xFF; 80], format);
        assert!(matches!(session.write_packet(&packet), Err(Error::NotStarted)));
        assert!(receiver.try_recv().is_err());

        session.write_header().unwrap();
        session.write_packet(&packet).unwrap();
        session.send_packet(&packet).unwrap();
        let chunks: Vec<Vec<u8>> = receiver.try_iter().collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(&chunks[0][..3], b"FLV");
        assert!(chunks[1..].iter().all(|chunk| !chunk.starts_with(b"FLV")));
    }

    #[test]
    fn test_add_stream_after_header_is_rejected() {
        let (mut session, receiver) = session();
        let format = AudioFormat::new(AudioCodec::G711U, 8000, 1);
        let audio = MediaPacket::audio(vec![0xFF; 80], format);
        session.send_packet(&audio).unwrap();

        let video = MediaPacket::video(
            vec![0, 0, 0, 1, 0x65, 0x88],
            VideoFormat::new(320, 240, 300_000),
        );
        assert!(matches!(
            session.add_stream(&video),
            Err(Error::HeaderAlreadySent)
        ));
        // the video stream stays undeclared, so its frames are dropped
        assert!(matches!(
            session.send_packet(&video),
            Err(Error::Packetizer(PacketizerError::StreamNotDeclared("video")))
        ));

        let chunks: Vec<Vec<u8>> = receiver.try_iter().collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0][4], crate::flv::FLV_HEADER_FLAG_HASAUDIO);
    }
}
