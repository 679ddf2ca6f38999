use std::io;

/// A specialized [`Result`](std::result::Result) type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Session allocation failed: {0}")]
    Allocation(#[from] SessionCreateError),

    #[error("Transport setup failed: {0}")]
    Setup(TransportError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] BufferError),

    #[error("Transport write failed: {0}")]
    TransportWrite(TransportError),

    #[error("Packet queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Packetizer error: {0}")]
    Packetizer(#[from] PacketizerError),

    #[error("Send pipeline already started")]
    AlreadyStarted,

    #[error("Stream not started: FLV header not written yet")]
    NotStarted,

    #[error("FLV header already written, streams can no longer be declared")]
    HeaderAlreadySent,

    #[error("Send pipeline thread exited abnormally")]
    PipelineThreadExited,

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
}

impl Error {
    /// Whether the error terminates the stream.
    ///
    /// Serialization and packetizer failures only discard the frame being
    /// written; everything else leaves the muxer unusable for this stream.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Serialization(_) | Error::Packetizer(_))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionCreateError {
    #[error("serialization buffer capacity must be non-zero")]
    ZeroBufferCapacity,
    #[error("scratch buffer capacity must be non-zero")]
    ZeroScratchCapacity,
    #[error("packet queue capacity must be non-zero")]
    ZeroQueueCapacity,
    #[error("poll interval must be non-zero")]
    ZeroPollInterval,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer overflow: {position} + {additional} > {capacity} max")]
    Overflow {
        position: usize,
        additional: usize,
        capacity: usize,
    },
    #[error("backpatch offset {offset} is beyond write position {position}")]
    InvalidOffset { offset: usize, position: usize },
    #[error("value {0} does not fit in 24 bits")]
    ValueTooLarge(u32),
    #[error("amf string of {0} bytes exceeds the 65535 byte limit")]
    StringTooLong(usize),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("packet queue is full ({capacity} items)")]
    Full { capacity: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("receiver disconnected")]
    Disconnected,
    #[error("transport already closed")]
    Closed,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketizerError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("no {0} stream declared for this session")]
    StreamNotDeclared(&'static str),
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),
    #[error("unsupported audio codec {0:?}")]
    UnsupportedCodec(crate::core::media_packet::AudioCodec),
    #[error("truncated adts header")]
    TruncatedAdtsHeader,
}

impl From<TransportError> for Error {
    fn from(error: TransportError) -> Self {
        Error::TransportWrite(error)
    }
}
