/// Payload allocations are rounded up to this many bytes when a packet is
/// deep-copied into the queue.
pub const PAYLOAD_ALIGNMENT: usize = 16;

/// Encoded video stream description.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    /// Bits per second.
    pub bitrate: u32,
    /// Frames per second, written as the `framerate` metadata value when known.
    pub framerate: Option<f64>,
}

impl VideoFormat {
    pub fn new(width: u32, height: u32, bitrate: u32) -> Self {
        Self {
            width,
            height,
            bitrate,
            framerate: None,
        }
    }

    pub fn set_framerate(mut self, framerate: f64) -> Self {
        self.framerate = Some(framerate);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    Aac,
    /// G.711 A-law
    G711A,
    /// G.711 µ-law
    G711U,
    /// Any codec without a built-in packetizer; carries the caller's own id.
    Other(u32),
}

impl AudioCodec {
    /// The FLV `SoundFormat` value, also used for the `audiocodecid` metadata.
    ///
    /// Codecs FLV has no id for map to 0 so the metadata key always gets a value.
    pub fn flv_codec_id(&self) -> u8 {
        match self {
            AudioCodec::Aac => 10,
            AudioCodec::G711A => 7,
            AudioCodec::G711U => 8,
            AudioCodec::Other(_) => 0,
        }
    }
}

/// Encoded audio stream description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub codec: AudioCodec,
    /// Bits per second.
    pub bitrate: u32,
    pub sample_rate: u32,
    /// Bits per sample.
    pub sample_size: u32,
    pub channels: u32,
}

impl AudioFormat {
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u32) -> Self {
        Self {
            codec,
            bitrate: 0,
            sample_rate,
            sample_size: 16,
            channels,
        }
    }

    pub fn set_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn set_sample_size(mut self, sample_size: u32) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoPacket {
    pub data: Vec<u8>,
    pub format: VideoFormat,
    /// Presentation timestamp in microseconds.
    pub pts: Option<u64>,
    pub key_frame: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioPacket {
    pub data: Vec<u8>,
    pub format: AudioFormat,
    /// Presentation timestamp in microseconds.
    pub pts: Option<u64>,
}

/// One encoded frame of either media type.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaPacket {
    Audio(AudioPacket),
    Video(VideoPacket),
}

impl MediaPacket {
    pub fn video(data: impl Into<Vec<u8>>, format: VideoFormat) -> Self {
        MediaPacket::Video(VideoPacket {
            data: data.into(),
            format,
            pts: None,
            key_frame: false,
        })
    }

    pub fn audio(data: impl Into<Vec<u8>>, format: AudioFormat) -> Self {
        MediaPacket::Audio(AudioPacket {
            data: data.into(),
            format,
            pts: None,
        })
    }

    pub fn set_pts(mut self, pts_us: u64) -> Self {
        match &mut self {
            MediaPacket::Audio(audio) => audio.pts = Some(pts_us),
            MediaPacket::Video(video) => video.pts = Some(pts_us),
        }
        self
    }

    /// Marks a video packet as a keyframe. Has no effect on audio.
    pub fn set_key_frame(mut self, key_frame: bool) -> Self {
        match &mut self {
            MediaPacket::Audio(_) => {}
            MediaPacket::Video(video) => video.key_frame = key_frame,
        }
        self
    }

    pub fn data(&self) -> &[u8] {
        match self {
            MediaPacket::Audio(audio) => &audio.data,
            MediaPacket::Video(video) => &video.data,
        }
    }

    pub fn size(&self) -> usize {
        self.data().len()
    }

    pub fn pts(&self) -> Option<u64> {
        match self {
            MediaPacket::Audio(audio) => audio.pts,
            MediaPacket::Video(video) => video.pts,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaPacket::Video(_))
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, MediaPacket::Audio(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MediaPacket::Audio(_) => "audio",
            MediaPacket::Video(_) => "video",
        }
    }

    /// Copies the packet into a freshly allocated payload whose capacity is
    /// rounded up to [`PAYLOAD_ALIGNMENT`].
    pub(crate) fn deep_copy(&self) -> MediaPacket {
        match self {
            MediaPacket::Audio(audio) => MediaPacket::Audio(AudioPacket {
                data: aligned_copy(&audio.data),
                format: audio.format,
                pts: audio.pts,
            }),
            MediaPacket::Video(video) => MediaPacket::Video(VideoPacket {
                data: aligned_copy(&video.data),
                format: video.format,
                pts: video.pts,
                key_frame: video.key_frame,
            }),
        }
    }
}

pub(crate) fn aligned_len(len: usize) -> usize {
    len.div_ceil(PAYLOAD_ALIGNMENT) * PAYLOAD_ALIGNMENT
}

fn aligned_copy(src: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(aligned_len(src.len()));
    data.extend_from_slice(src);
    data
}
