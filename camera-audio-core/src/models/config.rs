use serde::{Deserialize, Serialize};

/// Audio quality tier, ordered `Low < Medium < High < Ultra`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    Medium,
    High,
    Ultra,
}

impl AudioQuality {
    pub const ALL: [AudioQuality; 4] = [Self::Low, Self::Medium, Self::High, Self::Ultra];

    pub fn wire(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Ultra => 3,
        }
    }

    /// Unknown bytes fall back to `Medium`.
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0 => Self::Low,
            1 => Self::Medium,
            2 => Self::High,
            3 => Self::Ultra,
            _ => Self::Medium,
        }
    }
}

/// Codec tag carried alongside audio payloads. Payloads are never transcoded here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Pcm,
    Aac,
    Mp3,
    Opus,
}

impl AudioCodec {
    pub const ALL: [AudioCodec; 4] = [Self::Pcm, Self::Aac, Self::Mp3, Self::Opus];

    pub fn wire(self) -> u8 {
        match self {
            Self::Pcm => 0,
            Self::Aac => 1,
            Self::Mp3 => 2,
            Self::Opus => 3,
        }
    }

    /// Unknown bytes fall back to `Pcm`.
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0 => Self::Pcm,
            1 => Self::Aac,
            2 => Self::Mp3,
            3 => Self::Opus,
            _ => Self::Pcm,
        }
    }
}

/// Channel layout. On the wire each layout is its channel count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    #[serde(rename = "mono")]
    Mono,
    #[serde(rename = "stereo")]
    Stereo,
    #[serde(rename = "5.1")]
    Surround51,
    #[serde(rename = "7.1")]
    Surround71,
}

impl ChannelLayout {
    pub const ALL: [ChannelLayout; 4] =
        [Self::Mono, Self::Stereo, Self::Surround51, Self::Surround71];

    pub fn channel_count(self) -> u8 {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Surround51 => 6,
            Self::Surround71 => 8,
        }
    }

    /// Counts outside {1, 2, 6, 8} fall back to `Stereo`.
    pub fn from_channel_count(count: u8) -> Self {
        match count {
            1 => Self::Mono,
            2 => Self::Stereo,
            6 => Self::Surround51,
            8 => Self::Surround71,
            _ => Self::Stereo,
        }
    }
}

/// Requested format for a stream or talkback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub quality: AudioQuality,
    pub codec: AudioCodec,
    pub channels: ChannelLayout,

    /// Sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Bits per sample (default: 16). Valid values: 8, 16, 24, 32.
    pub bit_depth: u8,

    /// Target bit rate in bits per second, for compressed codecs.
    pub bit_rate: Option<u32>,

    /// Device-side buffer size in bytes.
    pub buffer_size: Option<u32>,
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![8, 16, 24, 32].contains(&self.bit_depth) {
            return Err(format!("unsupported bit depth: {}", self.bit_depth));
        }
        if self.bit_rate == Some(0) {
            return Err("bit rate must be positive when set".into());
        }
        if self.buffer_size == Some(0) {
            return Err("buffer size must be positive when set".into());
        }
        Ok(())
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            quality: AudioQuality::Medium,
            codec: AudioCodec::Pcm,
            channels: ChannelLayout::Stereo,
            sample_rate: 48000,
            bit_depth: 16,
            bit_rate: None,
            buffer_size: None,
        }
    }
}

/// Tunables shared by the source and sink managers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Run characteristic discovery before each service operation (default: true).
    pub verify_service: bool,

    /// Meter readings kept per stream (default: 64).
    pub level_history_capacity: usize,

    /// Outbound buffers kept per device for diagnostics (default: 32).
    pub send_queue_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            verify_service: true,
            level_history_capacity: 64,
            send_queue_capacity: 32,
        }
    }
}
