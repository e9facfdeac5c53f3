use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::{AudioCodec, AudioQuality, ChannelLayout};

/// One channel of a meter frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelLevel {
    pub level: f32,
    pub peak: f32,
    pub vu: f32,
    pub overload: bool,
}

/// Level meter frame for all channels, observed at a single instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMeterData {
    pub channels: Vec<ChannelLevel>,
    pub timestamp: DateTime<Utc>,
}

impl AudioMeterData {
    /// Loudest peak across channels, 0.0 for an empty frame.
    pub fn max_peak(&self) -> f32 {
        self.channels.iter().map(|c| c.peak).fold(0.0, f32::max)
    }

    pub fn any_overload(&self) -> bool {
        self.channels.iter().any(|c| c.overload)
    }
}

/// One audio payload received on a stream's data characteristic.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub stream_id: String,
    pub codec: AudioCodec,
    pub data: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// Hardware feature flags reported by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardwareFeatures {
    pub internal_mic: bool,
    pub external_input: bool,
    pub xlr_input: bool,
    pub phantom_power: bool,
    pub headphone_output: bool,
    pub line_output: bool,
    pub auto_gain: bool,
    pub noise_reduction: bool,
    pub compressor: bool,
    pub limiter: bool,
    pub low_cut_filter: bool,
}

/// What the camera's audio source supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCapabilities {
    pub codecs: Vec<AudioCodec>,
    pub qualities: Vec<AudioQuality>,
    pub channel_layouts: Vec<ChannelLayout>,
    pub sample_rates: Vec<u32>,
    pub bit_depths: Vec<u8>,
    pub features: HardwareFeatures,
    pub max_concurrent_streams: u8,
    pub max_bit_rate: u32,
    pub min_latency_ms: u16,
    pub buffer_sizes: Vec<u32>,
}
