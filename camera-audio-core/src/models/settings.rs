use serde::{Deserialize, Serialize};

/// Where the camera takes its audio input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    #[default]
    Internal,
    External,
    Xlr,
    Line,
}

impl InputSource {
    pub fn wire(self) -> u8 {
        match self {
            Self::Internal => 0,
            Self::External => 1,
            Self::Xlr => 2,
            Self::Line => 3,
        }
    }

    pub fn from_wire(byte: u8) -> Self {
        match byte {
            1 => Self::External,
            2 => Self::Xlr,
            3 => Self::Line,
            _ => Self::Internal,
        }
    }
}

/// Where the camera plays talkback and monitor audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputDestination {
    #[default]
    Speaker,
    Headphone,
    Line,
}

impl OutputDestination {
    pub fn wire(self) -> u8 {
        match self {
            Self::Speaker => 0,
            Self::Headphone => 1,
            Self::Line => 2,
        }
    }

    pub fn from_wire(byte: u8) -> Self {
        match byte {
            1 => Self::Headphone,
            2 => Self::Line,
            _ => Self::Speaker,
        }
    }
}

/// Microphone input settings. The camera holds the current values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioInputSettings {
    pub muted: bool,
    pub phantom_power: bool,
    pub low_cut_filter: bool,
    pub wind_noise_reduction: bool,
    pub monitoring: bool,
    pub auto_gain: bool,
    pub compressor: bool,
    pub limiter: bool,
    pub noise_suppression: bool,
    pub gain: u8,
    pub monitor_level: u8,
    pub source: InputSource,
}

/// Speaker/headphone output settings. The camera holds the current values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudioOutputSettings {
    pub muted: bool,
    pub talkback_enabled: bool,
    pub noise_suppression: bool,
    pub limiter: bool,
    pub playback_level: u8,
    pub talkback_level: u8,
    pub destination: OutputDestination,
}
