use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DecodeError;

/// Lifecycle of an inbound audio stream.
///
/// State transitions:
/// ```text
/// starting → streaming ⇄ paused
///               ↓          ↓
///            stopping → (removed)
/// ```
///
/// Status notifications from the camera may overwrite the state at any time,
/// including with `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Stopped,
    Starting,
    Streaming,
    Stopping,
    Paused,
}

impl StreamState {
    /// Byte used in the source status frame.
    pub fn wire(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Starting => 1,
            Self::Streaming => 2,
            Self::Stopping => 3,
            Self::Paused => 4,
        }
    }

    pub fn from_wire(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(Self::Stopped),
            1 => Ok(Self::Starting),
            2 => Ok(Self::Streaming),
            3 => Ok(Self::Stopping),
            4 => Ok(Self::Paused),
            other => Err(DecodeError::UnknownState(other)),
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Paused => "paused",
        };
        f.write_str(name)
    }
}
