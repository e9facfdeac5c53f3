use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::audio_models::AudioMeterData;
use super::config::AudioConfig;
use super::error::AudioError;
use super::state::StreamState;

/// An inbound audio stream owned by the source manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub id: String,
    pub device_id: String,
    pub state: StreamState,
    pub config: AudioConfig,
    pub level_history: VecDeque<AudioMeterData>,
    pub latency_ms: u32,
    pub dropped_frames: u64,
    pub total_frames: u64,
    pub duration: Duration,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl StreamRecord {
    pub fn new(id: String, device_id: String, config: AudioConfig) -> Self {
        let now = Utc::now();
        Self {
            id,
            device_id,
            state: StreamState::Starting,
            config,
            level_history: VecDeque::new(),
            latency_ms: 0,
            dropped_frames: 0,
            total_frames: 0,
            duration: Duration::ZERO,
            created_at: now,
            last_activity: now,
        }
    }

    /// Refresh last-activity and recompute the duration from creation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
        self.duration = (now - self.created_at).to_std().unwrap_or_default();
    }

    /// Append a meter frame, dropping the oldest beyond `capacity`.
    pub fn push_levels(&mut self, meter: AudioMeterData, capacity: usize) {
        if capacity == 0 {
            return;
        }
        while self.level_history.len() >= capacity {
            self.level_history.pop_front();
        }
        self.level_history.push_back(meter);
    }

    pub fn statistics(&self) -> StreamStatistics {
        let seen = self.total_frames + self.dropped_frames;
        let drop_rate = if seen == 0 {
            0.0
        } else {
            self.dropped_frames as f64 / seen as f64
        };
        StreamStatistics {
            stream_id: self.id.clone(),
            state: self.state,
            total_frames: self.total_frames,
            dropped_frames: self.dropped_frames,
            drop_rate,
            latency_ms: self.latency_ms,
            duration_secs: self.duration.as_secs_f64(),
        }
    }
}

/// An outbound talkback session owned by the sink manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkbackSession {
    pub id: String,
    pub device_id: String,
    pub config: AudioConfig,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub bytes_transmitted: u64,

    /// Output level last reported by the camera.
    pub remote_level: Option<u8>,

    /// Byte count last reported by the camera.
    pub remote_bytes_received: Option<u32>,
}

impl TalkbackSession {
    pub fn new(id: String, device_id: String, config: AudioConfig) -> Self {
        let now = Utc::now();
        Self {
            id,
            device_id,
            config,
            active: true,
            created_at: now,
            last_activity: now,
            bytes_transmitted: 0,
            remote_level: None,
            remote_bytes_received: None,
        }
    }

    pub fn statistics(&self) -> TalkbackStatistics {
        let duration = (self.last_activity - self.created_at).to_std().unwrap_or_default();
        TalkbackStatistics {
            talkback_id: self.id.clone(),
            active: self.active,
            bytes_transmitted: self.bytes_transmitted,
            remote_bytes_received: self.remote_bytes_received,
            duration_secs: duration.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStatistics {
    pub stream_id: String,
    pub state: StreamState,
    pub total_frames: u64,
    pub dropped_frames: u64,
    pub drop_rate: f64,
    pub latency_ms: u32,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalkbackStatistics {
    pub talkback_id: String,
    pub active: bool,
    pub bytes_transmitted: u64,
    pub remote_bytes_received: Option<u32>,
    pub duration_secs: f64,
}

/// Counters of a device's outbound send queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendQueueStatistics {
    pub queued: usize,
    pub total_bytes: usize,
    /// Buffers evicted by overflow.
    pub dropped: u64,
}

/// Per-device snapshot of stream and talkback statistics.
///
/// Serializable for JSON export to whatever front end drives the managers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDiagnostics {
    pub device_id: String,
    pub captured_at: String,
    pub streams: Vec<StreamStatistics>,
    pub talkback: Vec<TalkbackStatistics>,
    pub send_queue: SendQueueStatistics,
}

impl DeviceDiagnostics {
    pub fn new(
        device_id: &str,
        streams: Vec<StreamStatistics>,
        talkback: Vec<TalkbackStatistics>,
        send_queue: SendQueueStatistics,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            captured_at: Utc::now().to_rfc3339(),
            streams,
            talkback,
            send_queue,
        }
    }

    pub fn to_json(&self) -> Result<String, AudioError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            AudioError::Serialization(format!("failed to serialize diagnostics: {}", e))
        })
    }
}
