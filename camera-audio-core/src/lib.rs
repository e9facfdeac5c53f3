//! # camera-audio-core
//!
//! Audio layer for a Bluetooth LE camera controller.
//!
//! Encodes and decodes the fixed binary frames exchanged over the camera's
//! Audio Source and Audio Sink GATT services, and manages inbound audio
//! streams and outbound talkback sessions on top of them. The platform
//! Bluetooth stack implements the `GattTransport` trait and is handed to the
//! managers at construction.
//!
//! ## Architecture
//!
//! ```text
//! camera-audio-core (this crate)
//! ├── traits/       ← GattTransport, Subscription
//! ├── models/       ← AudioError, StreamState, AudioConfig, settings, records
//! ├── protocol/     ← service/characteristic UUIDs, command codes, frame codec
//! ├── processing/   ← SendQueue
//! └── session/      ← AudioSourceManager, AudioSinkManager, SubscriptionLedger
//! ```

pub mod models;
pub mod processing;
pub mod protocol;
pub mod session;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    AudioCapabilities, AudioFrame, AudioMeterData, ChannelLevel, HardwareFeatures,
};
pub use models::config::{AudioCodec, AudioConfig, AudioQuality, ChannelLayout, ManagerOptions};
pub use models::error::{AudioError, DecodeError, TransportError};
pub use models::records::{
    DeviceDiagnostics, SendQueueStatistics, StreamRecord, StreamStatistics, TalkbackSession,
    TalkbackStatistics,
};
pub use models::settings::{
    AudioInputSettings, AudioOutputSettings, InputSource, OutputDestination,
};
pub use models::state::StreamState;
pub use processing::send_queue::SendQueue;
pub use session::sink::AudioSinkManager;
pub use session::source::AudioSourceManager;
pub use session::subscriptions::{SubscriptionHandle, SubscriptionLedger, SubscriptionSlot};
pub use traits::transport::{GattTransport, NotifyCallback, Subscription};

/// Collect stream and talkback statistics for one device from both managers.
pub fn device_diagnostics<T: GattTransport + 'static>(
    device: &str,
    source: &AudioSourceManager<T>,
    sink: &AudioSinkManager<T>,
) -> DeviceDiagnostics {
    DeviceDiagnostics::new(
        device,
        source.device_statistics(device),
        sink.device_statistics(device),
        sink.send_queue_statistics(device),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::FakeTransport;

    #[test]
    fn diagnostics_cover_both_directions() {
        let transport = FakeTransport::new();
        let source = AudioSourceManager::new(Arc::clone(&transport), ManagerOptions::default());
        let sink = AudioSinkManager::new(Arc::clone(&transport), ManagerOptions::default());

        let stream = source.start_stream("camA", AudioConfig::default()).unwrap();
        let talkback = sink.start_talkback("camA", AudioConfig::default()).unwrap();
        sink.send_audio_data("camA", &[0u8; 64]).unwrap();

        let diagnostics = device_diagnostics("camA", &source, &sink);
        assert_eq!(diagnostics.streams[0].stream_id, stream);
        assert_eq!(diagnostics.talkback[0].talkback_id, talkback);
        assert_eq!(diagnostics.talkback[0].bytes_transmitted, 64);
        assert_eq!(diagnostics.send_queue.total_bytes, 64);

        let json = diagnostics.to_json().unwrap();
        assert!(json.contains(&stream));
        assert!(json.contains("\"starting\""));
    }
}
