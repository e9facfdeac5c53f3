use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::models::audio_models::{AudioCapabilities, AudioFrame, AudioMeterData};
use crate::models::config::{AudioConfig, ManagerOptions};
use crate::models::error::AudioError;
use crate::models::records::{StreamRecord, StreamStatistics};
use crate::models::settings::AudioInputSettings;
use crate::models::state::StreamState;
use crate::protocol::codec::{self, SOURCE_ID_LEN};
use crate::protocol::gatt::{source, SourceCommand};
use crate::session::subscriptions::{SubscriptionHandle, SubscriptionLedger, SubscriptionSlot};
use crate::session::{ensure_service, generate_id};
use crate::traits::transport::{GattTransport, NotifyCallback};

/// device id → stream id → record
type StreamMap = HashMap<String, HashMap<String, StreamRecord>>;

/// Manages inbound audio streams from cameras.
///
/// One instance per controller; it owns every stream it starts and every
/// subscription it opens. Notification callbacks update the same records
/// from the transport's delivery thread.
///
/// ```text
/// start_stream: [config write] → [START write] → record(starting) → [status subscribe]
/// status notify ──────────────────────────────→ record.state / latency
/// data notify   ──────────────────────────────→ frame counters → caller callback
/// ```
pub struct AudioSourceManager<T: GattTransport + 'static> {
    transport: Arc<T>,
    options: ManagerOptions,
    streams: Arc<Mutex<StreamMap>>,
    ledger: SubscriptionLedger,
    next_stream: AtomicU64,
}

impl<T: GattTransport + 'static> AudioSourceManager<T> {
    pub fn new(transport: Arc<T>, options: ManagerOptions) -> Self {
        Self {
            transport,
            options,
            streams: Arc::new(Mutex::new(HashMap::new())),
            ledger: SubscriptionLedger::new(),
            next_stream: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Start a stream. The record is created in `Starting` once the START
    /// command is written; the camera moves it on via status notifications.
    pub fn start_stream(&self, device: &str, config: AudioConfig) -> Result<String, AudioError> {
        config.validate().map_err(AudioError::InvalidConfiguration)?;

        let seq = self.next_stream.fetch_add(1, Ordering::Relaxed);
        let stream_id = generate_id("as", seq, 8);

        self.start_stream_inner(device, &stream_id, config)
            .map_err(|e| e.start_failed(AudioError::StreamStartFailed))?;

        log::info!("started stream {} on {}", stream_id, device);
        Ok(stream_id)
    }

    fn start_stream_inner(
        &self,
        device: &str,
        stream_id: &str,
        config: AudioConfig,
    ) -> Result<(), AudioError> {
        self.ensure_service(device)?;
        self.write(device, source::CONFIG, &codec::encode_source_config(stream_id, &config))?;
        self.write(
            device,
            source::CONTROL,
            &codec::encode_source_command(SourceCommand::Start, stream_id, Some(&config)),
        )?;

        self.streams
            .lock()
            .entry(device.to_string())
            .or_default()
            .insert(
                stream_id.to_string(),
                StreamRecord::new(stream_id.to_string(), device.to_string(), config),
            );

        if let Err(e) = self.subscribe_status(device, stream_id) {
            log::warn!("rolling back stream {} on {}: {}", stream_id, device, e);
            self.remove_record(device, stream_id);
            return Err(e);
        }

        // A concurrent cleanup may have dropped the record while subscribing.
        if self.with_record(device, stream_id, |_| ()).is_err() {
            log::warn!("stream {} on {} removed during start", stream_id, device);
            self.ledger.cancel(&SubscriptionSlot::Status {
                device: device.to_string(),
                id: stream_id.to_string(),
            });
            return Err(AudioError::StreamNotFound(stream_id.to_string()));
        }
        Ok(())
    }

    /// Stop a stream and forget it.
    ///
    /// Subscriptions are cancelled and the record removed even when the STOP
    /// write fails; the write error is returned afterwards.
    pub fn stop_stream(&self, device: &str, stream_id: &str) -> Result<(), AudioError> {
        let config = self.with_record(device, stream_id, |record| {
            record.state = StreamState::Stopping;
            record.config
        })?;

        let result = self.write(
            device,
            source::CONTROL,
            &codec::encode_source_command(SourceCommand::Stop, stream_id, Some(&config)),
        );

        self.ledger.cancel(&SubscriptionSlot::Data {
            device: device.to_string(),
            stream_id: stream_id.to_string(),
        });
        self.ledger.cancel(&SubscriptionSlot::Status {
            device: device.to_string(),
            id: stream_id.to_string(),
        });
        self.remove_record(device, stream_id);

        match &result {
            Ok(()) => log::info!("stopped stream {} on {}", stream_id, device),
            Err(e) => log::warn!(
                "stream {} on {} removed after failed stop: {}",
                stream_id,
                device,
                e
            ),
        }
        result
    }

    /// Pause a stream. Transitions: streaming → paused.
    pub fn pause_stream(&self, device: &str, stream_id: &str) -> Result<(), AudioError> {
        self.transition(
            device,
            stream_id,
            "pause",
            StreamState::Streaming,
            StreamState::Paused,
            SourceCommand::Pause,
        )
    }

    /// Resume a stream. Transitions: paused → streaming.
    pub fn resume_stream(&self, device: &str, stream_id: &str) -> Result<(), AudioError> {
        self.transition(
            device,
            stream_id,
            "resume",
            StreamState::Paused,
            StreamState::Streaming,
            SourceCommand::Resume,
        )
    }

    fn transition(
        &self,
        device: &str,
        stream_id: &str,
        action: &'static str,
        from: StreamState,
        to: StreamState,
        command: SourceCommand,
    ) -> Result<(), AudioError> {
        let config = self.with_record(device, stream_id, |record| {
            if record.state != from {
                return Err(AudioError::InvalidStateTransition {
                    stream_id: stream_id.to_string(),
                    action,
                    state: record.state,
                });
            }
            Ok(record.config)
        })??;

        let frame = codec::encode_source_command(command, stream_id, Some(&config));
        self.write(device, source::CONTROL, &frame)?;

        // The stream may have been stopped while the command was in flight.
        let _ = self.with_record(device, stream_id, |record| {
            record.state = to;
            record.touch(Utc::now());
        });
        log::debug!("{} stream {} on {}", action, stream_id, device);
        Ok(())
    }

    /// Snapshot of the device's streams; empty for an unknown device.
    pub fn get_active_streams(&self, device: &str) -> Vec<StreamRecord> {
        self.streams
            .lock()
            .get(device)
            .map(|streams| streams.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_stream_info(
        &self,
        device: &str,
        stream_id: &str,
    ) -> Result<StreamRecord, AudioError> {
        self.with_record(device, stream_id, |record| record.clone())
    }

    pub fn get_stream_statistics(
        &self,
        device: &str,
        stream_id: &str,
    ) -> Result<StreamStatistics, AudioError> {
        self.with_record(device, stream_id, |record| record.statistics())
    }

    /// Statistics for every stream on the device.
    pub fn device_statistics(&self, device: &str) -> Vec<StreamStatistics> {
        self.streams
            .lock()
            .get(device)
            .map(|streams| streams.values().map(StreamRecord::statistics).collect())
            .unwrap_or_default()
    }

    /// Write input settings. Nothing is cached; the camera is authoritative.
    pub fn configure_audio_input(
        &self,
        device: &str,
        settings: &AudioInputSettings,
    ) -> Result<(), AudioError> {
        self.ensure_service(device)?;
        self.write(device, source::INPUT_SETTINGS, &codec::encode_input_settings(settings))
    }

    pub fn get_audio_input_settings(&self, device: &str) -> Result<AudioInputSettings, AudioError> {
        self.ensure_service(device)?;
        let payload = self.transport.read(device, source::SERVICE, source::INPUT_SETTINGS)?;
        Ok(codec::decode_input_settings(&payload)?)
    }

    /// Query and decode the camera's audio capabilities. Not cached.
    pub fn get_audio_capabilities(&self, device: &str) -> Result<AudioCapabilities, AudioError> {
        self.ensure_service(device)?;
        self.write(
            device,
            source::CONTROL,
            &codec::encode_source_command(SourceCommand::GetCapabilities, "", None),
        )?;
        let payload = self.transport.read(device, source::SERVICE, source::CAPABILITIES)?;
        Ok(codec::decode_capabilities(&payload)?)
    }

    /// One-shot meter read.
    pub fn get_audio_levels(&self, device: &str) -> Result<AudioMeterData, AudioError> {
        self.ensure_service(device)?;
        self.write(
            device,
            source::CONTROL,
            &codec::encode_source_command(SourceCommand::GetLevels, "", None),
        )?;
        let payload = self.transport.read(device, source::SERVICE, source::LEVELS)?;
        Ok(codec::decode_meter_data(&payload)?)
    }

    /// Subscribe to meter frames for the device, replacing any earlier meter
    /// subscription. Each frame is also appended to the level history of the
    /// device's streams. Malformed frames are logged and skipped.
    pub fn subscribe_to_audio_levels<F>(
        &self,
        device: &str,
        callback: F,
    ) -> Result<SubscriptionHandle, AudioError>
    where
        F: Fn(&AudioMeterData) + Send + Sync + 'static,
    {
        self.ensure_service(device)?;

        let streams = Arc::downgrade(&self.streams);
        let capacity = self.options.level_history_capacity;
        let dev = device.to_string();
        let on_notify: NotifyCallback = Arc::new(move |payload: &[u8]| {
            let meter = match codec::decode_meter_data(payload) {
                Ok(meter) => meter,
                Err(e) => {
                    log::warn!("dropping meter frame from {}: {}", dev, e);
                    return;
                }
            };
            if let Some(streams) = streams.upgrade() {
                if let Some(device_streams) = streams.lock().get_mut(&dev) {
                    for record in device_streams.values_mut() {
                        record.push_levels(meter.clone(), capacity);
                    }
                }
            }
            callback(&meter);
        });

        let slot = SubscriptionSlot::Levels {
            device: device.to_string(),
        };
        let handle = self.ledger.replace(slot, || {
            self.transport.subscribe(device, source::SERVICE, source::LEVELS, on_notify)
        })?;
        Ok(handle)
    }

    /// Subscribe to audio payloads for an existing stream, replacing any
    /// earlier data subscription for it.
    ///
    /// Each decoded payload bumps `total_frames`; each undecodable one bumps
    /// `dropped_frames` instead and never reaches `callback`.
    pub fn subscribe_to_audio_data<F>(
        &self,
        device: &str,
        stream_id: &str,
        callback: F,
    ) -> Result<SubscriptionHandle, AudioError>
    where
        F: Fn(&AudioFrame) + Send + Sync + 'static,
    {
        self.with_record(device, stream_id, |_| ())?;

        let streams = Arc::downgrade(&self.streams);
        let dev = device.to_string();
        let id = stream_id.to_string();
        let on_notify: NotifyCallback = Arc::new(move |payload: &[u8]| {
            let Some(streams) = streams.upgrade() else {
                return;
            };
            let frame = {
                let mut guard = streams.lock();
                let Some(record) = guard.get_mut(&dev).and_then(|s| s.get_mut(&id)) else {
                    return;
                };
                match codec::decode_audio_frame(&id, record.config.codec, payload) {
                    Ok(frame) => {
                        record.total_frames += 1;
                        record.touch(frame.received_at);
                        frame
                    }
                    Err(e) => {
                        record.dropped_frames += 1;
                        log::warn!("dropped frame on stream {}: {}", id, e);
                        return;
                    }
                }
            };
            callback(&frame);
        });

        let slot = SubscriptionSlot::Data {
            device: device.to_string(),
            stream_id: stream_id.to_string(),
        };
        let handle = self.ledger.replace(slot, || {
            self.transport.subscribe(device, source::SERVICE, source::DATA, on_notify)
        })?;
        Ok(handle)
    }

    /// Cancel every subscription for the device and forget its streams.
    /// No commands are sent to the camera.
    pub fn cleanup(&self, device: &str) {
        let cancelled = self.ledger.cancel_device(device);
        let removed = self.streams.lock().remove(device).map(|s| s.len()).unwrap_or(0);
        if cancelled > 0 || removed > 0 {
            log::info!(
                "cleaned up {}: {} streams, {} subscriptions",
                device,
                removed,
                cancelled
            );
        }
    }

    // --- Internal helpers ---

    fn subscribe_status(&self, device: &str, stream_id: &str) -> Result<(), AudioError> {
        let streams = Arc::downgrade(&self.streams);
        let dev = device.to_string();
        let id = stream_id.to_string();
        let on_notify: NotifyCallback = Arc::new(move |payload: &[u8]| {
            if let Some(streams) = streams.upgrade() {
                apply_status(&streams, &dev, &id, payload);
            }
        });

        let slot = SubscriptionSlot::Status {
            device: device.to_string(),
            id: stream_id.to_string(),
        };
        self.ledger.replace(slot, || {
            self.transport.subscribe(device, source::SERVICE, source::STATUS, on_notify)
        })?;
        Ok(())
    }

    fn with_record<R>(
        &self,
        device: &str,
        stream_id: &str,
        f: impl FnOnce(&mut StreamRecord) -> R,
    ) -> Result<R, AudioError> {
        let mut streams = self.streams.lock();
        let record = streams
            .get_mut(device)
            .and_then(|s| s.get_mut(stream_id))
            .ok_or_else(|| AudioError::StreamNotFound(stream_id.to_string()))?;
        Ok(f(record))
    }

    fn remove_record(&self, device: &str, stream_id: &str) {
        let mut streams = self.streams.lock();
        if let Some(device_streams) = streams.get_mut(device) {
            device_streams.remove(stream_id);
            if device_streams.is_empty() {
                streams.remove(device);
            }
        }
    }

    fn ensure_service(&self, device: &str) -> Result<(), AudioError> {
        ensure_service(self.transport.as_ref(), &self.options, device, source::SERVICE)
    }

    fn write(
        &self,
        device: &str,
        characteristic: uuid::Uuid,
        payload: &[u8],
    ) -> Result<(), AudioError> {
        self.transport.write(device, source::SERVICE, characteristic, payload)?;
        Ok(())
    }
}

/// Apply a status notification to the stream it names, if it names this one.
fn apply_status(streams: &Mutex<StreamMap>, device: &str, stream_id: &str, payload: &[u8]) {
    let status = match codec::decode_source_status(payload) {
        Ok(status) => status,
        Err(e) => {
            log::warn!("ignoring status for stream {}: {}", stream_id, e);
            return;
        }
    };
    if !codec::id_matches(stream_id, &status.stream_id, SOURCE_ID_LEN) {
        return;
    }

    let mut streams = streams.lock();
    if let Some(record) = streams.get_mut(device).and_then(|s| s.get_mut(stream_id)) {
        log::debug!(
            "stream {} on {}: {} → {} ({} ms)",
            stream_id,
            device,
            record.state,
            status.state,
            status.latency_ms
        );
        record.state = status.state;
        record.latency_ms = status.latency_ms;
        record.touch(Utc::now());
    }
}
