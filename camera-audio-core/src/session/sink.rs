use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::models::config::{AudioCodec, AudioConfig, ManagerOptions};
use crate::models::error::AudioError;
use crate::models::records::{SendQueueStatistics, TalkbackSession, TalkbackStatistics};
use crate::models::settings::AudioOutputSettings;
use crate::processing::send_queue::SendQueue;
use crate::protocol::codec::{self, SINK_ID_LEN};
use crate::protocol::gatt::{sink, SinkCommand};
use crate::session::subscriptions::{SubscriptionLedger, SubscriptionSlot, WeakSubscriptionLedger};
use crate::session::{ensure_service, generate_id};
use crate::traits::transport::{GattTransport, NotifyCallback};

#[derive(Default)]
struct SinkState {
    /// device id → talkback id → session
    sessions: HashMap<String, HashMap<String, TalkbackSession>>,
    send_queues: HashMap<String, SendQueue>,
}

impl SinkState {
    /// Drop a session; clears the device's send queue when it was the last one.
    fn remove_session(&mut self, device: &str, talkback_id: &str) -> Option<TalkbackSession> {
        let device_sessions = self.sessions.get_mut(device)?;
        let removed = device_sessions.remove(talkback_id);
        if device_sessions.is_empty() {
            self.sessions.remove(device);
            if let Some(queue) = self.send_queues.get_mut(device) {
                queue.clear();
            }
        }
        removed
    }
}

/// Manages outbound talkback sessions to cameras.
///
/// Mirrors [`AudioSourceManager`](crate::session::source::AudioSourceManager)
/// with the data direction inverted. The camera may end a session on its own;
/// an inactive status for a session removes it here as well.
pub struct AudioSinkManager<T: GattTransport + 'static> {
    transport: Arc<T>,
    options: ManagerOptions,
    state: Arc<Mutex<SinkState>>,
    ledger: SubscriptionLedger,
    next_session: AtomicU64,
}

impl<T: GattTransport + 'static> AudioSinkManager<T> {
    pub fn new(transport: Arc<T>, options: ManagerOptions) -> Self {
        Self {
            transport,
            options,
            state: Arc::new(Mutex::new(SinkState::default())),
            ledger: SubscriptionLedger::new(),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Start a talkback session. The session is active as soon as the
    /// START_TALKBACK command is written.
    pub fn start_talkback(&self, device: &str, config: AudioConfig) -> Result<String, AudioError> {
        config.validate().map_err(AudioError::InvalidConfiguration)?;

        let seq = self.next_session.fetch_add(1, Ordering::Relaxed);
        let talkback_id = generate_id("tb", seq, 16);

        self.start_talkback_inner(device, &talkback_id, config)
            .map_err(|e| e.start_failed(AudioError::TalkbackStartFailed))?;

        log::info!("started talkback {} on {}", talkback_id, device);
        Ok(talkback_id)
    }

    fn start_talkback_inner(
        &self,
        device: &str,
        talkback_id: &str,
        config: AudioConfig,
    ) -> Result<(), AudioError> {
        self.ensure_service(device)?;
        self.write(device, sink::CONFIG, &codec::encode_sink_config(talkback_id, &config))?;
        self.write(
            device,
            sink::CONTROL,
            &codec::encode_sink_command(
                SinkCommand::StartTalkback,
                talkback_id,
                Some(&config),
                None,
            ),
        )?;

        self.state
            .lock()
            .sessions
            .entry(device.to_string())
            .or_default()
            .insert(
                talkback_id.to_string(),
                TalkbackSession::new(talkback_id.to_string(), device.to_string(), config),
            );

        if let Err(e) = self.subscribe_status(device, talkback_id) {
            log::warn!("rolling back talkback {} on {}: {}", talkback_id, device, e);
            self.state.lock().remove_session(device, talkback_id);
            return Err(e);
        }

        // A status delivered from inside subscribe may already have ended it.
        if self.with_session(device, talkback_id, |_| ()).is_err() {
            log::warn!("talkback {} on {} ended by camera during start", talkback_id, device);
            self.ledger.cancel(&SubscriptionSlot::Status {
                device: device.to_string(),
                id: talkback_id.to_string(),
            });
            return Err(AudioError::SessionNotFound(talkback_id.to_string()));
        }
        Ok(())
    }

    /// Stop a talkback session and forget it.
    ///
    /// Like stopping a stream, local state is released even when the
    /// STOP_TALKBACK write fails; the write error is returned afterwards.
    pub fn stop_talkback(&self, device: &str, talkback_id: &str) -> Result<(), AudioError> {
        let config = self.with_session(device, talkback_id, |session| {
            session.active = false;
            session.config
        })?;

        let result = self.write(
            device,
            sink::CONTROL,
            &codec::encode_sink_command(
                SinkCommand::StopTalkback,
                talkback_id,
                Some(&config),
                None,
            ),
        );

        self.ledger.cancel(&SubscriptionSlot::Status {
            device: device.to_string(),
            id: talkback_id.to_string(),
        });
        self.state.lock().remove_session(device, talkback_id);

        match &result {
            Ok(()) => log::info!("stopped talkback {} on {}", talkback_id, device),
            Err(e) => log::warn!(
                "talkback {} on {} removed after failed stop: {}",
                talkback_id,
                device,
                e
            ),
        }
        result
    }

    /// Write one outbound audio buffer.
    ///
    /// Every active session on the device is credited with the bytes; the
    /// characteristic is shared by all of them.
    pub fn send_audio_data(&self, device: &str, data: &[u8]) -> Result<(), AudioError> {
        self.ensure_service(device)?;
        self.write(device, sink::DATA_IN, data)?;

        let now = Utc::now();
        let mut state = self.state.lock();
        if let Some(sessions) = state.sessions.get_mut(device) {
            for session in sessions.values_mut().filter(|s| s.active) {
                session.bytes_transmitted += data.len() as u64;
                session.last_activity = now;
            }
        }
        let capacity = self.options.send_queue_capacity;
        state
            .send_queues
            .entry(device.to_string())
            .or_insert_with(|| SendQueue::new(capacity))
            .push(data.to_vec());
        Ok(())
    }

    /// Write output settings. Nothing is cached; the camera is authoritative.
    pub fn configure_audio_output(
        &self,
        device: &str,
        settings: &AudioOutputSettings,
    ) -> Result<(), AudioError> {
        self.ensure_service(device)?;
        self.write(device, sink::OUTPUT_SETTINGS, &codec::encode_output_settings(settings))
    }

    pub fn get_audio_output_settings(
        &self,
        device: &str,
    ) -> Result<AudioOutputSettings, AudioError> {
        self.ensure_service(device)?;
        let payload = self.transport.read(device, sink::SERVICE, sink::OUTPUT_SETTINGS)?;
        Ok(codec::decode_output_settings(&payload)?)
    }

    /// Codecs the camera can play back, at most eight.
    pub fn get_supported_codecs(&self, device: &str) -> Result<Vec<AudioCodec>, AudioError> {
        self.ensure_service(device)?;
        self.write(
            device,
            sink::CODEC_NEGOTIATION,
            &codec::encode_sink_command(SinkCommand::GetSupportedCodecs, "", None, None),
        )?;
        let payload = self.transport.read(device, sink::SERVICE, sink::CODEC_NEGOTIATION)?;
        Ok(codec::decode_codec_list(&payload)?)
    }

    /// Ask the camera for `preferred` and return the codec it chose, which
    /// need not be the one requested.
    pub fn negotiate_codec(
        &self,
        device: &str,
        preferred: AudioCodec,
    ) -> Result<AudioCodec, AudioError> {
        self.ensure_service(device)?;
        self.write(
            device,
            sink::CODEC_NEGOTIATION,
            &codec::encode_sink_command(SinkCommand::NegotiateCodec, "", None, Some(preferred)),
        )?;
        let payload = self.transport.read(device, sink::SERVICE, sink::CODEC_NEGOTIATION)?;
        let chosen = codec::decode_negotiated_codec(&payload)?;
        if chosen != preferred {
            log::debug!("{} chose {:?} over requested {:?}", device, chosen, preferred);
        }
        Ok(chosen)
    }

    pub fn set_talkback_level(&self, device: &str, level: u8) -> Result<(), AudioError> {
        self.talkback_control(device, SinkCommand::SetTalkbackLevel, level, false)
    }

    pub fn mute_output(&self, device: &str) -> Result<(), AudioError> {
        self.talkback_control(device, SinkCommand::MuteOutput, 0, true)
    }

    pub fn unmute_output(&self, device: &str) -> Result<(), AudioError> {
        self.talkback_control(device, SinkCommand::UnmuteOutput, 0, false)
    }

    fn talkback_control(
        &self,
        device: &str,
        command: SinkCommand,
        level: u8,
        muted: bool,
    ) -> Result<(), AudioError> {
        self.ensure_service(device)?;
        let frame = codec::encode_talkback_control(command, level, muted);
        self.write(device, sink::TALKBACK_CONTROL, &frame)
    }

    /// Ids of the device's sessions; empty for an unknown device.
    pub fn get_talkback_sessions(&self, device: &str) -> Vec<String> {
        self.state
            .lock()
            .sessions
            .get(device)
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_talkback_session(
        &self,
        device: &str,
        talkback_id: &str,
    ) -> Result<TalkbackSession, AudioError> {
        self.with_session(device, talkback_id, |session| session.clone())
    }

    pub fn get_talkback_statistics(
        &self,
        device: &str,
        talkback_id: &str,
    ) -> Result<TalkbackStatistics, AudioError> {
        self.with_session(device, talkback_id, |session| session.statistics())
    }

    /// Statistics for every session on the device.
    pub fn device_statistics(&self, device: &str) -> Vec<TalkbackStatistics> {
        self.state
            .lock()
            .sessions
            .get(device)
            .map(|sessions| sessions.values().map(TalkbackSession::statistics).collect())
            .unwrap_or_default()
    }

    /// Buffers currently held in the device's send queue.
    pub fn send_queue_len(&self, device: &str) -> usize {
        self.state.lock().send_queues.get(device).map_or(0, SendQueue::len)
    }

    /// Copies of the queued buffers, oldest first.
    pub fn pending_sends(&self, device: &str) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .send_queues
            .get(device)
            .map(SendQueue::snapshot)
            .unwrap_or_default()
    }

    /// Send queue counters for the device; all zero when nothing was sent.
    pub fn send_queue_statistics(&self, device: &str) -> SendQueueStatistics {
        self.state
            .lock()
            .send_queues
            .get(device)
            .map(SendQueue::statistics)
            .unwrap_or_default()
    }

    /// Stop every session on the device, then drop its send queue.
    ///
    /// A failing stop is logged and the remaining sessions are still stopped.
    pub fn cleanup(&self, device: &str) {
        for talkback_id in self.get_talkback_sessions(device) {
            if let Err(e) = self.stop_talkback(device, &talkback_id) {
                log::warn!("cleanup of talkback {} on {} failed: {}", talkback_id, device, e);
            }
        }
        self.state.lock().send_queues.remove(device);
        self.ledger.cancel_device(device);
    }

    // --- Internal helpers ---

    fn subscribe_status(&self, device: &str, talkback_id: &str) -> Result<(), AudioError> {
        let state = Arc::downgrade(&self.state);
        let ledger = self.ledger.downgrade();
        let dev = device.to_string();
        let id = talkback_id.to_string();
        let on_notify: NotifyCallback = Arc::new(move |payload: &[u8]| {
            if let Some(state) = state.upgrade() {
                apply_status(&state, &ledger, &dev, &id, payload);
            }
        });

        let slot = SubscriptionSlot::Status {
            device: device.to_string(),
            id: talkback_id.to_string(),
        };
        self.ledger.replace(slot, || {
            self.transport.subscribe(device, sink::SERVICE, sink::STATUS, on_notify)
        })?;
        Ok(())
    }

    fn with_session<R>(
        &self,
        device: &str,
        talkback_id: &str,
        f: impl FnOnce(&mut TalkbackSession) -> R,
    ) -> Result<R, AudioError> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .get_mut(device)
            .and_then(|s| s.get_mut(talkback_id))
            .ok_or_else(|| AudioError::SessionNotFound(talkback_id.to_string()))?;
        Ok(f(session))
    }

    fn ensure_service(&self, device: &str) -> Result<(), AudioError> {
        ensure_service(self.transport.as_ref(), &self.options, device, sink::SERVICE)
    }

    fn write(
        &self,
        device: &str,
        characteristic: uuid::Uuid,
        payload: &[u8],
    ) -> Result<(), AudioError> {
        self.transport.write(device, sink::SERVICE, characteristic, payload)?;
        Ok(())
    }
}

/// Apply a sink status notification to the session it names.
///
/// An inactive report means the camera ended the session: it is removed and
/// its status subscription cancelled without writing STOP_TALKBACK.
fn apply_status(
    state: &Mutex<SinkState>,
    ledger: &WeakSubscriptionLedger,
    device: &str,
    talkback_id: &str,
    payload: &[u8],
) {
    let status = match codec::decode_sink_status(payload) {
        Ok(status) => status,
        Err(e) => {
            log::warn!("ignoring status for talkback {}: {}", talkback_id, e);
            return;
        }
    };
    if !codec::id_matches(talkback_id, &status.talkback_id, SINK_ID_LEN) {
        return;
    }

    if status.active {
        let mut state = state.lock();
        if let Some(session) = state.sessions.get_mut(device).and_then(|s| s.get_mut(talkback_id)) {
            log::debug!(
                "talkback {} on {}: level {}, {} bytes received",
                talkback_id,
                device,
                status.level,
                status.bytes_received
            );
            session.remote_level = Some(status.level);
            session.remote_bytes_received = Some(status.bytes_received);
            session.last_activity = Utc::now();
        }
        return;
    }

    let removed = state.lock().remove_session(device, talkback_id);
    if removed.is_some() {
        log::info!("talkback {} on {} ended by camera", talkback_id, device);
        if let Some(ledger) = ledger.upgrade() {
            ledger.cancel(&SubscriptionSlot::Status {
                device: device.to_string(),
                id: talkback_id.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::{AudioQuality, ChannelLayout};
    use crate::models::settings::OutputDestination;
    use crate::testing::FakeTransport;

    fn manager() -> (Arc<FakeTransport>, AudioSinkManager<FakeTransport>) {
        let transport = FakeTransport::new();
        let manager = AudioSinkManager::new(Arc::clone(&transport), ManagerOptions::default());
        (transport, manager)
    }

    fn voice() -> AudioConfig {
        AudioConfig {
            quality: AudioQuality::Medium,
            codec: AudioCodec::Opus,
            channels: ChannelLayout::Mono,
            sample_rate: 16000,
            bit_depth: 16,
            bit_rate: Some(32000),
            buffer_size: None,
        }
    }

    #[test]
    fn start_talkback_creates_active_session() {
        let (transport, manager) = manager();
        let id = manager.start_talkback("camB", voice()).unwrap();

        assert!(id.starts_with("tb"));
        assert!(id.len() <= codec::SINK_COMMAND_ID_LEN);
        assert_eq!(manager.get_talkback_sessions("camB"), vec![id.clone()]);
        assert!(manager.get_talkback_session("camB", &id).unwrap().active);

        let config = codec::decode_sink_config(&transport.writes_to(sink::CONFIG)[0]).unwrap();
        assert_eq!(config.id, id);
        assert_eq!(config.config, voice());

        let command = codec::decode_sink_command(&transport.writes_to(sink::CONTROL)[0]).unwrap();
        assert_eq!(command.command, SinkCommand::StartTalkback as u8);
        assert_eq!(command.id, id);
        assert_eq!(transport.live_subscriptions(sink::STATUS), 1);
    }

    #[test]
    fn start_without_service_fails() {
        let (transport, manager) = manager();
        transport.remove_service(sink::SERVICE);

        assert!(matches!(
            manager.start_talkback("camB", voice()),
            Err(AudioError::ServiceUnavailable { .. })
        ));
        assert!(manager.get_talkback_sessions("camB").is_empty());
    }

    #[test]
    fn failed_command_write_leaves_no_session() {
        let (transport, manager) = manager();
        transport.fail_writes_to(sink::CONTROL);
        assert!(matches!(
            manager.start_talkback("camB", voice()),
            Err(AudioError::TalkbackStartFailed(_))
        ));
        assert!(manager.get_talkback_sessions("camB").is_empty());
    }

    #[test]
    fn failed_status_subscribe_rolls_back_session() {
        let (transport, manager) = manager();
        transport.fail_subscribes_to(sink::STATUS);
        assert!(matches!(
            manager.start_talkback("camB", voice()),
            Err(AudioError::TalkbackStartFailed(_))
        ));
        assert!(manager.get_talkback_sessions("camB").is_empty());
    }

    #[test]
    fn session_ended_during_subscribe_fails_start() {
        let (transport, manager) = manager();
        transport.reply_on_subscribe(sink::STATUS, |writes| {
            let config = writes.iter().rev().find(|w| w.characteristic == sink::CONFIG).unwrap();
            let id = codec::decode_sink_config(&config.payload).unwrap().id;
            codec::encode_sink_status(&id, false, 0, 0).to_vec()
        });

        let err = manager.start_talkback("camB", voice()).unwrap_err();
        match err {
            AudioError::TalkbackStartFailed(cause) => {
                assert!(matches!(*cause, AudioError::SessionNotFound(_)))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(manager.get_talkback_sessions("camB").is_empty());
        assert_eq!(transport.live_subscriptions(sink::STATUS), 0);
    }

    #[test]
    fn active_status_during_subscribe_keeps_session() {
        let (transport, manager) = manager();
        transport.reply_on_subscribe(sink::STATUS, |writes| {
            let config = writes.iter().rev().find(|w| w.characteristic == sink::CONFIG).unwrap();
            let id = codec::decode_sink_config(&config.payload).unwrap().id;
            codec::encode_sink_status(&id, true, 42, 0).to_vec()
        });

        let id = manager.start_talkback("camB", voice()).unwrap();
        let session = manager.get_talkback_session("camB", &id).unwrap();
        assert_eq!(session.remote_level, Some(42));
        assert_eq!(transport.live_subscriptions(sink::STATUS), 1);
    }

    #[test]
    fn stop_unknown_session_leaves_others() {
        let (transport, manager) = manager();
        let first = manager.start_talkback("camB", voice()).unwrap();
        let second = manager.start_talkback("camB", voice()).unwrap();
        let writes_before = transport.writes().len();

        assert_eq!(
            manager.stop_talkback("camB", "x"),
            Err(AudioError::SessionNotFound("x".into()))
        );

        let mut sessions = manager.get_talkback_sessions("camB");
        sessions.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(sessions, expected);
        assert_eq!(transport.writes().len(), writes_before);
    }

    #[test]
    fn stop_talkback_writes_stop_and_forgets_session() {
        let (transport, manager) = manager();
        let id = manager.start_talkback("camB", voice()).unwrap();

        manager.stop_talkback("camB", &id).unwrap();

        let writes = transport.writes_to(sink::CONTROL);
        let stop = codec::decode_sink_command(writes.last().unwrap()).unwrap();
        assert_eq!(stop.command, SinkCommand::StopTalkback as u8);
        assert_eq!(stop.id, id);
        assert!(manager.get_talkback_sessions("camB").is_empty());
        assert_eq!(transport.live_subscriptions(sink::STATUS), 0);
    }

    #[test]
    fn send_audio_data_credits_every_active_session() {
        let (transport, manager) = manager();
        let first = manager.start_talkback("camA", voice()).unwrap();
        let second = manager.start_talkback("camA", voice()).unwrap();
        let other = manager.start_talkback("camB", voice()).unwrap();

        let buffer = vec![0x55u8; 320];
        manager.send_audio_data("camA", &buffer).unwrap();

        for id in [&first, &second] {
            assert_eq!(manager.get_talkback_session("camA", id).unwrap().bytes_transmitted, 320);
        }
        assert_eq!(manager.get_talkback_session("camB", &other).unwrap().bytes_transmitted, 0);
        assert_eq!(transport.writes_to(sink::DATA_IN), vec![buffer.clone()]);
        assert_eq!(manager.pending_sends("camA"), vec![buffer]);
    }

    #[test]
    fn failed_send_changes_nothing() {
        let (transport, manager) = manager();
        let id = manager.start_talkback("camA", voice()).unwrap();
        transport.fail_writes_to(sink::DATA_IN);

        assert!(matches!(
            manager.send_audio_data("camA", &[1, 2, 3]),
            Err(AudioError::Transport(_))
        ));
        assert_eq!(manager.get_talkback_session("camA", &id).unwrap().bytes_transmitted, 0);
        assert_eq!(manager.send_queue_len("camA"), 0);
    }

    #[test]
    fn send_queue_is_bounded_and_cleared_with_last_session() {
        let transport = FakeTransport::new();
        let options = ManagerOptions {
            send_queue_capacity: 2,
            ..ManagerOptions::default()
        };
        let manager = AudioSinkManager::new(Arc::clone(&transport), options);
        let first = manager.start_talkback("camA", voice()).unwrap();
        let second = manager.start_talkback("camA", voice()).unwrap();

        for i in 0..3u8 {
            manager.send_audio_data("camA", &[i]).unwrap();
        }
        assert_eq!(manager.pending_sends("camA"), vec![vec![1], vec![2]]);
        assert_eq!(
            manager.send_queue_statistics("camA"),
            SendQueueStatistics {
                queued: 2,
                total_bytes: 2,
                dropped: 1,
            }
        );
        assert_eq!(manager.send_queue_statistics("camB"), SendQueueStatistics::default());

        manager.stop_talkback("camA", &first).unwrap();
        assert_eq!(manager.send_queue_len("camA"), 2);
        manager.stop_talkback("camA", &second).unwrap();
        assert_eq!(manager.send_queue_len("camA"), 0);
    }

    #[test]
    fn camera_can_end_a_session() {
        let (transport, manager) = manager();
        let ended = manager.start_talkback("camB", voice()).unwrap();
        let kept = manager.start_talkback("camB", voice()).unwrap();
        let writes_before = transport.writes().len();

        transport.notify("camB", sink::STATUS, &codec::encode_sink_status(&ended, false, 0, 0));

        assert_eq!(manager.get_talkback_sessions("camB"), vec![kept]);
        assert_eq!(transport.live_subscriptions(sink::STATUS), 1);
        // no STOP_TALKBACK for a camera-initiated end
        assert_eq!(transport.writes().len(), writes_before);
    }

    #[test]
    fn active_status_records_remote_counters() {
        let (transport, manager) = manager();
        let id = manager.start_talkback("camB", voice()).unwrap();

        transport.notify("camB", sink::STATUS, &codec::encode_sink_status(&id, true, 180, 4096));
        transport.notify("camB", sink::STATUS, &[0u8; 10]);

        let session = manager.get_talkback_session("camB", &id).unwrap();
        assert!(session.active);
        assert_eq!(session.remote_level, Some(180));
        assert_eq!(session.remote_bytes_received, Some(4096));
        assert_eq!(
            manager.get_talkback_statistics("camB", &id).unwrap().remote_bytes_received,
            Some(4096)
        );
    }

    #[test]
    fn output_settings_round_trip_through_device() {
        let (transport, manager) = manager();
        let settings = AudioOutputSettings {
            talkback_enabled: true,
            talkback_level: 90,
            destination: OutputDestination::Headphone,
            ..AudioOutputSettings::default()
        };

        manager.configure_audio_output("camB", &settings).unwrap();
        let written = transport.writes_to(sink::OUTPUT_SETTINGS);
        assert_eq!(written[0].len(), 16);

        transport.set_read(sink::OUTPUT_SETTINGS, written[0].clone());
        assert_eq!(manager.get_audio_output_settings("camB").unwrap(), settings);
    }

    #[test]
    fn supported_codecs_query_then_read() {
        let (transport, manager) = manager();
        transport.set_read(
            sink::CODEC_NEGOTIATION,
            codec::encode_codec_list(&[AudioCodec::Aac, AudioCodec::Opus]),
        );

        assert_eq!(
            manager.get_supported_codecs("camB").unwrap(),
            vec![AudioCodec::Aac, AudioCodec::Opus]
        );
        let query = &transport.writes_to(sink::CODEC_NEGOTIATION)[0];
        assert_eq!(query[0], SinkCommand::GetSupportedCodecs as u8);
    }

    #[test]
    fn negotiation_may_pick_another_codec() {
        let (transport, manager) = manager();
        transport.set_read(sink::CODEC_NEGOTIATION, vec![AudioCodec::Aac.wire()]);

        assert_eq!(manager.negotiate_codec("camB", AudioCodec::Opus).unwrap(), AudioCodec::Aac);

        let writes = transport.writes_to(sink::CODEC_NEGOTIATION);
        let request = codec::decode_sink_command(&writes[0]).unwrap();
        assert_eq!(request.command, SinkCommand::NegotiateCodec as u8);
        assert_eq!(request.preferred_codec, Some(AudioCodec::Opus));
    }

    #[test]
    fn empty_negotiation_reply_is_a_decode_error() {
        let (transport, manager) = manager();
        transport.set_read(sink::CODEC_NEGOTIATION, Vec::new());
        assert!(matches!(
            manager.negotiate_codec("camB", AudioCodec::Pcm),
            Err(AudioError::Decode(_))
        ));
    }

    #[test]
    fn talkback_control_frames() {
        let (transport, manager) = manager();
        manager.set_talkback_level("camB", 200).unwrap();
        manager.mute_output("camB").unwrap();
        manager.unmute_output("camB").unwrap();

        let frames = transport.writes_to(sink::TALKBACK_CONTROL);
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..3], &[SinkCommand::SetTalkbackLevel as u8, 200, 0]);
        assert_eq!(&frames[1][..3], &[SinkCommand::MuteOutput as u8, 0, 1]);
        assert_eq!(&frames[2][..3], &[SinkCommand::UnmuteOutput as u8, 0, 0]);
        assert!(frames.iter().all(|f| f.len() == 8));
    }

    #[test]
    fn cleanup_stops_all_sessions_best_effort() {
        let (transport, manager) = manager();
        manager.start_talkback("camA", voice()).unwrap();
        manager.start_talkback("camA", voice()).unwrap();
        manager.send_audio_data("camA", &[1, 2]).unwrap();
        transport.fail_writes_to(sink::CONTROL);

        manager.cleanup("camA");

        assert!(manager.get_talkback_sessions("camA").is_empty());
        assert_eq!(manager.send_queue_len("camA"), 0);
        assert_eq!(transport.total_live_subscriptions(), 0);
    }

    #[test]
    fn cleanup_of_unknown_device_is_noop() {
        let (transport, manager) = manager();
        manager.cleanup("ghost");
        manager.cleanup("ghost");
        assert!(transport.writes().is_empty());
    }
}
