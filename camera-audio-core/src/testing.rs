//! In-memory GATT transport used by the manager tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::error::TransportError;
use crate::protocol::gatt::{sink, source};
use crate::traits::transport::{GattTransport, NotifyCallback, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub device: String,
    pub service: Uuid,
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
}

/// Builds a notification payload from the writes seen so far.
type SubscribeReply = Arc<dyn Fn(&[WriteRecord]) -> Vec<u8> + Send + Sync>;

#[derive(Default)]
struct FakeState {
    missing_services: HashSet<Uuid>,
    reads: HashMap<Uuid, Vec<u8>>,
    writes: Vec<WriteRecord>,
    failing_writes: HashSet<Uuid>,
    failing_subscribes: HashSet<Uuid>,
    subscribe_replies: HashMap<Uuid, SubscribeReply>,
    subscribers: HashMap<u64, (String, Uuid, NotifyCallback)>,
    next_subscriber: u64,
    cancelled: usize,
}

/// Scriptable transport: serves canned reads, records writes and lets tests
/// push notifications to live subscribers.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn remove_service(&self, service: Uuid) {
        self.state.lock().missing_services.insert(service);
    }

    pub fn set_read(&self, characteristic: Uuid, payload: impl Into<Vec<u8>>) {
        self.state.lock().reads.insert(characteristic, payload.into());
    }

    pub fn fail_writes_to(&self, characteristic: Uuid) {
        self.state.lock().failing_writes.insert(characteristic);
    }

    pub fn fail_subscribes_to(&self, characteristic: Uuid) {
        self.state.lock().failing_subscribes.insert(characteristic);
    }

    /// Deliver one notification from inside `subscribe`, before it returns.
    pub fn reply_on_subscribe(
        &self,
        characteristic: Uuid,
        reply: impl Fn(&[WriteRecord]) -> Vec<u8> + Send + Sync + 'static,
    ) {
        self.state
            .lock()
            .subscribe_replies
            .insert(characteristic, Arc::new(reply));
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.characteristic == characteristic)
            .map(|w| w.payload.clone())
            .collect()
    }

    pub fn live_subscriptions(&self, characteristic: Uuid) -> usize {
        self.state
            .lock()
            .subscribers
            .values()
            .filter(|(_, c, _)| *c == characteristic)
            .count()
    }

    pub fn total_live_subscriptions(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub fn cancelled(&self) -> usize {
        self.state.lock().cancelled
    }

    /// Deliver `payload` to every subscriber of (device, characteristic).
    pub fn notify(&self, device: &str, characteristic: Uuid, payload: &[u8]) {
        let callbacks: Vec<NotifyCallback> = self
            .state
            .lock()
            .subscribers
            .values()
            .filter(|(d, c, _)| d == device && *c == characteristic)
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(payload);
        }
    }
}

impl GattTransport for FakeTransport {
    fn read(
        &self,
        _device: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, TransportError> {
        self.state
            .lock()
            .reads
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("no value for {}", characteristic)))
    }

    fn write(
        &self,
        device: &str,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.failing_writes.contains(&characteristic) {
            return Err(TransportError::new("write rejected"));
        }
        state.writes.push(WriteRecord {
            device: device.to_string(),
            service,
            characteristic,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn subscribe(
        &self,
        device: &str,
        _service: Uuid,
        characteristic: Uuid,
        on_notify: NotifyCallback,
    ) -> Result<Subscription, TransportError> {
        let (id, immediate) = {
            let mut state = self.state.lock();
            if state.failing_subscribes.contains(&characteristic) {
                return Err(TransportError::new("notify refused"));
            }
            let id = state.next_subscriber;
            state.next_subscriber += 1;
            state
                .subscribers
                .insert(id, (device.to_string(), characteristic, Arc::clone(&on_notify)));
            let immediate = state
                .subscribe_replies
                .get(&characteristic)
                .map(|reply| reply(&state.writes));
            (id, immediate)
        };
        if let Some(payload) = immediate {
            on_notify(&payload);
        }

        let state = Arc::clone(&self.state);
        Ok(Subscription::new(move || {
            let removed = {
                let mut state = state.lock();
                let removed = state.subscribers.remove(&id);
                if removed.is_some() {
                    state.cancelled += 1;
                }
                removed
            };
            drop(removed);
        }))
    }

    fn discover_characteristics(
        &self,
        _device: &str,
        service: Uuid,
    ) -> Result<Vec<Uuid>, TransportError> {
        if self.state.lock().missing_services.contains(&service) {
            return Ok(Vec::new());
        }
        let characteristics = if service == source::SERVICE {
            vec![
                source::CONTROL,
                source::STATUS,
                source::DATA,
                source::CONFIG,
                source::LEVELS,
                source::INPUT_SETTINGS,
                source::CAPABILITIES,
            ]
        } else if service == sink::SERVICE {
            vec![
                sink::CONTROL,
                sink::STATUS,
                sink::DATA_IN,
                sink::CONFIG,
                sink::OUTPUT_SETTINGS,
                sink::CODEC_NEGOTIATION,
                sink::TALKBACK_CONTROL,
            ]
        } else {
            Vec::new()
        };
        Ok(characteristics)
    }
}
