use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::traits::transport::Subscription;

/// A (device, purpose) slot holding at most one live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionSlot {
    /// Meter notifications for a device.
    Levels { device: String },
    /// Audio data notifications for one stream.
    Data { device: String, stream_id: String },
    /// Status notifications for one stream or talkback session.
    Status { device: String, id: String },
}

impl SubscriptionSlot {
    pub fn device(&self) -> &str {
        match self {
            Self::Levels { device } | Self::Data { device, .. } | Self::Status { device, .. } => {
                device
            }
        }
    }
}

struct Entry {
    generation: u64,
    subscription: Subscription,
}

#[derive(Default)]
struct LedgerInner {
    entries: HashMap<SubscriptionSlot, Entry>,
    next_generation: u64,
}

/// Bookkeeping for live transport subscriptions, one per slot.
///
/// Installing into an occupied slot cancels the previous subscription before
/// the new one is requested from the transport. Cancellation is idempotent.
/// Transport teardown always runs with the ledger lock released.
#[derive(Clone, Default)]
pub struct SubscriptionLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl SubscriptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever occupies `slot`, run `install`, and register its result.
    ///
    /// If `install` fails the slot is left empty.
    pub fn replace<E>(
        &self,
        slot: SubscriptionSlot,
        install: impl FnOnce() -> Result<Subscription, E>,
    ) -> Result<SubscriptionHandle, E> {
        self.cancel(&slot);

        let subscription = install()?;

        let (generation, displaced) = {
            let mut inner = self.inner.lock();
            let generation = inner.next_generation;
            inner.next_generation += 1;
            let displaced = inner.entries.insert(
                slot.clone(),
                Entry {
                    generation,
                    subscription,
                },
            );
            (generation, displaced)
        };
        // Another caller filled the slot while we were subscribing.
        if let Some(entry) = displaced {
            log::debug!("replacing concurrently installed subscription for {:?}", slot);
            entry.subscription.cancel();
        }

        Ok(SubscriptionHandle {
            ledger: Arc::downgrade(&self.inner),
            slot,
            generation,
        })
    }

    /// Cancel the subscription in `slot`. Returns whether one was live.
    pub fn cancel(&self, slot: &SubscriptionSlot) -> bool {
        let removed = self.inner.lock().entries.remove(slot);
        match removed {
            Some(entry) => {
                entry.subscription.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every subscription belonging to `device`. Returns how many were live.
    pub fn cancel_device(&self, device: &str) -> usize {
        let removed: Vec<Entry> = {
            let mut inner = self.inner.lock();
            let slots: Vec<SubscriptionSlot> = inner
                .entries
                .keys()
                .filter(|slot| slot.device() == device)
                .cloned()
                .collect();
            slots.iter().filter_map(|slot| inner.entries.remove(slot)).collect()
        };
        let count = removed.len();
        for entry in removed {
            entry.subscription.cancel();
        }
        count
    }

    pub fn is_active(&self, slot: &SubscriptionSlot) -> bool {
        self.inner.lock().entries.contains_key(slot)
    }

    /// Number of live subscriptions across all devices.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-owning reference for use inside notification callbacks.
    pub fn downgrade(&self) -> WeakSubscriptionLedger {
        WeakSubscriptionLedger {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak counterpart of [`SubscriptionLedger`].
#[derive(Clone)]
pub struct WeakSubscriptionLedger {
    inner: Weak<Mutex<LedgerInner>>,
}

impl WeakSubscriptionLedger {
    pub fn upgrade(&self) -> Option<SubscriptionLedger> {
        self.inner.upgrade().map(|inner| SubscriptionLedger { inner })
    }
}

/// Caller-facing handle to an installed subscription.
///
/// Cancelling after the slot was replaced or cleaned up is a no-op. Dropping
/// the handle leaves the subscription running until its slot is cancelled.
#[derive(Debug)]
pub struct SubscriptionHandle {
    ledger: Weak<Mutex<LedgerInner>>,
    slot: SubscriptionSlot,
    generation: u64,
}

impl SubscriptionHandle {
    pub fn slot(&self) -> &SubscriptionSlot {
        &self.slot
    }

    /// Whether this handle's subscription is still the one in its slot.
    pub fn is_active(&self) -> bool {
        self.ledger.upgrade().is_some_and(|inner| {
            inner
                .lock()
                .entries
                .get(&self.slot)
                .is_some_and(|entry| entry.generation == self.generation)
        })
    }

    pub fn cancel(self) {
        let Some(inner) = self.ledger.upgrade() else {
            return;
        };
        let removed = {
            let mut guard = inner.lock();
            let current = guard
                .entries
                .get(&self.slot)
                .is_some_and(|entry| entry.generation == self.generation);
            if current {
                guard.entries.remove(&self.slot)
            } else {
                None
            }
        };
        if let Some(entry) = removed {
            entry.subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counted(counter: &Arc<AtomicUsize>) -> Subscription {
        let counter = Arc::clone(counter);
        Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn levels(device: &str) -> SubscriptionSlot {
        SubscriptionSlot::Levels { device: device.into() }
    }

    #[test]
    fn replace_cancels_previous_once() {
        let ledger = SubscriptionLedger::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        ledger.replace(levels("camA"), || Ok::<_, ()>(counted(&first))).unwrap();
        let handle = ledger.replace(levels("camA"), || Ok::<_, ()>(counted(&second))).unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.len(), 1);
        assert!(handle.is_active());
    }

    #[test]
    fn stale_handle_does_not_cancel_replacement() {
        let ledger = SubscriptionLedger::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let stale = ledger.replace(levels("camA"), || Ok::<_, ()>(counted(&first))).unwrap();
        ledger.replace(levels("camA"), || Ok::<_, ()>(counted(&second))).unwrap();

        assert!(!stale.is_active());
        stale.cancel();
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert!(ledger.is_active(&levels("camA")));
    }

    #[test]
    fn failed_install_leaves_slot_empty() {
        let ledger = SubscriptionLedger::new();
        let first = Arc::new(AtomicUsize::new(0));
        ledger.replace(levels("camA"), || Ok::<_, &str>(counted(&first))).unwrap();

        let result = ledger.replace(levels("camA"), || Err("notify refused"));

        assert_eq!(result.err(), Some("notify refused"));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn cancel_device_only_touches_that_device() {
        let ledger = SubscriptionLedger::new();
        let count = Arc::new(AtomicUsize::new(0));

        ledger.replace(levels("camA"), || Ok::<_, ()>(counted(&count))).unwrap();
        ledger
            .replace(
                SubscriptionSlot::Data {
                    device: "camA".into(),
                    stream_id: "as1".into(),
                },
                || Ok::<_, ()>(counted(&count)),
            )
            .unwrap();
        ledger.replace(levels("camB"), || Ok::<_, ()>(counted(&count))).unwrap();

        assert_eq!(ledger.cancel_device("camA"), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(ledger.len(), 1);

        // idempotent
        assert_eq!(ledger.cancel_device("camA"), 0);
        assert!(!ledger.cancel(&levels("camA")));
    }

    #[test]
    fn handle_cancel_removes_entry() {
        let ledger = SubscriptionLedger::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = ledger.replace(levels("camA"), || Ok::<_, ()>(counted(&count))).unwrap();

        handle.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn dropping_ledger_cancels_everything() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let ledger = SubscriptionLedger::new();
            ledger.replace(levels("camA"), || Ok::<_, ()>(counted(&count))).unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
