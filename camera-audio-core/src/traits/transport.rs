use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::models::error::TransportError;

/// Callback invoked with each notification payload on a subscribed characteristic.
///
/// Fires on whatever thread the Bluetooth stack delivers notifications from.
/// It may fire synchronously from inside [`GattTransport::subscribe`].
pub type NotifyCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// GATT primitives supplied by the platform Bluetooth stack.
///
/// Connection management, discovery caching and pairing live behind this
/// trait. Calls block until the stack answers; there is no timeout at this
/// layer.
pub trait GattTransport: Send + Sync {
    /// Read the current value of a characteristic.
    fn read(&self, device: &str, service: Uuid, characteristic: Uuid)
        -> Result<Vec<u8>, TransportError>;

    /// Write a value to a characteristic.
    fn write(
        &self,
        device: &str,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Enable notifications, delivering each payload to `on_notify` until the
    /// returned subscription is cancelled.
    fn subscribe(
        &self,
        device: &str,
        service: Uuid,
        characteristic: Uuid,
        on_notify: NotifyCallback,
    ) -> Result<Subscription, TransportError>;

    /// List the characteristics the device exposes for `service`.
    fn discover_characteristics(
        &self,
        device: &str,
        service: Uuid,
    ) -> Result<Vec<Uuid>, TransportError>;
}

/// A live notification subscription.
///
/// Cancelling runs the transport's teardown exactly once. Dropping an
/// uncancelled subscription cancels it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        self.run_cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn cancel_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        sub.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_cancels() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        {
            let _sub = Subscription::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
