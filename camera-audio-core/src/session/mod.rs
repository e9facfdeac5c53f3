pub mod sink;
pub mod source;
pub mod subscriptions;

use uuid::Uuid;

use crate::models::config::ManagerOptions;
use crate::models::error::AudioError;
use crate::traits::transport::GattTransport;

/// Fail with `ServiceUnavailable` when discovery finds no characteristics for `service`.
pub(crate) fn ensure_service<T: GattTransport + ?Sized>(
    transport: &T,
    options: &ManagerOptions,
    device: &str,
    service: Uuid,
) -> Result<(), AudioError> {
    if !options.verify_service {
        return Ok(());
    }
    let characteristics = transport.discover_characteristics(device, service)?;
    if characteristics.is_empty() {
        return Err(AudioError::ServiceUnavailable {
            device: device.to_string(),
            service,
        });
    }
    Ok(())
}

/// `prefix` + 5 hex digits of `seq` + `nonce_len` random hex digits.
///
/// The sequence keeps ids from one manager distinguishable in creation order;
/// the nonce keeps them distinct across manager instances.
pub(crate) fn generate_id(prefix: &str, seq: u64, nonce_len: usize) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{}{:05x}{}", prefix, seq & 0xF_FFFF, &nonce[..nonce_len.min(nonce.len())])
}
