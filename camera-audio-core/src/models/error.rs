use thiserror::Error;
use uuid::Uuid;

use super::state::StreamState;

/// Failure reported by a [`GattTransport`](crate::traits::transport::GattTransport) call.
///
/// The platform Bluetooth stack owns the real cause; only its message crosses
/// this boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A payload that could not be turned into a typed record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{frame} frame truncated: need {expected} bytes, got {actual}")]
    Truncated {
        frame: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown stream state byte: {0:#04x}")]
    UnknownState(u8),

    #[error("{0} frame is empty")]
    Empty(&'static str),
}

/// Errors surfaced by the audio source and sink managers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("service {service} unavailable on device {device}")]
    ServiceUnavailable { device: String, service: Uuid },

    #[error("stream not found: {0}")]
    StreamNotFound(String),

    #[error("talkback session not found: {0}")]
    SessionNotFound(String),

    #[error("cannot {action} stream {stream_id} while {state}")]
    InvalidStateTransition {
        stream_id: String,
        action: &'static str,
        state: StreamState,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to start stream: {0}")]
    StreamStartFailed(#[source] Box<AudioError>),

    #[error("failed to start talkback: {0}")]
    TalkbackStartFailed(#[source] Box<AudioError>),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl AudioError {
    /// Wraps a start-path failure, letting `ServiceUnavailable` and
    /// configuration errors through untouched.
    pub(crate) fn start_failed(self, wrap: fn(Box<AudioError>) -> AudioError) -> AudioError {
        match self {
            e @ (AudioError::ServiceUnavailable { .. } | AudioError::InvalidConfiguration(_)) => e,
            other => wrap(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn start_failure_keeps_cause() {
        let err = AudioError::from(TransportError::new("gatt write timed out"))
            .start_failed(AudioError::StreamStartFailed);

        assert!(matches!(err, AudioError::StreamStartFailed(_)));
        assert_eq!(
            err.to_string(),
            "failed to start stream: transport error: gatt write timed out"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn service_unavailable_is_not_wrapped() {
        let err = AudioError::ServiceUnavailable {
            device: "camA".into(),
            service: Uuid::nil(),
        }
        .start_failed(AudioError::TalkbackStartFailed);

        assert!(matches!(err, AudioError::ServiceUnavailable { .. }));
    }

    #[test]
    fn invalid_transition_names_state() {
        let err = AudioError::InvalidStateTransition {
            stream_id: "as1".into(),
            action: "pause",
            state: StreamState::Starting,
        };
        assert_eq!(err.to_string(), "cannot pause stream as1 while starting");
    }
}
