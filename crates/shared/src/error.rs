use thiserror::Error;

/// Wire data that could not be decoded into a domain value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid event envelope: {0}")]
    InvalidEnvelope(String),
    #[error("invalid `{event}` payload: {reason}")]
    InvalidPayload { event: String, reason: String },
    #[error("stored entry is inconsistent: {0}")]
    InconsistentEntry(String),
}

impl ProtocolError {
    pub fn invalid_payload(event: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event: event.into(),
            reason: reason.into(),
        }
    }
}
