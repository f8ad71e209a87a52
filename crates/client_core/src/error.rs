use shared::error::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("a session is already active for {username}@{address}")]
    AlreadyConnected { username: String, address: String },
    #[error("session is not connected")]
    NotConnected,
    #[error("malformed `{event}` event: {reason}")]
    MalformedEvent { event: String, reason: String },
    #[error("file transfer failed: {0}")]
    Transfer(String),
    #[error("failed to persist chat history: {0}")]
    Persist(String),
    #[error("failed to retrieve chat history: {0}")]
    Retrieve(String),
    #[error("cannot open download locator: {0}")]
    DownloadUnsupported(String),
    #[error("file information is missing")]
    MissingReference,
    #[error("no file selected")]
    NoFileSelected,
}

impl ChatError {
    pub fn malformed(event: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            event: event.into(),
            reason: reason.into(),
        }
    }
}

impl From<ProtocolError> for ChatError {
    fn from(value: ProtocolError) -> Self {
        match value {
            ProtocolError::InvalidEnvelope(reason) => Self::malformed("<envelope>", reason),
            ProtocolError::InvalidPayload { event, reason } => Self::malformed(event, reason),
            ProtocolError::InconsistentEntry(reason) => Self::malformed("<entry>", reason),
        }
    }
}
