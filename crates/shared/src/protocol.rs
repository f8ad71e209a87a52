use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    domain::{ConversationEntry, EntryKind},
    error::ProtocolError,
};

pub const CHAT_MESSAGE_EVENT: &str = "chat_message";
pub const FILE_UPLOADED_EVENT: &str = "file_uploaded";

/// One frame on the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(event: impl Into<String>, payload: &impl Serialize) -> Result<Self, ProtocolError> {
        let event = event.into();
        let data = serde_json::to_value(payload)
            .map_err(|err| ProtocolError::invalid_payload(event.clone(), err.to_string()))?;
        Ok(Self { event, data })
    }

    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(|err| ProtocolError::InvalidEnvelope(err.to_string()))
    }

    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|err| ProtocolError::InvalidEnvelope(err.to_string()))
    }
}

/// Decodes an event payload, naming the event in the error.
pub fn decode_payload<T: DeserializeOwned>(
    event: &str,
    data: serde_json::Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|err| ProtocolError::invalid_payload(event, err.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    pub message: String,
    pub username: String,
    /// Sender-formatted `HH:MM`. Servers that rebroadcast may strip it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadedPayload {
    pub filename: String,
    pub username: String,
    #[serde(default)]
    pub file_type: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Acknowledgement body returned by `/upload` and `/saveChat`.
///
/// The server answers 200 even when it refuses the request, so `success`
/// has to be checked alongside the status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAck {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveChatRequest {
    pub chat: Vec<StoredEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFileInfo {
    pub filename: String,
}

/// History entry as kept by the server's chat store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEntry {
    pub username: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_image: bool,
    #[serde(default)]
    pub is_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_info: Option<StoredFileInfo>,
}

impl From<&ConversationEntry> for StoredEntry {
    fn from(entry: &ConversationEntry) -> Self {
        let transfer = entry.transfer_ref();
        Self {
            username: entry.author().to_string(),
            message: entry.body().to_string(),
            timestamp: Some(entry.timestamp().to_string()),
            is_image: entry.kind() == EntryKind::ImageTransfer,
            is_file: entry.kind() == EntryKind::FileTransfer,
            image_uri: transfer.and_then(|t| t.resource_locator.clone()),
            file_info: transfer.map(|t| StoredFileInfo {
                filename: t.filename.clone(),
            }),
        }
    }
}

impl TryFrom<StoredEntry> for ConversationEntry {
    type Error = ProtocolError;

    fn try_from(stored: StoredEntry) -> Result<Self, Self::Error> {
        let timestamp = stored.timestamp.unwrap_or_default();
        match (stored.is_image, stored.is_file) {
            (true, true) => Err(ProtocolError::InconsistentEntry(
                "entry is flagged as both image and file".to_string(),
            )),
            (true, false) => {
                let filename = stored
                    .file_info
                    .map(|info| info.filename)
                    .ok_or_else(|| {
                        ProtocolError::InconsistentEntry("image entry without fileInfo".to_string())
                    })?;
                let locator = stored.image_uri.ok_or_else(|| {
                    ProtocolError::InconsistentEntry("image entry without imageUri".to_string())
                })?;
                Ok(
                    ConversationEntry::image(stored.username, filename, locator, timestamp)
                        .with_body(stored.message),
                )
            }
            (false, true) => {
                let filename = stored
                    .file_info
                    .map(|info| info.filename)
                    .ok_or_else(|| {
                        ProtocolError::InconsistentEntry("file entry without fileInfo".to_string())
                    })?;
                Ok(ConversationEntry::file(stored.username, filename, timestamp)
                    .with_body(stored.message))
            }
            (false, false) => Ok(ConversationEntry::text(
                stored.username,
                stored.message,
                timestamp,
            )),
        }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
