use std::sync::Arc;

use shared::{
    domain::{ConversationEntry, EntryKind},
    protocol::{
        decode_payload, ChatMessagePayload, FileUploadedPayload, CHAT_MESSAGE_EVENT,
        FILE_UPLOADED_EVENT,
    },
};
use tracing::debug;

use crate::{
    clock::Clock,
    endpoint::{is_plain_filename, ServerEndpoint},
    error::ChatError,
    message_log::MessageLog,
};

/// Turns inbound event payloads into log entries.
pub struct InboundRouter {
    endpoint: ServerEndpoint,
    log: Arc<MessageLog>,
    clock: Arc<dyn Clock>,
}

impl InboundRouter {
    pub fn new(endpoint: ServerEndpoint, log: Arc<MessageLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            endpoint,
            log,
            clock,
        }
    }

    pub fn transfer_entry(
        &self,
        payload: FileUploadedPayload,
    ) -> Result<ConversationEntry, ChatError> {
        require_non_empty(FILE_UPLOADED_EVENT, "username", &payload.username)?;
        require_non_empty(FILE_UPLOADED_EVENT, "filename", &payload.filename)?;
        if !is_plain_filename(&payload.filename) {
            return Err(ChatError::malformed(
                FILE_UPLOADED_EVENT,
                format!("`filename` is not a plain file name: {:?}", payload.filename),
            ));
        }

        let timestamp = self.clock.display_time();
        let entry = match EntryKind::classify_transfer(payload.file_type.as_deref()) {
            EntryKind::ImageTransfer => {
                let locator = self.endpoint.download_url(&payload.filename);
                ConversationEntry::image(payload.username, payload.filename, locator, timestamp)
            }
            _ => ConversationEntry::file(payload.username, payload.filename, timestamp),
        };
        Ok(entry)
    }

    pub fn chat_entry(&self, payload: ChatMessagePayload) -> Result<ConversationEntry, ChatError> {
        require_non_empty(CHAT_MESSAGE_EVENT, "username", &payload.username)?;

        let timestamp = match payload.timestamp {
            Some(timestamp) => timestamp,
            None => {
                debug!(
                    username = %payload.username,
                    "router: chat message without sender timestamp; using receipt time"
                );
                self.clock.display_time()
            }
        };
        Ok(ConversationEntry::text(
            payload.username,
            payload.message,
            timestamp,
        ))
    }

    /// Decodes a `file_uploaded` payload and appends the resulting entry.
    pub fn route_transfer_notice(
        &self,
        data: serde_json::Value,
    ) -> Result<(usize, ConversationEntry), ChatError> {
        let payload: FileUploadedPayload = decode_payload(FILE_UPLOADED_EVENT, data)?;
        let entry = self.transfer_entry(payload)?;
        let position = self.log.append(entry.clone());
        Ok((position, entry))
    }

    /// Decodes a `chat_message` payload and appends the resulting entry.
    pub fn route_chat_message(
        &self,
        data: serde_json::Value,
    ) -> Result<(usize, ConversationEntry), ChatError> {
        let payload: ChatMessagePayload = decode_payload(CHAT_MESSAGE_EVENT, data)?;
        let entry = self.chat_entry(payload)?;
        let position = self.log.append(entry.clone());
        Ok((position, entry))
    }
}

fn require_non_empty(event: &str, field: &str, value: &str) -> Result<(), ChatError> {
    if value.trim().is_empty() {
        return Err(ChatError::malformed(event, format!("`{field}` is empty")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
