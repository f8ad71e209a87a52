use reqwest::Client;
use shared::{
    domain::ConversationEntry,
    protocol::{SaveChatRequest, ServerAck, StoredEntry},
};
use tracing::info;

use crate::{endpoint::ServerEndpoint, error::ChatError};

/// Bulk save/load of the whole log against the server's chat store.
pub struct HistorySyncClient {
    http: Client,
}

impl HistorySyncClient {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    pub async fn persist(
        &self,
        endpoint: &ServerEndpoint,
        entries: &[ConversationEntry],
    ) -> Result<(), ChatError> {
        let request = SaveChatRequest {
            chat: entries.iter().map(StoredEntry::from).collect(),
        };
        let ack: ServerAck = self
            .http
            .post(endpoint.save_chat_url())
            .json(&request)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ChatError::Persist(err.to_string()))?
            .json()
            .await
            .map_err(|err| ChatError::Persist(format!("invalid save response: {err}")))?;

        if !ack.success {
            return Err(ChatError::Persist(ack.message));
        }
        info!(entries = entries.len(), "history: chat saved");
        Ok(())
    }

    pub async fn retrieve(
        &self,
        endpoint: &ServerEndpoint,
    ) -> Result<Vec<ConversationEntry>, ChatError> {
        let stored: Vec<StoredEntry> = self
            .http
            .get(endpoint.get_chat_url())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ChatError::Retrieve(err.to_string()))?
            .json()
            .await
            .map_err(|err| ChatError::Retrieve(format!("invalid chat payload: {err}")))?;

        let entries = stored
            .into_iter()
            .map(ConversationEntry::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ChatError::Retrieve(err.to_string()))?;
        info!(entries = entries.len(), "history: chat retrieved");
        Ok(entries)
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
