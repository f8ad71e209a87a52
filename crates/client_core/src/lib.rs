use std::sync::Arc;

use reqwest::Client;
use shared::{
    domain::{ConversationEntry, TransferRef},
    protocol::{ChatMessagePayload, CHAT_MESSAGE_EVENT, FILE_UPLOADED_EVENT},
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

pub mod clock;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod message_log;
pub mod router;
pub mod session;
pub mod transfer;
pub mod transport;

pub use clock::{Clock, FixedClock, LocalClock};
pub use config::{load_config, ClientConfig};
pub use endpoint::{build_download_url, is_plain_filename, ServerEndpoint};
pub use error::ChatError;
pub use message_log::MessageLog;
pub use session::{SessionHandle, SessionId, SessionState};
pub use transfer::{MissingUrlOpener, PickedFile, TransferResult, UrlOpener};
pub use transport::{EventChannel, EventChannelConnector, WebSocketConnector};

use history::HistorySyncClient;
use router::InboundRouter;
use session::{ListenerRegistry, SessionManager};
use transfer::TransferCoordinator;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionStateChanged {
        session_id: SessionId,
        state: SessionState,
        /// Why the session ended, when it was not a local disconnect.
        reason: Option<String>,
    },
    EntryAppended {
        position: usize,
        entry: ConversationEntry,
    },
    EntryDeleted {
        position: usize,
    },
    LogReplaced {
        len: usize,
    },
    Error(String),
}

/// The client context: one message log, at most one session, and the
/// request/response collaborators. Everything the UI does goes through here.
pub struct ChatClient {
    config: ClientConfig,
    log: Arc<MessageLog>,
    sessions: Arc<SessionManager>,
    transfers: TransferCoordinator,
    history: HistorySyncClient,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ClientEvent>,
}

impl ChatClient {
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn EventChannelConnector>,
        opener: Arc<dyn UrlOpener>,
    ) -> Arc<Self> {
        Self::new_with_clock(config, connector, opener, Arc::new(LocalClock))
    }

    pub fn new_with_clock(
        config: ClientConfig,
        connector: Arc<dyn EventChannelConnector>,
        opener: Arc<dyn UrlOpener>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|err| {
                warn!("client: falling back to default http client: {err}");
                Client::new()
            });

        Arc::new(Self {
            sessions: SessionManager::new(connector, config.clone(), events.clone()),
            transfers: TransferCoordinator::new(http.clone(), opener),
            history: HistorySyncClient::new(http),
            log: Arc::new(MessageLog::new()),
            clock,
            events,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn session_state(&self) -> SessionState {
        self.sessions.state()
    }

    pub fn current_session(&self) -> Option<SessionHandle> {
        self.sessions.current()
    }

    pub fn listener_count(&self) -> usize {
        self.sessions.listener_count()
    }

    /// The two inbound listeners every session carries.
    fn inbound_listeners(&self, address: &str) -> ListenerRegistry {
        let endpoint = ServerEndpoint::new(address, &self.config);
        let router = Arc::new(InboundRouter::new(
            endpoint,
            Arc::clone(&self.log),
            Arc::clone(&self.clock),
        ));

        let transfer_router = Arc::clone(&router);
        let transfer_events = self.events.clone();
        let chat_events = self.events.clone();
        ListenerRegistry::new()
            .on(FILE_UPLOADED_EVENT, move |data| {
                let (position, entry) = transfer_router.route_transfer_notice(data)?;
                let _ = transfer_events.send(ClientEvent::EntryAppended { position, entry });
                Ok(())
            })
            .on(CHAT_MESSAGE_EVENT, move |data| {
                let (position, entry) = router.route_chat_message(data)?;
                let _ = chat_events.send(ClientEvent::EntryAppended { position, entry });
                Ok(())
            })
    }

    pub fn connect(&self, username: &str, address: &str) -> Result<SessionHandle, ChatError> {
        self.sessions
            .connect(username, address, self.inbound_listeners(address))
    }

    pub fn disconnect(&self, handle: &SessionHandle) {
        self.sessions.disconnect(handle);
    }

    /// Sends the draft as a chat message and clears it.
    ///
    /// The log is not touched here; the message shows up when the server
    /// broadcasts it back.
    pub fn send_message(&self, handle: &SessionHandle, draft: &mut String) -> Result<(), ChatError> {
        if draft.trim().is_empty() {
            return Err(ChatError::Validation("message must not be empty".into()));
        }
        let payload = ChatMessagePayload {
            message: draft.clone(),
            username: handle.username().to_string(),
            timestamp: Some(self.clock.display_time()),
        };
        self.sessions.send(handle, CHAT_MESSAGE_EVENT, &payload)?;
        draft.clear();
        Ok(())
    }

    pub async fn upload(
        &self,
        handle: &SessionHandle,
        picked: Option<PickedFile>,
    ) -> Result<TransferResult, ChatError> {
        self.transfers
            .upload(handle, picked, handle.username())
            .await
    }

    pub async fn download(
        &self,
        handle: &SessionHandle,
        transfer_ref: Option<&TransferRef>,
    ) -> Result<Url, ChatError> {
        self.transfers
            .download(handle.endpoint(), transfer_ref)
            .await
    }

    /// Downloads the transfer attached to the entry at `position`.
    pub async fn download_entry(
        &self,
        handle: &SessionHandle,
        position: usize,
    ) -> Result<Url, ChatError> {
        let entry = self.log.get(position);
        self.download(handle, entry.as_ref().and_then(|entry| entry.transfer_ref()))
            .await
    }

    pub fn select(&self, position: usize) -> bool {
        self.log.select(position)
    }

    /// Removes the entry at `position`; a no-op unless something is selected.
    pub fn delete_at(&self, position: usize) -> Option<ConversationEntry> {
        let removed = self.log.delete_at(position)?;
        let _ = self.events.send(ClientEvent::EntryDeleted { position });
        Some(removed)
    }

    pub fn delete_selected(&self) -> Option<ConversationEntry> {
        let (position, removed) = self.log.delete_selected()?;
        let _ = self.events.send(ClientEvent::EntryDeleted { position });
        Some(removed)
    }

    pub fn snapshot(&self) -> Vec<ConversationEntry> {
        self.log.snapshot()
    }

    pub async fn persist_history(&self, handle: &SessionHandle) -> Result<(), ChatError> {
        let entries = self.log.snapshot();
        self.history.persist(handle.endpoint(), &entries).await
    }

    /// Replaces the local log with the server's copy. On failure the local
    /// log is left as it was.
    pub async fn retrieve_history(&self, handle: &SessionHandle) -> Result<usize, ChatError> {
        let entries = self.history.retrieve(handle.endpoint()).await?;
        let len = entries.len();
        self.log.replace_all(entries);
        info!(entries = len, "client: log replaced from history");
        let _ = self.events.send(ClientEvent::LogReplaced { len });
        Ok(len)
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
