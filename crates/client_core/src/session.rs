use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
};

use serde::Serialize;
use shared::protocol::EventEnvelope;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::ClientConfig, endpoint::ServerEndpoint, error::ChatError,
    transport::EventChannelConnector, ClientEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    Connecting,
    Connected,
}

/// Caller-side view of one session. Cheap to clone; the state it reports is
/// owned and advanced by [`SessionManager`] only.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    username: String,
    endpoint: ServerEndpoint,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// A handle not backed by any session, for exercising the HTTP paths.
    #[cfg(test)]
    pub(crate) fn detached(username: &str, endpoint: ServerEndpoint) -> Self {
        let (_, state) = watch::channel(SessionState::Unconnected);
        Self {
            id: SessionId(0),
            username: username.to_string(),
            endpoint,
            state,
        }
    }

    /// Waits until `done` accepts the session state. A session that has been
    /// dropped reports its last state.
    pub async fn wait_for(&self, mut done: impl FnMut(SessionState) -> bool) -> SessionState {
        let mut rx = self.state.clone();
        let outcome = rx.wait_for(|state| done(*state)).await.map(|state| *state);
        outcome.unwrap_or_else(|_| *rx.borrow())
    }

    /// Waits for the connect attempt to succeed or fail.
    pub async fn settled(&self) -> SessionState {
        self.wait_for(|state| state != SessionState::Connecting)
            .await
    }
}

pub type EventListener = Box<dyn Fn(serde_json::Value) -> Result<(), ChatError> + Send + Sync>;

/// Inbound listeners keyed by event name. Owned by one session and dropped
/// with it.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<String, EventListener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        mut self,
        event: impl Into<String>,
        listener: impl Fn(serde_json::Value) -> Result<(), ChatError> + Send + Sync + 'static,
    ) -> Self {
        self.listeners.insert(event.into(), Box::new(listener));
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Delivered,
    Unhandled,
    /// The session the frame belongs to has been torn down.
    Stale,
}

/// Marks which session may currently run listener callbacks.
///
/// Callbacks run under the read lock; closing takes the write lock, so once
/// `close_if` returns no callback of that session is running or will run.
#[derive(Default)]
pub(crate) struct SessionGate {
    live: RwLock<Option<SessionId>>,
}

impl SessionGate {
    pub(crate) fn open(&self, id: SessionId) {
        *self.live.write().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    pub(crate) fn close_if(&self, id: SessionId) {
        let mut live = self.live.write().unwrap_or_else(PoisonError::into_inner);
        if *live == Some(id) {
            *live = None;
        }
    }

    pub(crate) fn run_if_live<T>(&self, id: SessionId, f: impl FnOnce() -> T) -> Option<T> {
        let live = self.live.read().unwrap_or_else(PoisonError::into_inner);
        if *live != Some(id) {
            return None;
        }
        Some(f())
    }
}

pub(crate) fn dispatch_frame(
    gate: &SessionGate,
    id: SessionId,
    listeners: &ListenerRegistry,
    frame: &str,
) -> Result<Dispatch, ChatError> {
    let envelope = EventEnvelope::parse(frame)?;
    let Some(listener) = listeners.listeners.get(&envelope.event) else {
        return Ok(Dispatch::Unhandled);
    };
    match gate.run_if_live(id, || listener(envelope.data)) {
        Some(result) => result.map(|()| Dispatch::Delivered),
        None => Ok(Dispatch::Stale),
    }
}

struct ActiveSession {
    handle: SessionHandle,
    state_tx: watch::Sender<SessionState>,
    listeners: Arc<ListenerRegistry>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the zero-or-one live session of the process.
pub struct SessionManager {
    connector: Arc<dyn EventChannelConnector>,
    config: ClientConfig,
    active: Mutex<Option<ActiveSession>>,
    gate: SessionGate,
    next_id: AtomicU64,
    events: broadcast::Sender<ClientEvent>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn EventChannelConnector>,
        config: ClientConfig,
        events: broadcast::Sender<ClientEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            connector,
            config,
            active: Mutex::new(None),
            gate: SessionGate::default(),
            next_id: AtomicU64::new(1),
            events,
        })
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_state(&self, id: SessionId, state: SessionState, reason: Option<String>) {
        let _ = self.events.send(ClientEvent::SessionStateChanged {
            session_id: id,
            state,
            reason,
        });
    }

    /// Starts a session and returns its handle in `Connecting`.
    ///
    /// The handshake completes in the background; the outcome is published
    /// on the handle and as [`ClientEvent::SessionStateChanged`]. Must be
    /// called from within a Tokio runtime.
    pub fn connect(
        self: &Arc<Self>,
        username: &str,
        address: &str,
        listeners: ListenerRegistry,
    ) -> Result<SessionHandle, ChatError> {
        let username = username.trim();
        let address = address.trim();
        if username.is_empty() {
            return Err(ChatError::Validation("username must not be empty".into()));
        }
        if address.is_empty() {
            return Err(ChatError::Validation("server address must not be empty".into()));
        }

        let mut guard = self.lock_active();
        if let Some(active) = guard.as_ref() {
            return Err(ChatError::AlreadyConnected {
                username: active.handle.username.clone(),
                address: active.handle.endpoint.address().to_string(),
            });
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let endpoint = ServerEndpoint::new(address, &self.config);
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let handle = SessionHandle {
            id,
            username: username.to_string(),
            endpoint,
            state: state_rx,
        };

        let connect_task = tokio::spawn(Arc::clone(self).complete_connect(id));
        *guard = Some(ActiveSession {
            handle: handle.clone(),
            state_tx,
            listeners: Arc::new(listeners),
            outbound: None,
            tasks: vec![connect_task],
        });
        drop(guard);

        info!(
            session_id = id.0,
            username,
            address,
            "session: connecting"
        );
        self.emit_state(id, SessionState::Connecting, None);
        Ok(handle)
    }

    async fn complete_connect(self: Arc<Self>, id: SessionId) {
        let Some(url) = self
            .current()
            .filter(|handle| handle.id == id)
            .map(|handle| handle.endpoint.event_channel_url())
        else {
            return;
        };

        let result = self.connector.open(&url).await;

        let mut guard = self.lock_active();
        if guard.as_ref().map(|active| active.handle.id) != Some(id) {
            debug!(session_id = id.0, "session: connect finished after teardown");
            return;
        }

        match result {
            Err(err) => {
                let taken = guard.take();
                drop(guard);
                let reason = format!("{err:#}");
                warn!(session_id = id.0, url = %url, "session: connect failed: {reason}");
                if let Some(active) = taken {
                    self.teardown(active, Some(reason));
                }
            }
            Ok(channel) => {
                let Some(active) = guard.as_mut() else {
                    return;
                };
                self.gate.open(id);
                active.outbound = Some(channel.outbound);
                let dispatch = tokio::spawn(Arc::clone(&self).run_dispatch(
                    id,
                    channel.inbound,
                    Arc::clone(&active.listeners),
                ));
                active.tasks.push(dispatch);
                active.state_tx.send_replace(SessionState::Connected);
                drop(guard);

                info!(session_id = id.0, url = %url, "session: connected");
                self.emit_state(id, SessionState::Connected, None);
            }
        }
    }

    async fn run_dispatch(
        self: Arc<Self>,
        id: SessionId,
        mut inbound: mpsc::UnboundedReceiver<String>,
        listeners: Arc<ListenerRegistry>,
    ) {
        while let Some(frame) = inbound.recv().await {
            match dispatch_frame(&self.gate, id, &listeners, &frame) {
                Ok(Dispatch::Delivered) => {}
                Ok(Dispatch::Unhandled) => {
                    debug!(session_id = id.0, "session: ignoring unhandled event");
                }
                Ok(Dispatch::Stale) => {
                    debug!(session_id = id.0, "session: dropping frame for closed session");
                    return;
                }
                Err(err) => {
                    warn!(session_id = id.0, "session: {err}");
                    let _ = self.events.send(ClientEvent::Error(err.to_string()));
                }
            }
        }

        let taken = {
            let mut guard = self.lock_active();
            if guard.as_ref().map(|active| active.handle.id) == Some(id) {
                guard.take()
            } else {
                None
            }
        };
        if let Some(active) = taken {
            warn!(session_id = id.0, "session: event channel closed by server");
            self.teardown(active, Some("event channel closed by server".into()));
        }
    }

    fn teardown(&self, mut active: ActiveSession, reason: Option<String>) {
        let id = active.handle.id;
        self.gate.close_if(id);
        for task in active.tasks.drain(..) {
            task.abort();
        }
        active.outbound.take();
        active.state_tx.send_replace(SessionState::Unconnected);
        self.emit_state(id, SessionState::Unconnected, reason);
    }

    /// Ends the session behind `handle`. Safe to call repeatedly and on
    /// handles whose session already ended.
    pub fn disconnect(&self, handle: &SessionHandle) {
        let taken = {
            let mut guard = self.lock_active();
            if guard.as_ref().map(|active| active.handle.id) == Some(handle.id) {
                guard.take()
            } else {
                None
            }
        };
        match taken {
            Some(active) => {
                info!(session_id = handle.id.0, "session: disconnected");
                self.teardown(active, None);
            }
            None => debug!(session_id = handle.id.0, "session: already disconnected"),
        }
    }

    /// Queues one event for the peer. Nothing is awaited.
    pub fn send(
        &self,
        handle: &SessionHandle,
        event: &str,
        payload: &impl Serialize,
    ) -> Result<(), ChatError> {
        let frame = EventEnvelope::new(event, payload)
            .and_then(|envelope| envelope.to_frame())
            .map_err(|err| ChatError::Validation(err.to_string()))?;

        let guard = self.lock_active();
        let active = guard
            .as_ref()
            .filter(|active| active.handle.id == handle.id)
            .ok_or(ChatError::NotConnected)?;
        if *active.state_tx.borrow() != SessionState::Connected {
            return Err(ChatError::NotConnected);
        }
        let outbound = active.outbound.as_ref().ok_or(ChatError::NotConnected)?;
        outbound.send(frame).map_err(|_| ChatError::NotConnected)?;
        debug!(session_id = handle.id.0, event, "session: event sent");
        Ok(())
    }

    pub fn current(&self) -> Option<SessionHandle> {
        self.lock_active()
            .as_ref()
            .map(|active| active.handle.clone())
    }

    pub fn state(&self) -> SessionState {
        self.lock_active()
            .as_ref()
            .map(|active| *active.state_tx.borrow())
            .unwrap_or(SessionState::Unconnected)
    }

    /// Listeners registered for the live session; zero when there is none.
    pub fn listener_count(&self) -> usize {
        self.lock_active()
            .as_ref()
            .map(|active| active.listeners.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
