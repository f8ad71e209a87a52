//! In-memory event channel and an axum stand-in for the chat server.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Multipart, Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use shared::protocol::{EventEnvelope, CHAT_MESSAGE_EVENT, FILE_UPLOADED_EVENT};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, Mutex},
};

use crate::transport::{EventChannel, EventChannelConnector};

pub(crate) enum ConnectMode {
    /// Every outbound frame comes straight back, like a server broadcast.
    Echo,
    /// The test drives both directions through a [`ManualPeer`].
    Manual,
    Fail(String),
    /// The handshake never completes.
    Pending,
}

pub(crate) struct ManualPeer {
    pub to_client: mpsc::UnboundedSender<String>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

pub(crate) struct MemoryConnector {
    mode: ConnectMode,
    peers: StdMutex<Vec<ManualPeer>>,
    opened_urls: StdMutex<Vec<String>>,
}

impl MemoryConnector {
    pub(crate) fn new(mode: ConnectMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            peers: StdMutex::new(Vec::new()),
            opened_urls: StdMutex::new(Vec::new()),
        })
    }

    pub(crate) fn take_peer(&self) -> Option<ManualPeer> {
        self.peers.lock().expect("peers").pop()
    }

    pub(crate) fn opened_urls(&self) -> Vec<String> {
        self.opened_urls.lock().expect("urls").clone()
    }
}

#[async_trait]
impl EventChannelConnector for MemoryConnector {
    async fn open(&self, url: &str) -> Result<EventChannel> {
        self.opened_urls
            .lock()
            .expect("urls")
            .push(url.to_string());

        match &self.mode {
            ConnectMode::Fail(reason) => Err(anyhow!(reason.clone())),
            ConnectMode::Pending => std::future::pending().await,
            ConnectMode::Echo => {
                let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
                let (inbound_tx, inbound) = mpsc::unbounded_channel::<String>();
                tokio::spawn(async move {
                    while let Some(frame) = outbound_rx.recv().await {
                        if inbound_tx.send(frame).is_err() {
                            break;
                        }
                    }
                });
                Ok(EventChannel { outbound, inbound })
            }
            ConnectMode::Manual => {
                let (outbound, from_client) = mpsc::unbounded_channel::<String>();
                let (to_client, inbound) = mpsc::unbounded_channel::<String>();
                self.peers.lock().expect("peers").push(ManualPeer {
                    to_client,
                    from_client,
                });
                Ok(EventChannel { outbound, inbound })
            }
        }
    }
}

pub(crate) fn frame(event: &str, data: Value) -> String {
    EventEnvelope {
        event: event.to_string(),
        data,
    }
    .to_frame()
    .expect("frame")
}

pub(crate) async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..300 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    done()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadBehavior {
    Accept,
    /// 200 with `success: false`, as the server does for a missing part.
    Refuse,
    Fail,
}

#[derive(Clone)]
pub(crate) struct ChatServerState {
    pub broadcast: broadcast::Sender<String>,
    pub files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub saved_chat: Arc<Mutex<Value>>,
    pub upload_behavior: UploadBehavior,
}

pub(crate) struct ChatServer {
    pub port: u16,
    pub state: ChatServerState,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ChatServerState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: ChatServerState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.broadcast.subscribe();

    let send_task = tokio::spawn(async move {
        while let Ok(text) = events_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            if let Ok(envelope) = EventEnvelope::parse(&text) {
                if envelope.event == CHAT_MESSAGE_EVENT {
                    let _ = state.broadcast.send(text);
                }
            }
        }
    }

    send_task.abort();
}

async fn upload(
    State(state): State<ChatServerState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, StatusCode> {
    match state.upload_behavior {
        UploadBehavior::Fail => return Err(StatusCode::INTERNAL_SERVER_ERROR),
        UploadBehavior::Refuse => {
            return Ok(Json(json!({"success": false, "message": "No selected file"})))
        }
        UploadBehavior::Accept => {}
    }

    let mut filename = None;
    let mut username = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.unwrap_or_default();
                if let Some(file_name) = file_name {
                    state
                        .files
                        .lock()
                        .await
                        .insert(file_name.clone(), bytes.to_vec());
                    filename = Some(file_name);
                }
            }
            Some("username") => username = field.text().await.ok(),
            _ => {}
        }
    }

    let (Some(filename), Some(username)) = (filename, username) else {
        return Ok(Json(json!({"success": false, "message": "Failed to upload file"})));
    };
    let file_type = filename
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    let _ = state.broadcast.send(frame(
        FILE_UPLOADED_EVENT,
        json!({"filename": filename, "username": username, "file_type": file_type}),
    ));
    Ok(Json(json!({"success": true, "message": "File Berhasil di Upload"})))
}

async fn uploaded_file(
    State(state): State<ChatServerState>,
    Path(filename): Path<String>,
) -> Result<Vec<u8>, StatusCode> {
    state
        .files
        .lock()
        .await
        .get(&filename)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

async fn save_chat(State(state): State<ChatServerState>, Json(body): Json<Value>) -> Json<Value> {
    *state.saved_chat.lock().await = body.get("chat").cloned().unwrap_or(json!([]));
    Json(json!({"success": true, "message": "Chat Berhasil Disimpan"}))
}

async fn get_chat(State(state): State<ChatServerState>) -> Json<Value> {
    Json(state.saved_chat.lock().await.clone())
}

pub(crate) async fn spawn_chat_server(upload_behavior: UploadBehavior) -> ChatServer {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let (broadcast, _) = broadcast::channel(64);
    let state = ChatServerState {
        broadcast,
        files: Arc::new(Mutex::new(HashMap::new())),
        saved_chat: Arc::new(Mutex::new(json!([]))),
        upload_behavior,
    };
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/upload", post(upload))
        .route("/uploads/:filename", get(uploaded_file))
        .route("/saveChat", post(save_chat))
        .route("/getChat", get(get_chat))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    ChatServer { port, state }
}

/// A port nothing listens on.
pub(crate) async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("addr").port()
}
