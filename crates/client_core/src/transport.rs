use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// An open event channel as a pair of text-frame queues.
///
/// Dropping `outbound` closes the connection; `inbound` ends when the remote
/// side goes away.
pub struct EventChannel {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
pub trait EventChannelConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<EventChannel>;
}

pub struct WebSocketConnector;

#[async_trait]
impl EventChannelConnector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<EventChannel> {
        let (ws_stream, _) = connect_async(url)
            .await
            .with_context(|| format!("failed to connect websocket: {url}"))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(err) = ws_writer.send(Message::Text(frame)).await {
                    warn!("event channel: send failed: {err}");
                    break;
                }
            }
            let _ = ws_writer.close().await;
            debug!("event channel: writer closed");
        });

        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!("event channel: receive failed: {err}");
                        break;
                    }
                }
            }
            debug!("event channel: reader closed");
        });

        Ok(EventChannel {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
