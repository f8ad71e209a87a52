use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{domain::TransferRef, protocol::ServerAck};
use tracing::{info, warn};
use url::Url;

use crate::{
    endpoint::{build_download_url, is_plain_filename, ServerEndpoint},
    error::ChatError,
    session::SessionHandle,
};

const FALLBACK_EXTENSION: &str = "bin";

/// What the file picker returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickedFile {
    pub uri: String,
    pub name: Option<String>,
}

impl PickedFile {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
        }
    }

    fn local_path(&self) -> PathBuf {
        PathBuf::from(self.uri.strip_prefix("file://").unwrap_or(&self.uri))
    }

    fn extension(&self) -> String {
        std::iter::once(self.uri.as_str())
            .chain(self.name.as_deref())
            .find_map(extension_of)
            .unwrap_or(FALLBACK_EXTENSION)
            .to_string()
    }
}

fn extension_of(path: &str) -> Option<&str> {
    let last_segment = path.rsplit(|c: char| c == '/' || c == '\\').next()?;
    let (_, ext) = last_segment.rsplit_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

/// In-flight upload. Lives only for the duration of one `upload` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub local: PickedFile,
    pub remote_filename: String,
    pub extension: String,
    pub uploader: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub remote_filename: String,
    pub ack: ServerAck,
}

/// Platform hook that can open a download locator.
#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn can_open(&self, url: &Url) -> bool;
    async fn open(&self, url: &Url) -> Result<()>;
}

pub struct MissingUrlOpener;

#[async_trait]
impl UrlOpener for MissingUrlOpener {
    async fn can_open(&self, _url: &Url) -> bool {
        false
    }

    async fn open(&self, url: &Url) -> Result<()> {
        Err(anyhow!("no url opener available for {url}"))
    }
}

pub struct TransferCoordinator {
    http: Client,
    opener: Arc<dyn UrlOpener>,
    last_instant: AtomicI64,
}

impl TransferCoordinator {
    pub fn new(http: Client, opener: Arc<dyn UrlOpener>) -> Self {
        Self {
            http,
            opener,
            last_instant: AtomicI64::new(0),
        }
    }

    /// Milliseconds since the epoch, strictly greater than any value handed
    /// out before.
    pub fn next_creation_instant(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_instant
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    pub fn prepare(
        &self,
        picked: Option<PickedFile>,
        uploader: &str,
    ) -> Result<PendingTransfer, ChatError> {
        let local = picked.ok_or(ChatError::NoFileSelected)?;
        if local.uri.trim().is_empty() {
            return Err(ChatError::NoFileSelected);
        }
        if uploader.trim().is_empty() {
            return Err(ChatError::Validation("uploader name must not be empty".into()));
        }
        let extension = local.extension();
        let remote_filename = format!("file_{}.{extension}", self.next_creation_instant());
        Ok(PendingTransfer {
            local,
            remote_filename,
            extension,
            uploader: uploader.to_string(),
        })
    }

    /// Posts the picked file to the server's upload endpoint.
    ///
    /// No log entry is produced here: the server's `file_uploaded` broadcast
    /// reaches every participant, the uploader included.
    pub async fn upload(
        &self,
        handle: &SessionHandle,
        picked: Option<PickedFile>,
        username: &str,
    ) -> Result<TransferResult, ChatError> {
        let pending = self.prepare(picked, username)?;
        let endpoint = handle.endpoint();

        let path = pending.local.local_path();
        let bytes = tokio::fs::read(&path).await.map_err(|err| {
            ChatError::Transfer(format!("cannot read {}: {err}", path.display()))
        })?;
        let size_bytes = bytes.len();

        let part = Part::bytes(bytes)
            .file_name(pending.remote_filename.clone())
            .mime_str(&format!("application/{}", pending.extension))
            .map_err(|err| ChatError::Transfer(err.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("username", pending.uploader.clone());

        let ack: ServerAck = self
            .http
            .post(endpoint.upload_url())
            .multipart(form)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ChatError::Transfer(err.to_string()))?
            .json()
            .await
            .map_err(|err| ChatError::Transfer(format!("invalid upload response: {err}")))?;

        if !ack.success {
            warn!(
                filename = %pending.remote_filename,
                "transfer: server rejected upload: {}",
                ack.message
            );
            return Err(ChatError::Transfer(ack.message));
        }

        info!(
            session_id = handle.id().0,
            filename = %pending.remote_filename,
            size_bytes,
            "transfer: upload accepted"
        );
        Ok(TransferResult {
            remote_filename: pending.remote_filename,
            ack,
        })
    }

    /// Hands the download locator of `transfer_ref` to the URL opener.
    pub async fn download(
        &self,
        endpoint: &ServerEndpoint,
        transfer_ref: Option<&TransferRef>,
    ) -> Result<Url, ChatError> {
        let transfer_ref = transfer_ref.ok_or(ChatError::MissingReference)?;
        if transfer_ref.filename.trim().is_empty() {
            return Err(ChatError::MissingReference);
        }
        if !is_plain_filename(&transfer_ref.filename) {
            return Err(ChatError::DownloadUnsupported(transfer_ref.filename.clone()));
        }

        let locator = build_download_url(endpoint, &transfer_ref.filename);
        let url = Url::parse(&locator)
            .map_err(|err| ChatError::DownloadUnsupported(format!("{locator}: {err}")))?;
        if !self.opener.can_open(&url).await {
            return Err(ChatError::DownloadUnsupported(locator));
        }
        self.opener
            .open(&url)
            .await
            .map_err(|err| ChatError::Transfer(format!("{err:#}")))?;
        info!(filename = %transfer_ref.filename, "transfer: download opened");
        Ok(url)
    }
}

#[cfg(test)]
#[path = "tests/transfer_tests.rs"]
mod tests;
