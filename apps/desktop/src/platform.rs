//! Terminal stand-ins for the platform file picker and URL handler.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use client_core::{is_plain_filename, PickedFile, UrlOpener};
use percent_encoding::percent_decode_str;
use tracing::info;
use url::Url;

/// A path that does not exist is treated like a cancelled picker.
pub fn pick_file(path: &str) -> Option<PickedFile> {
    let path = Path::new(path.trim());
    if !path.is_file() {
        return None;
    }
    Some(PickedFile {
        uri: path.display().to_string(),
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
    })
}

pub fn default_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

/// Last path segment, decoded. Names that would leave `dir` are refused.
fn file_name_of(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let name = percent_decode_str(segment).decode_utf8().ok()?;
    is_plain_filename(&name).then(|| name.into_owned())
}

/// Saves downloads into a directory instead of handing them to a browser.
pub struct DownloadDirOpener {
    http: reqwest::Client,
    dir: PathBuf,
}

impl DownloadDirOpener {
    pub fn new(http: reqwest::Client, dir: PathBuf) -> Self {
        Self { http, dir }
    }
}

#[async_trait]
impl UrlOpener for DownloadDirOpener {
    async fn can_open(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && file_name_of(url).is_some()
    }

    async fn open(&self, url: &Url) -> Result<()> {
        let filename = file_name_of(url).ok_or_else(|| anyhow!("no file name in {url}"))?;
        let bytes = self
            .http
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("failed to fetch {url}"))?
            .bytes()
            .await
            .with_context(|| format!("failed to read {url}"))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("cannot create {}", self.dir.display()))?;
        let path = self.dir.join(&filename);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        info!(path = %path.display(), size_bytes = bytes.len(), "downloads: saved");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/platform_tests.rs"]
mod tests;
