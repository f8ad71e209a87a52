use url::Url;

use crate::config::ClientConfig;

/// Address of the remote peer. Every locator the client uses is derived here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    address: String,
    port: u16,
    event_path: String,
}

impl ServerEndpoint {
    pub fn new(address: impl Into<String>, config: &ClientConfig) -> Self {
        Self {
            address: address.into().trim().to_string(),
            port: config.http_port,
            event_path: config.event_path.clone(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    pub fn event_channel_url(&self) -> String {
        format!("ws://{}:{}{}", self.address, self.port, self.event_path)
    }

    pub fn upload_url(&self) -> String {
        format!("{}/upload", self.http_base())
    }

    pub fn save_chat_url(&self) -> String {
        format!("{}/saveChat", self.http_base())
    }

    pub fn get_chat_url(&self) -> String {
        format!("{}/getChat", self.http_base())
    }

    pub fn download_url(&self, filename: &str) -> String {
        build_download_url(self, filename)
    }
}

/// The filename becomes a single percent-encoded path segment.
pub fn build_download_url(endpoint: &ServerEndpoint, filename: &str) -> String {
    let base = endpoint.http_base();
    let Ok(mut url) = Url::parse(&base) else {
        return format!("{base}/uploads/{filename}");
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().extend(["uploads", filename]);
    }
    url.to_string()
}

/// True when a peer-supplied name cannot escape the uploads directory.
pub fn is_plain_filename(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
