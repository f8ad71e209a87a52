use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_HTTP_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub http_port: u16,
    pub event_path: String,
    pub request_timeout_secs: u64,
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            event_path: "/ws".into(),
            request_timeout_secs: 30,
            event_buffer: 256,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Defaults, then the optional TOML file, then environment overrides.
pub fn load_config(path: Option<&Path>) -> ClientConfig {
    let mut config = match path {
        Some(path) => read_config_file(path).unwrap_or_default(),
        None => ClientConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

fn read_config_file(path: &Path) -> Option<ClientConfig> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(path = %path.display(), "config: cannot read file: {err}");
            return None;
        }
    };
    match parse_config(&raw) {
        Ok(config) => Some(config),
        Err(err) => {
            warn!(path = %path.display(), "config: ignoring invalid file: {err}");
            None
        }
    }
}

pub fn parse_config(raw: &str) -> Result<ClientConfig, toml::de::Error> {
    toml::from_str(raw)
}

pub(crate) fn apply_env_overrides(
    config: &mut ClientConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let pick = |plain: &str, prefixed: &str| lookup(prefixed).or_else(|| lookup(plain));

    if let Some(v) = pick("CHAT_HTTP_PORT", "APP__HTTP_PORT") {
        match v.parse::<u16>() {
            Ok(port) => config.http_port = port,
            Err(_) => warn!(value = %v, "config: ignoring invalid http port override"),
        }
    }
    if let Some(v) = pick("CHAT_EVENT_PATH", "APP__EVENT_PATH") {
        config.event_path = if v.starts_with('/') { v } else { format!("/{v}") };
    }
    if let Some(v) = pick("CHAT_REQUEST_TIMEOUT_SECS", "APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(secs) => config.request_timeout_secs = secs,
            Err(_) => warn!(value = %v, "config: ignoring invalid request timeout override"),
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
