use std::collections::HashMap;

use super::*;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn empty_file_yields_defaults() {
    let config = parse_config("").expect("empty config");
    assert_eq!(config, ClientConfig::default());
    assert_eq!(config.http_port, 3000);
    assert_eq!(config.event_path, "/ws");
}

#[test]
fn partial_file_keeps_remaining_defaults() {
    let config = parse_config("http_port = 8080\nrequest_timeout_secs = 5\n").expect("config");
    assert_eq!(config.http_port, 8080);
    assert_eq!(config.request_timeout(), Duration::from_secs(5));
    assert_eq!(config.event_path, "/ws");
    assert_eq!(config.event_buffer, 256);
}

#[test]
fn wrong_types_are_rejected() {
    assert!(parse_config("http_port = \"not a port\"").is_err());
}

#[test]
fn zero_timeout_is_clamped() {
    let config = ClientConfig {
        request_timeout_secs: 0,
        ..ClientConfig::default()
    };
    assert_eq!(config.request_timeout(), Duration::from_secs(1));
}

#[test]
fn env_overrides_apply_and_prefixed_keys_win() {
    let mut config = ClientConfig::default();
    apply_env_overrides(
        &mut config,
        lookup(&[
            ("CHAT_HTTP_PORT", "4000"),
            ("APP__HTTP_PORT", "4100"),
            ("CHAT_EVENT_PATH", "events"),
            ("CHAT_REQUEST_TIMEOUT_SECS", "12"),
        ]),
    );
    assert_eq!(config.http_port, 4100);
    assert_eq!(config.event_path, "/events");
    assert_eq!(config.request_timeout_secs, 12);
}

#[test]
fn invalid_env_values_are_ignored() {
    let mut config = ClientConfig::default();
    apply_env_overrides(
        &mut config,
        lookup(&[
            ("CHAT_HTTP_PORT", "99999"),
            ("CHAT_REQUEST_TIMEOUT_SECS", "soon"),
        ]),
    );
    assert_eq!(config, ClientConfig::default());
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = read_config_file(&dir.path().join("absent.toml"));
    assert!(config.is_none());
}

#[test]
fn file_on_disk_is_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("client.toml");
    fs::write(&path, "event_path = \"/chat\"\n").expect("write");
    let config = read_config_file(&path).expect("config");
    assert_eq!(config.event_path, "/chat");
}
