use serde_json::json;

use super::*;
use crate::{
    config::ClientConfig,
    test_support::{closed_port, spawn_chat_server, UploadBehavior},
};

fn endpoint_on(port: u16) -> ServerEndpoint {
    let config = ClientConfig {
        http_port: port,
        ..ClientConfig::default()
    };
    ServerEndpoint::new("127.0.0.1", &config)
}

#[tokio::test]
async fn persist_sends_the_stored_shape() {
    let server = spawn_chat_server(UploadBehavior::Accept).await;
    let history = HistorySyncClient::new(Client::new());
    let entries = vec![
        ConversationEntry::text("alice", "hello", "10:00"),
        ConversationEntry::image(
            "bob",
            "file_1.png",
            "http://127.0.0.1:3000/uploads/file_1.png",
            "10:01",
        ),
        ConversationEntry::file("carol", "file_2.pdf", "10:02"),
    ];

    history
        .persist(&endpoint_on(server.port), &entries)
        .await
        .expect("persisted");

    let saved = server.state.saved_chat.lock().await.clone();
    assert_eq!(
        saved,
        json!([
            {
                "username": "alice",
                "message": "hello",
                "timestamp": "10:00",
                "isImage": false,
                "isFile": false
            },
            {
                "username": "bob",
                "message": "Sent an image: file_1.png",
                "timestamp": "10:01",
                "isImage": true,
                "isFile": false,
                "imageUri": "http://127.0.0.1:3000/uploads/file_1.png",
                "fileInfo": {"filename": "file_1.png"}
            },
            {
                "username": "carol",
                "message": "Sent a file: file_2.pdf",
                "timestamp": "10:02",
                "isImage": false,
                "isFile": true,
                "fileInfo": {"filename": "file_2.pdf"}
            }
        ])
    );
}

#[tokio::test]
async fn persisted_log_comes_back_unchanged() {
    let server = spawn_chat_server(UploadBehavior::Accept).await;
    let history = HistorySyncClient::new(Client::new());
    let endpoint = endpoint_on(server.port);
    let entries = vec![
        ConversationEntry::text("alice", "hello", "10:00"),
        ConversationEntry::file("carol", "file_2.pdf", "10:02"),
    ];

    history.persist(&endpoint, &entries).await.expect("persisted");
    assert_eq!(history.retrieve(&endpoint).await.expect("retrieved"), entries);
}

#[tokio::test]
async fn entries_saved_by_the_server_without_timestamp_are_accepted() {
    let server = spawn_chat_server(UploadBehavior::Accept).await;
    *server.state.saved_chat.lock().await = json!([
        {"username": "bob", "message": "hi there", "isImage": false}
    ]);

    let entries = HistorySyncClient::new(Client::new())
        .retrieve(&endpoint_on(server.port))
        .await
        .expect("retrieved");

    assert_eq!(entries, vec![ConversationEntry::text("bob", "hi there", "")]);
}

#[tokio::test]
async fn inconsistent_entries_fail_the_whole_retrieve() {
    let server = spawn_chat_server(UploadBehavior::Accept).await;
    *server.state.saved_chat.lock().await = json!([
        {"username": "bob", "message": "ok", "isImage": false},
        {"username": "bob", "message": "broken", "isImage": true}
    ]);

    let err = HistorySyncClient::new(Client::new())
        .retrieve(&endpoint_on(server.port))
        .await
        .expect_err("image without file info");
    assert!(matches!(err, ChatError::Retrieve(_)));
}

#[tokio::test]
async fn unreachable_server_maps_to_history_errors() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let endpoint = endpoint_on(closed_port().await);
    let history = HistorySyncClient::new(Client::new());

    assert!(matches!(
        history.persist(&endpoint, &[]).await,
        Err(ChatError::Persist(_))
    ));
    assert!(matches!(
        history.retrieve(&endpoint).await,
        Err(ChatError::Retrieve(_))
    ));
}
