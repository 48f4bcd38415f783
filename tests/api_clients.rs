//! Chat and AniList clients against a mock backend.

use anichat_lib::anilist::{AniListApi, KeyStatus, SyncTarget, PATH_ANILIST_KEY, PATH_ANILIST_SYNC};
use anichat_lib::chat::{ChatApi, PATH_CHAT, PATH_CHAT_HISTORY};
use anichat_lib::client::ApiClient;
use anichat_lib::error::ApiError;
use anichat_lib::state::{MemoryBackend, SecretManager, TokenStore, KEYRING_USER_ANILIST_KEY};
use anichat_lib::types::ChatRole;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api(server: &MockServer) -> Arc<ApiClient> {
    Arc::new(ApiClient::new(server.uri(), TokenStore::new()).expect("client"))
}

fn anilist(server: &MockServer) -> (AniListApi, SecretManager) {
    let secrets =
        SecretManager::with_backend(KEYRING_USER_ANILIST_KEY, Arc::new(MemoryBackend::default()));
    (AniListApi::new(api(server), secrets.clone()), secrets)
}

#[tokio::test]
async fn chat_send_posts_message_and_context_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_CHAT))
        .and(body_json(json!({ "message": "something cozy", "includeAnimeContext": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "message": {
                "role": "assistant",
                "content": "Try Laid-Back Camp",
                "timestamp": "2024-05-01T12:00:00Z"
            } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let chat = ChatApi::new(api(&server));
    let reply = chat.send("  something cozy ", true).await.unwrap();
    assert_eq!(reply.role, ChatRole::Assistant);
    assert_eq!(reply.content, "Try Laid-Back Camp");
}

#[tokio::test]
async fn chat_send_validates_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_CHAT))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let chat = ChatApi::new(api(&server));
    let err = chat.send("   ", false).await.unwrap_err();
    assert_eq!(err, ApiError::Validation("Message cannot be empty".to_string()));
}

#[tokio::test]
async fn history_normalizes_mixed_timestamps() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PATH_CHAT_HISTORY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "messages": [
                { "role": "user", "content": "a", "timestamp": 1700000000 },
                { "role": "assistant", "content": "b", "timestamp": 1700000000000_i64 },
                { "role": "system", "content": "c", "timestamp": "yesterday-ish" }
            ] }
        })))
        .mount(&server)
        .await;

    let chat = ChatApi::new(api(&server));
    let history = chat.history().await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].timestamp, history[1].timestamp);
    assert!(history[2].timestamp > history[0].timestamp);
}

#[tokio::test]
async fn clear_history_surfaces_reported_failure() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(PATH_CHAT_HISTORY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "History is locked"
        })))
        .mount(&server)
        .await;

    let chat = ChatApi::new(api(&server));
    let err = chat.clear_history().await.unwrap_err();
    assert_eq!(err.user_message(), "History is locked");
}

#[tokio::test]
async fn permanent_key_is_remembered_and_session_key_is_not() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_ANILIST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(2)
        .mount(&server)
        .await;

    let (client, secrets) = anilist(&server);

    client.save_key(" key-perm ", true).await.unwrap();
    secrets.set_in_memory(None).await;
    assert_eq!(client.current_key(true).await.as_deref(), Some("key-perm"));

    client.save_key("key-session", false).await.unwrap();
    secrets.set_in_memory(None).await;
    assert_eq!(client.current_key(true).await, None);
}

#[tokio::test]
async fn remembered_key_is_restored_by_a_new_process_only_when_allowed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_ANILIST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = Arc::new(MemoryBackend::default());
    let first = AniListApi::new(
        api(&server),
        SecretManager::with_backend(KEYRING_USER_ANILIST_KEY, storage.clone()),
    );
    first.save_key("key-perm", true).await.unwrap();

    let restarted = || {
        AniListApi::new(
            api(&server),
            SecretManager::with_backend(KEYRING_USER_ANILIST_KEY, storage.clone()),
        )
    };

    let without_remember = restarted();
    assert!(!without_remember.restore_key(false).await);
    assert_eq!(
        without_remember.key_status(false).await,
        KeyStatus {
            key_present: false,
            secure_storage: true
        }
    );

    let with_remember = restarted();
    assert!(with_remember.restore_key(true).await);
    assert!(with_remember.key_status(false).await.key_present);
}

#[tokio::test]
async fn delete_key_forgets_locally_even_if_server_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_ANILIST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(PATH_ANILIST_KEY))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _secrets) = anilist(&server);
    client.save_key("key-perm", true).await.unwrap();

    assert!(client.delete_key().await.is_err());
    assert_eq!(client.current_key(true).await, None);
}

#[tokio::test]
async fn sync_rejects_both_or_neither_identifier_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_ANILIST_SYNC))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (client, _secrets) = anilist(&server);

    let both = SyncTarget::PublicProfile {
        username: Some("mika".to_string()),
        user_id: Some(101),
    };
    assert_eq!(
        client.sync(&both).await.unwrap_err().user_message(),
        "Cannot provide both username and userId"
    );

    let neither = SyncTarget::PublicProfile {
        username: None,
        user_id: None,
    };
    assert_eq!(
        client.sync(&neither).await.unwrap_err().user_message(),
        "Either username or userId must be provided"
    );
}

#[tokio::test]
async fn sync_by_user_id_sends_bearer_and_reads_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PATH_ANILIST_SYNC))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_json(json!({ "userId": 101 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "count": 57, "username": "mika" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server);
    api.tokens().set("tok-1").await;
    let client = AniListApi::new(
        api,
        SecretManager::with_backend(KEYRING_USER_ANILIST_KEY, Arc::new(MemoryBackend::default())),
    );

    let summary = client
        .sync(&SyncTarget::PublicProfile {
            username: None,
            user_id: Some(101),
        })
        .await
        .unwrap();
    assert_eq!(summary.synced_entries, 57);
    assert_eq!(summary.username.as_deref(), Some("mika"));
}
