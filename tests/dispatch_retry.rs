//! Refresh-and-replay behaviour of the request dispatcher against a mock
//! backend. Request counts are asserted by `expect(n)` when the server drops.

use anichat_lib::client::{ApiClient, ApiRequest, PATH_REFRESH};
use anichat_lib::error::ApiError;
use anichat_lib::state::TokenStore;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HISTORY: &str = "/api/chat/history";

fn client(server: &MockServer) -> (Arc<ApiClient>, TokenStore) {
    let tokens = TokenStore::new();
    let api = ApiClient::new(server.uri(), tokens.clone()).expect("client");
    (Arc::new(api), tokens)
}

async fn mount_refresh_ok(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(PATH_REFRESH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "accessToken": token }
        })))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_replayed_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(HISTORY))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": "Token expired"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(HISTORY))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "messages": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, "fresh", 1).await;

    let (api, tokens) = client(&server);
    tokens.set("stale").await;

    let body = api.dispatch(ApiRequest::get(HISTORY)).await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(tokens.get().await.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn second_401_on_replay_does_not_refresh_again() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": "Token expired"
        })))
        .expect(2)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, "fresh", 1).await;

    let (api, tokens) = client(&server);
    tokens.set("stale").await;

    let err = api.dispatch(ApiRequest::get(HISTORY)).await.unwrap_err();
    assert_eq!(err, ApiError::SessionExpired);
}

#[tokio::test]
async fn missing_token_401_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": "No token provided"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, "fresh", 0).await;

    let (api, _tokens) = client(&server);
    let err = api.dispatch(ApiRequest::get(HISTORY)).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthenticated);
}

#[tokio::test]
async fn bare_401_without_a_bearer_skips_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, "fresh", 0).await;

    let (api, tokens) = client(&server);
    let err = api.dispatch(ApiRequest::get(HISTORY)).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthenticated);
    assert_eq!(tokens.get().await, None);
}

#[tokio::test]
async fn failed_refresh_clears_token_and_skips_replay() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": "jwt expired"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(PATH_REFRESH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": "Refresh token invalid"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (api, tokens) = client(&server);
    tokens.set("stale").await;

    let err = api.dispatch(ApiRequest::get(HISTORY)).await.unwrap_err();
    assert_eq!(err, ApiError::SessionExpired);
    assert_eq!(tokens.get().await, None);
}

#[tokio::test]
async fn requests_marked_without_refresh_surface_401_directly() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "success": false,
            "error": "Invalid email or password"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, "fresh", 0).await;

    let (api, _tokens) = client(&server);
    let err = api
        .dispatch(ApiRequest::post("/api/auth/login", json!({})).without_refresh())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::Server {
            status: 401,
            message: Some("Invalid email or password".to_string())
        }
    );
}

#[tokio::test]
async fn other_errors_pass_through_untouched() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    mount_refresh_ok(&server, "fresh", 0).await;

    let (api, _tokens) = client(&server);
    let err = api.dispatch(ApiRequest::get(HISTORY)).await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Server {
            status: 503,
            message: None
        }
    );
    assert_eq!(err.user_message(), "Server error. Please try again later.");
}

#[tokio::test]
async fn embedded_token_in_any_response_updates_the_store() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(HISTORY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "messages": [], "tokens": { "accessToken": "rotated" } }
        })))
        .mount(&server)
        .await;

    let (api, tokens) = client(&server);
    tokens.set("old").await;
    api.dispatch(ApiRequest::get(HISTORY)).await.unwrap();
    assert_eq!(tokens.get().await.as_deref(), Some("rotated"));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let tokens = TokenStore::new();
    let api = ApiClient::new("http://127.0.0.1:1", tokens).unwrap();
    let err = api.dispatch(ApiRequest::get(HISTORY)).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "{err:?}");
}
