//! Session manager: the current user, the bearer token lifecycle and the
//! login / signup / logout / check flows built on [`ApiClient`].

use crate::chat::parse_timestamp;
use crate::client::{ApiClient, ApiRequest, PATH_LOGIN, PATH_LOGOUT, PATH_ME, PATH_SIGNUP};
use crate::error::ApiError;
use crate::state::{OperationGuard, TokenStore};
use crate::types::{ApiEnvelope, AuthResult, AuthTokens, LinkedIdentity, User};
use crate::validation::{validate_login, validate_signup};
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> Option<String> {
        let s = match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n.to_string(),
        };
        (!s.is_empty()).then_some(s)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLinkedAccount {
    provider: String,
    #[serde(default, alias = "userId")]
    external_id: Option<RawId>,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAniList {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    username: Option<String>,
}

/// User object as it may come off the wire, before normalization.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default, rename = "_id")]
    underscore_id: Option<RawId>,
    email: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    linked_accounts: Option<Vec<Value>>,
    #[serde(default)]
    anilist: Option<RawAniList>,
    #[serde(default)]
    created_at: Value,
    #[serde(default)]
    updated_at: Value,
}

fn normalize_instant(value: &Value) -> Option<String> {
    parse_timestamp(value).map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

impl RawUser {
    fn normalize(self) -> Option<User> {
        let id = self
            .id
            .and_then(RawId::into_string)
            .or_else(|| self.underscore_id.and_then(RawId::into_string))?;
        let email = self.email.trim().to_string();
        if email.is_empty() {
            return None;
        }

        let mut linked_accounts: Vec<LinkedIdentity> = self
            .linked_accounts
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value::<RawLinkedAccount>(v).ok())
            .map(|a| LinkedIdentity {
                provider: a.provider,
                external_id: a.external_id.and_then(RawId::into_string),
                username: a.username,
            })
            .collect();
        if let Some(anilist) = self.anilist {
            if !linked_accounts.iter().any(|a| a.provider == "anilist") {
                linked_accounts.push(LinkedIdentity {
                    provider: "anilist".to_string(),
                    external_id: anilist.id.and_then(RawId::into_string),
                    username: anilist.username,
                });
            }
        }

        Some(User {
            id,
            email,
            username: self.username.unwrap_or_default(),
            linked_accounts,
            created_at: normalize_instant(&self.created_at),
            updated_at: normalize_instant(&self.updated_at),
        })
    }
}

/// Which known layout an auth payload matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    TopLevelUser,
    NestedUnderData,
    FlattenedInData,
    FlattenedTopLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    pub shape: PayloadShape,
    pub user: User,
    pub tokens: Option<AuthTokens>,
}

fn parse_user(value: Option<&Value>) -> Option<User> {
    let value = value?;
    if !value.is_object() {
        return None;
    }
    serde_json::from_value::<RawUser>(value.clone())
        .ok()
        .and_then(RawUser::normalize)
}

fn parse_tokens(container: Option<&Value>) -> Option<AuthTokens> {
    let container = container?;
    if let Some(tokens) = container.get("tokens") {
        if let Ok(parsed) = serde_json::from_value::<AuthTokens>(tokens.clone()) {
            return Some(parsed);
        }
    }
    let access = container.get("accessToken")?.as_str()?.trim();
    if access.is_empty() {
        return None;
    }
    Some(AuthTokens {
        access_token: access.to_string(),
        refresh_token: container
            .get("refreshToken")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        expires_in: container.get("expiresIn").and_then(|v| v.as_u64()),
    })
}

/// Tries each known layout in order and returns the first that holds a
/// structurally valid user. Never guesses: no match is `None`.
pub fn parse_auth_payload(body: &Value) -> Option<AuthPayload> {
    let data = body.get("data");
    let attempts = [
        (PayloadShape::TopLevelUser, body.get("user"), Some(body)),
        (
            PayloadShape::NestedUnderData,
            data.and_then(|d| d.get("user")),
            data,
        ),
        (PayloadShape::FlattenedInData, data, data),
        (PayloadShape::FlattenedTopLevel, Some(body), Some(body)),
    ];

    attempts.into_iter().find_map(|(shape, user, tokens_at)| {
        let user = parse_user(user)?;
        Some(AuthPayload {
            shape,
            user,
            tokens: parse_tokens(tokens_at),
        })
    })
}

/// Owns the signed-in state for one client process.
pub struct AuthSession {
    api: Arc<ApiClient>,
    user: Arc<RwLock<Option<User>>>,
    loading: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    checking: OperationGuard,
    logging_in: OperationGuard,
    signing_up: OperationGuard,
    settle_delay: Duration,
}

impl AuthSession {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            user: Arc::new(RwLock::new(None)),
            loading: Arc::new(AtomicBool::new(true)),
            alive: Arc::new(AtomicBool::new(true)),
            checking: OperationGuard::new(),
            logging_in: OperationGuard::new(),
            signing_up: OperationGuard::new(),
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn tokens(&self) -> &TokenStore {
        self.api.tokens()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Never true while a check is running, so callers cannot flash
    /// signed-in UI before the server confirms.
    pub async fn is_authenticated(&self) -> bool {
        !self.is_loading() && self.user.read().await.is_some()
    }

    /// Stops state updates from requests still in flight.
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    async fn set_user(&self, user: Option<User>) {
        let mut guard = self.user.write().await;
        *guard = user;
    }

    /// Asks the server who we are and mirrors the answer locally.
    pub async fn check_auth(&self) -> Option<User> {
        let Some(_in_flight) = self.checking.try_begin() else {
            debug!("auth check already running");
            return self.current_user().await;
        };

        self.loading.store(true, Ordering::Release);
        let outcome = self.api.dispatch(ApiRequest::get(PATH_ME)).await;

        if !self.is_alive() {
            self.loading.store(false, Ordering::Release);
            return None;
        }

        let user = match outcome {
            Ok(body) if !ApiEnvelope::from_value(&body).reported_failure() => {
                parse_auth_payload(&body).map(|p| p.user)
            }
            Ok(body) => {
                debug!(
                    error = ApiEnvelope::from_value(&body).error_text().unwrap_or(""),
                    "auth check reported failure"
                );
                None
            }
            Err(ApiError::Unauthenticated) => {
                debug!("no active session");
                None
            }
            Err(e) => {
                warn!(error = %e, "auth check failed");
                None
            }
        };

        self.set_user(user.clone()).await;
        self.loading.store(false, Ordering::Release);
        user
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult {
        let Some(_in_flight) = self.logging_in.try_begin() else {
            return AuthResult::failure(ApiError::InProgress("Login").user_message());
        };
        if let Err(e) = validate_login(email, password) {
            return AuthResult::failure(e.to_string());
        }

        let request = ApiRequest::post(
            PATH_LOGIN,
            json!({ "email": email.trim(), "password": password }),
        )
        .without_refresh();
        self.establish(request, "login").await
    }

    pub async fn signup(&self, email: &str, username: &str, password: &str) -> AuthResult {
        let Some(_in_flight) = self.signing_up.try_begin() else {
            return AuthResult::failure(ApiError::InProgress("Signup").user_message());
        };
        if let Err(e) = validate_signup(email, username, password) {
            return AuthResult::failure(e.to_string());
        }

        let request = ApiRequest::post(
            PATH_SIGNUP,
            json!({
                "email": email.trim(),
                "username": username.trim(),
                "password": password,
            }),
        )
        .without_refresh();
        self.establish(request, "signup").await
    }

    async fn establish(&self, request: ApiRequest, operation: &'static str) -> AuthResult {
        let body = match self.api.dispatch(request).await {
            Ok(body) => body,
            Err(e) => {
                debug!(operation, error = %e, "credential submission failed");
                return AuthResult::failure(e.user_message());
            }
        };

        let envelope = ApiEnvelope::from_value(&body);
        if envelope.reported_failure() {
            return AuthResult::failure(
                envelope
                    .error_text()
                    .unwrap_or("The server rejected the request.")
                    .to_string(),
            );
        }

        let Some(payload) = parse_auth_payload(&body) else {
            warn!(operation, "success response carried no recognizable user");
            return AuthResult::failure(
                ApiError::UnexpectedShape("no user data in response".to_string()).user_message(),
            );
        };

        if let Some(tokens) = &payload.tokens {
            self.tokens().set(tokens.access_token.clone()).await;
        }
        self.set_user(Some(payload.user.clone())).await;
        info!(operation, user_id = %payload.user.id, "session established");

        tokio::time::sleep(self.settle_delay).await;
        self.check_auth().await;

        AuthResult::ok(payload.user, payload.tokens)
    }

    /// Tells the server, then forgets the session locally no matter what.
    pub async fn logout(&self) {
        let request = ApiRequest::new(reqwest::Method::POST, PATH_LOGOUT).without_refresh();
        if let Err(e) = self.api.dispatch(request).await {
            warn!(error = %e, "logout notification failed");
        }
        self.set_user(None).await;
        self.tokens().clear().await;
        info!("signed out");
    }

    pub async fn refresh_token(&self) -> bool {
        let refreshed = self.api.refresh().await;
        if !refreshed {
            self.set_user(None).await;
        }
        refreshed
    }

    /// Drops local user state after any call reported the session as gone.
    pub async fn on_api_error(&self, err: &ApiError) {
        if err.is_auth_failure() {
            self.set_user(None).await;
        }
    }
}
