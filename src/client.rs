use crate::error::ApiError;
use crate::redact::redact_secrets;
use crate::state::TokenStore;
use crate::types::ApiEnvelope;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

pub const PATH_LOGIN: &str = "/api/auth/login";
pub const PATH_SIGNUP: &str = "/api/auth/signup";
pub const PATH_LOGOUT: &str = "/api/auth/logout";
pub const PATH_REFRESH: &str = "/api/auth/refresh";
pub const PATH_ME: &str = "/api/auth/me";

// 401 bodies carrying these mean "never logged in"; refreshing cannot help.
const EXPECTED_UNAUTH_MARKERS: [&str; 4] = [
  "no token",
  "not authenticated",
  "no access token",
  "missing token",
];

/// Whether a 401 may trigger the refresh-and-replay step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
  RefreshOnce,
  Never,
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
  pub method: Method,
  pub path: String,
  pub body: Option<Value>,
  pub retry: RetryPolicy,
}

impl ApiRequest {
  pub fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      body: None,
      retry: RetryPolicy::RefreshOnce,
    }
  }

  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::GET, path)
  }

  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self::new(Method::POST, path).with_body(body)
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self::new(Method::DELETE, path)
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }

  pub fn without_refresh(mut self) -> Self {
    self.retry = RetryPolicy::Never;
    self
  }
}

/// A response that arrived, successful or not.
#[derive(Debug, Clone)]
struct RawResponse {
  status: u16,
  body: Value,
  bearer_sent: bool,
}

impl RawResponse {
  fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

pub(crate) fn is_expected_unauthenticated(text: &str) -> bool {
  let lower = text.to_ascii_lowercase();
  EXPECTED_UNAUTH_MARKERS.iter().any(|m| lower.contains(m))
}

fn error_text(body: &Value) -> Option<String> {
  ApiEnvelope::from_value(body).error_text().map(|s| s.to_string())
}

fn read_token(value: Option<&Value>) -> Option<String> {
  let s = value?.as_str()?.trim();
  if s.is_empty() {
    None
  } else {
    Some(s.to_string())
  }
}

/// Looks for a fresh access token in any of the known response layouts.
pub fn extract_access_token(body: &Value) -> Option<String> {
  let data = body.get("data");
  let candidates = [
    body.get("tokens").and_then(|t| t.get("accessToken")),
    data.and_then(|d| d.get("tokens")).and_then(|t| t.get("accessToken")),
    body.get("accessToken"),
    data.and_then(|d| d.get("accessToken")),
  ];
  candidates.into_iter().find_map(read_token)
}

fn classify_failure(response: &RawResponse) -> ApiError {
  let message = error_text(&response.body);
  match response.status {
    401 => {
      // Nothing to refresh when no token went out.
      if !response.bearer_sent || message.as_deref().is_some_and(is_expected_unauthenticated) {
        ApiError::Unauthenticated
      } else {
        ApiError::SessionExpired
      }
    }
    status => ApiError::Server { status, message },
  }
}

fn classify_transport(err: &reqwest::Error) -> ApiError {
  let msg = redact_secrets(&err.to_string()).to_string();
  if err.is_builder() {
    ApiError::RequestSetup(msg)
  } else {
    ApiError::Network(msg)
  }
}

fn build_headers(token: Option<&str>) -> HeaderMap {
  let mut headers = HeaderMap::new();
  headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
  headers.insert(
    USER_AGENT,
    HeaderValue::from_static(concat!("anichat/", env!("CARGO_PKG_VERSION"))),
  );
  if let Some(token) = token {
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
      headers.insert(AUTHORIZATION, value);
    }
  }
  headers
}

/// Sends requests to the backend with the current bearer token and handles
/// the single refresh-and-replay cycle on an expired session.
///
/// Refresh credentials travel only as server-set cookies in the client's jar;
/// the bearer token always comes from the [`TokenStore`].
pub struct ApiClient {
  http: reqwest::Client,
  base_url: String,
  tokens: TokenStore,
}

impl ApiClient {
  pub fn new(base_url: impl Into<String>, tokens: TokenStore) -> Result<Self, ApiError> {
    let http = reqwest::Client::builder()
      .cookie_store(true)
      .build()
      .map_err(|e| classify_transport(&e))?;
    Ok(Self {
      http,
      base_url: base_url.into().trim_end_matches('/').to_string(),
      tokens,
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub fn tokens(&self) -> &TokenStore {
    &self.tokens
  }

  async fn send_once(&self, request: &ApiRequest) -> Result<RawResponse, ApiError> {
    let url = format!("{}{}", self.base_url, request.path);
    let token = self.tokens.get().await;
    let mut builder = self
      .http
      .request(request.method.clone(), url)
      .headers(build_headers(token.as_deref()));
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let res = builder.send().await.map_err(|e| classify_transport(&e))?;
    let status = res.status().as_u16();
    let text = res.text().await.map_err(|e| classify_transport(&e))?;
    let body = if text.trim().is_empty() {
      Value::Null
    } else {
      serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
    };

    Ok(RawResponse {
      status,
      body,
      bearer_sent: token.is_some(),
    })
  }

  async fn absorb_token(&self, body: &Value) {
    if let Some(token) = extract_access_token(body) {
      self.tokens.set(token).await;
    }
  }

  /// Issues `request`; on a recoverable 401 refreshes once and replays once.
  pub async fn dispatch(&self, request: ApiRequest) -> Result<Value, ApiError> {
    let first = self.send_once(&request).await?;
    if first.is_success() {
      self.absorb_token(&first.body).await;
      return Ok(first.body);
    }

    if first.status == 401 && request.retry == RetryPolicy::Never {
      // Credential endpoints: a 401 is a plain rejection.
      return Err(ApiError::Server {
        status: first.status,
        message: error_text(&first.body),
      });
    }
    let failure = classify_failure(&first);
    if failure != ApiError::SessionExpired {
      if failure == ApiError::Unauthenticated {
        debug!(path = %request.path, "request rejected as unauthenticated");
      }
      return Err(failure);
    }

    debug!(path = %request.path, "access token rejected, refreshing once");
    if !self.refresh().await {
      return Err(ApiError::SessionExpired);
    }

    let replay = self.send_once(&request).await?;
    if replay.is_success() {
      self.absorb_token(&replay.body).await;
      return Ok(replay.body);
    }
    Err(classify_failure(&replay))
  }

  /// Mints a new access token from the server-held refresh credential.
  pub async fn refresh(&self) -> bool {
    let request = ApiRequest::new(Method::POST, PATH_REFRESH).without_refresh();
    let outcome = self.send_once(&request).await;
    match outcome {
      Ok(res) if res.is_success() && !ApiEnvelope::from_value(&res.body).reported_failure() => {
        match extract_access_token(&res.body) {
          Some(token) => {
            self.tokens.set(token).await;
            info!("access token refreshed");
            true
          }
          None => {
            warn!("refresh succeeded without an access token");
            self.tokens.clear().await;
            false
          }
        }
      }
      Ok(res) => {
        debug!(status = res.status, "refresh rejected");
        self.tokens.clear().await;
        false
      }
      Err(e) => {
        warn!(error = %e, "refresh failed");
        self.tokens.clear().await;
        false
      }
    }
  }
}
