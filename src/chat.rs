use crate::client::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::types::{ApiEnvelope, ChatMessage, ChatRole};
use crate::validation::validate_chat_message;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub const PATH_CHAT: &str = "/api/chat";
pub const PATH_CHAT_HISTORY: &str = "/api/chat/history";

// Unix values below this are read as seconds, at or above as milliseconds.
const SECONDS_CUTOFF: f64 = 1e11;

fn from_unix_number(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    let millis = if n.abs() < SECONDS_CUTOFF {
        n * 1000.0
    } else {
        n
    };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

fn from_text(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    s.parse::<f64>().ok().and_then(from_unix_number)
}

/// Reads a message timestamp from whatever the backend sent.
///
/// Accepts ISO/RFC 3339 text, numeric text, `{"$date": ...}` objects and Unix
/// numbers in seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => from_text(s),
        Value::Number(n) => n.as_f64().and_then(from_unix_number),
        Value::Object(obj) => obj.get("$date").and_then(parse_timestamp),
        _ => None,
    }
}

/// Falls back to the current time instead of failing the message.
pub fn timestamp_or_now(value: &Value) -> DateTime<Utc> {
    parse_timestamp(value).unwrap_or_else(Utc::now)
}

pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(timestamp_or_now(&value))
}

fn parse_message(value: &Value) -> Option<ChatMessage> {
    serde_json::from_value::<ChatMessage>(value.clone()).ok()
}

fn assistant_text(text: &str) -> ChatMessage {
    ChatMessage {
        id: None,
        role: ChatRole::Assistant,
        content: text.to_string(),
        timestamp: Utc::now(),
    }
}

/// Finds the assistant reply in a `POST /api/chat` response.
pub fn parse_reply(body: &Value) -> Option<ChatMessage> {
    let data = body.get("data").unwrap_or(body);
    if let Some(message) = data.get("message").and_then(parse_message) {
        return Some(message);
    }
    ["response", "reply"]
        .into_iter()
        .find_map(|key| data.get(key).and_then(|v| v.as_str()))
        .map(assistant_text)
}

/// Reads the message log; entries that are not messages are skipped.
pub fn parse_history(body: &Value) -> Option<Vec<ChatMessage>> {
    let data = body.get("data").unwrap_or(body);
    let list = data
        .get("messages")
        .and_then(|v| v.as_array())
        .or_else(|| data.as_array())?;
    Some(list.iter().filter_map(parse_message).collect())
}

pub struct ChatApi {
    api: Arc<ApiClient>,
}

impl ChatApi {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    pub async fn send(
        &self,
        message: &str,
        include_anime_context: bool,
    ) -> Result<ChatMessage, ApiError> {
        validate_chat_message(message)?;
        let body = self
            .api
            .dispatch(ApiRequest::post(
                PATH_CHAT,
                json!({
                    "message": message.trim(),
                    "includeAnimeContext": include_anime_context,
                }),
            ))
            .await?;
        reject_reported_failure(&body)?;
        parse_reply(&body)
            .ok_or_else(|| ApiError::UnexpectedShape("no assistant message in response".to_string()))
    }

    pub async fn history(&self) -> Result<Vec<ChatMessage>, ApiError> {
        let body = self.api.dispatch(ApiRequest::get(PATH_CHAT_HISTORY)).await?;
        reject_reported_failure(&body)?;
        let messages = parse_history(&body)
            .ok_or_else(|| ApiError::UnexpectedShape("no message list in response".to_string()))?;
        debug!(count = messages.len(), "loaded chat history");
        Ok(messages)
    }

    pub async fn clear_history(&self) -> Result<(), ApiError> {
        let body = self.api.dispatch(ApiRequest::delete(PATH_CHAT_HISTORY)).await?;
        reject_reported_failure(&body)
    }
}

pub(crate) fn reject_reported_failure(body: &Value) -> Result<(), ApiError> {
    let envelope = ApiEnvelope::from_value(body);
    if envelope.reported_failure() {
        return Err(ApiError::Server {
            status: 200,
            message: envelope.error_text().map(|s| s.to_string()),
        });
    }
    Ok(())
}
