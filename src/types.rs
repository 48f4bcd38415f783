use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Wire envelope every backend route answers with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiEnvelope {
    /// Tolerant parse: a body that is not an object yields an empty envelope.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        Self {
            success: obj.get("success").and_then(|v| v.as_bool()),
            data: obj.get("data").filter(|v| !v.is_null()).cloned(),
            error: read_text(obj.get("error")),
            message: read_text(obj.get("message")),
        }
    }

    pub fn reported_failure(&self) -> bool {
        self.success == Some(false)
    }

    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}

fn read_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Object(obj) => read_text(obj.get("message")),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LinkedIdentity {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_accounts: Vec<LinkedIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuthTokens {
    #[serde(alias = "access_token")]
    pub access_token: String,
    #[serde(default, alias = "refresh_token", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "expires_in", skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// Outcome of login, signup and friends as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuthResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<AuthTokens>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthResult {
    pub fn ok(user: User, tokens: Option<AuthTokens>) -> Self {
        Self {
            success: true,
            user: Some(user),
            tokens,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            user: None,
            tokens: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChatMessage {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: ChatRole,
    pub content: String,
    #[serde(
        default = "Utc::now",
        deserialize_with = "crate::chat::deserialize_timestamp"
    )]
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AnimeEntry {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SyncSummary {
    #[serde(default, alias = "count", alias = "animeCount")]
    pub synced_entries: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResult<T> {
    Ok { ok: bool, value: T },
    Err { ok: bool, error: CommandError },
}

impl<T> CommandResult<T> {
    pub fn ok(value: T) -> Self {
        Self::Ok { ok: true, value }
    }

    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Err {
            ok: false,
            error: CommandError {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_reads_nested_error_message() {
        let env = ApiEnvelope::from_value(&json!({
            "success": false,
            "error": { "message": "Email already registered" }
        }));
        assert!(env.reported_failure());
        assert_eq!(env.error_text(), Some("Email already registered"));
    }

    #[test]
    fn envelope_from_non_object_is_empty() {
        let env = ApiEnvelope::from_value(&json!("oops"));
        assert_eq!(env.success, None);
        assert!(env.data.is_none());
        assert!(!env.reported_failure());
    }

    #[test]
    fn command_result_serializes_ok_and_err_shapes() {
        let ok = serde_json::to_value(CommandResult::ok(3)).unwrap();
        assert_eq!(ok, json!({ "ok": true, "value": 3 }));

        let err = serde_json::to_value(CommandResult::<()>::err("NETWORK", "offline")).unwrap();
        assert_eq!(
            err,
            json!({ "ok": false, "error": { "code": "NETWORK", "message": "offline" } })
        );
    }

    #[test]
    fn auth_tokens_accept_snake_case_keys() {
        let tokens: AuthTokens = serde_json::from_value(json!({
            "access_token": "a1",
            "refresh_token": "r1"
        }))
        .unwrap();
        assert_eq!(tokens.access_token, "a1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
    }
}
