use crate::chat::reject_reported_failure;
use crate::client::{ApiClient, ApiRequest};
use crate::error::ApiError;
use crate::state::SecretManager;
use crate::types::SyncSummary;
use crate::validation::{validate_anilist_key, validate_sync_profile};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

pub const PATH_ANILIST_KEY: &str = "/api/anilist/key";
pub const PATH_ANILIST_SYNC: &str = "/api/anilist/sync";

/// Whose list a sync pulls in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    /// The account linked to the signed-in user.
    LinkedAccount,
    /// Someone's public profile, by exactly one of username or numeric id.
    PublicProfile {
        username: Option<String>,
        user_id: Option<u64>,
    },
}

impl SyncTarget {
    fn request_body(&self) -> Result<Value, ApiError> {
        match self {
            Self::LinkedAccount => Ok(json!({})),
            Self::PublicProfile { username, user_id } => {
                validate_sync_profile(username.as_deref(), *user_id)?;
                Ok(match (username.as_deref().map(str::trim), user_id) {
                    (Some(name), _) if !name.is_empty() => json!({ "username": name }),
                    (_, Some(id)) => json!({ "userId": id }),
                    _ => json!({}),
                })
            }
        }
    }
}

fn parse_summary(body: &Value) -> SyncSummary {
    let data = body.get("data").unwrap_or(body);
    serde_json::from_value::<SyncSummary>(data.clone()).unwrap_or(SyncSummary {
        synced_entries: 0,
        username: None,
        synced_at: None,
    })
}

/// What this process knows about the linked key; never the key itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    pub key_present: bool,
    pub secure_storage: bool,
}

pub struct AniListApi {
    api: Arc<ApiClient>,
    key: SecretManager,
}

impl AniListApi {
    pub fn new(api: Arc<ApiClient>, key: SecretManager) -> Self {
        Self { api, key }
    }

    /// Stores or replaces the linked-account key. `permanent` keeps a copy in
    /// secure storage; otherwise the key lives only for this process.
    pub async fn save_key(&self, key: &str, permanent: bool) -> Result<(), ApiError> {
        validate_anilist_key(key)?;
        let key = key.trim();
        let body = self
            .api
            .dispatch(ApiRequest::post(
                PATH_ANILIST_KEY,
                json!({ "apiKey": key, "permanent": permanent }),
            ))
            .await?;
        reject_reported_failure(&body)?;

        self.key.set_in_memory(Some(key.to_string())).await;
        if permanent {
            if let Err(e) = self.key.remember(key).await {
                warn!(error = %e, "could not persist AniList key; keeping it for this session");
            }
        } else {
            let _ = self.key.delete_persisted().await;
        }
        info!(permanent, "AniList key saved");
        Ok(())
    }

    /// Unlinks server-side; local copies are dropped even if that fails.
    pub async fn delete_key(&self) -> Result<(), ApiError> {
        let outcome = self
            .api
            .dispatch(ApiRequest::delete(PATH_ANILIST_KEY))
            .await
            .and_then(|body| reject_reported_failure(&body));
        let _ = self.key.forget_all().await;
        outcome
    }

    pub async fn current_key(&self, remember: bool) -> Option<String> {
        match self.key.get_current(remember).await {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "could not read AniList key");
                None
            }
        }
    }

    /// Loads a remembered key from secure storage when `remember` allows it.
    pub async fn restore_key(&self, remember: bool) -> bool {
        let restored = self.current_key(remember).await.is_some();
        if restored {
            info!("AniList key available");
        }
        restored
    }

    pub async fn key_status(&self, remember: bool) -> KeyStatus {
        KeyStatus {
            key_present: self.current_key(remember).await.is_some(),
            secure_storage: self.key.is_available(),
        }
    }

    pub async fn sync(&self, target: &SyncTarget) -> Result<SyncSummary, ApiError> {
        let request_body = target.request_body()?;
        let body = self
            .api
            .dispatch(ApiRequest::post(PATH_ANILIST_SYNC, request_body))
            .await?;
        reject_reported_failure(&body)?;
        let summary = parse_summary(&body);
        info!(entries = summary.synced_entries, "AniList sync finished");
        Ok(summary)
    }
}
