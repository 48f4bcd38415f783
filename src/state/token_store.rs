use std::sync::Arc;
use tokio::sync::RwLock;

/// The single in-memory slot holding the bearer access token.
///
/// Cloning shares the slot. Only the session manager (and the dispatcher on
/// its behalf) writes; everyone else reads. Nothing here touches disk.
#[derive(Clone, Default)]
pub struct TokenStore {
    slot: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<String> {
        self.slot.read().await.clone()
    }

    pub async fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let trimmed = token.trim();
        let mut guard = self.slot.write().await;
        *guard = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }

    pub async fn clear(&self) {
        let mut guard = self.slot.write().await;
        *guard = None;
    }

    pub async fn is_present(&self) -> bool {
        self.slot.read().await.is_some()
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}
