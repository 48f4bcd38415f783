use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

const KEYRING_SERVICE: &str = "com.softaworks.anichat";
pub const KEYRING_USER_ANILIST_KEY: &str = "anilist_api_key";

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secure storage is not available")]
    Unavailable,
    #[error("secure storage failed: {0}")]
    Backend(String),
}

/// Where remembered secrets live between runs.
pub trait SecretBackend: Send + Sync {
    fn is_available(&self) -> bool;
    fn read(&self, user: &str) -> Result<Option<String>, SecretError>;
    fn write(&self, user: &str, value: &str) -> Result<(), SecretError>;
    fn delete(&self, user: &str) -> Result<(), SecretError>;
}

pub struct KeyringBackend;

impl KeyringBackend {
    fn entry(user: &str) -> Result<keyring::Entry, keyring::Error> {
        keyring::Entry::new(KEYRING_SERVICE, user)
    }
}

fn map_keyring_error(err: keyring::Error) -> SecretError {
    match err {
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
            SecretError::Unavailable
        }
        other => SecretError::Backend(other.to_string()),
    }
}

impl SecretBackend for KeyringBackend {
    fn is_available(&self) -> bool {
        let Ok(entry) = Self::entry(KEYRING_USER_ANILIST_KEY) else {
            return false;
        };

        match entry.get_password() {
            Ok(_) => true,
            Err(keyring::Error::NoEntry) => true,
            Err(keyring::Error::BadEncoding(_)) => true,
            Err(keyring::Error::Ambiguous(_)) => true,
            Err(_) => false,
        }
    }

    fn read(&self, user: &str) -> Result<Option<String>, SecretError> {
        let entry = Self::entry(user).map_err(map_keyring_error)?;
        match entry.get_password() {
            Ok(pwd) => Ok(Some(pwd)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e @ keyring::Error::NoStorageAccess(_)) => Err(map_keyring_error(e)),
            Err(e @ keyring::Error::PlatformFailure(_)) => Err(map_keyring_error(e)),
            Err(_) => Ok(None),
        }
    }

    fn write(&self, user: &str, value: &str) -> Result<(), SecretError> {
        let entry = Self::entry(user).map_err(map_keyring_error)?;
        entry.set_password(value).map_err(map_keyring_error)
    }

    fn delete(&self, user: &str) -> Result<(), SecretError> {
        if let Ok(entry) = Self::entry(user) {
            let _ = entry.delete_credential();
        }
        Ok(())
    }
}

/// Process-local backend, used when no keyring is wanted and in tests.
#[derive(Default)]
pub struct MemoryBackend {
    values: std::sync::Mutex<HashMap<String, String>>,
}

impl SecretBackend for MemoryBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn read(&self, user: &str) -> Result<Option<String>, SecretError> {
        let values = self
            .values
            .lock()
            .map_err(|_| SecretError::Backend("poisoned".to_string()))?;
        Ok(values.get(user).cloned())
    }

    fn write(&self, user: &str, value: &str) -> Result<(), SecretError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| SecretError::Backend("poisoned".to_string()))?;
        values.insert(user.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, user: &str) -> Result<(), SecretError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| SecretError::Backend("poisoned".to_string()))?;
        values.remove(user);
        Ok(())
    }
}

/// A secret held in memory for the session, optionally remembered by the
/// backend when the user picked permanent retention.
#[derive(Clone)]
pub struct SecretManager {
    user: &'static str,
    backend: Arc<dyn SecretBackend>,
    in_memory: Arc<Mutex<Option<String>>>,
}

impl SecretManager {
    pub fn new(user: &'static str) -> Self {
        Self::with_backend(user, Arc::new(KeyringBackend))
    }

    pub fn with_backend(user: &'static str, backend: Arc<dyn SecretBackend>) -> Self {
        Self {
            user,
            backend,
            in_memory: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    pub async fn set_in_memory(&self, value: Option<String>) {
        let mut guard = self.in_memory.lock().await;
        *guard = value.and_then(|v| {
            let trimmed = v.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        });
    }

    pub async fn get_current(&self, remember: bool) -> Result<Option<String>, SecretError> {
        if let Some(value) = self.in_memory.lock().await.clone() {
            return Ok(Some(value));
        }

        if !remember {
            return Ok(None);
        }

        match self.backend.read(self.user)? {
            Some(pwd) => {
                let trimmed = pwd.trim().to_string();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    self.set_in_memory(Some(trimmed.clone())).await;
                    Ok(Some(trimmed))
                }
            }
            None => Ok(None),
        }
    }

    pub async fn remember(&self, value: &str) -> Result<(), SecretError> {
        self.backend.write(self.user, value.trim())
    }

    pub async fn delete_persisted(&self) -> Result<(), SecretError> {
        self.backend.delete(self.user)
    }

    pub async fn forget_all(&self) -> Result<(), SecretError> {
        let _ = self.delete_persisted().await;
        self.set_in_memory(None).await;
        Ok(())
    }
}
