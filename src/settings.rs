use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SETTINGS_FILE: &str = "anichat-settings.json";
const SETTINGS_PATH_ENV: &str = "ANICHAT_SETTINGS";
const API_URL_ENV: &str = "ANICHAT_API_URL";

pub const KEY_API_BASE_URL: &str = "apiBaseUrl";
pub const KEY_POST_AUTH_SETTLE_MS: &str = "postAuthSettleMs";
pub const KEY_REMEMBER_ANILIST_KEY: &str = "rememberAniListKey";
pub const KEY_LOG_FILTER: &str = "logFilter";

#[derive(Debug, Error)]
pub enum SettingsError {
  #[error("could not read settings file {path}: {source}")]
  Read {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("settings file {path} is not valid json: {source}")]
  Parse {
    path: PathBuf,
    source: serde_json::Error,
  },
  #[error("settings file {path} must contain a json object")]
  NotAnObject { path: PathBuf },
}

fn defaults() -> HashMap<String, Value> {
  HashMap::from([
    (KEY_API_BASE_URL.to_string(), json!(crate::client::DEFAULT_BASE_URL)),
    (KEY_POST_AUTH_SETTLE_MS.to_string(), json!(100)),
    (KEY_REMEMBER_ANILIST_KEY.to_string(), json!(false)),
    (KEY_LOG_FILTER.to_string(), json!("info")),
  ])
}

/// Read-only view over the settings file layered on top of the defaults.
#[derive(Debug, Clone)]
pub struct SettingsStore {
  values: HashMap<String, Value>,
}

impl Default for SettingsStore {
  fn default() -> Self {
    Self { values: defaults() }
  }
}

impl SettingsStore {
  pub fn default_path() -> PathBuf {
    std::env::var(SETTINGS_PATH_ENV)
      .ok()
      .map(|p| p.trim().to_string())
      .filter(|p| !p.is_empty())
      .map(PathBuf::from)
      .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE))
  }

  /// Missing file means defaults; a broken file is an error.
  pub fn load(path: &Path) -> Result<Self, SettingsError> {
    let text = match std::fs::read_to_string(path) {
      Ok(text) => text,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
      Err(source) => {
        return Err(SettingsError::Read {
          path: path.to_path_buf(),
          source,
        })
      }
    };
    Self::from_json_str(&text).map_err(|e| match e {
      SettingsError::Parse { source, .. } => SettingsError::Parse {
        path: path.to_path_buf(),
        source,
      },
      SettingsError::NotAnObject { .. } => SettingsError::NotAnObject {
        path: path.to_path_buf(),
      },
      other => other,
    })
  }

  pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
    let parsed: Value = serde_json::from_str(text).map_err(|source| SettingsError::Parse {
      path: PathBuf::new(),
      source,
    })?;
    let Value::Object(obj) = parsed else {
      return Err(SettingsError::NotAnObject {
        path: PathBuf::new(),
      });
    };
    let mut values = defaults();
    values.extend(obj);
    Ok(Self { values })
  }

  pub fn get_u64(&self, key: &str, fallback: u64) -> u64 {
    self
      .values
      .get(key)
      .and_then(|v| v.as_u64())
      .unwrap_or(fallback)
  }

  pub fn get_bool(&self, key: &str, fallback: bool) -> bool {
    self
      .values
      .get(key)
      .and_then(|v| v.as_bool())
      .unwrap_or(fallback)
  }

  pub fn get_string(&self, key: &str) -> Option<String> {
    let v = self.values.get(key)?;
    let s = v.as_str()?.trim();
    if s.is_empty() {
      None
    } else {
      Some(s.to_string())
    }
  }

  /// The environment wins over the file for the backend location.
  pub fn api_base_url(&self) -> String {
    std::env::var(API_URL_ENV)
      .ok()
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty())
      .or_else(|| self.get_string(KEY_API_BASE_URL))
      .unwrap_or_else(|| crate::client::DEFAULT_BASE_URL.to_string())
  }

  pub fn post_auth_settle(&self) -> std::time::Duration {
    std::time::Duration::from_millis(self.get_u64(KEY_POST_AUTH_SETTLE_MS, 100))
  }

  pub fn remember_anilist_key(&self) -> bool {
    self.get_bool(KEY_REMEMBER_ANILIST_KEY, false)
  }

  pub fn log_filter(&self) -> String {
    self
      .get_string(KEY_LOG_FILTER)
      .unwrap_or_else(|| "info".to_string())
  }
}
