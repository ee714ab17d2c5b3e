//! Client configuration.
//!
//! Loaded from a JSON file; every field has a default so an empty object
//! is a valid configuration. Durations are plain milliseconds on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::protocol::{EndpointError, Endpoints, FeedPaths};
use crate::state::connection::BackoffPolicy;

/// Error loading configuration or cached data.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

/// Reconnection settings for the push feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    pub base_ms: u64,
    pub max_ms: u64,
    pub construction_retry_ms: u64,
    /// `null` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            base_ms: policy.base.as_millis() as u64,
            max_ms: policy.max.as_millis() as u64,
            construction_retry_ms: policy.construction_retry.as_millis() as u64,
            max_attempts: policy.max_attempts,
        }
    }
}

impl BackoffSettings {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(self.base_ms),
            max: Duration::from_millis(self.max_ms),
            construction_retry: Duration::from_millis(self.construction_retry_ms),
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Controller HTTP base
    pub api_base: String,
    pub game_state_path: String,
    pub magazine_status_path: String,
    pub camera_path: String,
    pub backoff: BackoffSettings,
    pub prompt_window_ms: u64,
    pub request_timeout_ms: u64,
    pub carousel_len: usize,
    pub nickname_cache: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/".to_string(),
            game_state_path: "/ws/game_state".to_string(),
            magazine_status_path: "/ws/magazine_status".to_string(),
            camera_path: "/ws/camera".to_string(),
            backoff: BackoffSettings::default(),
            prompt_window_ms: crate::state::prompt::DEFAULT_PROMPT_WINDOW.as_millis() as u64,
            request_timeout_ms: 10_000,
            carousel_len: crate::state::hardware::DEFAULT_CAROUSEL_LEN,
            nickname_cache: None,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        debug!(path = %path.display(), api_base = %config.api_base, "loaded client config");
        Ok(config)
    }

    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        let base = Url::parse(&self.api_base).map_err(EndpointError::from)?;
        Ok(Endpoints::new(
            &base,
            FeedPaths {
                game_state: &self.game_state_path,
                magazine_status: &self.magazine_status_path,
                camera: &self.camera_path,
            },
        )?)
    }

    pub fn prompt_window(&self) -> Duration {
        Duration::from_millis(self.prompt_window_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CachedNickname {
    nickname: String,
}

/// Last nickname entered on the start screen, kept across restarts.
#[derive(Debug, Clone)]
pub struct NicknameCache {
    path: PathBuf,
}

impl NicknameCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The cached nickname. A missing or unreadable file yields `None`.
    pub fn load(&self) -> Option<String> {
        let text = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<CachedNickname>(&text) {
            Ok(cached) => Some(cached.nickname).filter(|n| !n.is_empty()),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring corrupt nickname cache");
                None
            }
        }
    }

    pub fn store(&self, nickname: &str) -> Result<(), ConfigError> {
        let io = |source: std::io::Error| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io)?;
        }
        let text = serde_json::to_string(&CachedNickname {
            nickname: nickname.to_string(),
        })?;
        fs::write(&self.path, text).map_err(io)
    }
}
