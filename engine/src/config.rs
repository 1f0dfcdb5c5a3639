use serde::Deserialize;
use std::time::Duration;
use std::{env, fs, path::Path, path::PathBuf};

use lingqian_providers::{DEFAULT_GENERATION_TIMEOUT, gemini};

use crate::RitualTimings;

/// Environment variable that overrides the configured Gemini API key.
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Default, Deserialize)]
pub struct LingqianConfig {
    pub app: Option<AppConfig>,
    pub api_keys: Option<ApiKeys>,
    pub ritual: Option<RitualConfig>,
    pub provider: Option<ProviderConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Gemini model identifier used for generation.
    pub model: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct ApiKeys {
    pub google: Option<String>,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let google = if self.google.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ApiKeys").field("google", &google).finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RitualConfig {
    pub shake_ms: Option<u64>,
    pub reveal_ms: Option<u64>,
    pub resolve_grace_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderConfig {
    /// Ceiling on a live generation attempt, in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl LingqianConfig {
    /// Load from a TOML file. A missing file yields the defaults; a present
    /// but unreadable or malformed file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the Gemini API key: the `GEMINI_API_KEY` environment variable
    /// wins over the config file.
    #[must_use]
    pub fn google_api_key(&self) -> Option<String> {
        resolve_api_key(
            env::var(API_KEY_ENV_VAR).ok(),
            self.api_keys.as_ref().and_then(|keys| keys.google.as_deref()),
        )
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.app
            .as_ref()
            .and_then(|app| app.model.as_deref())
            .unwrap_or(gemini::DEFAULT_MODEL)
    }

    #[must_use]
    pub fn timings(&self) -> RitualTimings {
        let defaults = RitualTimings::default();
        let Some(ritual) = self.ritual.as_ref() else {
            return defaults;
        };
        RitualTimings {
            shake: ritual.shake_ms.map_or(defaults.shake, Duration::from_millis),
            reveal: ritual
                .reveal_ms
                .map_or(defaults.reveal, Duration::from_millis),
            resolve_grace: ritual
                .resolve_grace_ms
                .map_or(defaults.resolve_grace, Duration::from_millis),
        }
    }

    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        self.provider
            .as_ref()
            .and_then(|provider| provider.timeout_ms)
            .map_or(DEFAULT_GENERATION_TIMEOUT, Duration::from_millis)
    }
}

fn resolve_api_key(env_value: Option<String>, file_value: Option<&str>) -> Option<String> {
    env_value
        .filter(|key| !key.trim().is_empty())
        .or_else(|| file_value.map(str::to_string))
        .filter(|key| !key.trim().is_empty())
}
