//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.prlens.toml` in the working directory
//! 4. `~/.config/prlens/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{
    CHATGPT_WEB_BASE, DEFAULT_API_MODEL, DEFAULT_CHUNK_CEILING, DEFAULT_DISMISS_DELAY,
    DEFAULT_WEB_MODEL, OPENAI_API_BASE,
};
use crate::diff::ChunkOptions;
use crate::diff::chunker::DEFAULT_LOCKFILE_PATTERN;
use crate::env::Env;
use crate::models::ChatStyle;
use crate::orchestrator::ReviewSettings;

/// Smallest usable chunk ceiling: room for the fence, a header and a line.
const MIN_CHUNK_CEILING: usize = 256;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid review.lockfile_pattern '{pattern}': {source}")]
    LockfilePattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("review.chunk_ceiling must be at least {MIN_CHUNK_CEILING}, got {0}")]
    ChunkCeiling(usize),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub review: ReviewConfig,
    pub cache: CacheConfig,
}

/// Chat backend configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub backend: ChatStyle,
    /// Model name; defaults depend on the backend.
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// API key for the `api` backend.
    #[serde(alias = "openai_apikey")]
    pub api_key: Option<String>,
    /// Browser session cookie for the `web` backend.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ProviderConfig {
    /// Configured model, or the backend's default.
    pub fn model(&self) -> String {
        match (&self.model, self.backend) {
            (Some(model), _) => model.clone(),
            (None, ChatStyle::Api) => DEFAULT_API_MODEL.to_string(),
            (None, ChatStyle::Web) => DEFAULT_WEB_MODEL.to_string(),
        }
    }

    /// Configured base URL, or the backend's default.
    pub fn base_url(&self) -> String {
        match (&self.base_url, self.backend) {
            (Some(url), _) => url.clone(),
            (None, ChatStyle::Api) => OPENAI_API_BASE.to_string(),
            (None, ChatStyle::Web) => CHATGPT_WEB_BASE.to_string(),
        }
    }

    /// API key, unless blank.
    pub fn api_key(&self) -> Option<String> {
        non_blank(&self.api_key)
    }

    /// Web session token, unless blank.
    pub fn session_token(&self) -> Option<String> {
        non_blank(&self.session_token)
    }

    /// Whether the selected backend has a credential to use.
    pub fn has_credential(&self) -> bool {
        match self.backend {
            ChatStyle::Api => self.api_key().is_some(),
            ChatStyle::Web => self.session_token().is_some(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

/// Review-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Maximum characters per prompt segment.
    pub chunk_ceiling: usize,
    /// Files whose original path matches are left out of the review.
    pub lockfile_pattern: String,
    /// Seconds an unsupported-page message stays up.
    pub dismiss_delay_secs: u64,
    /// External review tool URL; `{url}` is replaced with the page URL.
    pub external_link: Option<String>,
    /// Self-hosted GitLab hosts, e.g. `git.example.org`.
    pub gitlab_hosts: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            chunk_ceiling: DEFAULT_CHUNK_CEILING,
            lockfile_pattern: DEFAULT_LOCKFILE_PATTERN.to_string(),
            dismiss_delay_secs: DEFAULT_DISMISS_DELAY.as_secs(),
            external_link: None,
            gitlab_hosts: Vec::new(),
        }
    }
}

impl ReviewConfig {
    /// Validate and convert into orchestrator settings.
    pub fn settings(&self) -> Result<ReviewSettings, ConfigError> {
        if self.chunk_ceiling < MIN_CHUNK_CEILING {
            return Err(ConfigError::ChunkCeiling(self.chunk_ceiling));
        }
        let chunk = ChunkOptions::new(self.chunk_ceiling, &self.lockfile_pattern).map_err(|e| {
            ConfigError::LockfilePattern {
                pattern: self.lockfile_pattern.clone(),
                source: e,
            }
        })?;
        Ok(ReviewSettings {
            chunk,
            dismiss_delay: Duration::from_secs(self.dismiss_delay_secs),
            gitlab_hosts: self.gitlab_hosts.clone(),
            external_link: self.external_link.clone(),
        })
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Overrides the session directory.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, the local config in `local_dir`, then
    /// applies environment variable overrides.
    pub fn load(local_dir: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        Self::load_layers(Self::global_config_path().as_deref(), local_dir, env)
    }

    fn load_layers(
        global_path: Option<&Path>,
        local_dir: Option<&Path>,
        env: &Env,
    ) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Layer 4: global config
        if let Some(global_path) = global_path {
            if global_path.exists() {
                let global = Self::load_file(global_path)?;
                config.merge(global);
            }
        }

        // Layer 3: local config
        if let Some(dir) = local_dir {
            let local_path = dir.join(crate::constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        // Layer 2: environment variables
        config.apply_env_vars(env);

        tracing::debug!(?config, "loaded configuration");
        Ok(config)
    }

    /// Load a config from a specific file.
    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the global config file path.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::constants::CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one (other takes precedence for
    /// non-default values).
    fn merge(&mut self, other: Config) {
        // Provider settings
        if other.provider.backend != ChatStyle::default() {
            self.provider.backend = other.provider.backend;
        }
        if other.provider.model.is_some() {
            self.provider.model = other.provider.model.clone();
        }
        if other.provider.base_url.is_some() {
            self.provider.base_url = other.provider.base_url.clone();
        }
        // A blank credential in a later layer does not unset an earlier one.
        if let Some(key) = other.provider.api_key() {
            self.provider.api_key = Some(key);
        }
        if let Some(token) = other.provider.session_token() {
            self.provider.session_token = Some(token);
        }

        // Review settings
        let default_review = ReviewConfig::default();
        if other.review.chunk_ceiling != default_review.chunk_ceiling {
            self.review.chunk_ceiling = other.review.chunk_ceiling;
        }
        if other.review.lockfile_pattern != default_review.lockfile_pattern {
            self.review.lockfile_pattern = other.review.lockfile_pattern;
        }
        if other.review.dismiss_delay_secs != default_review.dismiss_delay_secs {
            self.review.dismiss_delay_secs = other.review.dismiss_delay_secs;
        }
        if other.review.external_link.is_some() {
            self.review.external_link = other.review.external_link;
        }
        for host in other.review.gitlab_hosts {
            if !self.review.gitlab_hosts.contains(&host) {
                self.review.gitlab_hosts.push(host);
            }
        }

        // Cache settings (disabled overrides enabled)
        if !other.cache.enabled {
            self.cache.enabled = false;
        }
        if other.cache.dir.is_some() {
            self.cache.dir = other.cache.dir;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        use crate::constants::{
            ENV_API_KEY, ENV_BACKEND, ENV_BASE_URL, ENV_MODEL, ENV_OPENAI_API_KEY,
            ENV_SESSION_TOKEN,
        };

        if let Some(val) = env.var(ENV_BACKEND) {
            match val.parse::<ChatStyle>() {
                Ok(backend) => self.provider.backend = backend,
                Err(e) => tracing::warn!("ignoring invalid {ENV_BACKEND} value: {e}"),
            }
        }
        if let Some(val) = env.var(ENV_MODEL) {
            self.provider.model = Some(val);
        }
        if let Some(val) = env.var(ENV_BASE_URL) {
            self.provider.base_url = Some(val);
        }
        if let Some(val) = env.first_of(&[ENV_API_KEY, ENV_OPENAI_API_KEY]) {
            self.provider.api_key = Some(val);
        }
        if let Some(val) = env.var(ENV_SESSION_TOKEN) {
            self.provider.session_token = Some(val);
        }
    }
}
