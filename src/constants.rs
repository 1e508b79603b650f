//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! prompt limits, and backend URLs so a rename only requires changing this file.

use std::time::Duration;

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "prlens";

/// Crate version, as printed by `prlens version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compilation target triple (set by `build.rs`).
pub const TARGET: &str = env!("TARGET");

/// Local config filename (e.g. `.prlens.toml` in the working directory).
pub const CONFIG_FILENAME: &str = ".prlens.toml";

/// Directory name under `~/.config/` for global config, and under the
/// runtime/cache directory for the session store.
pub const CONFIG_DIR: &str = "prlens";

/// `User-Agent` sent with every outgoing request.
pub const USER_AGENT: &str = concat!("prlens/", env!("CARGO_PKG_VERSION"));

// ── Prompt limits ───────────────────────────────────────────────────

/// Per-segment character ceiling.
///
/// Roughly 4 characters per token for a 4096-token context, minus a
/// 1000-character margin.
pub const DEFAULT_CHUNK_CEILING: usize = 15384;

/// Delay before an unsupported-page error dismisses itself.
pub const DEFAULT_DISMISS_DELAY: Duration = Duration::from_secs(4);

// ── Backends ────────────────────────────────────────────────────────

/// Default base URL for the key-authenticated chat-completions API.
pub const OPENAI_API_BASE: &str = "https://api.openai.com";

/// Default base URL for the session-cookie authenticated web backend.
pub const CHATGPT_WEB_BASE: &str = "https://chat.openai.com";

/// Cookie that carries the web session token.
pub const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";

/// Default model for the API backend.
pub const DEFAULT_API_MODEL: &str = "gpt-3.5-turbo";

/// Default model for the web backend.
pub const DEFAULT_WEB_MODEL: &str = "text-davinci-002-render";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_BACKEND: &str = "PRLENS_BACKEND";
pub const ENV_MODEL: &str = "PRLENS_MODEL";
pub const ENV_API_KEY: &str = "PRLENS_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_SESSION_TOKEN: &str = "PRLENS_SESSION_TOKEN";
pub const ENV_BASE_URL: &str = "PRLENS_BASE_URL";
pub const ENV_LOG: &str = "PRLENS_LOG";
