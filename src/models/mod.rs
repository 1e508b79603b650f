//! Shared types used across all modules.
//!
//! This module defines the core data structures for diffs, prompts,
//! review targets, and the review error taxonomy. Other modules import
//! from here rather than reaching into each other's internals.

pub mod diff;
pub mod prompt;
pub mod target;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use diff::FileDiff;
pub use prompt::{Prompt, PromptSegment, SegmentKind};
pub use target::{PageContext, Provider, ReviewInput, ReviewTarget, TargetIdentity};

/// How the chat backend consumes a prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStyle {
    /// Key-authenticated chat-completions API; one call per segment,
    /// threaded by parent message id.
    #[default]
    Api,
    /// Session-cookie authenticated web backend; one call carrying the
    /// whole composed prompt.
    Web,
}

impl fmt::Display for ChatStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatStyle::Api => write!(f, "api"),
            ChatStyle::Web => write!(f, "web"),
        }
    }
}

impl std::str::FromStr for ChatStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "api" => Ok(ChatStyle::Api),
            "web" => Ok(ChatStyle::Web),
            other => Err(format!("unsupported backend: '{other}'. Supported: api, web")),
        }
    }
}

/// Why a review attempt did not produce a rendered review.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewError {
    /// The page is not a recognised pull/merge request.
    #[error("{0}")]
    UnsupportedTarget(String),

    /// No API key / not logged in.
    #[error("{0}")]
    MissingCredential(String),

    /// Diff or description retrieval failed.
    #[error("failed to fetch review context: {0}")]
    FetchFailure(String),

    /// Non-2xx response from the AI backend.
    #[error("backend error {status}: {detail}")]
    Backend { status: u16, detail: String },

    /// The connection failed mid-transfer.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ReviewError {
    /// Whether the user can retry from the same page with a rerun.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReviewError::UnsupportedTarget(_))
    }
}
