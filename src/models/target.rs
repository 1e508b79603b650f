//! Review target types: which pull/merge request is being reviewed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Code hosting provider of a review target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    GitHub,
    GitLab,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::GitHub => write!(f, "GitHub"),
            Provider::GitLab => write!(f, "GitLab"),
        }
    }
}

/// Stable key for one reviewed artifact, used for caching and rerun
/// correlation. Derived from the patch URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetIdentity(String);

impl TargetIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved pull request or merge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTarget {
    pub provider: Provider,
    /// The page the user pointed us at.
    pub page_url: String,
    /// Where the unified diff for the change can be downloaded.
    pub patch_url: String,
    /// Short human-readable name, e.g. `owner/repo#12` or `group/project!7`.
    pub display_name: String,
}

impl ReviewTarget {
    /// The cache and session key for this target.
    pub fn identity(&self) -> TargetIdentity {
        TargetIdentity::new(self.patch_url.clone())
    }
}

/// Human-authored context scraped from the PR/MR page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContext {
    /// Page `<title>` text (empty when the page has none).
    pub title: String,
    /// PR/MR description (empty when the page has none).
    pub description: String,
}

/// Everything needed to compose a prompt for a target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewInput {
    pub title: String,
    pub description: String,
    pub patch: String,
}
