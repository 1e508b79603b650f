//! Review context retrieval: which change to review, its patch, and the
//! title and description written by its author.

pub mod page;
pub mod target;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ReviewError, ReviewInput, ReviewTarget};

pub use page::extract_context;
pub use target::resolve_target;

/// Errors from fetching review context.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

impl From<SourceError> for ReviewError {
    fn from(err: SourceError) -> Self {
        ReviewError::FetchFailure(err.to_string())
    }
}

/// Where patches and PR/MR pages come from.
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Fetch the patch and page context for `target`.
    async fn fetch(&self, target: &ReviewTarget) -> Result<ReviewInput, SourceError>;
}

/// Fetches patches and pages over HTTP.
pub struct HttpContextSource {
    http: reqwest::Client,
}

impl HttpContextSource {
    pub fn new() -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent(crate::constants::USER_AGENT)
            .build()
            .map_err(|source| SourceError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        let http_err = |source| SourceError::Http {
            url: url.to_string(),
            source,
        };
        let response = self.http.get(url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(http_err)
    }
}

#[async_trait]
impl ContextSource for HttpContextSource {
    async fn fetch(&self, target: &ReviewTarget) -> Result<ReviewInput, SourceError> {
        tracing::debug!(patch = %target.patch_url, page = %target.page_url, "fetching review context");
        let (patch, html) = tokio::try_join!(
            self.fetch_text(&target.patch_url),
            self.fetch_text(&target.page_url),
        )?;
        let context = extract_context(target.provider, &html);
        tracing::debug!(
            patch_bytes = patch.len(),
            description_bytes = context.description.len(),
            "fetched review context"
        );
        Ok(ReviewInput {
            title: context.title,
            description: context.description,
            patch,
        })
    }
}
