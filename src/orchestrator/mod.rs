//! Review orchestrator: one review session from page URL to rendered review.
//!
//! A session moves through
//! `Idle → ResolvingTarget → FetchingContext → Streaming → Rendered | Failed`.
//! Cached reviews skip straight to `Rendered`. Every round of streaming is
//! stamped with a generation number; events from older rounds are dropped,
//! so a rerun can start while a previous stream is still in flight.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResultCache;
use crate::constants::DEFAULT_DISMISS_DELAY;
use crate::diff::{ChunkOptions, chunk_patch, strip_binary_patches};
use crate::models::{ReviewError, ReviewInput, ReviewTarget};
use crate::prompt::{compose, truncation_warning};
use crate::providers::{ChatEvent, ChatStream, Outcome, StreamingChatClient, TaggedEvent};
use crate::render::{RenderSink, markdown_to_html};
use crate::source::{ContextSource, resolve_target};

/// Where a session currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    Idle,
    ResolvingTarget,
    FetchingContext,
    Streaming,
    Rendered,
    Failed(ReviewError),
}

/// Knobs that shape a review.
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub chunk: ChunkOptions,
    /// How long an unsupported-page message stays up before the sink closes.
    pub dismiss_delay: Duration,
    /// Self-hosted GitLab instances.
    pub gitlab_hosts: Vec<String>,
    /// External review tool URL template; `{url}` is the page URL.
    pub external_link: Option<String>,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            chunk: ChunkOptions::default(),
            dismiss_delay: DEFAULT_DISMISS_DELAY,
            gitlab_hosts: Vec::new(),
            external_link: None,
        }
    }
}

/// Per-target state held across reruns.
#[derive(Debug)]
struct ReviewSession {
    target: ReviewTarget,
    /// Caller-supplied title, preferred over the page title.
    title: Option<String>,
    /// Fetched context; absent when the review was served from cache.
    input: Option<ReviewInput>,
    /// Shown under the review when the prompt was cut; empty otherwise.
    warning: String,
    html: String,
}

/// Render a (partial) review with the truncation warning appended.
pub fn render_review(text: &str, warning: &str) -> String {
    markdown_to_html(&format!("{text}\n\n{warning}"))
}

/// Drives review sessions against a chat backend and a render sink.
pub struct ReviewOrchestrator {
    client: Arc<dyn StreamingChatClient>,
    source: Arc<dyn ContextSource>,
    cache: ResultCache,
    sink: Box<dyn RenderSink>,
    settings: ReviewSettings,
    state: ReviewState,
    generation: u64,
    session: Option<ReviewSession>,
}

impl ReviewOrchestrator {
    pub fn new(
        client: Arc<dyn StreamingChatClient>,
        source: Arc<dyn ContextSource>,
        cache: ResultCache,
        sink: Box<dyn RenderSink>,
        settings: ReviewSettings,
    ) -> Self {
        Self {
            client,
            source,
            cache,
            sink,
            settings,
            state: ReviewState::Idle,
            generation: 0,
            session: None,
        }
    }

    pub fn state(&self) -> &ReviewState {
        &self.state
    }

    /// Generation of the current round.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn target(&self) -> Option<&ReviewTarget> {
        self.session.as_ref().map(|s| &s.target)
    }

    /// Whether a rerun would do anything.
    pub fn can_rerun(&self) -> bool {
        self.session.is_some()
            && match &self.state {
                ReviewState::Streaming | ReviewState::Rendered => true,
                ReviewState::Failed(err) => err.is_retryable(),
                _ => false,
            }
    }

    fn transition(&mut self, state: ReviewState) {
        tracing::debug!(from = ?self.state, to = ?state, generation = self.generation, "review state");
        self.state = state;
    }

    /// Begin a session for `page_url`.
    ///
    /// Returns the stream to drain when the backend has to be asked, or
    /// `None` when the session already ended (served from cache, or failed).
    pub async fn start(&mut self, page_url: &str, title: Option<&str>) -> Option<ChatStream> {
        self.generation += 1;
        self.session = None;
        self.sink.show_progress();
        self.transition(ReviewState::ResolvingTarget);

        let target = match resolve_target(page_url, &self.settings.gitlab_hosts) {
            Ok(target) => target,
            Err(err) => {
                tracing::info!(url = page_url, error = %err, "not a reviewable page");
                self.dismiss(err).await;
                return None;
            }
        };
        tracing::info!(target = %target.display_name, generation = self.generation, "starting review");

        let identity = target.identity();
        self.session = Some(ReviewSession {
            target,
            title: title.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string),
            input: None,
            warning: String::new(),
            html: String::new(),
        });

        if let Some(html) = self.cache.get(&identity) {
            tracing::debug!(key = %identity, "serving review from cache");
            self.sink.show_result(&html);
            if let Some(session) = self.session.as_mut() {
                session.html = html;
            }
            self.sink.show_done(false, true);
            self.transition(ReviewState::Rendered);
            return None;
        }

        self.begin_round().await
    }

    /// Throw away the current result and ask the backend again.
    ///
    /// Any stream from the previous round becomes stale.
    pub async fn restart(&mut self) -> Option<ChatStream> {
        if !self.can_rerun() {
            tracing::debug!(state = ?self.state, "rerun not available");
            return None;
        }
        let identity = self.session.as_ref()?.target.identity();
        tracing::info!(key = %identity, "rerunning review");
        self.cache.evict(&identity);
        self.generation += 1;
        self.sink.show_result("");
        self.sink.show_progress();
        self.begin_round().await
    }

    /// Fetch context if none is held, compose the prompt and send it.
    async fn begin_round(&mut self) -> Option<ChatStream> {
        let session = self.session.as_ref()?;
        if session.input.is_none() {
            let target = session.target.clone();
            self.transition(ReviewState::FetchingContext);
            match self.source.fetch(&target).await {
                Ok(input) => {
                    if let Some(session) = self.session.as_mut() {
                        session.input = Some(input);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to fetch review context");
                    self.fail(err.into());
                    return None;
                }
            }
        }

        let session = self.session.as_mut()?;
        let input = session.input.as_ref()?;
        let title = session
            .title
            .clone()
            .or_else(|| Some(input.title.trim().to_string()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| session.target.display_name.clone());

        let patch = strip_binary_patches(&input.patch);
        let chunks = chunk_patch(&patch, &self.settings.chunk);
        let prompt = compose(&title, &input.description, &chunks, self.settings.chunk.ceiling);
        tracing::debug!(
            segments = prompt.segments.len(),
            chunks = chunks.texts.len(),
            skipped_files = chunks.skipped,
            truncated = prompt.truncated,
            "composed prompt"
        );
        session.warning = if prompt.truncated {
            truncation_warning(self.settings.chunk.ceiling)
        } else {
            String::new()
        };
        session.html.clear();

        self.transition(ReviewState::Streaming);
        Some(self.client.send(self.generation, prompt.segments))
    }

    /// Apply one streamed event. Returns `true` when it ended the current
    /// round. Events from other rounds are ignored.
    pub fn apply(&mut self, tagged: TaggedEvent) -> bool {
        if tagged.generation != self.generation || self.state != ReviewState::Streaming {
            tracing::debug!(
                event_generation = tagged.generation,
                current = self.generation,
                "dropping stale event"
            );
            return false;
        }
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        match tagged.event {
            ChatEvent::Partial(text) => {
                session.html = render_review(&text, &session.warning);
                self.sink.show_result(&session.html);
                false
            }
            ChatEvent::Done(Outcome::Completed) => {
                self.cache.set(&session.target.identity(), &session.html);
                tracing::info!(target = %session.target.display_name, "review complete");
                self.sink.show_done(false, true);
                self.transition(ReviewState::Rendered);
                true
            }
            ChatEvent::Done(Outcome::Failed(err)) => {
                tracing::info!(target = %session.target.display_name, error = %err, "review failed");
                if session.html.is_empty() {
                    session.html = markdown_to_html(&err.to_string());
                    self.sink.show_error(&session.html);
                }
                // The error stays up on reopen until a rerun evicts it.
                self.cache.set(&session.target.identity(), &session.html);
                self.sink.show_done(true, err.is_retryable());
                self.transition(ReviewState::Failed(err));
                true
            }
        }
    }

    /// Consume `stream` until its round ends.
    pub async fn drain(&mut self, mut stream: ChatStream) {
        while let Some(event) = stream.next().await {
            if self.apply(event) {
                return;
            }
        }
        if stream.generation() == self.generation && self.state == ReviewState::Streaming {
            self.fail(ReviewError::Transport("stream closed before completion".to_string()));
        }
    }

    /// Run a whole session for `page_url`.
    pub async fn open(&mut self, page_url: &str, title: Option<&str>) {
        if let Some(stream) = self.start(page_url, title).await {
            self.drain(stream).await;
        }
    }

    /// Run a whole rerun round.
    pub async fn rerun(&mut self) {
        if let Some(stream) = self.restart().await {
            self.drain(stream).await;
        }
    }

    /// The external review tool link for the current target.
    pub fn external_link(&self) -> Option<String> {
        let template = self.settings.external_link.as_deref()?;
        let session = self.session.as_ref()?;
        Some(template.replace("{url}", &session.target.page_url))
    }

    /// Show the external review tool link, if one is configured.
    pub fn open_link(&mut self) {
        match self.external_link() {
            Some(url) => self.sink.show_link(&url),
            None => tracing::warn!("no external review link configured (review.external_link)"),
        }
    }

    /// Dismiss the display.
    pub fn close(&mut self) {
        self.sink.close();
    }

    fn fail(&mut self, err: ReviewError) {
        self.sink.show_error(&markdown_to_html(&err.to_string()));
        self.sink.show_done(true, err.is_retryable());
        self.transition(ReviewState::Failed(err));
    }

    /// Show a non-retryable error, then close after the dismiss delay.
    async fn dismiss(&mut self, err: ReviewError) {
        self.fail(err);
        tokio::time::sleep(self.settings.dismiss_delay).await;
        self.sink.close();
    }
}

impl std::fmt::Debug for ReviewOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewOrchestrator")
            .field("backend", &self.client.style())
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_without_truncation_has_no_warning() {
        let html = render_review("**LGTM**", "");
        assert_eq!(html, "<p><strong>LGTM</strong></p>\n");
    }

    #[test]
    fn truncated_review_carries_warning() {
        let html = render_review("Looks fine", &truncation_warning(2000));
        assert!(html.contains("Looks fine"));
        assert!(html.contains("were truncated"));
        assert!(html.contains("2000 characters"));
    }

    #[test]
    fn default_settings() {
        let settings = ReviewSettings::default();
        assert_eq!(settings.dismiss_delay, Duration::from_secs(4));
        assert_eq!(settings.chunk.ceiling, crate::constants::DEFAULT_CHUNK_CEILING);
        assert!(settings.external_link.is_none());
    }
}
