//! Streaming chat backends.
//!
//! A [`StreamingChatClient`] takes the composed prompt segments and returns
//! a [`ChatStream`] right away. A background task talks to the backend and
//! pushes events into the stream: any number of [`ChatEvent::Partial`]
//! updates, each carrying the full text so far, followed by exactly one
//! [`ChatEvent::Done`].

pub mod openai;
pub mod sse;
pub mod web;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ProviderConfig;
use crate::models::{ChatStyle, PromptSegment, ReviewError};

/// Events buffered between the backend task and the consumer.
const EVENT_BUFFER: usize = 64;

/// Errors from setting up a chat client.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(ReviewError),
}

/// One update from a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Full text received so far.
    Partial(String),
    /// Terminal event; nothing follows it.
    Done(Outcome),
}

/// An event stamped with the generation of the session that requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: ChatEvent,
}

/// Trait for streaming chat backends.
pub trait StreamingChatClient: Send + Sync {
    /// Start a review round. Never fails synchronously: every failure is
    /// reported as a terminal event on the returned stream.
    ///
    /// Must be called from within a tokio runtime.
    fn send(&self, generation: u64, segments: Vec<PromptSegment>) -> ChatStream;

    /// Which backend this is.
    fn style(&self) -> ChatStyle;
}

/// Receiving half of a review round.
///
/// Dropping the stream aborts the backend task.
pub struct ChatStream {
    generation: u64,
    rx: mpsc::Receiver<ChatEvent>,
    task: Option<JoinHandle<()>>,
    finished: bool,
}

impl ChatStream {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next event, or `None` once the terminal event has been delivered.
    pub async fn next(&mut self) -> Option<TaggedEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await?;
        if matches!(event, ChatEvent::Done(_)) {
            self.finished = true;
        }
        Some(TaggedEvent {
            generation: self.generation,
            event,
        })
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Sending half handed to the backend task.
///
/// [`Emitter::finish`] consumes the emitter, so at most one terminal event
/// can be sent. An emitter dropped without finishing sends a transport
/// failure so consumers always see a `Done`.
pub struct Emitter {
    tx: mpsc::Sender<ChatEvent>,
    finished: bool,
}

impl Emitter {
    /// Send the full text so far. Returns `false` once the consumer is gone.
    pub async fn partial(&self, text: impl Into<String>) -> bool {
        self.tx.send(ChatEvent::Partial(text.into())).await.is_ok()
    }

    /// Whether the consumer has dropped its stream.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send the terminal event.
    pub async fn finish(mut self, outcome: Outcome) {
        self.finished = true;
        let _ = self.tx.send(ChatEvent::Done(outcome)).await;
    }

    /// Show `message` after whatever text was already on screen, then fail.
    pub async fn fail(self, shown: &str, message: &str, error: ReviewError) {
        let text = if shown.is_empty() {
            message.to_string()
        } else {
            format!("{shown}\n\n{message}")
        };
        self.partial(text).await;
        self.finish(Outcome::Failed(error)).await;
    }
}

impl Drop for Emitter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.tx.try_send(ChatEvent::Done(Outcome::Failed(ReviewError::Transport(
                "stream ended unexpectedly".to_string(),
            ))));
        }
    }
}

/// Run `produce` on a background task and return the stream it feeds.
pub fn spawn_stream<F, Fut>(generation: u64, produce: F) -> ChatStream
where
    F: FnOnce(Emitter) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let emitter = Emitter {
        tx,
        finished: false,
    };
    let task = tokio::spawn(produce(emitter));
    ChatStream {
        generation,
        rx,
        task: Some(task),
        finished: false,
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Looks for `error.message`, then `detail`, then falls back to the raw
/// body. An empty body yields the status reason.
pub fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return message.to_string();
        }
        match value.get("detail") {
            Some(serde_json::Value::String(detail)) => return detail.clone(),
            Some(detail) if !detail.is_null() => return detail.to_string(),
            _ => {}
        }
    }

    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        body.to_string()
    }
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Build the configured chat client.
pub fn build_client(config: &ProviderConfig) -> Result<Arc<dyn StreamingChatClient>, ProviderError> {
    let base_url = config.base_url();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ProviderError::InvalidBaseUrl(base_url));
    }

    let http = reqwest::Client::builder()
        .user_agent(crate::constants::USER_AGENT)
        .build()?;

    tracing::debug!(backend = %config.backend, base_url = %base_url, "building chat client");
    Ok(match config.backend {
        ChatStyle::Api => Arc::new(openai::OpenAiClient::new(
            http,
            base_url,
            config.model(),
            config.api_key(),
        )),
        ChatStyle::Web => Arc::new(web::WebClient::new(
            http,
            base_url,
            config.model(),
            config.session_token(),
        )),
    })
}
