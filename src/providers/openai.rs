//! Chat-completions backend authenticated with an API key.
//!
//! Every prompt segment is sent as its own streamed request. Earlier turns
//! are replayed from a per-round [`ConversationStore`] so the model sees the
//! whole thread. Only the last request's output reaches the reader; earlier
//! ones surface as a progress message.

use std::collections::HashMap;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::sse::{self, SseData};
use super::{
    ChatStream, Emitter, Outcome, StreamingChatClient, endpoint, error_detail, spawn_stream,
};
use crate::models::{ChatStyle, PromptSegment, ReviewError};
use crate::prompt::SYSTEM_MESSAGE;

/// Shown when no API key is configured.
pub const MISSING_KEY_MESSAGE: &str = "Please add your OpenAI API key to the configuration (`provider.api_key` or the PRLENS_API_KEY environment variable).";

const COMPLETIONS_PATH: &str = "v1/chat/completions";

/// Placeholder text while earlier segments are being sent.
pub fn progress_message(remaining: usize) -> String {
    format!(
        "Processing your code changes. Number of prompts left to send: {remaining}. Stay tuned..."
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub parent_id: Option<String>,
    pub role: Role,
    pub content: String,
}

/// Messages of one review round, keyed by id and linked to their parents.
#[derive(Debug, Default)]
pub struct ConversationStore {
    messages: HashMap<String, StoredMessage>,
}

impl ConversationStore {
    pub fn insert(&mut self, message: StoredMessage) {
        self.messages.insert(message.id.clone(), message);
    }

    pub fn get(&self, id: &str) -> Option<&StoredMessage> {
        self.messages.get(id)
    }

    /// The thread ending at `leaf`, oldest first.
    pub fn thread(&self, leaf: Option<&str>) -> Vec<&StoredMessage> {
        let mut thread = Vec::new();
        let mut next = leaf;
        while let Some(id) = next {
            let Some(message) = self.messages.get(id) else {
                break;
            };
            // Parent links come from us, but a cycle would never end.
            if thread.len() > self.messages.len() {
                break;
            }
            thread.push(message);
            next = message.parent_id.as_deref();
        }
        thread.reverse();
        thread
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default)]
struct Reply {
    id: Option<String>,
    text: String,
}

/// What went wrong in one turn, and what the reader should see.
struct TurnFailure {
    shown: String,
    message: String,
    error: ReviewError,
}

impl TurnFailure {
    fn transport(shown: &str, error: reqwest::Error) -> Self {
        Self {
            shown: shown.to_string(),
            message: error.to_string(),
            error: ReviewError::Transport(error.to_string()),
        }
    }
}

/// OpenAI chat-completions client.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        model: String,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url,
            model,
            api_key,
        }
    }
}

impl StreamingChatClient for OpenAiClient {
    fn send(&self, generation: u64, segments: Vec<PromptSegment>) -> ChatStream {
        let round = Round {
            http: self.http.clone(),
            url: endpoint(&self.base_url, COMPLETIONS_PATH),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
        };
        spawn_stream(generation, move |emitter| round.run(emitter, segments))
    }

    fn style(&self) -> ChatStyle {
        ChatStyle::Api
    }
}

/// State owned by the background task of one `send`.
struct Round {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl Round {
    async fn run(self, emitter: Emitter, segments: Vec<PromptSegment>) {
        let Some(api_key) = self.api_key.as_deref() else {
            emitter
                .fail(
                    "",
                    MISSING_KEY_MESSAGE,
                    ReviewError::MissingCredential(MISSING_KEY_MESSAGE.to_string()),
                )
                .await;
            return;
        };

        let mut store = ConversationStore::default();
        let mut parent: Option<String> = None;
        let total = segments.len();

        for (index, segment) in segments.into_iter().enumerate() {
            if emitter.is_closed() {
                tracing::debug!(sent = index, total, "consumer gone, not sending remaining segments");
                return;
            }
            let remaining = total - index - 1;
            let is_final = remaining == 0;
            if !is_final {
                emitter.partial(progress_message(remaining)).await;
            }

            let user = StoredMessage {
                id: uuid::Uuid::new_v4().to_string(),
                parent_id: parent.clone(),
                role: Role::User,
                content: segment.text,
            };
            let user_id = user.id.clone();
            store.insert(user);

            let result = {
                let thread = store.thread(Some(&user_id));
                let mut messages = Vec::with_capacity(thread.len() + 1);
                messages.push(WireMessage {
                    role: Role::System,
                    content: SYSTEM_MESSAGE,
                });
                messages.extend(thread.into_iter().map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                }));
                tracing::debug!(segment = index + 1, total, turns = messages.len(), "sending segment");
                self.stream_turn(api_key, messages, is_final, &emitter).await
            };

            match result {
                Ok(reply) => {
                    if is_final && reply.text.is_empty() {
                        // An empty answer still replaces the progress message.
                        emitter.partial(String::new()).await;
                    }
                    let id = reply
                        .id
                        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                    store.insert(StoredMessage {
                        id: id.clone(),
                        parent_id: Some(user_id),
                        role: Role::Assistant,
                        content: reply.text,
                    });
                    parent = Some(id);
                }
                Err(failure) => {
                    emitter
                        .fail(&failure.shown, &failure.message, failure.error)
                        .await;
                    return;
                }
            }
        }

        emitter.finish(Outcome::Completed).await;
    }

    /// Send one request and stream its reply. When `surface` is set, every
    /// delta is forwarded to the reader as the accumulated text.
    async fn stream_turn(
        &self,
        api_key: &str,
        messages: Vec<WireMessage<'_>>,
        surface: bool,
        emitter: &Emitter,
    ) -> Result<Reply, TurnFailure> {
        let request = ChatRequest {
            model: &self.model,
            stream: true,
            messages,
        };
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TurnFailure::transport("", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(status, &body);
            tracing::warn!(status = status.as_u16(), %detail, "chat completion rejected");
            return Err(TurnFailure {
                shown: String::new(),
                message: format!("OpenAI error {}: {detail}", status.as_u16()),
                error: ReviewError::Backend {
                    status: status.as_u16(),
                    detail,
                },
            });
        }

        let mut reply = Reply::default();
        let mut events = std::pin::pin!(sse::decode(response.bytes_stream()));
        while let Some(item) = events.next().await {
            let payload = match item {
                Ok(SseData::Done) => break,
                Ok(SseData::Data(payload)) => payload,
                Err(e) => {
                    let shown = if surface { reply.text.as_str() } else { "" };
                    return Err(TurnFailure::transport(shown, e));
                }
            };
            let chunk: ChatChunk = match serde_json::from_str(&payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed stream event");
                    continue;
                }
            };
            if reply.id.is_none() {
                reply.id = chunk.id;
            }
            let Some(delta) = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
            else {
                continue;
            };
            if delta.is_empty() {
                continue;
            }
            reply.text.push_str(&delta);
            if surface && !emitter.partial(reply.text.clone()).await {
                break;
            }
        }
        Ok(reply)
    }
}
