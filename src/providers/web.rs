//! ChatGPT web backend authenticated with a browser session cookie.
//!
//! The session cookie is exchanged for a short-lived access token, then the
//! whole prompt is sent as a single conversation message. The web API
//! streams full snapshots of the answer rather than deltas.

use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use super::sse::{self, SseData};
use super::{
    ChatStream, Emitter, Outcome, StreamingChatClient, endpoint, error_detail, spawn_stream,
};
use crate::constants::SESSION_COOKIE;
use crate::models::{ChatStyle, PromptSegment, ReviewError};
use crate::prompt::compose_single;

/// Shown when there is no usable session.
pub const LOGIN_MESSAGE: &str = "Please login and pass Cloudflare check at chat.openai.com";

const SESSION_PATH: &str = "api/auth/session";
const CONVERSATION_PATH: &str = "backend-api/conversation";

#[derive(Debug, Deserialize)]
struct SessionInfo {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationEvent {
    message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    content: EventContent,
}

#[derive(Debug, Deserialize)]
struct EventContent {
    #[serde(default)]
    parts: Vec<serde_json::Value>,
}

/// Text of a streamed snapshot, if it carries any.
fn snapshot_text(payload: &str) -> Result<Option<String>, serde_json::Error> {
    let event: ConversationEvent = serde_json::from_str(payload)?;
    Ok(event
        .message
        .and_then(|m| m.content.parts.into_iter().next())
        .and_then(|part| part.as_str().map(str::to_string))
        .filter(|text| !text.is_empty()))
}

/// Single-call client for the ChatGPT web conversation API.
pub struct WebClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    session_token: Option<String>,
}

impl WebClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        model: String,
        session_token: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url,
            model,
            session_token,
        }
    }
}

impl StreamingChatClient for WebClient {
    fn send(&self, generation: u64, segments: Vec<PromptSegment>) -> ChatStream {
        let round = Round {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            session_token: self.session_token.clone(),
        };
        spawn_stream(generation, move |emitter| round.run(emitter, segments))
    }

    fn style(&self) -> ChatStyle {
        ChatStyle::Web
    }
}

struct Round {
    http: reqwest::Client,
    base_url: String,
    model: String,
    session_token: Option<String>,
}

impl Round {
    async fn run(self, emitter: Emitter, segments: Vec<PromptSegment>) {
        let access_token = match self.access_token().await {
            Ok(token) => token,
            Err(reason) => {
                tracing::debug!(%reason, "no usable web session");
                emitter
                    .fail(
                        "",
                        LOGIN_MESSAGE,
                        ReviewError::MissingCredential(LOGIN_MESSAGE.to_string()),
                    )
                    .await;
                return;
            }
        };

        let body = json!({
            "action": "next",
            "messages": [{
                "id": uuid::Uuid::new_v4().to_string(),
                "role": "user",
                "content": {
                    "content_type": "text",
                    "parts": [compose_single(&segments)],
                },
            }],
            "model": self.model,
            "parent_message_id": uuid::Uuid::new_v4().to_string(),
        });

        let response = match self
            .http
            .post(endpoint(&self.base_url, CONVERSATION_PATH))
            .bearer_auth(&access_token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                emitter
                    .fail("", &e.to_string(), ReviewError::Transport(e.to_string()))
                    .await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(status, &body);
            tracing::warn!(status = status.as_u16(), %detail, "conversation request rejected");
            emitter
                .fail(
                    "",
                    &format!("ChatGPT error {}: {detail}", status.as_u16()),
                    ReviewError::Backend {
                        status: status.as_u16(),
                        detail,
                    },
                )
                .await;
            return;
        }

        let mut text = String::new();
        let mut events = std::pin::pin!(sse::decode(response.bytes_stream()));
        while let Some(item) = events.next().await {
            let payload = match item {
                Ok(SseData::Done) => break,
                Ok(SseData::Data(payload)) => payload,
                Err(e) => {
                    emitter
                        .fail(&text, &e.to_string(), ReviewError::Transport(e.to_string()))
                        .await;
                    return;
                }
            };
            match snapshot_text(&payload) {
                Ok(Some(snapshot)) if snapshot != text => {
                    text = snapshot;
                    if !emitter.partial(text.clone()).await {
                        return;
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "skipping malformed stream event"),
            }
        }

        emitter.finish(Outcome::Completed).await;
    }

    /// Exchange the session cookie for an access token.
    async fn access_token(&self) -> Result<String, String> {
        let token = self
            .session_token
            .as_deref()
            .ok_or_else(|| "no session token configured".to_string())?;
        let response = self
            .http
            .get(endpoint(&self.base_url, SESSION_PATH))
            .header(reqwest::header::COOKIE, format!("{SESSION_COOKIE}={token}"))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        let session: SessionInfo = response.json().await.map_err(|e| e.to_string())?;
        session
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "session has no access token".to_string())
    }
}
