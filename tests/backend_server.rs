//! HTTP-level tests against an in-process mock server.
//!
//! Covers the chat-completions and web chat backends, and fetching
//! patches and pages for a review target.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use prlens::constants::SESSION_COOKIE;
use prlens::models::{PromptSegment, Provider, ReviewError, ReviewTarget, SegmentKind};
use prlens::providers::openai::{MISSING_KEY_MESSAGE, OpenAiClient, progress_message};
use prlens::providers::web::{LOGIN_MESSAGE, WebClient};
use prlens::providers::{ChatEvent, ChatStream, Outcome, StreamingChatClient};
use prlens::source::{ContextSource, HttpContextSource, SourceError};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const PATCH: &str = "diff --git a/src/lib.rs b/src/lib.rs\n--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1 +1 @@\n-old\n+new\n";

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>
  Add sorting · Pull Request #7 · acme/widgets
</title></head>
<body>
  <div class="markdown-body"><p>Sorts widgets by name.</p></div>
  <div class="markdown-body"><p>A review comment.</p></div>
</body>
</html>"#;

#[derive(Clone, Default)]
struct MockState {
    completions: Arc<Mutex<Vec<Value>>>,
    conversations: Arc<Mutex<Vec<Value>>>,
    sessions: Arc<Mutex<usize>>,
}

fn header(headers: &HeaderMap, name: axum::http::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Serve `payload` as an event stream, split into small chunks so that
/// events straddle chunk boundaries.
fn event_stream(payload: String) -> Response {
    let chunks: Vec<Result<Bytes, std::io::Error>> = payload
        .into_bytes()
        .chunks(7)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    (
        [(CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(futures::stream::iter(chunks)),
    )
        .into_response()
}

async fn completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let n = {
        let mut requests = state.completions.lock().expect("completions lock");
        requests.push(body);
        requests.len()
    };
    if header(&headers, AUTHORIZATION) == "Bearer quiet-key" {
        return event_stream("data: [DONE]\n\n".to_string());
    }
    if header(&headers, AUTHORIZATION) != "Bearer good-key" {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "invalid_api_key" })),
        )
            .into_response();
    }

    let id = format!("cmpl-{n}");
    event_stream(format!(
        "data: {{\"id\":\"{id}\",\"choices\":[{{\"delta\":{{\"role\":\"assistant\"}}}}]}}\n\n\
         data: {{\"id\":\"{id}\",\"choices\":[{{\"delta\":{{\"content\":\"Hel\"}}}}]}}\n\n\
         data: this is not json\n\n\
         : keep-alive\n\n\
         data: {{\"id\":\"{id}\",\"choices\":[{{\"delta\":{{\"content\":\"lo\"}}}}]}}\n\n\
         data: [DONE]\n\n"
    ))
}

async fn session(State(state): State<MockState>, headers: HeaderMap) -> Response {
    *state.sessions.lock().expect("sessions lock") += 1;
    let cookie = header(&headers, COOKIE);
    let token = match cookie.strip_prefix(&format!("{SESSION_COOKIE}=")) {
        Some("good-session") => "access-1",
        Some("busy-session") => "access-busy",
        _ => return Json(json!({})).into_response(),
    };
    Json(json!({ "accessToken": token, "expires": "2099-01-01T00:00:00Z" })).into_response()
}

fn snapshot(text: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({ "message": { "content": { "content_type": "text", "parts": [text] } } })
    )
}

async fn conversation(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state
        .conversations
        .lock()
        .expect("conversations lock")
        .push(body);
    match header(&headers, AUTHORIZATION).as_str() {
        "Bearer access-1" => event_stream(format!(
            "{}{}{}data: [DONE]\n\n",
            snapshot("Hi"),
            snapshot("Hi"),
            snapshot("Hi there"),
        )),
        "Bearer access-busy" => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": { "message": "Too many requests" } })),
        )
            .into_response(),
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn patch() -> &'static str {
    PATCH
}

async fn page() -> ([(axum::http::HeaderName, &'static str); 1], &'static str) {
    ([(CONTENT_TYPE, "text/html; charset=utf-8")], PAGE)
}

async fn spawn_mock_server() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .route("/api/auth/session", get(session))
        .route("/backend-api/conversation", post(conversation))
        .route("/acme/widgets/pull/7.patch", get(patch))
        .route("/acme/widgets/pull/7", get(page))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server listener");
    let address: SocketAddr = listener.local_addr().expect("mock listener local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("run mock server");
    });
    (format!("http://{address}"), state)
}

fn segments(texts: &[&str]) -> Vec<PromptSegment> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| PromptSegment {
            kind: if i + 1 == texts.len() {
                SegmentKind::Closing
            } else {
                SegmentKind::Diff
            },
            text: text.to_string(),
            continues_previous: i > 0,
        })
        .collect()
}

async fn collect(mut stream: ChatStream) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(tagged) = timeout(TEST_TIMEOUT, stream.next())
        .await
        .expect("stream stalled")
    {
        events.push(tagged.event);
    }
    events
}

fn api_client(base_url: &str, key: Option<&str>) -> OpenAiClient {
    OpenAiClient::new(
        reqwest::Client::new(),
        base_url.to_string(),
        "gpt-test".to_string(),
        key.map(str::to_string),
    )
}

fn web_client(base_url: &str, session_token: Option<&str>) -> WebClient {
    WebClient::new(
        reqwest::Client::new(),
        base_url.to_string(),
        "text-davinci-002-render".to_string(),
        session_token.map(str::to_string),
    )
}

fn done_count(events: &[ChatEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ChatEvent::Done(_)))
        .count()
}

// ── Chat-completions backend ────────────────────────────────────────

#[tokio::test]
async fn api_streams_partials_then_one_done() {
    let (base_url, state) = spawn_mock_server().await;
    let client = api_client(&base_url, Some("good-key"));

    let stream = client.send(3, segments(&["Review this."]));
    assert_eq!(stream.generation(), 3);
    let events = collect(stream).await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Partial("Hel".to_string()),
            ChatEvent::Partial("Hello".to_string()),
            ChatEvent::Done(Outcome::Completed),
        ]
    );

    let requests = state.completions.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["model"], "gpt-test");
    assert_eq!(requests[0]["stream"], true);
    assert_eq!(requests[0]["messages"][0]["role"], "system");
    assert_eq!(requests[0]["messages"][1]["content"], "Review this.");
}

#[tokio::test]
async fn api_threads_segments_and_reports_progress() {
    let (base_url, state) = spawn_mock_server().await;
    let client = api_client(&base_url, Some("good-key"));

    let events = collect(client.send(1, segments(&["first", "second", "last"]))).await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Partial(progress_message(2)),
            ChatEvent::Partial(progress_message(1)),
            ChatEvent::Partial("Hel".to_string()),
            ChatEvent::Partial("Hello".to_string()),
            ChatEvent::Done(Outcome::Completed),
        ]
    );

    let requests = state.completions.lock().unwrap().clone();
    assert_eq!(requests.len(), 3);
    let sizes: Vec<usize> = requests
        .iter()
        .map(|r| r["messages"].as_array().map_or(0, Vec::len))
        .collect();
    assert_eq!(sizes, vec![2, 4, 6]);

    let last = requests[2]["messages"].as_array().unwrap();
    let roles: Vec<&str> = last.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(
        roles,
        vec!["system", "user", "assistant", "user", "assistant", "user"]
    );
    assert_eq!(last[1]["content"], "first");
    assert_eq!(last[2]["content"], "Hello");
    assert_eq!(last[5]["content"], "last");
}

#[tokio::test]
async fn api_empty_final_answer_clears_progress() {
    let (base_url, _state) = spawn_mock_server().await;
    let client = api_client(&base_url, Some("quiet-key"));

    let events = collect(client.send(1, segments(&["first", "last"]))).await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Partial(progress_message(1)),
            ChatEvent::Partial(String::new()),
            ChatEvent::Done(Outcome::Completed),
        ]
    );
}

#[tokio::test]
async fn api_rejection_is_shown_with_detail() {
    let (base_url, _state) = spawn_mock_server().await;
    let client = api_client(&base_url, Some("wrong-key"));

    let events = collect(client.send(1, segments(&["a", "b"]))).await;

    assert_eq!(done_count(&events), 1);
    assert!(events.iter().any(|e| matches!(
        e,
        ChatEvent::Partial(text) if text == "OpenAI error 401: invalid_api_key"
    )));
    assert_eq!(
        events.last(),
        Some(&ChatEvent::Done(Outcome::Failed(ReviewError::Backend {
            status: 401,
            detail: "invalid_api_key".to_string(),
        })))
    );
}

#[tokio::test]
async fn api_without_key_sends_nothing() {
    let (base_url, state) = spawn_mock_server().await;
    let client = api_client(&base_url, None);

    let events = collect(client.send(1, segments(&["a"]))).await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Partial(MISSING_KEY_MESSAGE.to_string()),
            ChatEvent::Done(Outcome::Failed(ReviewError::MissingCredential(
                MISSING_KEY_MESSAGE.to_string()
            ))),
        ]
    );
    assert!(state.completions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn api_unreachable_server_is_transport_failure() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    let client = api_client(&format!("http://{address}"), Some("good-key"));

    let events = collect(client.send(1, segments(&["a"]))).await;

    assert_eq!(done_count(&events), 1);
    assert!(matches!(
        events.last(),
        Some(ChatEvent::Done(Outcome::Failed(ReviewError::Transport(_))))
    ));
}

// ── Web backend ─────────────────────────────────────────────────────

#[tokio::test]
async fn web_exchanges_session_and_streams_snapshots() {
    let (base_url, state) = spawn_mock_server().await;
    let client = web_client(&base_url, Some("good-session"));

    let events = collect(client.send(1, segments(&["first", "last"]))).await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Partial("Hi".to_string()),
            ChatEvent::Partial("Hi there".to_string()),
            ChatEvent::Done(Outcome::Completed),
        ]
    );

    let bodies = state.conversations.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["action"], "next");
    assert_eq!(bodies[0]["model"], "text-davinci-002-render");
    let prompt = bodies[0]["messages"][0]["content"]["parts"][0]
        .as_str()
        .unwrap();
    assert!(prompt.contains("[Part 1 of 2]\nfirst"));
    assert!(prompt.contains("[Part 2 of 2]\nlast"));
}

#[tokio::test]
async fn web_without_session_asks_for_login() {
    let (base_url, state) = spawn_mock_server().await;
    let client = web_client(&base_url, Some("expired-session"));

    let events = collect(client.send(1, segments(&["a"]))).await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Partial(LOGIN_MESSAGE.to_string()),
            ChatEvent::Done(Outcome::Failed(ReviewError::MissingCredential(
                LOGIN_MESSAGE.to_string()
            ))),
        ]
    );
    assert_eq!(*state.sessions.lock().unwrap(), 1);
    assert!(state.conversations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn web_without_token_skips_session_request() {
    let (base_url, state) = spawn_mock_server().await;
    let client = web_client(&base_url, None);

    let events = collect(client.send(1, segments(&["a"]))).await;

    assert_eq!(done_count(&events), 1);
    assert_eq!(*state.sessions.lock().unwrap(), 0);
}

#[tokio::test]
async fn web_rejection_is_shown_with_detail() {
    let (base_url, _state) = spawn_mock_server().await;
    let client = web_client(&base_url, Some("busy-session"));

    let events = collect(client.send(1, segments(&["a"]))).await;

    assert_eq!(
        events,
        vec![
            ChatEvent::Partial("ChatGPT error 429: Too many requests".to_string()),
            ChatEvent::Done(Outcome::Failed(ReviewError::Backend {
                status: 429,
                detail: "Too many requests".to_string(),
            })),
        ]
    );
}

// ── Context source ──────────────────────────────────────────────────

fn target(base_url: &str, number: u32) -> ReviewTarget {
    ReviewTarget {
        provider: Provider::GitHub,
        page_url: format!("{base_url}/acme/widgets/pull/{number}"),
        patch_url: format!("{base_url}/acme/widgets/pull/{number}.patch"),
        display_name: format!("acme/widgets#{number}"),
    }
}

#[tokio::test]
async fn source_fetches_patch_and_page_context() {
    let (base_url, _state) = spawn_mock_server().await;
    let source = HttpContextSource::new().unwrap();

    let input = source.fetch(&target(&base_url, 7)).await.unwrap();

    assert_eq!(input.patch, PATCH);
    assert_eq!(input.title, "Add sorting · Pull Request #7 · acme/widgets");
    assert_eq!(input.description, "Sorts widgets by name.");
}

#[tokio::test]
async fn source_reports_missing_pages() {
    let (base_url, _state) = spawn_mock_server().await;
    let source = HttpContextSource::with_client(reqwest::Client::new());

    let err = source.fetch(&target(&base_url, 8)).await.unwrap_err();

    assert!(matches!(err, SourceError::Status { status: 404, .. }));
    let review_err: ReviewError = err.into();
    assert!(matches!(review_err, ReviewError::FetchFailure(ref m) if m.contains("404")));
    assert!(review_err.is_retryable());
}
