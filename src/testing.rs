//! Test doubles: an axum stub provider replaying canned replies, and a recording reply sink.

use crate::messaging::ReplySink;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One canned HTTP reply.
#[derive(Debug, Clone)]
pub(crate) struct StubReply {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
    delay: Duration,
}

impl StubReply {
    pub(crate) fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// A successful chat completion carrying `content`.
    pub(crate) fn completion(content: &str) -> Self {
        Self::json(
            200,
            serde_json::json!({
                "id": "chatcmpl-test",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
            }),
        )
    }

    pub(crate) fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request the stub received.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

#[derive(Default)]
struct StubState {
    replies: Mutex<VecDeque<StubReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Stub provider bound to an ephemeral localhost port.
pub(crate) struct StubProvider {
    pub url: String,
    state: Arc<StubState>,
}

impl StubProvider {
    pub(crate) async fn start(replies: Vec<StubReply>) -> Self {
        let state = Arc::new(StubState {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(respond).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub listener should bind");
        let address = listener.local_addr().expect("stub listener address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            url: format!("http://{address}/v1/chat/completions"),
            state,
        }
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub(crate) fn hits(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

async fn respond(State(state): State<Arc<StubState>>, headers: HeaderMap, body: Bytes) -> Response {
    let body = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    state
        .requests
        .lock()
        .unwrap()
        .push(RecordedRequest { headers, body });

    let reply = state.replies.lock().unwrap().pop_front();
    let Some(reply) = reply else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "no stub reply queued").into_response();
    };

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let status = StatusCode::from_u16(reply.status).expect("valid stub status");
    let mut response = (status, reply.body).into_response();
    for (name, value) in reply.headers {
        response.headers_mut().insert(
            HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(&value).expect("valid header value"),
        );
    }
    response
}

/// Reply sink that records what it was asked to send.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl ReplySink for RecordingSink {
    fn describe(&self) -> String {
        "recording".into()
    }

    async fn send_text(&self, text: String) -> crate::Result<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }
}
