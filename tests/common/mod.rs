//! In-process stand-in for an Ollama server's `/api/generate` endpoint.

use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;

/// How the mock answers every generate request.
#[derive(Clone, Debug)]
pub enum Reply {
    /// Streams the given body chunks, then closes the response.
    Chunks(Vec<String>),
    /// Streams the given body chunks and then keeps the connection open.
    ChunksThenHang(Vec<String>),
    /// Responds with a status and a plain body.
    Status(u16, String),
}

struct MockState {
    reply: Reply,
    requests: Mutex<Vec<Value>>,
}

pub struct MockOllama {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockOllama {
    pub async fn start(reply: Reply) -> Self {
        let state = Arc::new(MockState {
            reply,
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/api/generate", post(generate))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// JSON bodies of the requests received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.state.requests.lock().clone()
    }
}

async fn generate(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.requests.lock().push(body);

    match state.reply.clone() {
        Reply::Chunks(chunks) => ndjson(Body::from_stream(stream::iter(
            chunks.into_iter().map(|c| Ok::<_, Infallible>(Bytes::from(c))),
        ))),
        Reply::ChunksThenHang(chunks) => ndjson(Body::from_stream(
            stream::iter(chunks.into_iter().map(|c| Ok::<_, Infallible>(Bytes::from(c))))
                .chain(stream::pending()),
        )),
        Reply::Status(status, body) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
    }
}

fn ndjson(body: Body) -> Response {
    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(body)
        .unwrap()
}

/// One streamed generate line.
pub fn line(text: &str) -> String {
    format!(
        "{}\n",
        serde_json::json!({
            "model": "codellama:7b-code",
            "created_at": "2024-01-01T00:00:00Z",
            "response": text,
            "done": false
        })
    )
}

/// The final generate line with counters.
pub fn done_line() -> String {
    format!(
        "{}\n",
        serde_json::json!({
            "model": "codellama:7b-code",
            "created_at": "2024-01-01T00:00:00Z",
            "response": "",
            "done": true,
            "done_reason": "stop",
            "total_duration": 5_000_000_000u64,
            "prompt_eval_count": 42,
            "eval_count": 8,
            "eval_duration": 2_000_000_000u64
        })
    )
}

/// Returns a loopback address nothing is listening on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
