// Mock Ollama-compatible upstream used by the integration tests
#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::Value;

/// What the mock answers on `POST /api/chat`
#[derive(Clone)]
pub enum MockReply {
    Json { status: StatusCode, body: &'static str },
    Lines(Vec<&'static str>),
    Delayed(Duration),
    /// Accept the request, then break the connection mid-body
    Reset,
}

#[derive(Clone)]
struct MockState {
    reply: MockReply,
    calls: Arc<Mutex<Vec<Value>>>,
}

pub struct MockUpstream {
    pub base_url: String,
    calls: Arc<Mutex<Vec<Value>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start(reply: MockReply) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            reply,
            calls: calls.clone(),
        };

        let app = Router::new()
            .route("/api/chat", post(chat))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/api", addr),
            calls,
            handle,
        }
    }

    /// Request bodies received so far
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn chat(State(state): State<MockState>, Json(body): Json<Value>) -> Response {
    state.calls.lock().unwrap().push(body);

    match state.reply {
        MockReply::Json { status, body } => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        MockReply::Lines(lines) => {
            let chunks = lines
                .into_iter()
                .map(|line| Ok::<_, Infallible>(Bytes::from(format!("{}\n", line))));
            Response::builder()
                .header(header::CONTENT_TYPE, "application/x-ndjson")
                .body(Body::from_stream(futures::stream::iter(chunks)))
                .unwrap()
        }
        MockReply::Reset => {
            let broken = futures::stream::iter([Err::<Bytes, _>(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "upstream hung up",
            ))]);
            Response::builder()
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from_stream(broken))
                .unwrap()
        }
        MockReply::Delayed(delay) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, "{}").into_response()
        }
    }
}

/// A base URL nothing is listening on
pub async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api", addr)
}
