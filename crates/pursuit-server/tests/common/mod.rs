use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use futures::StreamExt;

use pursuit_core::engine::RoomSnapshot;
use pursuit_server::build_app;
use pursuit_server::config::{PursuitTimingConfig, ServerConfig};
use pursuit_server::state::AppState;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    _server: tokio::task::JoinHandle<()>,
}

/// Compressed pursuit timings: the countdown is pushed out of the test
/// window (attacks are answer-driven) and the attack window closes in two
/// 5 ms ticks.
pub fn fast_test_config() -> ServerConfig {
    ServerConfig {
        pursuit: PursuitTimingConfig {
            status_tick_ms: 20,
            attack_tick_ms: 5,
            countdown_secs: 100,
            decay_idle_secs: 600,
            attack_progress_step: 0.5,
            ..PursuitTimingConfig::default()
        },
        ..ServerConfig::default()
    }
}

impl TestServer {
    pub async fn new() -> Self {
        Self::from_config(fast_test_config()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, state) = build_app(config);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            state,
            _server: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url())
    }
}

/// Create a room over HTTP and return its snapshot.
pub async fn create_room(
    client: &reqwest::Client,
    server: &TestServer,
    players: &[u64],
) -> RoomSnapshot {
    let resp = client
        .post(server.api_url("/rooms"))
        .json(&serde_json::json!({ "players": players }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    resp.json().await.unwrap()
}

/// Report an answer outcome over HTTP, returning the response status.
pub async fn post_answer(
    client: &reqwest::Client,
    server: &TestServer,
    room_id: &str,
    player_id: u64,
    is_correct: bool,
) -> reqwest::StatusCode {
    client
        .post(server.api_url(&format!("/rooms/{room_id}/answers")))
        .json(&serde_json::json!({ "player_id": player_id, "is_correct": is_correct }))
        .send()
        .await
        .unwrap()
        .status()
}

/// Pull one player's record until the predicate holds or the deadline runs
/// out. Returns whether the predicate was observed.
pub async fn wait_for_player(
    client: &reqwest::Client,
    server: &TestServer,
    room_id: &str,
    player_id: u64,
    predicate: impl Fn(&serde_json::Value) -> bool,
) -> bool {
    for _ in 0..100 {
        let resp = client
            .get(server.api_url(&format!("/rooms/{room_id}/players/{player_id}")))
            .send()
            .await
            .unwrap();
        if resp.status() == reqwest::StatusCode::OK {
            let body: serde_json::Value = resp.json().await.unwrap();
            if predicate(&body["player"]) {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<axum::body::Bytes, reqwest::Error>> + Send>>;

/// Minimal SSE reader over a reqwest byte stream.
pub struct SseReader {
    stream: ByteStream,
    buffer: String,
}

impl SseReader {
    pub async fn connect(client: &reqwest::Client, url: &str) -> Self {
        let resp = client.get(url).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        Self {
            stream: Box::pin(resp.bytes_stream()),
            buffer: String::new(),
        }
    }

    /// Read the next `(event, data)` pair, skipping keep-alive comments.
    /// Returns None after five seconds without a complete event.
    pub async fn next_event(&mut self) -> Option<(String, String)> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(idx) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..idx + 2).collect();
                let mut event = String::new();
                let mut data = String::new();
                for line in block.lines() {
                    if let Some(rest) = line.strip_prefix("event:") {
                        event = rest.trim().to_string();
                    } else if let Some(rest) = line.strip_prefix("data:") {
                        data = rest.trim().to_string();
                    }
                }
                if event.is_empty() && data.is_empty() {
                    continue; // keep-alive comment block
                }
                return Some((event, data));
            }

            let chunk = tokio::time::timeout_at(deadline, self.stream.next())
                .await
                .ok()??
                .ok()?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// Read events until one with the given name arrives, returning its
    /// data. Panics if `limit` events pass without a match.
    pub async fn wait_for(&mut self, event_name: &str, limit: usize) -> String {
        for _ in 0..limit {
            let Some((event, data)) = self.next_event().await else {
                panic!("SSE stream ended while waiting for {event_name}");
            };
            if event == event_name {
                return data;
            }
        }
        panic!("no {event_name} event within {limit} events");
    }
}
