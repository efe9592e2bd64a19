#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use vigil_reporter::collectors::{LoadSnapshot, LoadSource};
use vigil_reporter::transport::HttpTransport;
use vigil_reporter::{CollectorError, Config};

/// One request as seen by the mock endpoint.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub at: Instant,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct MockState {
    statuses: Mutex<VecDeque<u16>>,
    latency: Mutex<Duration>,
    recorded: Mutex<Vec<Recorded>>,
}

/// Minimal stand-in for a Vigil server: records every request and answers
/// with scripted statuses (200 once the script runs out).
pub struct MockVigil {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockVigil {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(record).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state, task })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn script(&self, statuses: &[u16]) {
        self.state.statuses.lock().extend(statuses.iter().copied());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock() = latency;
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.state.recorded.lock().clone()
    }

    /// Wait until at least `count` requests arrived.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> anyhow::Result<Vec<Recorded>> {
        let deadline = Instant::now() + timeout;
        loop {
            let recorded = self.recorded();
            if recorded.len() >= count {
                return Ok(recorded);
            }
            if Instant::now() > deadline {
                anyhow::bail!("expected {count} requests, got {}", recorded.len());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockVigil {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn record(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.recorded.lock().push(Recorded {
        method,
        path: uri.path().to_string(),
        headers,
        body,
        at: Instant::now(),
    });

    let latency = *state.latency.lock();
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }

    let status = state.statuses.lock().pop_front().unwrap_or(200);
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Constant load, so payloads are predictable.
pub struct FixedLoad;

#[async_trait]
impl LoadSource for FixedLoad {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn sample(&self) -> Result<LoadSnapshot, CollectorError> {
        Ok(LoadSnapshot { cpu: 0.5, ram: 0.25 })
    }
}

pub fn config(url: &str, interval: u64) -> Config {
    Config::from_json(&json!({
        "url": url,
        "token": "T",
        "probe_id": "p",
        "node_id": "n",
        "replica_id": "r",
        "interval": interval
    }))
    .expect("valid config")
}

/// HTTP transport that ignores proxy settings from the environment.
pub fn local_transport(config: &Config) -> anyhow::Result<HttpTransport> {
    let client = reqwest::Client::builder().no_proxy().build()?;
    Ok(HttpTransport::with_client(client, config))
}

/// Initialize tracing for tests
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}
