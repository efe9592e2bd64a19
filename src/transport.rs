use crate::config::Config;
use crate::errors::{DispatchError, ReporterError};
use crate::request::RequestDescriptor;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

/// Issues a single request and classifies its outcome.
///
/// Implementations resolve exactly once per call: `Ok(())` only for a 200
/// response, any other status, transport error or timeout is an `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<(), DispatchError>;
}

/// reqwest-backed transport; TLS or plaintext follows the base URL scheme.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self, ReporterError> {
        let client = Client::builder().build().map_err(ReporterError::Client)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.base_url().to_string(),
            token: config.token().to_string(),
        }
    }

    async fn exchange(&self, url: Url, request: &RequestDescriptor) -> Result<(), DispatchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone())
            .basic_auth("", Some(&self.token));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        // drain so the connection is never left half-read
        let drained = response.bytes().await?;
        debug!(kind = %request.kind, status = status.as_u16(), bytes = drained.len(), "response received");

        classify(status)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<(), DispatchError> {
        let raw = format!("{}{}", self.base_url, request.path);
        let url = Url::parse(&raw).map_err(|_| DispatchError::InvalidUrl { url: raw.clone() })?;

        // the timeout wraps the whole exchange so the attempt resolves once
        match tokio::time::timeout(request.timeout, self.exchange(url, request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(DispatchError::Timeout {
                timeout_ms: request.timeout.as_millis() as u64,
            }),
        }
    }
}

fn classify(status: StatusCode) -> Result<(), DispatchError> {
    if status == StatusCode::OK {
        Ok(())
    } else {
        Err(DispatchError::Status {
            status: status.as_u16(),
        })
    }
}
