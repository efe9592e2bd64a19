//! Builds the three requests a reporter ever sends.
//!
//! | Kind       | Method | Path                                   | Body                         |
//! |------------|--------|----------------------------------------|------------------------------|
//! | Poll       | POST   | `/reporter/{probe}/{node}/`            | `{replica, interval, load}`  |
//! | Flush      | DELETE | `/reporter/{probe}/{node}/{replica}/`  | none                         |
//! | Deregister | DELETE | `/reporter/{probe}/{node}/`            | `{replica}`                  |

use crate::collectors::LoadSnapshot;
use crate::config::Config;
use crate::errors::DispatchError;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use reqwest::Method;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

pub const POLL_TIMEOUT: Duration = Duration::from_secs(10);
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEREGISTER_TIMEOUT: Duration = Duration::from_secs(10);

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const USER_AGENT_VALUE: &str = concat!("vigil-reporter/", env!("CARGO_PKG_VERSION"));

/// Characters left alone by JavaScript's `encodeURIComponent`, which is what
/// the endpoint expects identifiers to look like.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Poll,
    Flush,
    Deregister,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RequestKind::Poll => "poll",
            RequestKind::Flush => "flush",
            RequestKind::Deregister => "deregister",
        })
    }
}

/// One fully described HTTP request, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub kind: RequestKind,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub timeout: Duration,
}

/// Body of a poll report.
#[derive(Debug, Serialize)]
pub struct PollPayload<'a> {
    pub replica: &'a str,
    pub interval: u64,
    pub load: LoadSnapshot,
}

#[derive(Debug, Serialize)]
struct ReplicaPayload<'a> {
    replica: &'a str,
}

/// Stateless request factory; path segments are escaped once up front.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    node_path: String,
    replica_path: String,
    replica_id: String,
    interval_secs: u64,
    poll_timeout: Duration,
    flush_timeout: Duration,
    deregister_timeout: Duration,
}

impl RequestBuilder {
    pub fn new(config: &Config) -> Self {
        let node_path = format!(
            "/reporter/{}/{}/",
            encode_segment(config.probe_id()),
            encode_segment(config.node_id())
        );
        let replica_path = format!("{}{}/", node_path, encode_segment(config.replica_id()));

        Self {
            node_path,
            replica_path,
            replica_id: config.replica_id().to_string(),
            interval_secs: config.interval_secs(),
            poll_timeout: POLL_TIMEOUT,
            flush_timeout: FLUSH_TIMEOUT,
            deregister_timeout: DEREGISTER_TIMEOUT,
        }
    }

    /// Override the per-kind timeouts.
    pub fn with_timeouts(mut self, poll: Duration, flush: Duration, deregister: Duration) -> Self {
        self.poll_timeout = poll;
        self.flush_timeout = flush;
        self.deregister_timeout = deregister;
        self
    }

    pub fn poll(&self, load: LoadSnapshot) -> Result<RequestDescriptor, DispatchError> {
        let body = serde_json::to_vec(&PollPayload {
            replica: &self.replica_id,
            interval: self.interval_secs,
            load,
        })?;

        Ok(RequestDescriptor {
            kind: RequestKind::Poll,
            method: Method::POST,
            path: self.node_path.clone(),
            headers: headers(Some(body.len())),
            body: Some(body),
            timeout: self.poll_timeout,
        })
    }

    pub fn flush(&self) -> RequestDescriptor {
        RequestDescriptor {
            kind: RequestKind::Flush,
            method: Method::DELETE,
            path: self.replica_path.clone(),
            headers: headers(None),
            body: None,
            timeout: self.flush_timeout,
        }
    }

    pub fn deregister(&self) -> Result<RequestDescriptor, DispatchError> {
        let body = serde_json::to_vec(&ReplicaPayload {
            replica: &self.replica_id,
        })?;

        Ok(RequestDescriptor {
            kind: RequestKind::Deregister,
            method: Method::DELETE,
            path: self.node_path.clone(),
            headers: headers(Some(body.len())),
            body: Some(body),
            timeout: self.deregister_timeout,
        })
    }
}

fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_SEGMENT).to_string()
}

fn headers(body_len: Option<usize>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    if let Some(len) = body_len {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn config(probe: &str, node: &str, replica: &str) -> Config {
        Config::from_json(&json!({
            "url": "http://host:9999",
            "token": "T",
            "probe_id": probe,
            "node_id": node,
            "replica_id": replica,
            "interval": 30
        }))
        .unwrap()
    }

    #[test]
    fn test_poll_request() {
        let builder = RequestBuilder::new(&config("p", "n", "r"));
        let request = builder.poll(LoadSnapshot { cpu: 0.5, ram: 0.25 }).unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/reporter/p/n/");
        assert_eq!(request.timeout, POLL_TIMEOUT);

        let body = request.body.as_ref().unwrap();
        let value: Value = serde_json::from_slice(body).unwrap();
        assert_eq!(
            value,
            json!({ "replica": "r", "interval": 30, "load": { "cpu": 0.5, "ram": 0.25 } })
        );
        assert_eq!(request.headers[CONTENT_LENGTH], body.len().to_string().as_str());
        assert_eq!(request.headers[CONTENT_TYPE], JSON_CONTENT_TYPE);
    }

    #[test]
    fn test_poll_body_keeps_overload_ratio() {
        let builder = RequestBuilder::new(&config("p", "n", "r"));
        let request = builder.poll(LoadSnapshot { cpu: 1.75, ram: 0.5 }).unwrap();
        let value: Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
        assert_eq!(value["load"]["cpu"], json!(1.75));
    }

    #[test]
    fn test_flush_request() {
        let request = RequestBuilder::new(&config("p", "n", "r")).flush();
        assert_eq!(request.method, Method::DELETE);
        assert_eq!(request.path, "/reporter/p/n/r/");
        assert!(request.body.is_none());
        assert!(request.headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(request.timeout, FLUSH_TIMEOUT);
    }

    #[test]
    fn test_deregister_request() {
        let request = RequestBuilder::new(&config("p", "n", "r")).deregister().unwrap();
        assert_eq!(request.method, Method::DELETE);
        assert_eq!(request.path, "/reporter/p/n/");
        assert_eq!(request.body.as_deref(), Some(br#"{"replica":"r"}"#.as_slice()));
        assert_eq!(request.headers[CONTENT_LENGTH], "15");
        assert_eq!(request.timeout, DEREGISTER_TIMEOUT);
    }

    #[test]
    fn test_path_segments_are_escaped() {
        let builder = RequestBuilder::new(&config("my probe", "a/b", "10.0.0.1:80"));
        assert_eq!(builder.flush().path, "/reporter/my%20probe/a%2Fb/10.0.0.1%3A80/");
    }

    #[test]
    fn test_unreserved_characters_kept() {
        assert_eq!(encode_segment("socket-client_1.x~(a)"), "socket-client_1.x~(a)");
    }
}
