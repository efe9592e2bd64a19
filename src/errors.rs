use thiserror::Error;

//typed errors so callers and tests can match on the failure class

/// Rejected configuration, surfaced synchronously when a reporter is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required option `{field}`")]
    Missing { field: &'static str },

    #[error("option `{field}` must be a string")]
    InvalidType { field: &'static str },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported url scheme {scheme:?}, expected http or https")]
    UnsupportedScheme { scheme: String },

    #[error("unknown memory source {raw:?}, expected one of: used, active, process")]
    InvalidMemorySource { raw: String },
}

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("failed to read {path}: {source}")]
    ProcReadError {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {field} from {path}: {raw}")]
    ParseError {
        path: String,
        field: String,
        raw: String,
    },

    #[error("process {pid} disappeared during collection")]
    ProcessVanished { pid: u32 },

    #[error("metric unavailable on this platform: {what}")]
    Unsupported { what: String },
}

/// Failure of a single dispatch (poll, flush or deregister).
///
/// These never escape the scheduling loop; they halve the next delay and get
/// logged. Only the flush/deregister completion hands one back to the caller.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("endpoint answered with status {status}")]
    Status { status: u16 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("could not sample load: {0}")]
    Sample(#[from] CollectorError),

    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("request url {url:?} is invalid")]
    InvalidUrl { url: String },

    #[error("dispatch abandoned before an outcome was known")]
    Abandoned,
}

#[derive(Error, Debug)]
pub enum ReporterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("reporter must be started from within a tokio runtime")]
    NoRuntime,

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}
