use crate::errors::ConfigError;
use clap::{Args, ValueEnum};
use reqwest::Url;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Interval used when none (or a non-positive one) is configured.
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

/// Longest accepted interval; larger values are clamped to it.
pub const MAX_INTERVAL_SECS: u64 = u32::MAX as u64;

/// Which counter stands for "used memory" when computing the ram ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum MemorySource {
    /// OS-reported used memory (total minus available).
    #[default]
    Used,
    /// OS "Active" memory from /proc/meminfo.
    Active,
    /// Resident memory of this process.
    Process,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::Used => "used",
            MemorySource::Active => "active",
            MemorySource::Process => "process",
        }
    }
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemorySource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "used" => Ok(MemorySource::Used),
            "active" => Ok(MemorySource::Active),
            "process" | "heap" => Ok(MemorySource::Process),
            _ => Err(ConfigError::InvalidMemorySource { raw: s.to_string() }),
        }
    }
}

/// Raw reporter options, as given on the command line, through the
/// environment, or by an embedding application. Validated into [`Config`].
#[derive(Args, Debug, Clone, Default)]
pub struct ReporterOptions {
    /// Base URL of the Vigil endpoint, e.g. https://status.example.com.
    #[arg(long, env = "VIGIL_REPORTER_URL")]
    pub url: Option<String>,

    /// Reporter token, sent as the basic-auth password.
    #[arg(long, env = "VIGIL_REPORTER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Probe identifier (logical service).
    #[arg(long, env = "VIGIL_REPORTER_PROBE_ID")]
    pub probe_id: Option<String>,

    /// Node identifier (host group).
    #[arg(long, env = "VIGIL_REPORTER_NODE_ID")]
    pub node_id: Option<String>,

    /// Replica identifier (this instance).
    #[arg(long, env = "VIGIL_REPORTER_REPLICA_ID")]
    pub replica_id: Option<String>,

    /// Report interval in seconds; non-positive values fall back to 30.
    #[arg(long, env = "VIGIL_REPORTER_INTERVAL", allow_negative_numbers = true)]
    pub interval: Option<i64>,

    /// Counter used for the memory ratio.
    #[arg(long, env = "VIGIL_REPORTER_MEMORY_SOURCE", value_enum, default_value_t)]
    pub memory_source: MemorySource,
}

/// Validated, immutable reporter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    url: Url,
    token: String,
    probe_id: String,
    node_id: String,
    replica_id: String,
    interval_secs: u64,
    memory_source: MemorySource,
}

impl Config {
    /// Validate a loose JSON options object.
    ///
    /// Required fields that are present but not strings are rejected with
    /// [`ConfigError::InvalidType`]; an `interval` that is not a positive number
    /// silently becomes [`DEFAULT_INTERVAL_SECS`].
    pub fn from_json(value: &Value) -> Result<Self, ConfigError> {
        let map = value.as_object().ok_or(ConfigError::Missing { field: "options" })?;

        let memory_source = match map.get("memory_source") {
            Some(Value::String(raw)) => raw.parse()?,
            Some(Value::Null) | None => {
                if map.get("use_active_memory") == Some(&Value::Bool(true)) {
                    MemorySource::Active
                } else {
                    MemorySource::Used
                }
            }
            Some(other) => {
                return Err(ConfigError::InvalidMemorySource {
                    raw: other.to_string(),
                })
            }
        };

        Self::validate(
            json_str(map, "url")?,
            json_str(map, "token")?,
            json_str(map, "probe_id")?,
            json_str(map, "node_id")?,
            json_str(map, "replica_id")?,
            map.get("interval").and_then(Value::as_f64),
            memory_source,
        )
    }

    fn validate(
        url: Option<String>,
        token: Option<String>,
        probe_id: Option<String>,
        node_id: Option<String>,
        replica_id: Option<String>,
        interval: Option<f64>,
        memory_source: MemorySource,
    ) -> Result<Self, ConfigError> {
        let url = required(url, "url")?;
        let token = required(token, "token")?;
        let probe_id = required(probe_id, "probe_id")?;
        let node_id = required(node_id, "node_id")?;
        let replica_id = required(replica_id, "replica_id")?;

        Ok(Self {
            url: parse_url(&url)?,
            token,
            probe_id,
            node_id,
            replica_id,
            interval_secs: normalize_interval(interval),
            memory_source,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Base URL without a trailing slash, ready to have request paths appended.
    pub fn base_url(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn probe_id(&self) -> &str {
        &self.probe_id
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn memory_source(&self) -> MemorySource {
        self.memory_source
    }
}

impl TryFrom<ReporterOptions> for Config {
    type Error = ConfigError;

    fn try_from(options: ReporterOptions) -> Result<Self, Self::Error> {
        Self::validate(
            options.url,
            options.token,
            options.probe_id,
            options.node_id,
            options.replica_id,
            options.interval.map(|secs| secs as f64),
            options.memory_source,
        )
    }
}

impl ReporterOptions {
    /// Fill a missing replica id from the host name, upon failure leave it unset.
    pub fn with_hostname_replica(mut self) -> Self {
        if self.replica_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            self.replica_id = hostname::get()
                .ok()
                .map(|h| h.to_string_lossy().into_owned())
                .filter(|h| !h.is_empty());
        }
        self
    }
}

fn json_str(map: &Map<String, Value>, field: &'static str) -> Result<Option<String>, ConfigError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ConfigError::InvalidType { field }),
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing { field })
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ConfigError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".into(),
        });
    }

    Ok(url)
}

/// Positive finite intervals are rounded up to whole seconds and clamped to
/// [`MAX_INTERVAL_SECS`], anything else falls back to the default.
fn normalize_interval(interval: Option<f64>) -> u64 {
    match interval {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            secs.ceil().min(MAX_INTERVAL_SECS as f64) as u64
        }
        _ => DEFAULT_INTERVAL_SECS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "url": "http://localhost:8080",
            "token": "REPLACE_THIS_WITH_A_SECRET_KEY",
            "probe_id": "relay",
            "node_id": "socket-client",
            "replica_id": "192.168.1.10",
            "interval": 30
        })
    }

    fn without(field: &str) -> Value {
        let mut value = valid();
        value.as_object_mut().unwrap().remove(field);
        value
    }

    #[test]
    fn test_valid_options() {
        let config = Config::from_json(&valid()).unwrap();
        assert_eq!(config.probe_id(), "relay");
        assert_eq!(config.node_id(), "socket-client");
        assert_eq!(config.replica_id(), "192.168.1.10");
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert_eq!(config.memory_source(), MemorySource::Used);
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_missing_required_fields() {
        for field in ["url", "token", "probe_id", "node_id", "replica_id"] {
            let err = Config::from_json(&without(field)).unwrap_err();
            assert_eq!(err, ConfigError::Missing { field }, "field {field}");
        }
    }

    #[test]
    fn test_non_string_fields_rejected() {
        let mut value = valid();
        value["url"] = json!(0);
        assert_eq!(
            Config::from_json(&value).unwrap_err(),
            ConfigError::InvalidType { field: "url" }
        );

        let mut value = valid();
        value["replica_id"] = json!(["a"]);
        assert_eq!(
            Config::from_json(&value).unwrap_err(),
            ConfigError::InvalidType { field: "replica_id" }
        );
    }

    #[test]
    fn test_blank_string_is_missing() {
        let mut value = valid();
        value["token"] = json!("   ");
        assert_eq!(
            Config::from_json(&value).unwrap_err(),
            ConfigError::Missing { field: "token" }
        );
    }

    #[test]
    fn test_invalid_url() {
        let mut value = valid();
        value["url"] = json!("not a url");
        assert!(matches!(
            Config::from_json(&value),
            Err(ConfigError::InvalidUrl { .. })
        ));

        value["url"] = json!("ftp://localhost");
        assert!(matches!(
            Config::from_json(&value),
            Err(ConfigError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn test_interval_defaults() {
        for interval in [json!(0), json!(-5), json!("ten"), Value::Null] {
            let mut value = valid();
            value["interval"] = interval;
            assert_eq!(Config::from_json(&value).unwrap().interval_secs(), 30);
        }
        assert_eq!(Config::from_json(&without("interval")).unwrap().interval_secs(), 30);

        let mut value = valid();
        value["interval"] = json!(2.5);
        assert_eq!(Config::from_json(&value).unwrap().interval_secs(), 3);
    }

    #[test]
    fn test_huge_interval_is_clamped() {
        let mut value = valid();
        value["interval"] = json!(1e300);
        assert_eq!(
            Config::from_json(&value).unwrap().interval_secs(),
            MAX_INTERVAL_SECS
        );

        let options = ReporterOptions {
            url: Some("http://localhost:8080".into()),
            token: Some("T".into()),
            probe_id: Some("p".into()),
            node_id: Some("n".into()),
            replica_id: Some("r".into()),
            interval: Some(i64::MAX),
            memory_source: MemorySource::Used,
        };
        assert_eq!(Config::try_from(options).unwrap().interval_secs(), MAX_INTERVAL_SECS);
    }

    #[test]
    fn test_memory_source_options() {
        let mut value = valid();
        value["use_active_memory"] = json!(true);
        assert_eq!(
            Config::from_json(&value).unwrap().memory_source(),
            MemorySource::Active
        );

        value["memory_source"] = json!("process");
        assert_eq!(
            Config::from_json(&value).unwrap().memory_source(),
            MemorySource::Process
        );

        value["memory_source"] = json!("swap");
        assert!(matches!(
            Config::from_json(&value),
            Err(ConfigError::InvalidMemorySource { .. })
        ));
    }

    #[test]
    fn test_options_conversion() {
        let options = ReporterOptions {
            url: Some("https://status.example.com/".into()),
            token: Some("T".into()),
            probe_id: Some("p".into()),
            node_id: Some("n".into()),
            replica_id: Some("r".into()),
            interval: Some(-1),
            memory_source: MemorySource::Active,
        };
        let config = Config::try_from(options).unwrap();
        assert_eq!(config.interval_secs(), DEFAULT_INTERVAL_SECS);
        assert_eq!(config.base_url(), "https://status.example.com");
        assert_eq!(config.memory_source(), MemorySource::Active);
    }
}
