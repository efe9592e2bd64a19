//! Pushes host load (CPU and memory ratios) to a Vigil endpoint on behalf of
//! one probe/node/replica, retrying sooner after a failed report.
//!
//! ```no_run
//! use vigil_reporter::{Config, Reporter, StopOptions};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_json(&serde_json::json!({
//!     "url": "https://status.example.com",
//!     "token": "REPLACE_THIS_WITH_A_SECRET_KEY",
//!     "probe_id": "relay",
//!     "node_id": "socket-client",
//!     "replica_id": "192.168.1.10",
//!     "interval": 30
//! }))?;
//!
//! let reporter = Reporter::new(config)?;
//! // ...
//! let stopped = reporter.stop(StopOptions::flush());
//! stopped.completion.await?;
//! # Ok(())
//! # }
//! ```

pub mod collectors;
pub mod config;
pub mod errors;
pub mod reporter;
pub mod request;
pub mod scheduler;
pub mod transport;

pub use config::{Config, MemorySource, ReporterOptions};
pub use errors::{CollectorError, ConfigError, DispatchError, ReporterError};
pub use reporter::{Completion, Reporter, ReporterBuilder, StopOptions, Stopped};
pub use scheduler::Phase;
