use super::ratio;
use crate::errors::CollectorError;
use tokio::fs;

/// CPU load collector that reads directly from /proc/loadavg and /proc/stat.
pub struct CpuCollector;

/// 1-minute load average and logical CPU count at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuLoad {
    pub load_avg_1m: f64,
    pub num_cores: u32,
}

impl CpuLoad {
    /// 1-minute load average per logical CPU. Not clamped, overload reads above 1.0.
    pub fn load_ratio(&self) -> f64 {
        ratio(self.load_avg_1m, f64::from(self.num_cores))
    }
}

impl CpuCollector {
    pub fn new() -> Self {
        Self
    }

    /// Parse the 1-minute load average, the first field of /proc/loadavg.
    fn parse_loadavg(content: &str) -> Result<f64, CollectorError> {
        let raw = content.split_whitespace().next().unwrap_or_default();
        raw.parse::<f64>().map_err(|_| CollectorError::ParseError {
            path: "/proc/loadavg".into(),
            field: "1m".into(),
            raw: content.to_string(),
        })
    }

    /// Count logical CPUs from /proc/stat (lines starting with "cpu" followed by a digit).
    fn count_cores(stat_content: &str) -> u32 {
        stat_content
            .lines()
            .filter(|line| {
                line.starts_with("cpu") && line.chars().nth(3).map_or(false, |c| c.is_ascii_digit())
            })
            .count() as u32
    }

    pub async fn collect(&self) -> Result<CpuLoad, CollectorError> {
        let loadavg_content = fs::read_to_string("/proc/loadavg").await.map_err(|e| {
            CollectorError::ProcReadError {
                path: "/proc/loadavg".into(),
                source: e,
            }
        })?;
        let load_avg_1m = Self::parse_loadavg(&loadavg_content)?;

        let stat_content =
            fs::read_to_string("/proc/stat")
                .await
                .map_err(|e| CollectorError::ProcReadError {
                    path: "/proc/stat".into(),
                    source: e,
                })?;

        let num_cores = Self::count_cores(&stat_content);
        if num_cores == 0 {
            return Err(CollectorError::ParseError {
                path: "/proc/stat".into(),
                field: "cpuN".into(),
                raw: "no per-cpu lines".into(),
            });
        }

        Ok(CpuLoad {
            load_avg_1m,
            num_cores,
        })
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────
// Unit tests — validate on hardcoded information
// ─────────────────────────────────────────────
