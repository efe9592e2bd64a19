use super::ratio;
use crate::errors::CollectorError;
use std::collections::HashMap;
use tokio::fs;

/// Memory metrics collector reading directly from /proc/meminfo.
pub struct MemoryCollector;

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    /// Absent on kernels or containers that do not export `Active`.
    pub active_bytes: Option<u64>,
}

impl MemorySnapshot {
    pub fn used_ratio(&self) -> f64 {
        ratio(self.used_bytes as f64, self.total_bytes as f64)
    }

    pub fn active_ratio(&self) -> Result<f64, CollectorError> {
        let active = self.active_bytes.ok_or_else(|| CollectorError::ParseError {
            path: "/proc/meminfo".into(),
            field: "Active".into(),
            raw: "field not found".into(),
        })?;
        Ok(ratio(active as f64, self.total_bytes as f64))
    }
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self
    }

    /// Parse /proc/meminfo into a key-value map of kB values.
    fn parse_meminfo(content: &str) -> HashMap<String, u64> {
        let mut map = HashMap::new();
        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                let key = parts[0].trim_end_matches(':').to_string();
                if let Ok(val) = parts[1].parse::<u64>() {
                    map.insert(key, val);
                }
            }
        }
        map
    }

    /// Extract a required field from meminfo, converting kB -> bytes.
    fn get_bytes(map: &HashMap<String, u64>, field: &str) -> Result<u64, CollectorError> {
        map.get(field)
            .map(|kb| kb * 1024)
            .ok_or_else(|| CollectorError::ParseError {
                path: "/proc/meminfo".into(),
                field: field.into(),
                raw: "field not found".into(),
            })
    }

    fn snapshot(content: &str) -> Result<MemorySnapshot, CollectorError> {
        let map = Self::parse_meminfo(content);

        let total = Self::get_bytes(&map, "MemTotal")?;
        // kernels before 3.14 lack MemAvailable
        let available = Self::get_bytes(&map, "MemAvailable").or_else(|_| {
            Ok::<u64, CollectorError>(
                Self::get_bytes(&map, "MemFree")?
                    + Self::get_bytes(&map, "Buffers").unwrap_or(0)
                    + Self::get_bytes(&map, "Cached").unwrap_or(0),
            )
        })?;
        Ok(MemorySnapshot {
            total_bytes: total,
            used_bytes: total.saturating_sub(available),
            active_bytes: Self::get_bytes(&map, "Active").ok(),
        })
    }

    pub async fn collect(&self) -> Result<MemorySnapshot, CollectorError> {
        let content = fs::read_to_string("/proc/meminfo")
            .await
            .map_err(|e| CollectorError::ProcReadError {
                path: "/proc/meminfo".into(),
                source: e,
            })?;

        Self::snapshot(&content)
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}
