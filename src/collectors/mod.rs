pub mod cpu;
pub mod memory;
pub mod process;

use crate::config::MemorySource;
use crate::errors::CollectorError;
use async_trait::async_trait;
use serde::Serialize;

use self::cpu::CpuCollector;
use self::memory::MemoryCollector;
use self::process::ProcessMemoryCollector;

/// Supplies instantaneous load ratios. Pure query, sampled fresh on every dispatch.
#[async_trait]
pub trait LoadSource: Send + Sync {
    /// name of the source as used in logs
    fn name(&self) -> &'static str;

    async fn sample(&self) -> Result<LoadSnapshot, CollectorError>;
}

/// Load ratios as reported to the endpoint.
///
/// `cpu` is the 1-minute load average per logical CPU and may exceed 1.0
/// under overload. `ram` is used memory over total memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadSnapshot {
    pub cpu: f64,
    pub ram: f64,
}

/// Host-backed [`LoadSource`]; the memory counter is fixed at construction.
pub struct HostLoadSource {
    cpu: CpuCollector,
    memory: MemoryCollector,
    process: Option<ProcessMemoryCollector>,
    memory_source: MemorySource,
}

impl HostLoadSource {
    pub fn new(memory_source: MemorySource) -> Self {
        let process = match memory_source {
            MemorySource::Process => Some(ProcessMemoryCollector::new()),
            MemorySource::Used | MemorySource::Active => None,
        };

        Self {
            cpu: CpuCollector::new(),
            memory: MemoryCollector::new(),
            process,
            memory_source,
        }
    }

    async fn ram_ratio(&self) -> Result<f64, CollectorError> {
        match (&self.process, self.memory_source) {
            (Some(process), _) => process.ram_ratio(),
            (None, MemorySource::Active) => self.memory.collect().await?.active_ratio(),
            (None, _) => Ok(self.memory.collect().await?.used_ratio()),
        }
    }
}

#[async_trait]
impl LoadSource for HostLoadSource {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn sample(&self) -> Result<LoadSnapshot, CollectorError> {
        let cpu = self.cpu.collect().await?.load_ratio();
        let ram = self.ram_ratio().await?;
        Ok(LoadSnapshot { cpu, ram })
    }
}

/// Ratio helper shared by the collectors; an empty total reads as idle.
pub(crate) fn ratio(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total
    } else {
        0.0
    }
}
