use super::ratio;
use crate::errors::CollectorError;
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Resident memory of the current process against total host memory.
pub struct ProcessMemoryCollector {
    system: Mutex<System>,
}

impl ProcessMemoryCollector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    pub fn ram_ratio(&self) -> Result<f64, CollectorError> {
        let pid = sysinfo::get_current_pid().map_err(|e| CollectorError::Unsupported {
            what: format!("current pid: {e}"),
        })?;

        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let resident = Self::resident_bytes(&system, pid)?;
        Ok(ratio(resident as f64, system.total_memory() as f64))
    }

    fn resident_bytes(system: &System, pid: Pid) -> Result<u64, CollectorError> {
        system
            .process(pid)
            .map(|process| process.memory())
            .ok_or(CollectorError::ProcessVanished { pid: pid.as_u32() })
    }
}

impl Default for ProcessMemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}
