//! Host sampler backed by `sysinfo`
//!
//! Reads:
//! - resident memory of the current process
//! - total physical memory of the host
//! - process CPU usage (usage mode) or logical core count (cores mode)

use super::{CpuMode, ResourceSampler, CPU_UNAVAILABLE};
use crate::models::{MemoryStats, ResourceSnapshot};
use chrono::Utc;
use sysinfo::{Pid, System};
use tracing::{debug, warn};

/// Sampler for the current process on the local host
pub struct SystemSampler {
    system: System,
    pid: Option<Pid>,
    mode: CpuMode,
}

impl SystemSampler {
    pub fn new(mode: CpuMode) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = %e, "Failed to get current PID, process counters unavailable");
                None
            }
        };

        let mut sampler = Self {
            system: System::new(),
            pid,
            mode,
        };
        // CPU usage is a delta between refreshes, so take a baseline now
        sampler.refresh_process();
        sampler
    }

    fn refresh_process(&mut self) -> bool {
        match self.pid {
            Some(pid) => self.system.refresh_process(pid),
            None => false,
        }
    }

    fn read_cpu(&self, refreshed: bool) -> f64 {
        if !refreshed {
            return CPU_UNAVAILABLE;
        }
        self.pid
            .and_then(|pid| self.system.process(pid))
            .map(|process| process.cpu_usage() as f64)
            .unwrap_or(CPU_UNAVAILABLE)
    }

    fn read_allocated(&self, refreshed: bool) -> u64 {
        if !refreshed {
            return 0;
        }
        self.pid
            .and_then(|pid| self.system.process(pid))
            .map(|process| process.memory())
            .unwrap_or(0)
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&mut self) -> ResourceSnapshot {
        let timestamp = Utc::now();
        let refreshed = self.refresh_process();
        if !refreshed {
            debug!(pid = ?self.pid, "Process refresh failed, reporting degraded counters");
        }
        self.system.refresh_memory();

        let cores = num_cpus::get() as f64;
        let (cpu, cpu_num) = match self.mode {
            CpuMode::Cores => (cores, None),
            CpuMode::Usage => (self.read_cpu(refreshed), Some(cores)),
        };

        ResourceSnapshot {
            timestamp,
            cpu,
            cpu_num,
            memory: MemoryStats {
                allocated: self.read_allocated(refreshed),
                system: self.system.total_memory(),
            },
            hostname: System::host_name(),
        }
    }
}
