//! Process resource sampling

use serde::Serialize;
use std::sync::Mutex;
use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Resource usage snapshot included in status reports
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceUsage {
    pub running_collectors: usize,
    pub total_collectors: usize,
    pub memory_mb: Option<u64>,
    /// CPU usage of this process; meaningful from the second sample on
    pub cpu_percent: Option<f32>,
}

/// Samples memory and CPU of the current process
///
/// Keeps its `System` between calls because CPU usage is computed from the
/// difference between two refreshes.
pub struct ResourceSampler {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            pid: get_current_pid().ok(),
            system: Mutex::new(System::new()),
        }
    }

    /// Memory in MB and CPU percent, when the platform exposes them
    pub fn sample(&self) -> (Option<u64>, Option<f32>) {
        let Some(pid) = self.pid else {
            return (None, None);
        };

        let mut system = self
            .system
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );

        match system.process(pid) {
            Some(process) => (
                Some(process.memory() / (1024 * 1024)),
                Some(process.cpu_usage()),
            ),
            None => (None, None),
        }
    }

    pub fn usage(&self, running_collectors: usize, total_collectors: usize) -> ResourceUsage {
        let (memory_mb, cpu_percent) = self.sample();
        ResourceUsage {
            running_collectors,
            total_collectors,
            memory_mb,
            cpu_percent,
        }
    }
}

impl std::fmt::Debug for ResourceSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSampler").field("pid", &self.pid).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_carries_counts() {
        let sampler = ResourceSampler::new();
        let usage = sampler.usage(2, 5);
        assert_eq!(usage.running_collectors, 2);
        assert_eq!(usage.total_collectors, 5);
        if let Some(cpu) = usage.cpu_percent {
            assert!(cpu >= 0.0);
        }
    }
}
