use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Resource usage of one process at the time of sampling
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceUsage {
    /// CPU usage in percent (can exceed 100 on multi-core systems)
    pub cpu_usage: f32,
    /// Resident memory in bytes
    pub memory: u64,
}

/// Samples CPU and memory usage for supervised processes.
///
/// CPU usage is computed between two refreshes, so the first sample for a
/// pid reports 0%; keep one sampler alive to get meaningful numbers.
pub struct ResourceSampler {
    system: System,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Sample `pid`, or `None` if the process no longer exists
    pub fn sample(&mut self, pid: u32) -> Option<ResourceUsage> {
        let sys_pid = Pid::from_u32(pid);

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        self.system.process(sys_pid).map(|process| ResourceUsage {
            cpu_usage: process.cpu_usage(),
            memory: process.memory(),
        })
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}
