//! CPU and memory load checks

use async_trait::async_trait;
use slumber_api::Verdict;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use super::{CheckResult, PolicyCheck};

/// Keeps the machine awake while global CPU usage is at or above the
/// threshold.
///
/// CPU usage is measured between refreshes, so the first tick after
/// startup reports against the baseline taken at construction.
pub struct CpuCheck {
    threshold_percent: f32,
    system: System,
}

impl CpuCheck {
    pub fn new(threshold_percent: f32) -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::new().with_cpu_usage()),
        );
        // Baseline measurement; the first check() diffs against this.
        system.refresh_cpu();
        Self {
            threshold_percent,
            system,
        }
    }
}

#[async_trait]
impl PolicyCheck for CpuCheck {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn check(&mut self) -> CheckResult {
        self.system.refresh_cpu();
        let usage = self.system.global_cpu_info().cpu_usage();
        Ok(if usage >= self.threshold_percent {
            Verdict::suspend(format!(
                "CPU load at {:.0}% (threshold {:.0}%)",
                usage, self.threshold_percent
            ))
        } else {
            Verdict::allow()
        })
    }
}

/// Keeps the machine awake while memory usage is at or above the
/// threshold.
pub struct MemoryCheck {
    threshold_percent: f32,
    system: System,
}

impl MemoryCheck {
    pub fn new(threshold_percent: f32) -> Self {
        Self {
            threshold_percent,
            system: System::new_with_specifics(
                RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
            ),
        }
    }

    fn usage_percent(&self) -> f32 {
        let total = self.system.total_memory();
        if total == 0 {
            return 0.0;
        }
        (self.system.used_memory() as f64 / total as f64 * 100.0) as f32
    }
}

#[async_trait]
impl PolicyCheck for MemoryCheck {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn check(&mut self) -> CheckResult {
        self.system.refresh_memory();
        let usage = self.usage_percent();
        Ok(if usage >= self.threshold_percent {
            Verdict::suspend(format!(
                "Memory usage at {:.0}% (threshold {:.0}%)",
                usage, self.threshold_percent
            ))
        } else {
            Verdict::allow()
        })
    }
}
