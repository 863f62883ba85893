//! Host CPU and memory sampling for the metrics endpoint

use std::sync::{Mutex, PoisonError};
use sysinfo::System;

/// Host usage at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

/// Keeps the previous CPU reading so each sample covers the time since the
/// last one
pub struct SystemSampler {
    system: Mutex<System>,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
        }
    }

    pub fn sample(&self) -> SystemSample {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_cpu();
        system.refresh_memory();

        SystemSample {
            cpu_percent: clamp_percent(f64::from(system.global_cpu_info().cpu_usage())),
            memory_percent: memory_percent(system.used_memory(), system.total_memory()),
        }
    }
}

fn memory_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    clamp_percent(used as f64 / total as f64 * 100.0)
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
