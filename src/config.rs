// config.rs - scheduler configuration and defaults

use std::time::Duration;

/// GPU allocation policy. All GPUs are addressed uniformly by index; a
/// fixed count is reserved for the host and excluded from the assignable
/// pool, rather than pinning a specific "batch" GPU role (see DESIGN.md,
/// Open Question (a)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuReservation {
    pub reserved_for_host: u32,
    pub auto_detect: bool,
}

impl Default for GpuReservation {
    fn default() -> Self {
        Self {
            reserved_for_host: 1,
            auto_detect: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuReservation {
    pub reserved_for_host: u32,
    pub default_threads: u32,
}

impl Default for CpuReservation {
    fn default() -> Self {
        Self {
            reserved_for_host: 4,
            default_threads: 4,
        }
    }
}

/// Scheduler-wide configuration. Constructed with [`SchedulerConfig::default`]
/// and adjusted with the `with_*` methods; there is no global mutable
/// singleton, each [`crate::facade::Facade`] owns its own config.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub gpu: GpuReservation,
    pub cpu: CpuReservation,
    pub max_concurrent_processes: usize,
    pub process_timeout: Duration,
    pub terminate_grace_period: Duration,
    pub kill_grace_period: Duration,
    pub auto_restart_on_failure: bool,
    pub keep_latest_files: usize,
    pub auto_cleanup_age_hours: u64,
    pub cleanup_on_exit: bool,
    pub default_frame_range: String,
    pub default_step: u32,
    pub always_include_first_last: bool,
    pub fallback_enabled: bool,
    pub fallback_chain: Vec<crate::models::Renderer>,
    pub log_cap_per_job: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            gpu: GpuReservation::default(),
            cpu: CpuReservation::default(),
            max_concurrent_processes: 4,
            process_timeout: Duration::from_secs(3600),
            terminate_grace_period: Duration::from_secs(10),
            kill_grace_period: Duration::from_secs(5),
            auto_restart_on_failure: false,
            keep_latest_files: 5,
            auto_cleanup_age_hours: 24,
            cleanup_on_exit: true,
            default_frame_range: "1-24".to_string(),
            default_step: 1,
            always_include_first_last: true,
            fallback_enabled: true,
            fallback_chain: vec![
                crate::models::Renderer::Redshift,
                crate::models::Renderer::Arnold,
                crate::models::Renderer::Vray,
            ],
            log_cap_per_job: 10_000,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrent_processes(mut self, n: usize) -> Self {
        self.max_concurrent_processes = n;
        self
    }

    pub fn with_gpu_reservation(mut self, gpu: GpuReservation) -> Self {
        self.gpu = gpu;
        self
    }

    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout = timeout;
        self
    }

    pub fn with_fallback_chain(mut self, chain: Vec<crate::models::Renderer>) -> Self {
        self.fallback_chain = chain;
        self
    }

    pub fn with_log_cap_per_job(mut self, cap: usize) -> Self {
        self.log_cap_per_job = cap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.max_concurrent_processes, 4);
        assert_eq!(cfg.gpu.reserved_for_host, 1);
        assert_eq!(cfg.cpu.reserved_for_host, 4);
        assert_eq!(cfg.keep_latest_files, 5);
        assert!(cfg.always_include_first_last);
        assert_eq!(cfg.log_cap_per_job, 10_000);
    }

    #[test]
    fn builder_methods_override_defaults() {
        let cfg = SchedulerConfig::default().with_max_concurrent_processes(8);
        assert_eq!(cfg.max_concurrent_processes, 8);
    }
}
