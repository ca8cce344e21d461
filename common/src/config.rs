//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Throttling configuration for remote requests
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrottleConfig {
    /// Remote requests per second (0 = no throttle)
    pub ops_throttle: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress logs and per-object success records
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    /// Default log filter for the configured verbosity. SDK internals stay at ERROR below TRACE.
    #[must_use]
    pub fn log_directives(&self) -> String {
        if self.quiet {
            return "off".to_string();
        }
        match self.verbose {
            0 => "error".to_string(),
            1 => "error,s3cp=info,common=info,store=info,throttle=info".to_string(),
            2 => "error,s3cp=debug,common=debug,store=debug,throttle=debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}
