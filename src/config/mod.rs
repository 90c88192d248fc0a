//! Configuration module
//!
//! Handles loading and managing configuration.

mod env;
mod file;

pub use env::{print_env_help, EnvConfig};
pub use file::ConfigFile;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::executor::DEFAULT_ENV_VAR;
use crate::weights::DEFAULT_RUNTIME_COVERAGE;

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Number of worker processes (defaults to the CPU count)
    pub processes: Option<usize>,

    /// Factor applied to the process count
    pub multiply: f64,

    /// Maximum time between output flushes, in milliseconds
    pub chunk_timeout_ms: u64,

    /// Environment variable carrying the worker discriminator
    pub env_var: String,

    /// Directory (or pattern) scanned for test files
    pub root: String,

    /// File name suffix identifying test files
    pub suffix: String,

    /// Command template run by each worker
    pub command: Option<String>,

    /// Options inserted after the command's program
    pub test_options: Option<String>,

    /// Recorded runtimes, one `file:seconds` per line
    pub runtime_log: Option<String>,

    /// Trust recorded runtimes when `samples * runtime_coverage >= items`
    pub runtime_coverage: f64,

    /// Maximum number of workers running at once
    pub max_concurrent: Option<usize>,

    /// File receiving a copy of all worker output
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            processes: None,
            multiply: 1.0,
            chunk_timeout_ms: 200,
            env_var: DEFAULT_ENV_VAR.to_string(),
            root: "test/".to_string(),
            suffix: "_test.rb".to_string(),
            command: None,
            test_options: None,
            runtime_log: Some("tmp/parallel_profile.log".to_string()),
            runtime_coverage: DEFAULT_RUNTIME_COVERAGE,
            max_concurrent: None,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Apply environment overrides on top of this configuration
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(processes) = env.processes {
            self.processes = Some(processes);
        }
        if let Some(multiply) = env.multiply {
            self.multiply = multiply;
        }
        if let Some(timeout) = env.chunk_timeout {
            self.chunk_timeout_ms = (timeout * 1000.0).round() as u64;
        }
        if let Some(ref logger) = env.logger {
            self.log_file = Some(logger.clone());
        }
        if let Some(ref options) = env.test_options {
            self.test_options = Some(options.clone());
        }
    }

    /// Root to scan, with an optional pattern suffix such as `!(slow)`
    pub fn scan_root(&self, path_prefix: Option<&str>) -> String {
        format!("{}{}", self.root, path_prefix.unwrap_or_default())
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }

    /// Worker count after applying the multiplier, at least one.
    ///
    /// An explicit count of zero is rejected rather than rounded up.
    pub fn worker_count(&self, requested: Option<usize>) -> Result<usize> {
        let base = requested
            .or(self.processes)
            .unwrap_or_else(default_processes);
        if base == 0 {
            bail!("Number of processes must be at least 1");
        }
        Ok(((base as f64 * self.multiply).floor() as usize).max(1))
    }

    /// Reject settings no run could use
    pub fn validate(&self) -> Result<()> {
        if self.processes == Some(0) {
            bail!("processes must be at least 1");
        }
        if !(self.multiply.is_finite() && self.multiply > 0.0) {
            bail!("multiply must be a positive number, got {}", self.multiply);
        }
        if self.chunk_timeout_ms == 0 {
            bail!("chunk_timeout_ms must be greater than 0");
        }
        if !(self.runtime_coverage.is_finite() && self.runtime_coverage > 0.0) {
            bail!(
                "runtime_coverage must be a positive number, got {}",
                self.runtime_coverage
            );
        }
        if self.max_concurrent == Some(0) {
            bail!("max_concurrent must be at least 1");
        }
        if self.env_var.is_empty() || self.env_var.contains('=') {
            bail!("env_var is not a valid variable name: {:?}", self.env_var);
        }
        Ok(())
    }
}

fn default_processes() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
