//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "PARTEST";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Worker count from PARTEST_PROCESSES
    pub processes: Option<usize>,
    /// Worker count factor from PARTEST_MULTIPLY
    pub multiply: Option<f64>,
    /// Chunk timeout in seconds from PARTEST_CHUNK_TIMEOUT
    pub chunk_timeout: Option<f64>,
    /// Suffix appended to the root from PARTEST_PATH_PREFIX
    pub path_prefix: Option<String>,
    /// Output log file from PARTEST_LOGGER
    pub logger: Option<String>,
    /// Extra test options from PARTEST_TEST_OPTIONS
    pub test_options: Option<String>,
    /// Config file from PARTEST_CONFIG
    pub config_file: Option<String>,
    /// Verbose from PARTEST_VERBOSE
    pub verbose: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            processes: get_env_parse("PROCESSES"),
            multiply: get_env_parse("MULTIPLY"),
            chunk_timeout: get_env_parse("CHUNK_TIMEOUT"),
            path_prefix: get_env("PATH_PREFIX"),
            logger: get_env("LOGGER"),
            test_options: get_env("TEST_OPTIONS"),
            config_file: get_env("CONFIG"),
            verbose: get_env_bool("VERBOSE"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.processes.is_some()
            || self.multiply.is_some()
            || self.chunk_timeout.is_some()
            || self.path_prefix.is_some()
            || self.logger.is_some()
            || self.test_options.is_some()
            || self.config_file.is_some()
            || self.verbose.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_PROCESSES:     {:?}", ENV_PREFIX, self.processes);
        println!("  {}_MULTIPLY:      {:?}", ENV_PREFIX, self.multiply);
        println!("  {}_CHUNK_TIMEOUT: {:?}", ENV_PREFIX, self.chunk_timeout);
        println!("  {}_PATH_PREFIX:   {:?}", ENV_PREFIX, self.path_prefix);
        println!("  {}_LOGGER:        {:?}", ENV_PREFIX, self.logger);
        println!("  {}_TEST_OPTIONS:  {:?}", ENV_PREFIX, self.test_options);
        println!("  {}_CONFIG:        {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_VERBOSE:       {:?}", ENV_PREFIX, self.verbose);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.trim().parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    fn var(mut self, name: &str, value: impl ToString) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_{name}"), value.to_string()));
        self
    }

    pub fn processes(self, processes: usize) -> Self {
        self.var("PROCESSES", processes)
    }

    pub fn multiply(self, multiply: f64) -> Self {
        self.var("MULTIPLY", multiply)
    }

    pub fn chunk_timeout(self, seconds: f64) -> Self {
        self.var("CHUNK_TIMEOUT", seconds)
    }

    pub fn path_prefix(self, prefix: &str) -> Self {
        self.var("PATH_PREFIX", prefix)
    }

    pub fn verbose(self, verbose: &str) -> Self {
        self.var("VERBOSE", verbose)
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all PARTEST environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_PROCESSES      Number of worker processes");
    println!("  {ENV_PREFIX}_MULTIPLY       Factor applied to the process count");
    println!("  {ENV_PREFIX}_CHUNK_TIMEOUT  Seconds between output flushes");
    println!("  {ENV_PREFIX}_PATH_PREFIX    Appended to the test root, e.g. '!(slow)'");
    println!("  {ENV_PREFIX}_LOGGER         File receiving a copy of all output");
    println!("  {ENV_PREFIX}_TEST_OPTIONS   Options passed to every worker command");
    println!("  {ENV_PREFIX}_CONFIG         Path to configuration file");
    println!("  {ENV_PREFIX}_VERBOSE        Enable verbose output (true/false)");
    println!("  RUST_LOG                Overrides the log filter");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_PROCESSES=8");
    println!("  partest run test/");
}
