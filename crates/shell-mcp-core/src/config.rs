//! Configuration types for Shell MCP Server.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hard floor for the yield window, in milliseconds.
pub const MIN_YIELD_MS: u64 = 10;
/// Hard ceiling for the yield window, in milliseconds.
pub const MAX_YIELD_MS: u64 = 120_000;
/// Default yield window before a command is backgrounded.
pub const DEFAULT_YIELD_MS: u64 = 20_000;

/// Default hard timeout for a command, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 1_800;

/// Smallest permitted aggregated-output cap, in characters.
pub const MIN_OUTPUT_CHARS: usize = 1_000;
/// Largest permitted aggregated-output cap, in characters.
pub const MAX_OUTPUT_CHARS: usize = 150_000;
/// Default aggregated-output cap, in characters.
pub const DEFAULT_OUTPUT_CHARS: usize = 30_000;

/// Default retention of finished sessions, in milliseconds.
pub const DEFAULT_JOB_TTL_MS: u64 = 300_000;

/// Environment variable overriding the default yield window.
pub const ENV_YIELD_MS: &str = "SHELL_MCP_YIELD_MS";
/// Environment variable overriding the aggregated-output cap.
pub const ENV_MAX_OUTPUT_CHARS: &str = "SHELL_MCP_MAX_OUTPUT_CHARS";

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Defaults for the bash tool
    pub bash: BashSettings,
    /// Defaults for the process tool
    pub process: ProcessSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(yaml)
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.bash.default_yield_ms < MIN_YIELD_MS || self.bash.default_yield_ms > MAX_YIELD_MS {
            return Err(crate::Error::Config(format!(
                "bash.default_yield_ms must be within {MIN_YIELD_MS}..={MAX_YIELD_MS}"
            )));
        }

        if self.bash.max_output_chars < MIN_OUTPUT_CHARS
            || self.bash.max_output_chars > MAX_OUTPUT_CHARS
        {
            return Err(crate::Error::Config(format!(
                "bash.max_output_chars must be within {MIN_OUTPUT_CHARS}..={MAX_OUTPUT_CHARS}"
            )));
        }

        if self.process.job_ttl_ms == 0 {
            return Err(crate::Error::Config(
                "process.job_ttl_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply environment-variable overrides on top of the loaded values.
    ///
    /// Out-of-range values are clamped rather than rejected so a stray
    /// environment variable cannot prevent startup.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = read_env_u64(ENV_YIELD_MS) {
            self.bash.default_yield_ms = ms.clamp(MIN_YIELD_MS, MAX_YIELD_MS);
        }
        if let Some(chars) = read_env_u64(ENV_MAX_OUTPUT_CHARS) {
            self.bash.max_output_chars =
                (chars as usize).clamp(MIN_OUTPUT_CHARS, MAX_OUTPUT_CHARS);
        }
        self
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Transport type (stdio, tcp, etc.)
    pub transport: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Defaults for the bash tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BashSettings {
    /// Milliseconds a command is awaited before auto-backgrounding
    pub default_yield_ms: u64,
    /// Seconds before a command is killed (0 disables the guard)
    pub default_timeout_secs: u64,
    /// Maximum retained aggregated output per session, in characters
    pub max_output_chars: usize,
}

impl Default for BashSettings {
    fn default() -> Self {
        Self {
            default_yield_ms: DEFAULT_YIELD_MS,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_chars: DEFAULT_OUTPUT_CHARS,
        }
    }
}

/// Defaults for the process tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    /// Milliseconds a finished session is retained before eviction
    pub job_ttl_ms: u64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            job_ttl_ms: DEFAULT_JOB_TTL_MS,
        }
    }
}

fn read_env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    raw.trim().parse::<u64>().ok()
}

/// Clamp a caller-supplied value into a range, falling back to a default
/// when absent.
pub fn clamp_or_default(value: Option<u64>, default: u64, min: u64, max: u64) -> u64 {
    value.unwrap_or(default).clamp(min, max)
}
