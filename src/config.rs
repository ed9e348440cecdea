//! Userspace configuration for a trace session
//!
//! The probe itself takes no configuration beyond the offset table; these are
//! the knobs of the loader/consumer, all coming from command-line flags.

use crate::{OomKillError, Result};
use clap::ValueEnum;
use std::time::Duration;

/// How each event is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Explicit BTF file; `None` means the running kernel's
    pub btf_path: Option<String>,
    pub format: OutputFormat,
    /// Stop after this long; `None` runs until Ctrl+C
    pub duration: Option<Duration>,
    pub poll_interval: Duration,
}

impl TraceConfig {
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

    pub fn new(
        btf_path: Option<String>,
        format: OutputFormat,
        duration: Option<&str>,
        poll_interval_ms: u64,
    ) -> Result<Self> {
        if poll_interval_ms == 0 {
            return Err(OomKillError::ConfigError(
                "poll interval must be greater than 0".to_string(),
            ));
        }

        let duration = duration
            .map(parse_duration)
            .transpose()?
            .map(Duration::from_millis);

        Ok(Self {
            btf_path,
            format,
            duration,
            poll_interval: Duration::from_millis(poll_interval_ms),
        })
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            btf_path: None,
            format: OutputFormat::Text,
            duration: None,
            poll_interval: Duration::from_millis(Self::DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// Parse "500ms", "30s", "5m" or "1h" into milliseconds
pub fn parse_duration(s: &str) -> Result<u64> {
    let s = s.trim();
    let (num, unit) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1u64)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1000u64)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000u64)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000u64)
    } else {
        return Err(OomKillError::ConfigError(format!(
            "Invalid duration '{}'. Use: 30s, 5m, 1h, 500ms",
            s
        )));
    };

    let value: u64 = num
        .trim()
        .parse()
        .map_err(|_| OomKillError::ConfigError(format!("Invalid duration number in '{}'", s)))?;

    value
        .checked_mul(unit)
        .ok_or_else(|| OomKillError::ConfigError(format!("Duration '{}' is too long", s)))
}
