// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Logging setup and structured events for the execution pipeline.
//!
//! ## Why This Module Exists
//!
//! The pipeline reports what it does through `tracing`: device selection and
//! program builds at `info`, resource acquisition and release at `debug`,
//! individual transfers and argument bindings at `trace`, and the CPU fallback
//! at `warn`. Applications still need one place to install a subscriber, and
//! a few events (device reports, memory usage, queue profiles) deserve
//! consistent field names.
//!
//! ## Design Decisions
//!
//! - **tracing-based**: the library only emits events; installing a
//!   subscriber is the application's choice.
//! - **Environment-driven**: `RUST_LOG` always overrides the configured level.
//! - **Targets**: structured reports use `accel_runtime::device`,
//!   `accel_runtime::memory` and `accel_runtime::profile`.

use std::sync::Once;

use crate::backend::ProfileEntry;
use crate::device::DeviceInfo;
use crate::memory::MemoryTracker;

/// Configuration for logging initialization.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level when `RUST_LOG` is not set.
    pub default_level: LogLevel,
    /// Include timestamps in log output.
    pub with_timestamps: bool,
    /// Include target (module path) in log output.
    pub with_target: bool,
    /// Include source file and line numbers.
    pub with_file_line: bool,
    /// Use ANSI colors (disable for file output).
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
            with_file_line: false,
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// Create a new logging configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default log level.
    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.default_level = level;
        self
    }

    /// Enable or disable timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, enable: bool) -> Self {
        self.with_timestamps = enable;
        self
    }

    /// Enable or disable ANSI colors.
    #[must_use]
    pub fn with_ansi(mut self, enable: bool) -> Self {
        self.with_ansi = enable;
        self
    }

    /// Defaults, with the level taken from `ACCEL_LOG_LEVEL` when it parses.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(level) = std::env::var("ACCEL_LOG_LEVEL")
            .ok()
            .and_then(|v| LogLevel::parse(&v))
        {
            config.default_level = level;
        }
        config
    }

    /// Verbose output with colors and file/line info.
    #[must_use]
    pub fn development() -> Self {
        Self {
            default_level: LogLevel::Debug,
            with_timestamps: true,
            with_target: true,
            with_file_line: true,
            with_ansi: true,
        }
    }

    /// Clean output without colors.
    #[must_use]
    pub fn production() -> Self {
        Self {
            default_level: LogLevel::Info,
            with_timestamps: true,
            with_target: false,
            with_file_line: false,
            with_ansi: false,
        }
    }

    /// Minimal output for test harnesses.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            default_level: LogLevel::Warn,
            with_timestamps: false,
            with_target: false,
            with_file_line: false,
            with_ansi: false,
        }
    }
}

/// Log level, mapped onto tracing levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and above.
    Warn,
    /// Informational messages and above.
    #[default]
    Info,
    /// Debug messages and above.
    Debug,
    /// All messages including trace.
    Trace,
}

impl LogLevel {
    fn as_filter_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Parse a level name (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

static INIT_LOGGING: Once = Once::new();

/// Install a global `tracing-subscriber` formatter.
///
/// Only the first call has an effect. `RUST_LOG` takes precedence over
/// `config.default_level`.
///
/// ```rust
/// use accel_runtime::{init_logging, LogConfig};
///
/// init_logging(&LogConfig::testing());
/// init_logging(&LogConfig::development()); // no-op
/// ```
pub fn init_logging(config: &LogConfig) {
    INIT_LOGGING.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| config.default_level.as_filter_str().to_string());

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(config.with_ansi)
            .with_target(config.with_target)
            .with_file(config.with_file_line)
            .with_line_number(config.with_file_line);

        // A subscriber installed elsewhere wins.
        let result = if config.with_timestamps {
            builder.try_init()
        } else {
            builder.without_time().try_init()
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, "global subscriber already installed");
        }
    });
}

/// Log the capabilities of a device.
pub fn log_device_info(info: &DeviceInfo) {
    tracing::info!(
        target: "accel_runtime::device",
        kind = %info.kind,
        vendor = %info.vendor,
        name = %info.name,
        compute_units = info.compute_units,
        clock_mhz = info.clock_frequency_mhz,
        global_mem_bytes = info.global_mem_bytes,
        image_support = info.image_support,
        extensions = info.extensions.len(),
        "Device capabilities"
    );
}

/// Log the state of a memory budget.
pub fn log_memory_usage(tracker: &MemoryTracker, context: &str) {
    let to_mb = |bytes: usize| bytes as f64 / (1024.0 * 1024.0);
    tracing::debug!(
        target: "accel_runtime::memory",
        allocated_mb = format!("{:.2}", to_mb(tracker.allocated_bytes())),
        peak_mb = format!("{:.2}", to_mb(tracker.peak_bytes())),
        limit_mb = format!("{:.2}", to_mb(tracker.limit_bytes())),
        context,
        "Memory usage"
    );
}

/// Log the timings recorded by a profiling queue.
pub fn log_profile(entries: &[ProfileEntry]) {
    for entry in entries {
        tracing::debug!(
            target: "accel_runtime::profile",
            command = %entry.command,
            elapsed_us = entry.elapsed.as_micros(),
            "Command completed"
        );
    }
}

pub use tracing::{debug, error, info, trace, warn};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.default_level, LogLevel::Info);
        assert!(config.with_timestamps);
        assert!(config.with_ansi);
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .with_level(LogLevel::Debug)
            .with_timestamps(false)
            .with_ansi(false);

        assert_eq!(config.default_level, LogLevel::Debug);
        assert!(!config.with_timestamps);
        assert!(!config.with_ansi);
    }

    #[test]
    fn test_log_config_presets() {
        assert!(LogConfig::development().with_file_line);
        assert!(!LogConfig::production().with_ansi);
        let test = LogConfig::testing();
        assert_eq!(test.default_level, LogLevel::Warn);
        assert!(!test.with_timestamps);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse(" trace "), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogLevel::Debug.as_filter_str(), "debug");
    }

    #[test]
    fn test_init_logging_twice_is_safe() {
        init_logging(&LogConfig::testing());
        init_logging(&LogConfig::development());
        log_memory_usage(&MemoryTracker::with_limit(1024), "test");
        log_profile(&[]);
    }
}
