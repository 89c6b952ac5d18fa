//! Conduit logging setup.
//!
//! Installs a `tracing` subscriber configured from the environment. Library
//! crates only emit `tracing` events; applications call [`init`] once at
//! startup.
//!
//! # Usage
//!
//! ```rust
//! conduit_log::init();
//!
//! tracing::info!(port = 8080, "Service started");
//! ```
//!
//! # Environment Variables
//!
//! - `CONDUIT_DEBUG=1` - Enable debug logging
//! - `CONDUIT_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `CONDUIT_LOG_FORMAT=pretty|compact|json` - Set output format
//! - `CONDUIT_LOG_COLOR=1|0` - Enable/disable colors
//! - `RUST_LOG` - Full filter directives; takes precedence over the level

use once_cell::sync::Lazy;
use std::env;
use std::fmt;
use std::io::IsTerminal;
use std::str::FromStr;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as layer_fmt};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// No logging
    Off,
}

impl Level {
    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    /// Filter directive for this level.
    pub fn directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl FromStr for Level {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "off" | "none" => Ok(Level::Off),
            _ => Err(ParseError::new("level", s)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human-readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl FromStr for Format {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Format::Pretty),
            "compact" => Ok(Format::Compact),
            "json" => Ok(Format::Json),
            _ => Err(ParseError::new("format", s)),
        }
    }
}

/// Unrecognized level or format name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

impl ParseError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseError {}

// ============================================================================
// Configuration
// ============================================================================

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include the event target
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Compact,
            color: false,
            target: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key).map(|v| {
                let v = v.trim().to_lowercase();
                v == "1" || v == "true"
            })
        };

        let debug = flag("CONDUIT_DEBUG").unwrap_or(false);

        let level = lookup("CONDUIT_LOG_LEVEL")
            .and_then(|s| s.parse().ok())
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("CONDUIT_LOG_FORMAT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(Format::Compact);

        let color = flag("CONDUIT_LOG_COLOR")
            .unwrap_or_else(|| format != Format::Json && std::io::stderr().is_terminal());

        Self {
            debug,
            level,
            format,
            color,
            target: true,
        }
    }

    /// Create a new configuration builder.
    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.directive()))
    }

    /// Install this configuration as the global subscriber.
    ///
    /// Returns `false` if a global subscriber was already set.
    pub fn init(&self) -> bool {
        let registry = tracing_subscriber::registry().with(self.filter());

        let result = match self.format {
            Format::Pretty => registry
                .with(
                    layer_fmt::layer()
                        .pretty()
                        .with_ansi(self.color)
                        .with_target(self.target)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            Format::Compact => registry
                .with(
                    layer_fmt::layer()
                        .compact()
                        .with_ansi(self.color)
                        .with_target(self.target)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            Format::Json => registry
                .with(
                    layer_fmt::layer()
                        .json()
                        .with_target(self.target)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };

        result.is_ok()
    }
}

/// Builder for logging configuration.
#[derive(Debug, Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    /// Enable debug mode, lowering the level to debug.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        if enabled && self.config.level > Level::Debug {
            self.config.level = Level::Debug;
        }
        self
    }

    /// Set the minimum level.
    pub fn level(mut self, level: Level) -> Self {
        self.config.level = level;
        self
    }

    /// Set the output format.
    pub fn format(mut self, format: Format) -> Self {
        self.config.format = format;
        self
    }

    /// Enable or disable colors.
    pub fn color(mut self, enabled: bool) -> Self {
        self.config.color = enabled;
        self
    }

    /// Include or omit the event target.
    pub fn target(mut self, enabled: bool) -> Self {
        self.config.target = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Configuration read from the environment on first use.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Install the environment-configured subscriber.
///
/// Safe to call more than once; only the first call installs.
pub fn init() -> bool {
    config().init()
}

// ============================================================================
// Tests
// ============================================================================
