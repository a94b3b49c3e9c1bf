//! Logger module for Weft
//!
//! Go-style simple logging: `[LEVEL] message`
//!
//! # Usage
//!
//! ```rust
//! use weft::util::logger;
//!
//! logger::init();
//! tracing::info!("Hello, {}", "world");
//! ```

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

static INITIALIZED: OnceCell<LogLevel> = OnceCell::new();

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl LogLevel {
    /// Parse a level name, case-insensitive. Unknown names fall back to
    /// `Info`.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Initialize logger with default configuration (INFO level)
pub fn init() {
    init_with_level(LogLevel::Info);
}

/// Initialize logger with custom level (Go style: `[LEVEL] message`)
///
/// Idempotent: only the first call installs a subscriber, later calls
/// are no-ops. Tests from several threads can all call this safely.
pub fn init_with_level(level: LogLevel) {
    INITIALIZED.get_or_init(|| {
        let filter = tracing_subscriber::filter::LevelFilter::from_level(level.into());

        // Go style: show the [LEVEL] prefix, no time, no module path,
        // no colour.
        let layer = tracing_subscriber::fmt::layer()
            .without_time()
            .with_target(false)
            .with_level(true)
            .with_ansi(false)
            .compact()
            .with_filter(filter);

        Registry::default().with(layer).init();
        level
    });
}

/// Initialize logger for debug use (DEBUG level)
pub fn init_debug() {
    init_with_level(LogLevel::Debug);
}
