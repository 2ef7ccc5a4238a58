/// Structured logging for the snowfall teleconnection service
///
/// Provides context-rich logging with component and location identifiers,
/// timestamps, and severity levels. Supports both console output and
/// file-based logging for scheduled batch runs. Nothing is emitted until
/// `init_logger` has been called.

use chrono::Utc;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parses a config string; unknown values fall back to `Info`.
    pub fn parse(s: &str) -> LogLevel {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Pipeline stage a log line comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Provider,
    Analysis,
    Ensemble,
    Forecast,
    Backtest,
    System,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Provider => "PROVIDER",
            Component::Analysis => "ANALYSIS",
            Component::Ensemble => "ENSEMBLE",
            Component::Forecast => "FORECAST",
            Component::Backtest => "BACKTEST",
            Component::System => "SYS",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// The station has no record for the period (seasonal, decommissioned, not exported)
    Expected,
    /// Source outage or broken export
    Unexpected,
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureType::Expected => "EXPECTED",
            FailureType::Unexpected => "UNEXPECTED",
            FailureType::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    min_level: LogLevel,
    /// Append-mode log file, opened once at init.
    sink: Option<File>,
    console_timestamps: bool,
}

/// Full log line as written to the file sink.
fn format_line(level: LogLevel, component: Component, location_id: Option<&str>, message: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    match location_id {
        Some(id) => format!("{} {:<5} {} [{}]: {}", timestamp, level, component, id, message),
        None => format!("{} {:<5} {}: {}", timestamp, level, component, message),
    }
}

impl Logger {
    /// Installs the process-wide logger, replacing any earlier one. A log
    /// file that cannot be opened is reported and console output continues.
    pub fn init(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
        let sink = log_file.and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .inspect_err(|e| eprintln!("Cannot open log file {}: {}", path, e))
                .ok()
        });
        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(Logger { min_level, sink, console_timestamps });
        }
    }

    fn log(&mut self, level: LogLevel, component: Component, location_id: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }
        let line = format_line(level, component, location_id, message);

        if self.console_timestamps {
            if level >= LogLevel::Warning {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        } else {
            let at = location_id.map(|id| format!(" [{}]", id)).unwrap_or_default();
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, at, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, at, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   · {}{}: {}", component, at, message),
            }
        }

        if let Some(file) = self.sink.as_mut() {
            if let Err(e) = writeln!(file, "{}", line) {
                eprintln!("Failed to write log file: {}", e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file, console_timestamps);
}

/// Initialize from the `[logging]` config section
pub fn init_from_config(config: &crate::config::LoggingConfig) {
    init_logger(
        LogLevel::parse(&config.level),
        config.file.as_deref(),
        config.console_timestamps,
    );
}

fn emit(level: LogLevel, component: Component, location_id: Option<&str>, message: &str) {
    if let Ok(mut guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_mut() {
            logger.log(level, component, location_id, message);
        }
    }
}

pub fn info(component: Component, location_id: Option<&str>, message: &str) {
    emit(LogLevel::Info, component, location_id, message);
}

pub fn warn(component: Component, location_id: Option<&str>, message: &str) {
    emit(LogLevel::Warning, component, location_id, message);
}

pub fn error(component: Component, location_id: Option<&str>, message: &str) {
    emit(LogLevel::Error, component, location_id, message);
}

pub fn debug(component: Component, location_id: Option<&str>, message: &str) {
    emit(LogLevel::Debug, component, location_id, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a series provider failure from its message
pub fn classify_provider_failure(error_message: &str) -> FailureType {
    let msg = error_message.to_ascii_lowercase();
    if msg.contains("no such file") || msg.contains("no rows") || msg.contains("not found") {
        // Station simply has no record for this quantity/period
        FailureType::Expected
    } else if msg.contains("connection") || msg.contains("timeout") || msg.contains("refused") {
        FailureType::Unexpected
    } else if msg.contains("parse") || msg.contains("invalid series") {
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

/// Log a provider failure with automatic classification
pub fn log_provider_failure(location_id: &str, operation: &str, err: &dyn std::error::Error) {
    let text = err.to_string();
    let kind = classify_provider_failure(&text);
    let message = format!("{} failed [{}]: {}", operation, kind, text);

    match kind {
        FailureType::Expected => debug(Component::Provider, Some(location_id), &message),
        FailureType::Unexpected => error(Component::Provider, Some(location_id), &message),
        FailureType::Unknown => warn(Component::Provider, Some(location_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Batch Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a batch pass (ranking, backtest, multi-region scoring)
pub fn log_batch_summary(component: Component, operation: &str, total: usize, successful: usize, failed: usize) {
    let message = format!("{}: {} of {} ok, {} failed", operation, successful, total, failed);
    let level = match (successful, failed) {
        (_, 0) => LogLevel::Info,
        (0, _) => LogLevel::Error,
        _ => LogLevel::Warning,
    };
    emit(level, component, None, &message);
}
