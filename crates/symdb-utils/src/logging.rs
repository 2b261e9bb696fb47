//! # Logging Utilities
//!
//! Logging for symdb using `tracing`.
//!
//! Console output goes to **stderr** so command output on stdout stays
//! machine readable. Supported:
//! - pretty output for terminals and JSON output for log collectors
//! - `RUST_LOG` style filters (`symdb_core=debug`)
//! - an optional log file written through a non-blocking appender
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use symdb_utils::init_logging;
//!
//! // Keep the guard alive for as long as events should reach the log file.
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::info!("symdb started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=symdb_core=debug`)
//! - `SYMDB_LOG_FORMAT`: output format (`json` or `pretty`, default: `pretty`)
//! - `SYMDB_LOG_FILE`: optional log file, written in addition to the console

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, fmt as std_fmt};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const FORMAT_ENV: &str = "SYMDB_LOG_FORMAT";

/// Environment variable naming an additional log file.
pub const FILE_ENV: &str = "SYMDB_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable output (default)
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

impl std_fmt::Display for LogLevel
{
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result
    {
        write!(f, "{}", Level::from(*self))
    }
}

/// Keeps the log file writer running
///
/// Dropping the guard flushes buffered events and stops the background
/// writer; hold it until the program exits.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    file: Option<WorkerGuard>,
}

impl std_fmt::Debug for LoggingGuard
{
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result
    {
        f.debug_struct("LoggingGuard")
            .field("file", &self.file.is_some())
            .finish()
    }
}

/// Initialize logging from the environment
///
/// Reads `RUST_LOG`, `SYMDB_LOG_FORMAT` and `SYMDB_LOG_FILE`. Without
/// `RUST_LOG` only warnings and errors are shown, which is what a command
/// line user wants to see from the symbol database.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file directory cannot be created.
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = env::var(FORMAT_ENV)
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or_default();
    let file = env::var(FILE_ENV).ok().map(PathBuf::from);
    install(format, None, file.as_deref(), true)
}

/// Initialize console logging with an explicit level
///
/// The level replaces `RUST_LOG`; `SYMDB_LOG_FILE` is still honored.
///
/// ```rust,no_run
/// use symdb_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file directory cannot be created.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    let file = env::var(FILE_ENV).ok().map(PathBuf::from);
    install(format, Some(level), file.as_deref(), true)
}

/// Initialize file-only logging
///
/// Nothing is written to the console. `level` overrides `RUST_LOG` when set.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file directory cannot be created.
pub fn init_logging_to_file(path: &Path, level: Option<LogLevel>, format: LogFormat)
    -> Result<LoggingGuard, LoggingError>
{
    install(format, level, Some(path), false)
}

/// Dated log file under `dir`: `<dir>/YYYY-MM-DD-symdb.log`.
pub fn default_log_file(dir: &Path) -> PathBuf
{
    dir.join(format!("{}-symdb.log", Utc::now().format("%Y-%m-%d")))
}

/// Filter for the given explicit level, else `RUST_LOG`, else `warn`.
fn build_filter(explicit: Option<LogLevel>) -> EnvFilter
{
    if let Some(level) = explicit {
        return EnvFilter::new(Level::from(level).to_string());
    }
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string())),
        Err(_) => EnvFilter::new(Level::WARN.to_string()),
    }
}

/// Each layer gets its own filter; `EnvFilter` cannot be shared.
fn install(format: LogFormat, level: Option<LogLevel>, file: Option<&Path>, console: bool)
    -> Result<LoggingGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if console {
        layers.push(console_layer(format, build_filter(level)));
    }
    if let Some(path) = file {
        let (writer, file_guard) = file_writer(path)?;
        layers.push(file_layer(format, build_filter(level), writer));
        guard = Some(file_guard);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    Ok(LoggingGuard { file: guard })
}

fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard), LoggingError>
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.to_path_buf()))?;
    std::fs::create_dir_all(&dir)?;

    // The caller picks the file name, so no rotation.
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(io::stderr().is_terminal())
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, filter: EnvFilter, writer: NonBlocking) -> BoxedLayer
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// The log file path has no file name
    #[error("Invalid log file path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// The log file directory could not be created
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("prod").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("xml").is_err());
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("DBG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("loud").is_err());
    }

    #[test]
    fn test_log_level_display_matches_tracing()
    {
        assert_eq!(LogLevel::Debug.to_string(), "DEBUG");
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert!(LogLevel::Trace > LogLevel::Info);
    }

    #[test]
    fn test_default_log_file_is_dated()
    {
        let path = default_log_file(Path::new("/var/log/symdb"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        assert_eq!(path.parent(), Some(Path::new("/var/log/symdb")));
        assert!(name.ends_with("-symdb.log"));
        assert_eq!(name.len(), "YYYY-MM-DD-symdb.log".len());
    }

    #[test]
    fn test_file_writer_creates_directory()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("symdb.log");

        let (_writer, _guard) = file_writer(&path).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }

    #[test]
    fn test_file_writer_rejects_directory_paths()
    {
        assert!(matches!(
            file_writer(Path::new("/")).unwrap_err(),
            LoggingError::InvalidPath(_)
        ));
    }
}
