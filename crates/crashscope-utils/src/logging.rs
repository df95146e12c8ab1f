//! # Logging
//!
//! `tracing` subscriber setup for crashscope binaries and hosts.
//!
//! Crash reports are logged at `error` level right before the process goes
//! down, so file output goes through a `tracing-appender` file appender used
//! directly as the writer. Its `non_blocking` wrapper is not used: the
//! worker thread would still be holding the report when the process is
//! killed.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g. `debug`, `crashscope_core=trace`)
//! - `CRASHSCOPE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `CRASHSCOPE_LOG_FILE`: also append logs to this file
//!
//! ## Example
//!
//! ```rust,no_run
//! use crashscope_utils::init_logging;
//!
//! init_logging().expect("Failed to initialize logging");
//! tracing::info!("crash handler starting");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines
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
            "pretty" | "text" | "dev" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

/// Where and how to log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions
{
    /// Explicit level; overrides `RUST_LOG` when set
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    /// Log to standard error
    pub console: bool,
    /// Append to this file as well
    pub file: Option<PathBuf>,
}

impl Default for LogOptions
{
    fn default() -> Self
    {
        Self {
            level: None,
            format: LogFormat::Pretty,
            console: true,
            file: None,
        }
    }
}

impl LogOptions
{
    /// Options from `CRASHSCOPE_LOG_FORMAT` and `CRASHSCOPE_LOG_FILE`
    pub fn from_env() -> Self
    {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Options from an arbitrary variable lookup; unknown formats fall back
    /// to pretty output
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self
    {
        let format = lookup("CRASHSCOPE_LOG_FORMAT")
            .and_then(|s| LogFormat::from_str(&s).ok())
            .unwrap_or_default();
        let file = lookup("CRASHSCOPE_LOG_FILE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        Self {
            format,
            file,
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter
    {
        // Priority: explicit level, then RUST_LOG, then INFO.
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        }
    }
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// Returns an error if a subscriber is already installed or the log file
/// cannot be opened.
pub fn init_logging() -> Result<(), LoggingError>
{
    init_logging_with(&LogOptions::from_env())
}

/// Initialize console logging with an explicit level and format
///
/// ## Errors
///
/// Returns an error if a subscriber is already installed.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init_logging_with(&LogOptions {
        level: Some(level),
        format,
        ..LogOptions::from_env()
    })
}

/// Initialize file-only logging
///
/// Used while the crash dialog owns the terminal. The file is
/// `~/.crashscope/YYYY-MM-DD-crashscope.log`, or the same name in the temp
/// directory when there is no home directory.
///
/// ## Errors
///
/// Returns an error if a subscriber is already installed or the file
/// cannot be created.
pub fn init_logging_to_file(level: Option<LogLevel>) -> Result<PathBuf, LoggingError>
{
    let path = default_log_path();
    init_logging_with(&LogOptions {
        level,
        format: LogFormat::Pretty,
        console: false,
        file: Some(path.clone()),
    })?;
    Ok(path)
}

/// Dated log file used by [`init_logging_to_file`]
pub fn default_log_path() -> PathBuf
{
    let today = Utc::now().format("%Y-%m-%d");
    let dir = env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map_or_else(env::temp_dir, |home| PathBuf::from(home).join(".crashscope"));
    dir.join(format!("{today}-crashscope.log"))
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());

    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

/// Appender writing to exactly `path`, creating parent directories
fn file_appender(path: &Path) -> Result<RollingFileAppender, LoggingError>
{
    let name = path
        .file_name()
        .ok_or_else(|| LoggingError::InitializationFailed(format!("Not a file path: {}", path.display())))?;
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Initialize logging from explicit options
///
/// ## Errors
///
/// Returns an error if a subscriber is already installed or the log file
/// cannot be opened.
pub fn init_logging_with(options: &LogOptions) -> Result<(), LoggingError>
{
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if options.console {
        layers.push(fmt_layer(options.format, io::stderr, true, options.filter()));
    }
    if let Some(path) = &options.file {
        let appender = file_appender(path)?;
        layers.push(fmt_layer(options.format, appender, false, options.filter()));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Failed to install the subscriber
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// Log file could not be created
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
