//! # crashscope Utilities
//!
//! Logging setup shared by the crashscope crates.
//!
//! The core library only emits `tracing` events; installing a subscriber is
//! left to the host application or to the helpers here.

pub mod logging;

pub use logging::{
    default_log_path, init_logging, init_logging_to_file, init_logging_with, init_logging_with_level, LogFormat, LogLevel,
    LogOptions, LoggingError,
};
pub use tracing::{debug, error, info, trace, warn};
