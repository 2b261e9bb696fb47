//! # symdb Utilities
//!
//! Logging setup shared by the symdb command line tool and by hosts that embed
//! `symdb-core` and want its diagnostics.
//!
//! `symdb-core` only emits `tracing` events (bootstrap warnings, load failures
//! at debug level). This crate installs the subscriber that prints them.

pub mod logging;

pub use logging::{
    LogFormat, LogLevel, LoggingError, LoggingGuard, default_log_file, init_logging, init_logging_to_file,
    init_logging_with_level,
};
pub use tracing::{debug, error, info, trace, warn};
