//! # Logging Setup
//!
//! The library itself only emits through the `log` facade. This module is
//! for binaries that want the standard console + file output.

/// `fern` dispatcher with timestamped log files and rotation.
pub mod logger;

pub use logger::{cleanup_old_logs, parse_level, setup_logging, LoggerError};
