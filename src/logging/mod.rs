//! Logging for the leaf detection pipeline
//!
//! This module provides:
//! - Custom log formatting with bracketed output
//! - Dual logging (file + stdout)
//! - Timestamped log files under a configurable directory

mod formatter;
mod setup;

pub use setup::setup_logging;
