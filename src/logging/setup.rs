use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::formatter::BracketedFormatter;

/// Install stdout + file logging. Returns the path of the log file.
///
/// The filter defaults to `info` and can be overridden with `RUST_LOG`.
pub fn setup_logging(log_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(log_dir)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_path = log_dir.join(format!("leaf_detect_{}.log", timestamp));

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)?;

    let file_layer = fmt::layer()
        .event_format(BracketedFormatter::new())
        .with_writer(Mutex::new(file))
        .with_ansi(false);

    let stdout_layer = fmt::layer()
        .event_format(BracketedFormatter::new())
        .with_writer(io::stdout);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // ureq logs every connection at debug
        EnvFilter::new("info").add_directive(
            "ureq=warn"
                .parse()
                .unwrap_or_else(|_| LevelFilter::WARN.into()),
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    info!("Log file created at: {:?}", log_path);

    Ok(log_path)
}
