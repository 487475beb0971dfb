//! Logger module
//!
//! Diagnostics go through `tracing`; completed requests are written to the
//! access log in the configured format.

mod format;
pub mod writer;

pub use format::{AccessLogEntry, LogFormat};

use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Initialize diagnostics and the access log
///
/// Should be called once at application startup. `RUST_LOG` overrides the
/// configured level.
pub fn init(config: &Config) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    if config.logging.access_log {
        writer::init(
            config.logging.access_log_file.as_deref(),
            LogFormat::from_config(&config.logging.access_log_format),
        )?;
    }
    Ok(())
}

/// Write an access log line; a no-op until the access log is initialized.
pub fn log_access(entry: &AccessLogEntry) {
    if let Some(writer) = writer::get() {
        writer.write(entry);
    }
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    info!("======================================");
    info!("{} started", config.http.server_name);
    info!("Listening on: http://{addr}");
    info!("Document root: {}", config.http.document_root.display());
    info!(
        "Workers: {}, max connections per worker: {}",
        config.server.workers, config.server.max_connections
    );
    info!(
        "Timeouts: request {}s, keep-alive {}s",
        config.performance.timeout, config.performance.keep_alive_timeout
    );
    if let Some(ref path) = config.logging.access_log_file {
        info!("Access log: {path}");
    }
    info!("======================================");
}
