//! Access log writer module
//!
//! Provides thread-safe access log writing to a file or stdout.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock, PoisonError};

use super::format::{AccessLogEntry, LogFormat};

/// Global access log writer instance
static ACCESS_LOG: OnceLock<AccessLogWriter> = OnceLock::new();

/// Log output target
enum LogTarget {
    Stdout,
    File(Mutex<File>),
}

pub struct AccessLogWriter {
    target: LogTarget,
    format: LogFormat,
}

impl AccessLogWriter {
    fn new(file: Option<&str>, format: LogFormat) -> io::Result<Self> {
        let target = match file {
            Some(path) => LogTarget::File(Mutex::new(open_log_file(path)?)),
            None => LogTarget::Stdout,
        };
        Ok(Self { target, format })
    }

    pub fn write(&self, entry: &AccessLogEntry) {
        let line = entry.format(&self.format);
        match &self.target {
            LogTarget::Stdout => println!("{line}"),
            LogTarget::File(file) => {
                let mut f = file.lock().unwrap_or_else(PoisonError::into_inner);
                let _ = writeln!(f, "{line}");
            }
        }
    }
}

/// Open or create a log file for appending
fn open_log_file(path: &str) -> io::Result<File> {
    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

/// Initialize the global access log writer
///
/// This should be called once at application startup.
/// Returns error if the log file cannot be opened.
pub fn init(file: Option<&str>, format: LogFormat) -> io::Result<()> {
    let writer = AccessLogWriter::new(file, format)?;
    ACCESS_LOG.set(writer).map_err(|_| {
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            "Access log writer already initialized",
        )
    })
}

/// The global writer, if access logging was initialized.
pub fn get() -> Option<&'static AccessLogWriter> {
    ACCESS_LOG.get()
}
