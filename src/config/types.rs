// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub performance: PerformanceConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Worker threads, each with its own event loop
    pub workers: usize,
    /// Connection limit of one worker
    pub max_connections: usize,
    /// Host used in redirects when the request named none
    #[serde(default)]
    pub canonical_host: Option<String>,
}

/// HTTP configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub server_name: String,
    pub document_root: PathBuf,
    /// Use `sendfile(2)` for file bodies where available
    pub zero_copy: bool,
}

/// Performance configuration, in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    /// Idle limit while a request is in flight
    pub timeout: u64,
    /// Idle limit between keep-alive requests
    pub keep_alive_timeout: u64,
}

/// Directory listing cache configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Seconds a listing is served before it is rebuilt
    pub max_age: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}
