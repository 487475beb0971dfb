// Configuration module entry point
// Loads layered settings and derives the values the server runs with

mod types;

use std::net::SocketAddr;

pub use types::{CacheConfig, Config, HttpConfig, LoggingConfig, PerformanceConfig, ServerConfig};

use crate::http::connection::Timeouts;
use crate::http::context::Site;

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// The file is optional. `GX_`-prefixed environment variables override it,
    /// with `__` separating section and key (e.g. `GX_SERVER__PORT`).
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("GX").separator("__"))
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.workers", 4)?
            .set_default("server.max_connections", 10)?
            .set_default("http.server_name", "gx-0.01")?
            .set_default("http.document_root", ".")?
            .set_default("http.zero_copy", true)?
            .set_default("performance.timeout", 60)?
            .set_default("performance.keep_alive_timeout", 5)?
            .set_default("cache.max_entries", 128)?
            .set_default("cache.max_age", 60)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.server.workers == 0 {
            return Err(config::ConfigError::Message(
                "server.workers must be at least 1".to_string(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(config::ConfigError::Message(
                "server.max_connections must be at least 1".to_string(),
            ));
        }
        if !self.http.document_root.is_dir() {
            return Err(config::ConfigError::Message(format!(
                "http.document_root {} is not a directory",
                self.http.document_root.display()
            )));
        }
        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Static site settings shared by every worker.
    pub fn site(&self) -> Site {
        Site {
            server_name: self.http.server_name.clone(),
            document_root: self.http.document_root.clone(),
            canonical_host: self
                .server
                .canonical_host
                .clone()
                .unwrap_or_else(system_hostname),
            port: self.server.port,
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            request: seconds(self.performance.timeout),
            keep_alive: seconds(self.performance.keep_alive_timeout),
        }
    }

    pub fn cache_max_age(&self) -> i64 {
        seconds(self.cache.max_age)
    }
}

fn seconds(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Lowercased host name of this machine, `localhost` if unknown.
fn system_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .map_or_else(|| "localhost".to_string(), |name| name.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load_from("/nonexistent/gx-config").unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.server.workers, 4);
        assert_eq!(cfg.server.max_connections, 10);
        assert_eq!(cfg.http.server_name, "gx-0.01");
        assert!(cfg.http.zero_copy);
        assert_eq!(cfg.performance.timeout, 60);
        assert_eq!(cfg.performance.keep_alive_timeout, 5);
        assert_eq!(cfg.cache.max_entries, 128);
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert_eq!(cfg.timeouts(), Timeouts { request: 60, keep_alive: 5 });
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("www");
        fs::create_dir(&root).unwrap();
        let path = dir.path().join("gx.toml");
        fs::write(
            &path,
            format!(
                "[server]\nport = 9090\ncanonical_host = \"files.example.org\"\n\
                 [http]\ndocument_root = \"{}\"\nserver_name = \"gx-test\"\n\
                 [cache]\nmax_age = 5\n",
                root.display()
            ),
        )
        .unwrap();

        let cfg = Config::load_from(path.to_str().unwrap()).unwrap();
        let site = cfg.site();
        assert_eq!(site.port, 9090);
        assert_eq!(site.server_name, "gx-test");
        assert_eq!(site.canonical_host, "files.example.org");
        assert_eq!(site.document_root, root);
        assert_eq!(cfg.cache_max_age(), 5);
        assert_eq!(cfg.get_socket_addr().unwrap().port(), 9090);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [
            ("workers.toml", "[server]\nworkers = 0\n"),
            ("conns.toml", "[server]\nmax_connections = 0\n"),
            ("root.toml", "[http]\ndocument_root = \"/nonexistent/www\"\n"),
        ] {
            let path = dir.path().join(name);
            fs::write(&path, body).unwrap();
            assert!(
                Config::load_from(path.to_str().unwrap()).is_err(),
                "{name} should be rejected"
            );
        }
    }
}
