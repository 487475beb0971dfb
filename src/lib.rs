//! gx-httpd: a static file HTTP/1.x server.
//!
//! Requests are parsed and answered by the non-blocking engine in [`http`];
//! [`server`] runs it on a pool of single-threaded worker runtimes.

pub mod config;
pub mod dircache;
pub mod http;
pub mod logger;
pub mod server;
