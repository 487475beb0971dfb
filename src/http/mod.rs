//! HTTP protocol layer module
//!
//! The non-blocking HTTP/1.x engine: request reading and parsing, resolution
//! against the document root, response framing and resumable transmission.
//! Nothing here owns a socket or a runtime; the server module drives it.

pub mod connection;
pub mod context;
pub mod mime;
pub mod parser;
pub mod quote;
pub mod range;
pub mod reader;
pub mod request;
pub mod resolve;
pub mod response;
pub mod transport;
pub mod writer;

/// Request head buffer size.
pub const MAX_HEADER: usize = 4096;
/// Longest accepted request target.
pub const MAX_PATH: usize = 2048;
/// Longest accepted host name.
pub const MAX_HOST: usize = 64;
/// Longest method or scheme token.
pub const MAX_MISC: usize = 16;

// Re-export commonly used types
pub use connection::{Connection, State, Timeouts};
pub use context::{ServeContext, Site};
pub use response::Status;
