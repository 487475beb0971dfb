//! Ambient values every request handler reads.
//!
//! A [`ServeContext`] is built by the dispatcher once per readiness event and
//! passed down by reference; nothing in the protocol engine reads process
//! globals.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::dircache::DirCache;

/// `strftime` pattern of the fixed RFC 1123 timestamp.
pub const RFC1123: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Static site settings, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Site {
    /// Value of the `Server` response header.
    pub server_name: String,
    /// Directory the request paths are resolved against.
    pub document_root: PathBuf,
    /// Host used in redirects when the client did not name one.
    pub canonical_host: String,
    /// Listening port, echoed in redirect locations.
    pub port: u16,
}

/// Per-event view of the ambient state.
#[derive(Clone, Copy)]
pub struct ServeContext<'a> {
    pub site: &'a Site,
    pub dir_cache: &'a DirCache,
    /// Current time in unix seconds.
    pub now: i64,
}

impl<'a> ServeContext<'a> {
    pub const fn new(site: &'a Site, dir_cache: &'a DirCache, now: i64) -> Self {
        Self {
            site,
            dir_cache,
            now,
        }
    }

    /// `Date` header value for the current instant.
    pub fn http_date(&self) -> String {
        rfc1123(self.now)
    }
}

/// Current wall clock time in unix seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Format unix seconds as an RFC 1123 timestamp.
///
/// ```
/// use gx_httpd::http::context::rfc1123;
/// assert_eq!(rfc1123(784_111_777), "Sun, 06 Nov 1994 08:49:37 GMT");
/// ```
pub fn rfc1123(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.format(RFC1123).to_string())
        .unwrap_or_default()
}
