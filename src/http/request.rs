//! Parsed request state of one connection.

/// Everything the parser extracts from one request head.
///
/// Filled in progressively, so a request that fails validation still carries
/// whatever was parsed before the failure (used for the access log).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method token exactly as sent.
    pub method: String,
    /// Raw request target.
    pub target: String,
    pub major: u32,
    pub minor: u32,
    /// Lowercased host from an absolute target or the `Host` header.
    pub hostname: String,
    pub port: Option<u16>,
    /// Percent-decoded, normalized path.
    pub path: Vec<u8>,
    /// Percent-decoded query string.
    pub query: Vec<u8>,
    /// `Authorization` value, captured but never checked.
    pub auth: Option<String>,
    /// Header lines in arrival order, without line terminators.
    pub headers: Vec<String>,
    pub if_modified: Option<String>,
    pub if_unmodified: Option<String>,
    pub if_range: Option<String>,
    /// Text after `Range: bytes=`, parsed once the file size is known.
    pub range: Option<String>,
    pub keep_alive: bool,
    pub head_only: bool,
}

impl Request {
    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }

    /// `HTTP/major.minor` as written in logs.
    pub fn version(&self) -> String {
        format!("HTTP/{}.{}", self.major, self.minor)
    }

    pub fn path_lossy(&self) -> String {
        String::from_utf8_lossy(&self.path).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = Request {
            headers: vec![
                "Host: example.org".to_string(),
                "user-agent:  curl/8.0 ".to_string(),
            ],
            ..Request::default()
        };
        assert_eq!(req.header("User-Agent"), Some("curl/8.0"));
        assert_eq!(req.header("host"), Some("example.org"));
        assert_eq!(req.header("Referer"), None);
    }

    #[test]
    fn test_version_string() {
        let req = Request {
            major: 1,
            minor: 0,
            ..Request::default()
        };
        assert_eq!(req.version(), "HTTP/1.0");
    }
}
