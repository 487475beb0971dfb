//! HTTP request head parser
//!
//! Parses exactly one delimited request head into a [`Request`]. Every field
//! is bounded; anything outside the accepted grammar is rejected with a typed
//! error that knows its response status.

use thiserror::Error;

use super::request::Request;
use super::response::Status;
use super::{MAX_HOST, MAX_MISC, MAX_PATH};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed request line")]
    RequestLine,

    #[error("malformed request target `{0}`")]
    Target(String),

    #[error("unsupported scheme `{0}`")]
    Scheme(String),

    #[error("method `{0}` not implemented")]
    Method(String),

    #[error("request path must start with a slash")]
    RelativePath,

    #[error("request path leaves the document root")]
    Traversal,

    #[error("invalid hostname `{0}`")]
    Hostname(String),
}

impl ParseError {
    pub const fn status(&self) -> Status {
        match self {
            Self::Method(_) => Status::NotImplemented,
            Self::Traversal => Status::Forbidden,
            Self::RequestLine
            | Self::Target(_)
            | Self::Scheme(_)
            | Self::RelativePath
            | Self::Hostname(_) => Status::BadRequest,
        }
    }
}

/// Parse `head` (request line plus header lines, through the blank line)
/// into `req`.
///
/// On error `req` keeps the fields parsed so far.
pub fn parse_request_head(head: &[u8], req: &mut Request) -> Result<(), ParseError> {
    let mut lines = head.split(|&b| b == b'\n').map(strip_cr);
    let request_line = lines.next().ok_or(ParseError::RequestLine)?;
    parse_request_line(request_line, req)?;

    if req.target.starts_with('/') {
        let (path, query) = unquote(req.target.as_bytes());
        req.path = path;
        req.query = query;
    } else {
        parse_absolute_target(req)?;
    }
    req.path = fixpath(&req.path);

    match req.method.as_str() {
        "GET" => {}
        "HEAD" => req.head_only = true,
        other => return Err(ParseError::Method(other.to_string())),
    }

    req.keep_alive = req.minor >= 1;
    for line in lines.filter(|l| !l.is_empty()) {
        let line = String::from_utf8_lossy(line).into_owned();
        parse_header_line(&line, req);
        req.headers.push(line);
    }

    sanity_checks(req)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// `METHOD SP target SP HTTP/<int>.<int>`; anything after the version is
/// ignored.
fn parse_request_line(line: &[u8], req: &mut Request) -> Result<(), ParseError> {
    let mut cur = Cursor::new(line);

    let method = cur.take_while(|b| b.is_ascii_uppercase());
    if method.is_empty() || method.len() > MAX_MISC {
        return Err(ParseError::RequestLine);
    }
    req.method = String::from_utf8_lossy(method).into_owned();

    if cur.skip_whitespace() == 0 {
        return Err(ParseError::RequestLine);
    }

    let target = cur.take_while(|b| !b.is_ascii_whitespace());
    if target.is_empty() || target.len() > MAX_PATH {
        return Err(ParseError::RequestLine);
    }
    req.target = String::from_utf8_lossy(target).into_owned();

    if cur.skip_whitespace() == 0 || !cur.eat(b"HTTP/") {
        return Err(ParseError::RequestLine);
    }
    req.major = cur.number().ok_or(ParseError::RequestLine)?;
    if !cur.eat(b".") {
        return Err(ParseError::RequestLine);
    }
    req.minor = cur.number().ok_or(ParseError::RequestLine)?;
    Ok(())
}

/// `scheme://host[:port]path`; only `http` is served.
fn parse_absolute_target(req: &mut Request) -> Result<(), ParseError> {
    let bad_target = || ParseError::Target(req.target.clone());
    let mut cur = Cursor::new(req.target.as_bytes());

    let scheme = cur.take_while(|b| b.is_ascii_alphabetic());
    if scheme.is_empty() || scheme.len() > MAX_MISC || !cur.eat(b"://") {
        return Err(bad_target());
    }
    let host = cur.take_while(is_host_byte);
    if host.is_empty() || host.len() > MAX_HOST {
        return Err(bad_target());
    }
    let port = if cur.eat(b":") {
        Some(cur.number().ok_or_else(bad_target)?)
    } else {
        None
    };
    let rest = cur.rest();
    if rest.is_empty() {
        return Err(bad_target());
    }
    if !scheme.eq_ignore_ascii_case(b"http") {
        return Err(ParseError::Scheme(String::from_utf8_lossy(scheme).into_owned()));
    }

    let (path, query) = unquote(rest);
    req.hostname = String::from_utf8_lossy(host).into_owned();
    req.port = port.and_then(|p| u16::try_from(p).ok());
    req.path = path;
    req.query = query;
    Ok(())
}

fn parse_header_line(line: &str, req: &mut Request) {
    if let Some(value) = strip_prefix_ignore_case(line, "Connection: ") {
        req.keep_alive = value
            .get(..10)
            .is_some_and(|v| v.eq_ignore_ascii_case("Keep-Alive"));
    } else if let Some(value) = strip_prefix_ignore_case(line, "Host: ") {
        let mut cur = Cursor::new(value.as_bytes());
        let host = cur.take_while(is_host_byte);
        if !host.is_empty() {
            let host = &host[..host.len().min(MAX_HOST)];
            req.hostname = String::from_utf8_lossy(host).into_owned();
            if cur.eat(b":") {
                req.port = cur.number().and_then(|p| u16::try_from(p).ok());
            }
        }
    } else if let Some(value) = strip_prefix_ignore_case(line, "If-Modified-Since: ") {
        req.if_modified = Some(value.to_string());
    } else if let Some(value) = strip_prefix_ignore_case(line, "If-Unmodified-Since: ") {
        req.if_unmodified = Some(value.to_string());
    } else if let Some(value) = strip_prefix_ignore_case(line, "If-Range: ") {
        req.if_range = Some(value.to_string());
    } else if let Some(value) = strip_prefix_ignore_case(line, "Range: bytes=") {
        req.range = Some(value.to_string());
    } else if let Some(value) = strip_prefix_ignore_case(line, "Authorization: ") {
        req.auth = Some(value.to_string());
    }
}

fn sanity_checks(req: &mut Request) -> Result<(), ParseError> {
    if req.path.first() != Some(&b'/') {
        return Err(ParseError::RelativePath);
    }
    if req.path.windows(4).any(|w| w == b"/../") {
        return Err(ParseError::Traversal);
    }

    let mut previous = None;
    for (i, c) in req.hostname.bytes().enumerate() {
        let ok = match c {
            b'.' => i != 0 && previous != Some(b'.'),
            _ => c.is_ascii_alphanumeric() || c == b'-',
        };
        if !ok {
            return Err(ParseError::Hostname(req.hostname.clone()));
        }
        previous = Some(c);
    }
    req.hostname.make_ascii_lowercase();
    Ok(())
}

/// Split `src` on the first raw `?` and percent-decode both halves; `+`
/// means space in the query only.
fn unquote(src: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let (raw_path, raw_query) = match src.iter().position(|&b| b == b'?') {
        Some(i) => (&src[..i], &src[i + 1..]),
        None => (src, &[][..]),
    };
    (percent_decode(raw_path, false), percent_decode(raw_query, true))
}

fn percent_decode(src: &[u8], plus_is_space: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'+' if plus_is_space => out.push(b' '),
            b'%' => match (hex_at(src, i + 1), hex_at(src, i + 2)) {
                (Some(hi), Some(lo)) => {
                    out.push((hi << 4) | lo);
                    i += 2;
                }
                _ => out.push(b'%'),
            },
            b => out.push(b),
        }
        i += 1;
    }
    out
}

fn hex_at(src: &[u8], i: usize) -> Option<u8> {
    let digit = char::from(*src.get(i)?).to_digit(16)?;
    u8::try_from(digit).ok()
}

/// Collapse `//` and `/./`; `/../` is left for the traversal check.
fn fixpath(path: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(path.len());
    let mut i = 0;
    while i < path.len() {
        let rest = &path[i..];
        if rest.starts_with(b"//") {
            i += 1;
        } else if rest.starts_with(b"/./") {
            i += 2;
        } else {
            out.push(path[i]);
            i += 1;
        }
    }
    out
}

const fn is_host_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'-'
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

/// Forward-only byte cursor over one line.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.pos < self.buf.len() && pred(self.buf[self.pos]) {
            self.pos += 1;
        }
        &self.buf[start..self.pos]
    }

    fn skip_whitespace(&mut self) -> usize {
        self.take_while(|b| b == b' ' || b == b'\t').len()
    }

    fn eat(&mut self, literal: &[u8]) -> bool {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn number(&mut self) -> Option<u32> {
        let digits = self.take_while(|b| b.is_ascii_digit());
        std::str::from_utf8(digits).ok()?.parse().ok()
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}
