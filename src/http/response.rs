//! HTTP response building module
//!
//! Formats the status line and headers of every response shape. Builders are
//! pure: they fill buffers and never touch the socket.

use std::borrow::Cow;
use std::fs::File;

use bytes::{BufMut, BytesMut};

use super::context::ServeContext;
use super::quote::quote;
use super::range::{ByteRangeSet, BR_HEADER};
use super::MAX_PATH;
use crate::dircache::DirHandle;

/// Response status codes the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    PartialContent,
    Redirect,
    NotModified,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    RequestTimeout,
    PreconditionFailed,
    InternalServerError,
    NotImplemented,
}

impl Status {
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::PartialContent => 206,
            Self::Redirect => 302,
            Self::NotModified => 304,
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::RequestTimeout => 408,
            Self::PreconditionFailed => 412,
            Self::InternalServerError => 500,
            Self::NotImplemented => 501,
        }
    }

    /// Code and reason phrase as they appear on the status line.
    pub const fn status_line(self) -> &'static str {
        match self {
            Self::Ok => "200 OK",
            Self::PartialContent => "206 Partial Content",
            Self::Redirect => "302 Redirect",
            Self::NotModified => "304 Not Modified",
            Self::BadRequest => "400 Bad Request",
            Self::Unauthorized => "401 Authentication required",
            Self::Forbidden => "403 Forbidden",
            Self::NotFound => "404 Not Found",
            Self::RequestTimeout => "408 Request Timeout",
            Self::PreconditionFailed => "412 Precondition failed.",
            Self::InternalServerError => "500 Internal Server Error",
            Self::NotImplemented => "501 Not Implemented",
        }
    }

    /// Fixed plain-text body of an error status.
    pub const fn error_body(self) -> &'static str {
        match self {
            Self::BadRequest => "*PLONK*\n",
            Self::Unauthorized => "Authentication required\n",
            Self::Forbidden => "Access denied\n",
            Self::NotFound => "File or directory not found\n",
            Self::RequestTimeout => "Request Timeout\n",
            Self::PreconditionFailed => "Precondition failed\n",
            Self::InternalServerError | Self::NotImplemented => "Sorry folks\n",
            Self::Ok | Self::PartialContent | Self::Redirect | Self::NotModified => "",
        }
    }

    /// Whether answering with this status ends the connection.
    pub const fn forces_close(self) -> bool {
        matches!(
            self,
            Self::BadRequest
                | Self::Forbidden
                | Self::NotFound
                | Self::RequestTimeout
                | Self::InternalServerError
                | Self::NotImplemented
        )
    }
}

/// Open file snapshot: `size` comes from the `fstat` taken at open time.
#[derive(Debug)]
pub struct FileBody {
    pub file: File,
    pub size: u64,
}

/// The one active body source of a response.
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    Text(Cow<'static, [u8]>),
    Listing(DirHandle),
    File(FileBody),
}

impl Body {
    /// In-memory bytes, if the body is not a file.
    pub fn inline(&self) -> Option<&[u8]> {
        match self {
            Self::Text(text) => Some(text),
            Self::Listing(handle) => Some(handle.html()),
            Self::Empty | Self::File(_) => None,
        }
    }

    /// Full length of the body source.
    pub fn len(&self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::File(f) => f.size,
            Self::Text(_) | Self::Listing(_) => self.inline().map_or(0, |b| b.len() as u64),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Position of the writer inside a ranged body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Sub-header `i`; `i == ranges` is the closing boundary.
    SubHeader(usize),
    /// File span of range `i`.
    Span(usize),
}

/// A framed response plus the writer's resumable cursor.
#[derive(Debug)]
pub struct Response {
    pub status: Status,
    pub head: BytesMut,
    pub body: Body,
    pub ranges: ByteRangeSet,
    pub head_only: bool,
    /// Offset into the current header, body, or absolute file offset.
    pub(crate) written: u64,
    pub(crate) segment: Segment,
    /// Bytes handed to the transport for this response.
    pub bytes_sent: u64,
}

/// Everything a success response is framed from.
#[derive(Debug)]
pub struct Content {
    pub body: Body,
    pub mime: &'static str,
    pub mtime: Option<String>,
    pub ranges: ByteRangeSet,
    pub head_only: bool,
}

impl Response {
    fn new(status: Status, head: BytesMut, body: Body, ranges: ByteRangeSet, head_only: bool) -> Self {
        Self {
            status,
            head,
            body,
            ranges,
            head_only,
            written: 0,
            segment: Segment::SubHeader(0),
            bytes_sent: 0,
        }
    }

    /// Error response with the status' fixed plain-text body.
    pub fn error(
        ctx: &ServeContext<'_>,
        status: Status,
        keep_alive: bool,
        mtime: Option<&str>,
        head_only: bool,
    ) -> Self {
        let body = status.error_body().as_bytes();
        let mut head = start_head(ctx, status, keep_alive);
        put(&mut head, "Content-Type: text/plain\r\n");
        put(&mut head, &format!("Content-Length: {}\r\n", body.len()));
        if status == Status::Unauthorized {
            put(&mut head, "WWW-Authenticate: Basic realm=\"gx\"\r\n");
        }
        finish_head(&mut head, ctx, mtime);
        Self::new(
            status,
            head,
            Body::Text(Cow::Borrowed(body)),
            ByteRangeSet::default(),
            head_only,
        )
    }

    /// 302 to `path` on `host`; the unquoted path doubles as the body.
    pub fn redirect(
        ctx: &ServeContext<'_>,
        host: &str,
        path: &[u8],
        keep_alive: bool,
        head_only: bool,
    ) -> Self {
        let host = if host.is_empty() {
            ctx.site.canonical_host.as_str()
        } else {
            host
        };
        let mut head = start_head(ctx, Status::Redirect, keep_alive);
        put(
            &mut head,
            &format!(
                "Location: http://{host}:{}{}\r\n",
                ctx.site.port,
                quote(path, MAX_PATH * 3)
            ),
        );
        put(&mut head, "Content-Type: text/plain\r\n");
        put(&mut head, &format!("Content-Length: {}\r\n", path.len()));
        finish_head(&mut head, ctx, None);
        Self::new(
            Status::Redirect,
            head,
            Body::Text(Cow::Owned(path.to_vec())),
            ByteRangeSet::default(),
            head_only,
        )
    }

    /// 200 / 206 / 304 framing of a file or listing body.
    pub fn content(ctx: &ServeContext<'_>, status: Status, content: Content, keep_alive: bool) -> Self {
        let Content {
            body,
            mime,
            mtime,
            mut ranges,
            head_only,
        } = content;
        let size = body.len();
        let mut head = start_head(ctx, status, keep_alive);

        match (ranges.len(), ranges.get(0)) {
            (0, _) | (_, None) => {
                put(&mut head, &format!("Content-Type: {mime}\r\n"));
                put(&mut head, &format!("Content-Length: {size}\r\n"));
            }
            (1, Some(range)) => {
                put(&mut head, &format!("Content-Type: {mime}\r\n"));
                put(
                    &mut head,
                    &format!(
                        "Content-Range: bytes {}-{}/{size}\r\n",
                        range.start,
                        range.last()
                    ),
                );
                put(&mut head, &format!("Content-Length: {}\r\n", range.len()));
            }
            _ => {
                let length = frame_multipart(ctx, &mut ranges, mime, size);
                put(
                    &mut head,
                    &format!(
                        "Content-Type: multipart/byteranges; boundary={}\r\n",
                        boundary(ctx.now)
                    ),
                );
                put(&mut head, &format!("Content-Length: {length}\r\n"));
            }
        }

        finish_head(&mut head, ctx, mtime.as_deref());
        Self::new(status, head, body, ranges, head_only)
    }
}

/// Multipart boundary token for the given instant.
pub fn boundary(now: i64) -> String {
    format!("XXX_CUT_HERE_{now}_XXX")
}

/// Fill in every sub-header plus the closing boundary and return the total
/// multipart body length.
fn frame_multipart(ctx: &ServeContext<'_>, ranges: &mut ByteRangeSet, mime: &str, size: u64) -> u64 {
    let boundary = boundary(ctx.now);
    let mut length = 0u64;
    let spans: Vec<_> = ranges.iter().collect();
    for range in spans {
        let mut sub = Vec::with_capacity(BR_HEADER);
        sub.extend_from_slice(
            format!(
                "\r\n--{boundary}\r\nContent-type: {mime}\r\nContent-range: bytes {}-{}/{size}\r\n\r\n",
                range.start,
                range.last()
            )
            .as_bytes(),
        );
        length += sub.len() as u64 + range.len();
        ranges.push_subheader(sub);
    }
    let closing = format!("\r\n--{boundary}--\r\n").into_bytes();
    length += closing.len() as u64;
    ranges.push_subheader(closing);
    length
}

fn start_head(ctx: &ServeContext<'_>, status: Status, keep_alive: bool) -> BytesMut {
    let mut head = BytesMut::with_capacity(512);
    put(
        &mut head,
        &format!(
            "HTTP/1.1 {}\r\nServer: {}\r\nConnection: {}\r\nAccept-Ranges: bytes\r\n",
            status.status_line(),
            ctx.site.server_name,
            if keep_alive { "Keep-Alive" } else { "Close" }
        ),
    );
    head
}

fn finish_head(head: &mut BytesMut, ctx: &ServeContext<'_>, mtime: Option<&str>) {
    if let Some(mtime) = mtime.filter(|m| !m.is_empty()) {
        put(head, &format!("Last-Modified: {mtime}\r\n"));
    }
    put(head, &format!("Date: {}\r\n\r\n", ctx.http_date()));
}

fn put(head: &mut BytesMut, text: &str) {
    head.put_slice(text.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::range::parse_ranges;
    use crate::http::test_support::TestSite;

    fn head_str(resp: &Response) -> String {
        String::from_utf8(resp.head.to_vec()).unwrap()
    }

    fn text_content(text: &'static str, ranges: ByteRangeSet) -> Content {
        Content {
            body: Body::Text(Cow::Borrowed(text.as_bytes())),
            mime: "text/plain",
            mtime: Some("Thu, 01 Jan 1970 00:00:00 GMT".to_string()),
            ranges,
            head_only: false,
        }
    }

    #[test]
    fn test_status_table() {
        assert_eq!(Status::PreconditionFailed.as_u16(), 412);
        assert_eq!(Status::BadRequest.error_body(), "*PLONK*\n");
        assert_eq!(Status::Redirect.status_line(), "302 Redirect");
        assert!(Status::NotFound.forces_close());
        assert!(!Status::PreconditionFailed.forces_close());
        assert!(!Status::PartialContent.forces_close());
    }

    #[test]
    fn test_error_response_layout() {
        let site = TestSite::new();
        let ctx = site.ctx();
        let resp = Response::error(&ctx, Status::NotFound, false, None, false);
        let head = head_str(&resp);

        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\nServer: gx-test\r\nConnection: Close\r\nAccept-Ranges: bytes\r\n"));
        assert!(head.contains("Content-Type: text/plain\r\nContent-Length: 28\r\n"));
        assert!(head.ends_with("Date: Tue, 14 Nov 2023 22:13:20 GMT\r\n\r\n"));
        assert!(!head.contains("Last-Modified"));
        assert_eq!(resp.body.inline(), Some(&b"File or directory not found\n"[..]));
    }

    #[test]
    fn test_unauthorized_adds_challenge() {
        let site = TestSite::new();
        let resp = Response::error(&site.ctx(), Status::Unauthorized, true, None, false);
        let head = head_str(&resp);
        assert!(head.contains("Connection: Keep-Alive\r\n"));
        assert!(head.contains("WWW-Authenticate: Basic realm=\"gx\"\r\n"));
    }

    #[test]
    fn test_redirect_location_is_quoted() {
        let site = TestSite::new();
        let resp = Response::redirect(&site.ctx(), "example.org", b"/my dir/", true, false);
        let head = head_str(&resp);
        assert!(head.starts_with("HTTP/1.1 302 Redirect\r\n"));
        assert!(head.contains("Location: http://example.org:8000/my%20dir/\r\n"));
        assert!(head.contains("Content-Length: 8\r\n"));
        assert_eq!(resp.body.inline(), Some(&b"/my dir/"[..]));
    }

    #[test]
    fn test_redirect_falls_back_to_canonical_host() {
        let site = TestSite::new();
        let resp = Response::redirect(&site.ctx(), "", b"/d/", false, false);
        assert!(head_str(&resp).contains("Location: http://localhost:8000/d/\r\n"));
    }

    #[test]
    fn test_full_content_framing() {
        let site = TestSite::new();
        let resp = Response::content(
            &site.ctx(),
            Status::Ok,
            text_content("hello world", ByteRangeSet::default()),
            true,
        );
        let head = head_str(&resp);
        assert!(head.contains("Content-Type: text/plain\r\nContent-Length: 11\r\n"));
        assert!(head.contains("Last-Modified: Thu, 01 Jan 1970 00:00:00 GMT\r\n"));
    }

    #[test]
    fn test_single_range_framing() {
        let site = TestSite::new();
        let ranges = parse_ranges("2-5", 11).unwrap();
        let resp = Response::content(
            &site.ctx(),
            Status::PartialContent,
            text_content("hello world", ranges),
            true,
        );
        let head = head_str(&resp);
        assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(head.contains("Content-Range: bytes 2-5/11\r\nContent-Length: 4\r\n"));
        assert_eq!(resp.ranges.subheader(0), None);
    }

    #[test]
    fn test_multipart_length_accounts_for_every_part() {
        let site = TestSite::new();
        let ranges = parse_ranges("0-1,6-10", 11).unwrap();
        let resp = Response::content(
            &site.ctx(),
            Status::PartialContent,
            text_content("hello world", ranges),
            true,
        );
        let head = head_str(&resp);
        let boundary = boundary(1_700_000_000);
        assert!(head.contains(&format!(
            "Content-Type: multipart/byteranges; boundary={boundary}\r\n"
        )));

        let first = String::from_utf8(resp.ranges.subheader(0).unwrap().to_vec()).unwrap();
        assert_eq!(
            first,
            format!("\r\n--{boundary}\r\nContent-type: text/plain\r\nContent-range: bytes 0-1/11\r\n\r\n")
        );
        let closing = resp.ranges.subheader(2).unwrap();
        assert_eq!(closing, format!("\r\n--{boundary}--\r\n").as_bytes());

        let expected: u64 = resp.ranges.subheader_lengths().map(|l| l as u64).sum::<u64>() + 2 + 5;
        assert!(head.contains(&format!("Content-Length: {expected}\r\n")));
    }
}
