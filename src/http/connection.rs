//! Per-connection protocol engine
//!
//! A [`Connection`] owns one client transport and walks it through
//! read → parse → write, then either closes or resets for the next request.
//! Every step is non-blocking: [`Connection::process`] runs until the
//! transport would block and reports the state to resume from.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::io::Interest;
use tracing::debug;

use super::context::ServeContext;
use super::parser::parse_request_head;
use super::reader::{Fill, HeaderBuffer, Scan};
use super::request::Request;
use super::resolve::resolve;
use super::response::{Response, Status};
use super::transport::Transport;
use super::writer::write_response;
use crate::logger::{self, AccessLogEntry};

/// Protocol state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ReadHeader,
    ParseHeader,
    WriteHeader,
    WriteBody,
    WriteFile,
    WriteRanges,
    /// Response fully sent.
    Finished,
    /// Idle between requests.
    KeepAlive,
    Close,
}

impl State {
    pub const fn is_writing(self) -> bool {
        matches!(
            self,
            Self::WriteHeader | Self::WriteBody | Self::WriteFile | Self::WriteRanges
        )
    }

    /// Readiness the connection waits for in this state.
    pub const fn interest(self) -> Interest {
        if self.is_writing() {
            Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }
}

/// Idle limits in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// While a request is read or a response written.
    pub request: i64,
    /// Between keep-alive requests.
    pub keep_alive: i64,
}

pub struct Connection<T> {
    io: T,
    peer: SocketAddr,
    state: State,
    buffer: HeaderBuffer,
    request: Request,
    response: Option<Response>,
    keep_alive: bool,
    /// Unix seconds of the last readiness event.
    last_activity: i64,
    started: Option<Instant>,
}

impl<T: Transport> Connection<T> {
    pub fn new(io: T, peer: SocketAddr, now: i64) -> Self {
        Self {
            io,
            peer,
            state: State::ReadHeader,
            buffer: HeaderBuffer::default(),
            request: Request::default(),
            response: None,
            keep_alive: false,
            last_activity: now,
            started: None,
        }
    }

    pub const fn state(&self) -> State {
        self.state
    }

    pub const fn io(&self) -> &T {
        &self.io
    }

    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub const fn request(&self) -> &Request {
        &self.request
    }

    pub const fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    /// Make as much progress as the transport allows.
    ///
    /// Returns the state to wait in: a read or write state when blocked,
    /// [`State::KeepAlive`] when idle, [`State::Close`] when done.
    pub fn process(&mut self, ctx: &ServeContext<'_>) -> State {
        self.last_activity = ctx.now;
        let mut pipelined = false;

        loop {
            match self.state {
                State::KeepAlive | State::ReadHeader => {
                    self.state = State::ReadHeader;
                    self.read_request(ctx, pipelined);
                    pipelined = false;
                    if self.state == State::ReadHeader {
                        return self.state;
                    }
                }
                State::ParseHeader => self.parse_request(ctx),
                State::WriteHeader | State::WriteBody | State::WriteFile | State::WriteRanges => {
                    let Some(resp) = self.response.as_mut() else {
                        self.state = State::Close;
                        continue;
                    };
                    self.state = write_response(&mut self.io, resp, self.state);
                    if self.state.is_writing() {
                        return self.state;
                    }
                }
                State::Finished => {
                    self.log_access();
                    if !self.keep_alive {
                        self.state = State::Close;
                        continue;
                    }
                    pipelined = self.reset();
                    if !pipelined {
                        self.state = State::KeepAlive;
                        return self.state;
                    }
                    self.state = State::ReadHeader;
                }
                State::Close => return State::Close,
            }
        }
    }

    /// Buffer request bytes; pipelined mode only rescans what is buffered.
    fn read_request(&mut self, ctx: &ServeContext<'_>, pipelined: bool) {
        if !pipelined {
            match self.buffer.fill(&mut self.io) {
                Fill::Data(_) | Fill::Full => {}
                Fill::WouldBlock => return,
                Fill::Closed => {
                    self.state = State::Close;
                    return;
                }
            }
        }
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }

        match self.buffer.scan() {
            Scan::Incomplete => {}
            Scan::Rejected => {
                debug!("{}: rejecting unparseable request head", self.peer);
                self.fail(ctx, Status::BadRequest, None);
            }
            Scan::Complete { consumed } => {
                self.buffer.set_consumed(consumed);
                self.state = State::ParseHeader;
            }
        }
    }

    fn parse_request(&mut self, ctx: &ServeContext<'_>) {
        if let Err(e) = parse_request_head(self.buffer.head(), &mut self.request) {
            debug!("{}: {}", self.peer, e);
            self.fail(ctx, e.status(), None);
            return;
        }
        self.keep_alive = self.request.keep_alive;

        match resolve(ctx, &self.request) {
            Ok(resp) => self.install(resp),
            Err(rejection) => self.fail(ctx, rejection.status, rejection.mtime.as_deref()),
        }
    }

    /// Answer with an error response.
    fn fail(&mut self, ctx: &ServeContext<'_>, status: Status, mtime: Option<&str>) {
        if status.forces_close() {
            self.keep_alive = false;
        }
        let resp = Response::error(ctx, status, self.keep_alive, mtime, self.request.head_only);
        self.install(resp);
    }

    fn install(&mut self, resp: Response) {
        self.response = Some(resp);
        self.state = State::WriteHeader;
    }

    /// Clear the finished request; returns whether pipelined bytes remain.
    fn reset(&mut self) -> bool {
        self.request = Request::default();
        self.response = None;
        self.keep_alive = false;
        self.started = None;
        self.buffer.shift()
    }

    /// Apply idle limits. Returns `true` if the state changed.
    ///
    /// `pressure` is set when the worker is close to its connection limit;
    /// idle keep-alive connections are then closed right away.
    pub fn check_timeout(&mut self, ctx: &ServeContext<'_>, limits: Timeouts, pressure: bool) -> bool {
        let idle = ctx.now - self.last_activity;
        match self.state {
            State::KeepAlive if pressure || idle > limits.keep_alive => {
                self.state = State::Close;
            }
            State::ReadHeader if idle > limits.request => {
                debug!("{}: request timeout", self.peer);
                self.last_activity = ctx.now;
                self.fail(ctx, Status::RequestTimeout, None);
            }
            State::Close | State::KeepAlive | State::ReadHeader => return false,
            _ if idle > limits.request => {
                debug!("{}: idle in {:?}, closing", self.peer, self.state);
                self.state = State::Close;
            }
            _ => return false,
        }
        true
    }

    fn log_access(&self) {
        let Some(resp) = &self.response else {
            return;
        };
        let req = &self.request;
        let mut entry = AccessLogEntry::new(
            self.peer.ip().to_string(),
            req.method.clone(),
            req.path_lossy(),
        );
        if !req.query.is_empty() {
            entry.query = Some(String::from_utf8_lossy(&req.query).into_owned());
        }
        entry.http_version = req.version();
        entry.status = resp.status.as_u16();
        entry.body_bytes = resp.bytes_sent;
        entry.referer = req.header("Referer").map(str::to_string);
        entry.user_agent = req.header("User-Agent").map(str::to_string);
        entry.request_time_us = self
            .started
            .map_or(0, |t| u64::try_from(t.elapsed().as_micros()).unwrap_or(u64::MAX));
        logger::log_access(&entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::TestSite;
    use crate::http::transport::mock::{Input, MockTransport, Step};

    const LIMITS: Timeouts = Timeouts {
        request: 60,
        keep_alive: 5,
    };

    fn connect(input: &[u8]) -> Connection<MockTransport> {
        Connection::new(
            MockTransport::with_input(input),
            "127.0.0.1:40000".parse().unwrap(),
            TestSite::NOW,
        )
    }

    /// Run until the connection waits for more input or closes.
    fn run(conn: &mut Connection<MockTransport>, site: &TestSite) -> State {
        let mut state = conn.state();
        for _ in 0..10_000 {
            state = conn.process(&site.ctx());
            if !state.is_writing() {
                return state;
            }
        }
        panic!("connection stuck in {state:?}");
    }

    fn responses(output: &str) -> Vec<&str> {
        output
            .match_indices("HTTP/1.1 ")
            .map(|(i, _)| &output[i..i + 12])
            .collect()
    }

    #[test]
    fn test_get_then_keep_alive() {
        let site = TestSite::new();
        site.write("index.html", b"<h1>hi</h1>");
        let mut conn = connect(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");

        assert_eq!(run(&mut conn, &site), State::KeepAlive);
        let out = conn.io().output_str();
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Connection: Keep-Alive\r\n"));
        assert!(out.ends_with("\r\n\r\n<h1>hi</h1>"));
        assert!(conn.response().is_none());
    }

    #[test]
    fn test_http10_closes_after_response() {
        let site = TestSite::new();
        site.write("a.txt", b"abc");
        let mut conn = connect(b"GET /a.txt HTTP/1.0\r\n\r\n");
        assert_eq!(run(&mut conn, &site), State::Close);
        assert!(conn.io().output_str().contains("Connection: Close\r\n"));
    }

    #[test]
    fn test_single_range_framing() {
        let site = TestSite::new();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        site.write("blob", &data);
        let mut conn = connect(b"GET /blob HTTP/1.1\r\nRange: bytes=100-199\r\n\r\n");

        run(&mut conn, &site);
        let out = &conn.io().output;
        let text = String::from_utf8_lossy(out);
        assert!(text.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(text.contains("Content-Range: bytes 100-199/1000\r\nContent-Length: 100\r\n"));
        let body_at = out.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        assert_eq!(&out[body_at..], &data[100..200]);
    }

    #[test]
    fn test_pipelined_requests_across_partial_writes() {
        let site = TestSite::new();
        site.write("a.txt", b"first");
        site.write("b.txt", b"second");
        let mut conn = connect(
            b"GET /a.txt HTTP/1.1\r\n\r\nGET /b.txt HTTP/1.1\r\n\r\nGET /a.txt HTTP/1.1\r\nConnection: close\r\n\r\n",
        );
        let steps: Vec<Step> = (0..500).flat_map(|_| [Step::Accept(7), Step::WouldBlock]).collect();
        conn.io.push_steps(&steps);

        assert_eq!(run(&mut conn, &site), State::Close);
        let out = conn.io().output_str();
        assert_eq!(
            responses(&out),
            vec!["HTTP/1.1 200", "HTTP/1.1 200", "HTTP/1.1 200"]
        );
        let first = out.find("first").unwrap();
        let second = out.find("second").unwrap();
        let third = out.rfind("first").unwrap();
        assert!(first < second && second < third);
        assert!(out.ends_with("\r\n\r\nfirst"));
    }

    #[test]
    fn test_pipelined_mixed_line_endings() {
        let site = TestSite::new();
        site.write("a.txt", b"AAA");
        site.write("b.txt", b"BBB");
        let mut conn = connect(
            b"GET /a.txt HTTP/1.1\n\nGET /b.txt HTTP/1.1\r\nConnection: close\r\n\r\n",
        );

        assert_eq!(run(&mut conn, &site), State::Close);
        let out = conn.io().output_str();
        assert_eq!(responses(&out), vec!["HTTP/1.1 200", "HTTP/1.1 200"]);
        assert!(out.find("AAA").unwrap() < out.find("BBB").unwrap());
        assert!(out.ends_with("\r\n\r\nBBB"));
    }

    #[test]
    fn test_partial_head_waits_for_more() {
        let site = TestSite::new();
        site.write("a.txt", b"abc");
        let mut conn = connect(b"GET /a.txt HT");
        assert_eq!(run(&mut conn, &site), State::ReadHeader);
        assert!(conn.io().output.is_empty());

        conn.io.push_input(b"TP/1.1\r\n\r\n");
        assert_eq!(run(&mut conn, &site), State::KeepAlive);
        assert!(conn.io().output_str().ends_with("abc"));
    }

    #[test]
    fn test_traversal_is_forbidden_and_closes() {
        let site = TestSite::new();
        let mut conn = connect(b"GET /docs/../../etc/passwd HTTP/1.1\r\n\r\n");
        assert_eq!(run(&mut conn, &site), State::Close);
        let out = conn.io().output_str();
        assert!(out.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert!(out.contains("Connection: Close\r\n"));
        assert!(out.ends_with("Access denied\n"));
    }

    #[test]
    fn test_if_modified_since_match_is_304_without_body() {
        let site = TestSite::new();
        site.write("page.html", b"<p>cached</p>");
        let mtime = site.mtime("page.html");
        let head = format!("GET /page.html HTTP/1.1\r\nIf-Modified-Since: {mtime}\r\n\r\n");
        let mut conn = connect(head.as_bytes());

        assert_eq!(run(&mut conn, &site), State::KeepAlive);
        let out = conn.io().output_str();
        assert!(out.starts_with("HTTP/1.1 304 Not Modified\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
        assert!(!out.contains("cached"));
    }

    #[test]
    fn test_precondition_failed_keeps_connection() {
        let site = TestSite::new();
        site.write("f", b"x");
        let mut conn = connect(
            b"GET /f HTTP/1.1\r\nIf-Unmodified-Since: Thu, 01 Jan 1970 00:00:00 GMT\r\n\r\n",
        );
        assert_eq!(run(&mut conn, &site), State::KeepAlive);
        let out = conn.io().output_str();
        assert!(out.starts_with("HTTP/1.1 412 Precondition failed.\r\n"));
        assert!(out.ends_with("Precondition failed\n"));
    }

    #[test]
    fn test_garbage_is_400() {
        let site = TestSite::new();
        let mut conn = connect(b"\x16\x03\x01\x00\xa5\x01");
        assert_eq!(run(&mut conn, &site), State::Close);
        let out = conn.io().output_str();
        assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(out.ends_with("*PLONK*\n"));
    }

    #[test]
    fn test_post_is_501() {
        let site = TestSite::new();
        let mut conn = connect(b"POST /upload HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(run(&mut conn, &site), State::Close);
        assert!(conn.io().output_str().starts_with("HTTP/1.1 501 Not Implemented\r\n"));
    }

    #[test]
    fn test_head_request_has_no_body() {
        let site = TestSite::new();
        site.write("a.txt", b"payload");
        let mut conn = connect(b"HEAD /a.txt HTTP/1.1\r\n\r\n");
        run(&mut conn, &site);
        let out = conn.io().output_str();
        assert!(out.contains("Content-Length: 7\r\n"));
        assert!(out.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_peer_close_closes() {
        let site = TestSite::new();
        let mut conn = connect(b"");
        conn.io.input.clear();
        conn.io.input.push_back(Input::Eof);
        assert_eq!(run(&mut conn, &site), State::Close);
    }

    #[test]
    fn test_header_timeout_sends_408() {
        let site = TestSite::new();
        let mut conn = connect(b"GET / HT");
        run(&mut conn, &site);

        let later = site.ctx_at(TestSite::NOW + 61);
        assert!(conn.check_timeout(&later, LIMITS, false));
        assert_eq!(conn.state(), State::WriteHeader);
        assert_eq!(conn.process(&later), State::Close);
        assert!(conn.io().output_str().starts_with("HTTP/1.1 408 Request Timeout\r\n"));
    }

    #[test]
    fn test_keep_alive_timeout_and_pressure() {
        let site = TestSite::new();
        site.write("a", b"a");
        let mut conn = connect(b"GET /a HTTP/1.1\r\n\r\n");
        assert_eq!(run(&mut conn, &site), State::KeepAlive);

        assert!(!conn.check_timeout(&site.ctx_at(TestSite::NOW + 5), LIMITS, false));
        assert!(conn.check_timeout(&site.ctx_at(TestSite::NOW + 1), LIMITS, true));
        assert_eq!(conn.state(), State::Close);

        let mut conn = connect(b"GET /a HTTP/1.1\r\n\r\n");
        run(&mut conn, &site);
        assert!(conn.check_timeout(&site.ctx_at(TestSite::NOW + 6), LIMITS, false));
        assert_eq!(conn.state(), State::Close);
    }

    #[test]
    fn test_stalled_write_times_out() {
        let site = TestSite::new();
        site.write("a", b"abc");
        let mut conn = connect(b"GET /a HTTP/1.1\r\n\r\n");
        conn.io.push_steps(&[Step::WouldBlock]);
        assert_eq!(conn.process(&site.ctx()), State::WriteHeader);

        assert!(!conn.check_timeout(&site.ctx_at(TestSite::NOW + 60), LIMITS, true));
        assert!(conn.check_timeout(&site.ctx_at(TestSite::NOW + 61), LIMITS, false));
        assert_eq!(conn.state(), State::Close);
    }

    #[test]
    fn test_directory_listing_releases_cache_handle() {
        let site = TestSite::new();
        site.mkdir("pub");
        site.write("pub/x.iso", b"iso");
        let mut conn = connect(b"GET /pub/ HTTP/1.1\r\n\r\nGET /pub/ HTTP/1.1\r\n\r\n");

        assert_eq!(run(&mut conn, &site), State::KeepAlive);
        let out = conn.io().output_str();
        assert_eq!(responses(&out).len(), 2);
        assert!(out.contains("x.iso"));

        let handle = site
            .dir_cache
            .get(&site.root().join("pub/"), "/pub/", &site.mtime("pub"), TestSite::NOW)
            .unwrap();
        assert_eq!(handle.refcount(), 1);
        assert_eq!(site.dir_cache.len(), 1);
    }
}
