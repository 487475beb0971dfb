//! Bounded request header accumulation.
//!
//! Bytes are read into a fixed `MAX_HEADER` buffer until the head terminator
//! shows up. Bytes past the terminator stay buffered for the next pipelined
//! request.

use std::io;

use super::transport::Transport;
use super::MAX_HEADER;

/// Result of one read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// `n` new bytes were buffered.
    Data(usize),
    /// Nothing available right now.
    WouldBlock,
    /// Peer closed or the socket failed.
    Closed,
    /// No room left in the buffer.
    Full,
}

/// Result of scanning the buffered bytes for a complete head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    Incomplete,
    /// Not HTTP, or no terminator within `MAX_HEADER` bytes.
    Rejected,
    /// Head is complete; `consumed` counts through the terminator.
    Complete { consumed: usize },
}

/// Methods whose request line is worth buffering.
const KNOWN_PREFIXES: [&[u8]; 4] = [b"GET ", b"PUT ", b"HEAD ", b"POST "];

pub struct HeaderBuffer {
    buf: Box<[u8; MAX_HEADER]>,
    data_len: usize,
    consumed_len: usize,
}

impl Default for HeaderBuffer {
    fn default() -> Self {
        Self {
            buf: Box::new([0; MAX_HEADER]),
            data_len: 0,
            consumed_len: 0,
        }
    }
}

impl std::fmt::Debug for HeaderBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderBuffer")
            .field("data_len", &self.data_len)
            .field("consumed_len", &self.consumed_len)
            .finish_non_exhaustive()
    }
}

impl HeaderBuffer {
    /// Read once from `io`, retrying on interrupt.
    pub fn fill<T: Transport + ?Sized>(&mut self, io: &mut T) -> Fill {
        if self.data_len == MAX_HEADER {
            return Fill::Full;
        }
        loop {
            match io.read(&mut self.buf[self.data_len..]) {
                Ok(0) => return Fill::Closed,
                Ok(n) => {
                    self.data_len += n;
                    return Fill::Data(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Fill::WouldBlock,
                Err(_) => return Fill::Closed,
            }
        }
    }

    /// Look for a complete head in the buffered bytes.
    pub fn scan(&self) -> Scan {
        let data = self.data();
        if data.len() < 5 {
            return Scan::Incomplete;
        }
        if !KNOWN_PREFIXES.iter().any(|p| data.starts_with(p)) {
            return Scan::Rejected;
        }
        // The earliest blank line ends the head, whichever form it takes.
        let crlf = find(data, b"\r\n\r\n").map(|at| at + 4);
        let lf = find(data, b"\n\n").map(|at| at + 2);
        let terminator = match (crlf, lf) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        match terminator {
            Some(consumed) => Scan::Complete { consumed },
            None if data.len() == MAX_HEADER => Scan::Rejected,
            None => Scan::Incomplete,
        }
    }

    /// Mark the first `consumed` bytes as the current request head.
    pub fn set_consumed(&mut self, consumed: usize) {
        self.consumed_len = consumed.min(self.data_len);
    }

    /// The current request head.
    pub fn head(&self) -> &[u8] {
        &self.buf[..self.consumed_len]
    }

    /// Drop the current head and move any pipelined bytes to the front.
    /// Returns whether bytes remain.
    pub fn shift(&mut self) -> bool {
        self.buf.copy_within(self.consumed_len..self.data_len, 0);
        self.data_len -= self.consumed_len;
        self.consumed_len = 0;
        self.data_len > 0
    }

    pub fn clear(&mut self) {
        self.data_len = 0;
        self.consumed_len = 0;
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[..self.data_len]
    }

    pub const fn data_len(&self) -> usize {
        self.data_len
    }

    pub const fn consumed_len(&self) -> usize {
        self.consumed_len
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::transport::mock::{Input, MockTransport};

    fn buffered(data: &[u8]) -> HeaderBuffer {
        let mut buf = HeaderBuffer::default();
        let mut io = MockTransport::with_input(data);
        while let Fill::Data(_) = buf.fill(&mut io) {}
        buf
    }

    #[test]
    fn test_incomplete_until_terminator() {
        assert_eq!(buffered(b"GET").scan(), Scan::Incomplete);
        assert_eq!(buffered(b"GET / HTTP/1.1\r\n").scan(), Scan::Incomplete);
        assert_eq!(
            buffered(b"GET / HTTP/1.1\r\n\r\n").scan(),
            Scan::Complete { consumed: 18 }
        );
    }

    #[test]
    fn test_bare_lf_terminator() {
        assert_eq!(
            buffered(b"HEAD / HTTP/1.0\n\nrest").scan(),
            Scan::Complete { consumed: 17 }
        );
    }

    #[test]
    fn test_earliest_terminator_wins() {
        let buf = buffered(b"GET / HTTP/1.1\nX: y\n\nZ\r\n\r\n");
        assert_eq!(buf.scan(), Scan::Complete { consumed: 21 });

        let buf = buffered(b"GET / HTTP/1.1\r\n\r\nGET /b HTTP/1.1\n\n");
        assert_eq!(buf.scan(), Scan::Complete { consumed: 18 });
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        assert_eq!(buffered(b"\x16\x03\x01\x02\x00").scan(), Scan::Rejected);
        assert_eq!(buffered(b"DELETE / HTTP/1.1\r\n\r\n").scan(), Scan::Rejected);
        assert_eq!(buffered(b"POST /x HTTP/1.1\r\n").scan(), Scan::Incomplete);
    }

    #[test]
    fn test_full_buffer_without_terminator() {
        let mut data = b"GET /".to_vec();
        data.resize(MAX_HEADER + 100, b'a');
        let mut buf = buffered(&data);
        assert_eq!(buf.data_len(), MAX_HEADER);
        assert_eq!(buf.scan(), Scan::Rejected);
        assert_eq!(buf.fill(&mut MockTransport::default()), Fill::Full);
    }

    #[test]
    fn test_read_outcomes() {
        let mut buf = HeaderBuffer::default();
        let mut io = MockTransport::default();
        io.input.push_back(Input::Interrupted);
        io.push_input(b"GET");
        io.input.push_back(Input::WouldBlock);
        io.input.push_back(Input::Eof);

        assert_eq!(buf.fill(&mut io), Fill::Data(3));
        assert_eq!(buf.fill(&mut io), Fill::WouldBlock);
        assert_eq!(buf.fill(&mut io), Fill::Closed);
    }

    #[test]
    fn test_shift_keeps_pipelined_bytes() {
        let mut buf = buffered(b"GET /a HTTP/1.1\r\n\r\nGET /b");
        let Scan::Complete { consumed } = buf.scan() else {
            panic!("head should be complete");
        };
        buf.set_consumed(consumed);
        assert_eq!(buf.head(), b"GET /a HTTP/1.1\r\n\r\n");
        assert!(buf.shift());
        assert_eq!(buf.data(), b"GET /b");
        assert_eq!(buf.consumed_len(), 0);
    }
}
