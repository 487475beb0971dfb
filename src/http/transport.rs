//! Non-blocking byte transport used by the protocol engine.
//!
//! Every call either makes progress, reports `WouldBlock` (suspend until the
//! next readiness event), `Interrupted` (retry now), `Ok(0)` (peer gone) or a
//! hard error. File bodies go through [`Transport::send_file`], which is
//! zero-copy `sendfile(2)` on Linux and a positional-read copy elsewhere; both
//! honour the same partial-transfer contract as `write`.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;

/// Largest chunk moved by one buffered copy step.
const COPY_CHUNK: usize = 16 * 1024;

/// Largest count handed to a single `sendfile` call.
#[cfg(target_os = "linux")]
const SENDFILE_MAX: usize = 0x7fff_f000;

pub trait Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Transmit up to `len` bytes of `file` starting at `offset`.
    fn send_file(&mut self, file: &File, offset: u64, len: u64) -> io::Result<usize> {
        buffered_send_file(self, file, offset, len)
    }
}

/// Copy one chunk of `file` through user space into `io`.
///
/// Only the bytes the transport accepted are reported, so a short write is
/// resumed from the right file offset on the next call.
pub fn buffered_send_file<T: Transport + ?Sized>(
    io: &mut T,
    file: &File,
    offset: u64,
    len: u64,
) -> io::Result<usize> {
    let mut chunk = [0u8; COPY_CHUNK];
    let want = usize::try_from(len).map_or(COPY_CHUNK, |l| l.min(COPY_CHUNK));
    let n = file.read_at(&mut chunk[..want], offset)?;
    if n == 0 {
        return Ok(0);
    }
    io.write(&chunk[..n])
}

/// Client socket registered with the worker's tokio reactor.
pub struct TcpTransport {
    stream: TcpStream,
    zero_copy: bool,
}

impl TcpTransport {
    pub const fn new(stream: TcpStream, zero_copy: bool) -> Self {
        Self { stream, zero_copy }
    }

    /// Wait until the socket is ready for `interest`.
    pub async fn ready(&self, interest: Interest) -> io::Result<Ready> {
        self.stream.ready(interest).await
    }

    #[cfg(target_os = "linux")]
    fn sendfile(&self, file: &File, offset: u64, len: u64) -> io::Result<usize> {
        let mut off = nix::libc::off_t::try_from(offset)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let count = usize::try_from(len).map_or(SENDFILE_MAX, |l| l.min(SENDFILE_MAX));
        self.stream.try_io(Interest::WRITABLE, || {
            nix::sys::sendfile::sendfile(&self.stream, file, Some(&mut off), count)
                .map_err(io::Error::from)
        })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.try_read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.try_write(buf)
    }

    fn send_file(&mut self, file: &File, offset: u64, len: u64) -> io::Result<usize> {
        #[cfg(target_os = "linux")]
        if self.zero_copy {
            return self.sendfile(file, offset, len);
        }
        buffered_send_file(self, file, offset, len)
    }
}
