//! Resumable response transmission
//!
//! Sends the header, then the body, picking up exactly where the previous
//! call stopped. Would-block suspends with the cursor untouched, an
//! interrupt is retried at once, a zero-length transfer or hard error closes
//! the connection.

use std::io;

use super::connection::State;
use super::response::{Body, Response, Segment};
use super::transport::Transport;

/// Why a transfer did not make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Blocked,
    Failed,
}

/// Drive `resp` from `state` until it finishes, blocks or fails.
///
/// Returns the state to resume from: a write state when blocked,
/// [`State::Finished`] when done, [`State::Close`] on failure.
pub fn write_response<T: Transport + ?Sized>(io: &mut T, resp: &mut Response, mut state: State) -> State {
    loop {
        let step = match state {
            State::WriteHeader => write_header(io, resp),
            State::WriteBody => write_body(io, resp),
            State::WriteFile => write_file(io, resp),
            State::WriteRanges => write_ranges(io, resp),
            other => return other,
        };
        match step {
            Ok(next) => state = next,
            Err(Stop::Blocked) => return state,
            Err(Stop::Failed) => return State::Close,
        }
    }
}

fn write_header<T: Transport + ?Sized>(io: &mut T, resp: &mut Response) -> Result<State, Stop> {
    let at = offset(resp.written);
    if at < resp.head.len() {
        let n = retry(|| io.write(&resp.head[at..]))?;
        resp.written += n;
        return Ok(State::WriteHeader);
    }
    resp.written = 0;
    Ok(body_state(resp))
}

/// First body state once the header is out.
fn body_state(resp: &mut Response) -> State {
    if resp.head_only || resp.body.is_empty() {
        return State::Finished;
    }
    match (&resp.body, resp.ranges.len()) {
        (Body::File(_), 0) => State::WriteFile,
        (Body::File(_), 1) => {
            resp.segment = Segment::Span(0);
            resp.written = resp.ranges.get(0).map_or(0, |r| r.start);
            State::WriteRanges
        }
        (Body::File(_), _) => {
            resp.segment = Segment::SubHeader(0);
            resp.written = 0;
            State::WriteRanges
        }
        _ => State::WriteBody,
    }
}

fn write_body<T: Transport + ?Sized>(io: &mut T, resp: &mut Response) -> Result<State, Stop> {
    let body = resp.body.inline().unwrap_or_default();
    let at = offset(resp.written);
    if at >= body.len() {
        return Ok(State::Finished);
    }
    let n = retry(|| io.write(&body[at..]))?;
    resp.written += n;
    resp.bytes_sent += n;
    Ok(State::WriteBody)
}

fn write_file<T: Transport + ?Sized>(io: &mut T, resp: &mut Response) -> Result<State, Stop> {
    let Body::File(body) = &resp.body else {
        return Ok(State::Finished);
    };
    if resp.written >= body.size {
        return Ok(State::Finished);
    }
    let n = retry(|| io.send_file(&body.file, resp.written, body.size - resp.written))?;
    resp.written += n;
    resp.bytes_sent += n;
    Ok(State::WriteFile)
}

/// Alternates sub-header `i` and span `i`; a single range has no
/// sub-headers and is just its span.
fn write_ranges<T: Transport + ?Sized>(io: &mut T, resp: &mut Response) -> Result<State, Stop> {
    let Body::File(body) = &resp.body else {
        return Ok(State::Finished);
    };

    match resp.segment {
        Segment::SubHeader(i) => {
            let Some(sub) = resp.ranges.subheader(i) else {
                return Ok(State::Finished);
            };
            let at = offset(resp.written);
            if at < sub.len() {
                let n = retry(|| io.write(&sub[at..]))?;
                resp.written += n;
                resp.bytes_sent += n;
            } else if let Some(range) = resp.ranges.get(i) {
                resp.segment = Segment::Span(i);
                resp.written = range.start;
            } else {
                return Ok(State::Finished);
            }
        }
        Segment::Span(i) => {
            let Some(range) = resp.ranges.get(i) else {
                return Ok(State::Finished);
            };
            if resp.written < range.end {
                let n = retry(|| io.send_file(&body.file, resp.written, range.end - resp.written))?;
                resp.written += n;
                resp.bytes_sent += n;
            } else if resp.ranges.subheader(i + 1).is_some() {
                resp.segment = Segment::SubHeader(i + 1);
                resp.written = 0;
            } else {
                return Ok(State::Finished);
            }
        }
    }
    Ok(State::WriteRanges)
}

/// Run one transfer, retrying interrupts.
fn retry(mut op: impl FnMut() -> io::Result<usize>) -> Result<u64, Stop> {
    loop {
        match op() {
            Ok(0) => return Err(Stop::Failed),
            Ok(n) => return Ok(n as u64),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(Stop::Blocked),
            Err(_) => return Err(Stop::Failed),
        }
    }
}

fn offset(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}
