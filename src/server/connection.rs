// Connection driver module
// Runs one accepted client as a local task: waits for readiness, applies
// idle limits and hands every event to the protocol engine

use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use super::server_loop::WorkerState;
use super::Shared;
use crate::http::context::unix_now;
use crate::http::transport::TcpTransport;
use crate::http::{Connection, State};

/// Interval at which waiting connections check their idle limits.
const TICK: Duration = Duration::from_secs(1);

/// Releases the connection's slot in the worker when the task ends.
struct Slot(Rc<WorkerState>);

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.release();
    }
}

enum Wake {
    Ready,
    Check,
    Failed(std::io::Error),
}

/// Count the connection against the worker and start serving it.
pub fn accept_connection(
    stream: TcpStream,
    peer: SocketAddr,
    shared: &Arc<Shared>,
    worker: &Rc<WorkerState>,
) {
    worker.acquire(shared.max_connections);
    debug!("{peer}: accepted ({} active)", worker.active());

    let shared = Arc::clone(shared);
    let slot = Slot(Rc::clone(worker));
    tokio::task::spawn_local(async move {
        let worker = Rc::clone(&slot.0);
        serve(stream, peer, &shared, &worker).await;
        drop(slot);
    });
}

async fn serve(stream: TcpStream, peer: SocketAddr, shared: &Shared, worker: &WorkerState) {
    let io = TcpTransport::new(stream, shared.zero_copy);
    let mut conn = Connection::new(io, peer, unix_now());

    let mut state = conn.process(&shared.context(unix_now()));
    while state != State::Close {
        if !wait_ready(&mut conn, shared, worker).await {
            break;
        }
        state = conn.process(&shared.context(unix_now()));
    }
    debug!("{peer}: closed");
}

/// Wait until the connection can make progress.
///
/// Returns `false` if the socket failed; the connection is then dropped.
async fn wait_ready(
    conn: &mut Connection<TcpTransport>,
    shared: &Shared,
    worker: &WorkerState,
) -> bool {
    loop {
        let state = conn.state();
        let idle = state == State::KeepAlive;

        let wake = if idle && worker.under_pressure(shared.max_connections) {
            Wake::Check
        } else {
            tokio::select! {
                ready = tokio::time::timeout(TICK, conn.io().ready(state.interest())) => match ready {
                    Ok(Ok(_)) => Wake::Ready,
                    Ok(Err(e)) => Wake::Failed(e),
                    Err(_) => Wake::Check,
                },
                () = worker.pressure().notified(), if idle => Wake::Check,
            }
        };

        match wake {
            Wake::Ready => return true,
            Wake::Failed(e) => {
                debug!("{}: socket error: {e}", conn.peer());
                return false;
            }
            Wake::Check => {
                let ctx = shared.context(unix_now());
                let pressure = worker.under_pressure(shared.max_connections);
                if conn.check_timeout(&ctx, shared.timeouts, pressure) {
                    return true;
                }
            }
        }
    }
}
