// Worker loop module
// One OS thread per worker, each with its own current-thread runtime that
// accepts from the shared listener and drives its connections as local tasks

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::LocalSet;
use tracing::{debug, error, info, warn};

use super::connection::accept_connection;
use super::Shared;

/// Connection accounting of one worker.
#[derive(Debug, Default)]
pub struct WorkerState {
    active: Cell<usize>,
    /// A connection slot was released.
    freed: Notify,
    /// The worker crossed its pressure threshold.
    pressure: Notify,
}

impl WorkerState {
    pub fn active(&self) -> usize {
        self.active.get()
    }

    /// Above 90% of `max` connections.
    pub fn under_pressure(&self, max: usize) -> bool {
        self.active.get() * 10 > max * 9
    }

    pub fn pressure(&self) -> &Notify {
        &self.pressure
    }

    /// Count a new connection; wakes idle connections when crossing the
    /// pressure threshold.
    pub fn acquire(&self, max: usize) {
        self.active.set(self.active.get() + 1);
        if self.under_pressure(max) {
            self.pressure.notify_waiters();
        }
    }

    pub fn release(&self) {
        self.active.set(self.active.get().saturating_sub(1));
        self.freed.notify_one();
    }
}

/// Start worker `id` on its own thread.
pub fn spawn_worker(
    id: usize,
    listener: std::net::TcpListener,
    shared: Arc<Shared>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("gx-worker-{id}"))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Worker {id}: cannot build runtime: {e}");
                    return;
                }
            };
            // Dropping the LocalSet at the end drops every open connection.
            let local = LocalSet::new();
            if let Err(e) = local.block_on(&runtime, run_worker(id, listener, shared)) {
                error!("Worker {id} failed: {e}");
            }
        })
}

/// Accept loop of one worker; returns once shutdown is requested.
pub async fn run_worker(
    id: usize,
    listener: std::net::TcpListener,
    shared: Arc<Shared>,
) -> std::io::Result<()> {
    let listener = TcpListener::from_std(listener)?;
    let worker = Rc::new(WorkerState::default());
    let max = shared.max_connections;
    debug!("Worker {id} accepting");

    loop {
        // At the limit: stop accepting until a slot frees up.
        while worker.active() >= max {
            tokio::select! {
                () = worker.freed.notified() => {}
                () = shared.shutdown.wait() => return stop(id, &worker),
            }
        }

        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => accept_connection(stream, peer, &shared, &worker),
                Err(e) => warn!("Worker {id}: accept failed: {e}"),
            },
            () = shared.shutdown.wait() => return stop(id, &worker),
        }
    }
}

fn stop(id: usize, worker: &WorkerState) -> std::io::Result<()> {
    info!(
        "Worker {id} stopping, dropping {} connections",
        worker.active()
    );
    Ok(())
}
