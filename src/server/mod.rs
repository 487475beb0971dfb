// Server module entry point
// Listener, worker threads, connection driving and signal-driven shutdown

pub mod connection;
pub mod listener;
pub mod signal;

// `loop` is a keyword, so the module is exposed as `server_loop`
#[path = "loop.rs"]
pub mod server_loop;

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info};

pub use listener::create_shared_listener;
pub use server_loop::spawn_worker;
pub use signal::Shutdown;

use crate::config::Config;
use crate::dircache::DirCache;
use crate::http::{ServeContext, Site, Timeouts};
use crate::logger;

/// State every worker reads.
pub struct Shared {
    pub site: Site,
    pub dir_cache: DirCache,
    pub timeouts: Timeouts,
    /// Connection limit of one worker.
    pub max_connections: usize,
    pub zero_copy: bool,
    pub shutdown: Shutdown,
}

impl Shared {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            site: cfg.site(),
            dir_cache: DirCache::new(cfg.cache.max_entries, cfg.cache_max_age()),
            timeouts: cfg.timeouts(),
            max_connections: cfg.server.max_connections,
            zero_copy: cfg.http.zero_copy,
            shutdown: Shutdown::new(),
        }
    }

    /// Context for one readiness event at unix time `now`.
    pub fn context(&self, now: i64) -> ServeContext<'_> {
        ServeContext::new(&self.site, &self.dir_cache, now)
    }
}

/// Serve until SIGINT or SIGTERM.
pub fn run(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = create_shared_listener(addr, cfg.server.max_connections.saturating_mul(2))?;
    let shared = Arc::new(Shared::from_config(cfg));

    logger::log_server_start(&addr, cfg);
    let workers = start_workers(&listener, cfg.server.workers, &shared)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let waited = runtime.block_on(signal::wait_for_signal(&shared.shutdown));
    // Make sure workers stop even if signal registration failed.
    shared.shutdown.trigger();
    join_workers(workers);
    waited?;

    info!("bye");
    Ok(())
}

/// Spawn `count` workers accepting from clones of `listener`.
///
/// If one fails to start, the ones already running are stopped.
pub fn start_workers(
    listener: &std::net::TcpListener,
    count: usize,
    shared: &Arc<Shared>,
) -> std::io::Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(count);
    for id in 0..count {
        let spawned = listener
            .try_clone()
            .and_then(|clone| spawn_worker(id, clone, Arc::clone(shared)));
        match spawned {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                error!("Failed to start worker {id}: {e}");
                shared.shutdown.trigger();
                join_workers(handles);
                return Err(e);
            }
        }
    }
    Ok(handles)
}

pub fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            error!("Worker thread panicked");
        }
    }
}
