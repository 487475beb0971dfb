// Signal handling module
//
// Supported signals:
// - SIGTERM: Shutdown
// - SIGINT:  Shutdown (Ctrl+C)
// - SIGHUP:  Logged and ignored

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tracing::info;

/// Process-wide shutdown flag, observable from every worker runtime.
#[derive(Debug, Default)]
pub struct Shutdown {
    requested: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown was requested, including before the call.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_requested() {
            return;
        }
        notified.await;
    }
}

/// Block until SIGINT or SIGTERM arrives, then trigger `shutdown`.
///
/// SIGHUP is caught so it no longer terminates the process.
pub async fn wait_for_signal(shutdown: &Shutdown) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    info!("Process ID: {}", std::process::id());

    loop {
        tokio::select! {
            _ = sighup.recv() => {
                info!("SIGHUP received, ignoring");
                continue;
            }
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
            _ = sigint.recv() => info!("SIGINT received, shutting down"),
            () = shutdown.wait() => {}
        }
        break;
    }
    shutdown.trigger();
    Ok(())
}
