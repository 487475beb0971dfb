//! Shared directory listing cache
//!
//! Rendered listings are keyed by (filesystem path, mtime string) and shared
//! by every worker thread. The first requester of a key becomes its builder:
//! it inserts an unbuilt entry, drops the map lock and renders. Concurrent
//! requesters of the same key block on the entry's once-cell and then read
//! the finished listing like any other hit.
//!
//! Entries are handed out as [`DirHandle`]s. A handle keeps the entry's
//! reference count up until it is dropped; only entries nobody holds are
//! evicted.

pub mod listing;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use bytes::Bytes;
use tracing::{debug, warn};

/// Renders the listing page of `fs_path`, shown to clients as `url_path`.
pub type Renderer = dyn Fn(&Path, &str) -> io::Result<String> + Send + Sync;

type Key = (PathBuf, String);

/// One cached listing.
#[derive(Debug)]
pub struct DirEntry {
    path: PathBuf,
    mtime: String,
    /// Unix seconds at insertion.
    created: i64,
    refcount: AtomicUsize,
    /// Unset while the builder renders; `None` if rendering failed.
    listing: OnceLock<Option<Bytes>>,
}

impl DirEntry {
    fn new(path: PathBuf, mtime: String, created: i64) -> Self {
        Self {
            path,
            mtime,
            created,
            refcount: AtomicUsize::new(0),
            listing: OnceLock::new(),
        }
    }

    fn is_built(&self) -> bool {
        self.listing.get().is_some()
    }
}

/// Live reference to a built cache entry.
#[derive(Debug)]
pub struct DirHandle {
    entry: Arc<DirEntry>,
}

impl DirHandle {
    /// The rendered listing.
    pub fn html(&self) -> &[u8] {
        self.entry
            .listing
            .get()
            .and_then(Option::as_ref)
            .map_or(&[][..], |b| &b[..])
    }

    pub fn mtime(&self) -> &str {
        &self.entry.mtime
    }

    pub fn path(&self) -> &Path {
        &self.entry.path
    }

    /// Handles currently alive for this entry.
    pub fn refcount(&self) -> usize {
        self.entry.refcount.load(Ordering::Acquire)
    }
}

impl Drop for DirHandle {
    fn drop(&mut self) {
        self.entry.refcount.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct DirCache {
    entries: Mutex<HashMap<Key, Arc<DirEntry>>>,
    max_entries: usize,
    /// Seconds a built listing is served before it is rebuilt.
    max_age: i64,
    renderer: Box<Renderer>,
}

impl std::fmt::Debug for DirCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirCache")
            .field("max_entries", &self.max_entries)
            .field("max_age", &self.max_age)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl DirCache {
    /// Cache rendering with [`listing::render_directory`].
    pub fn new(max_entries: usize, max_age: i64) -> Self {
        Self::with_renderer(max_entries, max_age, Box::new(listing::render_directory))
    }

    pub fn with_renderer(max_entries: usize, max_age: i64, renderer: Box<Renderer>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            max_age,
            renderer,
        }
    }

    /// Listing of `fs_path` at modification time `mtime`.
    ///
    /// Blocks while another thread renders the same key. Returns `None` when
    /// the directory cannot be read.
    pub fn get(&self, fs_path: &Path, url_path: &str, mtime: &str, now: i64) -> Option<DirHandle> {
        let key: Key = (fs_path.to_path_buf(), mtime.to_string());
        let handle = self.claim(&key, now);

        let listing = handle.entry.listing.get_or_init(|| {
            debug!("Rendering listing of {}", fs_path.display());
            match (self.renderer)(fs_path, url_path) {
                Ok(html) => Some(Bytes::from(html)),
                Err(e) => {
                    warn!("Cannot list {}: {}", fs_path.display(), e);
                    None
                }
            }
        });

        if listing.is_none() {
            let mut entries = self.lock();
            if entries
                .get(&key)
                .is_some_and(|e| Arc::ptr_eq(e, &handle.entry))
            {
                entries.remove(&key);
            }
            return None;
        }
        Some(handle)
    }

    /// Find or insert the entry for `key` and take a reference to it.
    fn claim(&self, key: &Key, now: i64) -> DirHandle {
        let mut entries = self.lock();

        let expired = entries
            .get(key)
            .is_some_and(|e| e.is_built() && now - e.created > self.max_age);
        if expired {
            entries.remove(key);
        }

        let entry = Arc::clone(
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(DirEntry::new(key.0.clone(), key.1.clone(), now))),
        );
        entry.refcount.fetch_add(1, Ordering::AcqRel);

        if entries.len() > self.max_entries {
            Self::evict(&mut entries, self.max_entries);
        }
        DirHandle { entry }
    }

    /// Drop unreferenced built entries, oldest first, until `max` remain.
    fn evict(entries: &mut HashMap<Key, Arc<DirEntry>>, max: usize) {
        let mut idle: Vec<(i64, Key)> = entries
            .iter()
            .filter(|(_, e)| e.is_built() && e.refcount.load(Ordering::Acquire) == 0)
            .map(|(k, e)| (e.created, k.clone()))
            .collect();
        idle.sort_unstable_by_key(|(created, _)| *created);

        let excess = entries.len().saturating_sub(max);
        for (_, key) in idle.into_iter().take(excess) {
            entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Arc<DirEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
