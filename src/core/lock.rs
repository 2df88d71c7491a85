//! Cache entry lock management
//!
//! One marker file per cache key (`<root>/.#<key>`) is the whole critical
//! section: whoever creates it with `create_new` owns the key until the file
//! is deleted. This works across processes without OS advisory locks.
//!
//! Markers left behind by a crashed process are never considered stale.
//! They must be removed by hand (or by an external cleanup job), or waited
//! out with [`LockPolicy::timeout`].

use super::cancel::CancelToken;
use super::error::{CacheError, Result};
use super::output;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

/// Default interval between attempts to create a held marker
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Prefix of lock marker file names
pub const LOCK_PREFIX: &str = ".#";

/// How long to wait for a held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPolicy {
    pub poll_interval: Duration,
    /// `None` waits until the holder releases or the caller cancels.
    pub timeout: Option<Duration>,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

/// Markers created by this process, by owning thread.
fn holders() -> &'static Mutex<HashMap<PathBuf, ThreadId>> {
    static HOLDERS: OnceLock<Mutex<HashMap<PathBuf, ThreadId>>> = OnceLock::new();
    HOLDERS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn held_by_current_thread(path: &Path) -> bool {
    let map = holders().lock().unwrap_or_else(|e| e.into_inner());
    map.get(path) == Some(&std::thread::current().id())
}

fn register(path: &Path) {
    let mut map = holders().lock().unwrap_or_else(|e| e.into_inner());
    map.insert(path.to_path_buf(), std::thread::current().id());
}

fn unregister(path: &Path) {
    let mut map = holders().lock().unwrap_or_else(|e| e.into_inner());
    map.remove(path);
}

/// Path of the lock marker for `key` under `root`.
pub fn lock_path(root: &Path, key: &str) -> PathBuf {
    root.join(format!("{LOCK_PREFIX}{key}"))
}

/// Try once to create the marker. `Ok(None)` means someone else holds it.
fn try_create(path: &Path) -> Result<Option<CacheLock>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            register(path);
            // Owner pid helps whoever has to clean up after a crash.
            let _ = writeln!(file, "{}", std::process::id());
            Ok(Some(CacheLock {
                path: path.to_path_buf(),
                released: false,
            }))
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(source) => Err(CacheError::Lock {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Acquire the lock for `key`, polling while another holder is active.
///
/// Fails with [`CacheError::LockReentrant`] if the calling thread already
/// holds the same key, since waiting on itself would never end.
pub fn acquire_cache_lock(
    root: &Path,
    key: &str,
    policy: &LockPolicy,
    cancel: &CancelToken,
) -> Result<CacheLock> {
    std::fs::create_dir_all(root).map_err(|source| CacheError::Lock {
        path: root.to_path_buf(),
        source,
    })?;

    let path = lock_path(root, key);
    if held_by_current_thread(&path) {
        return Err(CacheError::LockReentrant { path });
    }

    cancel.check()?;
    if let Some(lock) = try_create(&path)? {
        tracing::debug!(lock = %path.display(), "lock acquired");
        return Ok(lock);
    }

    output::detail(&format!("waiting for lock {}", path.display()));
    let started = Instant::now();

    loop {
        if let Some(limit) = policy.timeout {
            let waited = started.elapsed();
            if waited >= limit {
                return Err(CacheError::LockTimeout { path, waited });
            }
        }
        cancel.sleep(policy.poll_interval)?;

        if let Some(lock) = try_create(&path)? {
            tracing::debug!(
                lock = %path.display(),
                waited_ms = started.elapsed().as_millis() as u64,
                "lock acquired after wait"
            );
            return Ok(lock);
        }
    }
}

/// Ownership of one cache key. Deletes the marker on release or drop.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
    released: bool,
}

impl CacheLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the marker, reporting I/O failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        unregister(&self.path);
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(lock = %self.path.display(), "lock released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(lock = %self.path.display(), "lock marker vanished before release");
                Ok(())
            }
            Err(source) => Err(CacheError::Lock {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if !self.released {
            unregister(&self.path);
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
