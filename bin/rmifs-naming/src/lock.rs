//! Path locks
//!
//! Each path has a reader/writer lock, created on first use and never
//! removed. Locking a path takes shared locks on the root and every
//! intermediate directory, then a shared or exclusive lock on the path
//! itself, always in sorted path order. Since every caller acquires in the
//! same global order, overlapping chains cannot deadlock.
//!
//! Writers are preferred: once a writer waits on a lock, new readers queue
//! behind it.

use parking_lot::Mutex;
use rmifs_common::Path;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

/// Lock release errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("no shared lock held on {0}")]
    SharedNotHeld(Path),
    #[error("no exclusive lock held on {0}")]
    ExclusiveNotHeld(Path),
}

#[derive(Debug, Default)]
struct LockState {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

/// Writer-preferring reader/writer lock for one path
#[derive(Debug, Default)]
pub struct PathLock {
    state: Mutex<LockState>,
    notify: Notify,
}

impl PathLock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for shared access
    pub async fn read(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and
            // the wait is not missed
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if !state.writer && state.waiting_writers == 0 {
                    state.readers += 1;
                    return;
                }
            }
            notified.await;
        }
    }

    /// Wait for exclusive access
    pub async fn write(&self) {
        let mut waiting = WaitingWriter::register(self);
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if !state.writer && state.readers == 0 {
                    state.writer = true;
                    state.waiting_writers -= 1;
                    waiting.granted = true;
                    return;
                }
            }
            notified.await;
        }
    }

    /// Release shared access; `false` when none was held
    pub fn release_read(&self) -> bool {
        let mut state = self.state.lock();
        if state.readers == 0 {
            return false;
        }
        state.readers -= 1;
        if state.readers == 0 {
            self.notify.notify_waiters();
        }
        true
    }

    /// Release exclusive access; `false` when it was not held
    pub fn release_write(&self) -> bool {
        let mut state = self.state.lock();
        if !state.writer {
            return false;
        }
        state.writer = false;
        self.notify.notify_waiters();
        true
    }

    fn holds(&self, exclusive: bool) -> bool {
        let state = self.state.lock();
        if exclusive { state.writer } else { state.readers > 0 }
    }

    /// Number of shared holders, for diagnostics
    pub fn readers(&self) -> usize {
        self.state.lock().readers
    }

    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer
    }
}

/// Counts a writer as waiting until it is granted or its wait is abandoned
struct WaitingWriter<'a> {
    lock: &'a PathLock,
    granted: bool,
}

impl<'a> WaitingWriter<'a> {
    fn register(lock: &'a PathLock) -> Self {
        lock.state.lock().waiting_writers += 1;
        Self {
            lock,
            granted: false,
        }
    }
}

impl Drop for WaitingWriter<'_> {
    fn drop(&mut self) {
        if !self.granted {
            self.lock.state.lock().waiting_writers -= 1;
            self.lock.notify.notify_waiters();
        }
    }
}

/// Lazily populated map from path to lock
#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<Path, Arc<PathLock>>>,
}

impl LockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&self, path: &Path) -> Arc<PathLock> {
        Arc::clone(self.locks.lock().entry(path.clone()).or_default())
    }

    fn get(&self, path: &Path) -> Option<Arc<PathLock>> {
        self.locks.lock().get(path).cloned()
    }

    /// Number of paths that have a lock
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock `path` and its ancestors
    ///
    /// The returned guard releases the chain when dropped, including when
    /// the acquisition is abandoned part way.
    pub async fn lock(&self, path: &Path, exclusive: bool) -> ChainGuard {
        let chain = path.chain();
        let last = chain.len() - 1;
        let mut guard = ChainGuard {
            path: path.clone(),
            held: Vec::with_capacity(chain.len()),
            exclusive,
            detached: false,
        };
        for (i, member) in chain.iter().enumerate() {
            let lock = self.get_or_create(member);
            let write = exclusive && i == last;
            if write {
                lock.write().await;
            } else {
                lock.read().await;
            }
            guard.held.push((lock, write));
        }
        guard
    }

    /// Release a chain locked earlier and detached from its guard
    pub fn unlock(&self, path: &Path, exclusive: bool) -> Result<(), LockError> {
        let chain = path.chain();
        let last = chain.len() - 1;
        let mut locks = Vec::with_capacity(chain.len());
        for (i, member) in chain.iter().enumerate() {
            let write = exclusive && i == last;
            let lock = self
                .get(member)
                .filter(|lock| lock.holds(write))
                .ok_or_else(|| not_held(member, write))?;
            locks.push((lock, write));
        }
        for (lock, write) in locks {
            release(&lock, write);
        }
        Ok(())
    }
}

fn not_held(path: &Path, write: bool) -> LockError {
    if write {
        LockError::ExclusiveNotHeld(path.clone())
    } else {
        LockError::SharedNotHeld(path.clone())
    }
}

fn release(lock: &PathLock, write: bool) {
    if write {
        lock.release_write();
    } else {
        lock.release_read();
    }
}

/// Locks held on a path chain
#[derive(Debug)]
pub struct ChainGuard {
    path: Path,
    held: Vec<(Arc<PathLock>, bool)>,
    exclusive: bool,
    detached: bool,
}

impl ChainGuard {
    #[must_use]
    pub const fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Keep the chain locked after the guard is gone; it must then be
    /// released with [`LockTable::unlock`]
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for ChainGuard {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        for (lock, write) in &self.held {
            release(lock, *write);
        }
    }
}
