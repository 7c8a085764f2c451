//! Lazy replication and pruning
//!
//! Shared locks on a file feed an access counter; when it reaches the read
//! threshold a background task copies the file to one more storage server.
//! An exclusive lock on a replicated file shrinks its replica set to a single
//! keeper and a background task deletes the dropped copies once the writer
//! is done. Both tasks are best effort: failures are logged and never reach
//! the client whose lock triggered them.

use crate::namespace::Namespace;
use crate::tree::Replica;
use parking_lot::Mutex;
use rmifs_common::Path;
use rmifs_proto::Command;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared lock acquisitions per file since the last replication
#[derive(Debug, Default)]
pub struct AccessCounters {
    counts: Mutex<HashMap<Path, u64>>,
}

impl AccessCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one acquisition and return the new total
    pub fn increment(&self, path: &Path) -> u64 {
        let mut counts = self.counts.lock();
        let count = counts.entry(path.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn reset(&self, path: &Path) {
        if let Some(count) = self.counts.lock().get_mut(path) {
            *count = 0;
        }
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> u64 {
        self.counts.lock().get(path).copied().unwrap_or(0)
    }

    /// Drop the counters of `path` and everything below it
    pub fn remove_under(&self, path: &Path) {
        self.counts.lock().retain(|counted, _| !counted.is_subpath(path));
    }
}

/// Copy `path` to one registered storage server that does not hold it yet
pub async fn replicate(namespace: Arc<Namespace>, path: Path) {
    let _guard = namespace.locks().lock(&path, false).await;

    let Some((source, target)) = namespace.pick_copy(&path) else {
        debug!("No storage server available to replicate {}", path);
        return;
    };

    match target.command.copy(path.clone(), source.storage.clone()).await {
        Ok(true) => {
            namespace.add_replica(&path, target.clone());
            namespace.counters().reset(&path);
            info!(
                "Replicated {} from {} to {}",
                path,
                source.storage.handle(),
                target.storage.handle()
            );
        }
        Ok(false) => debug!("Storage server {} refused copy of {}", target.command.handle(), path),
        Err(e) => warn!("Replication of {} to {} failed: {}", path, target.command.handle(), e),
    }
}

/// Delete the copies of `path` dropped from its replica set
///
/// Runs under an exclusive lock, so it starts only once the writer that
/// caused the pruning has unlocked.
pub async fn prune(namespace: Arc<Namespace>, path: Path, victims: Vec<Replica>) {
    let _guard = namespace.locks().lock(&path, true).await;

    let current = match namespace.node_replicas(&path) {
        Some(Some(replicas)) => replicas,
        // Deleted since; the dropped copies are stale either way
        None => Vec::new(),
        // Replaced by a directory, which the victims may now hold too
        Some(None) => return,
    };

    for victim in victims.iter().filter(|victim| !current.contains(victim)) {
        match victim.command.delete(path.clone()).await {
            Ok(true) => debug!("Pruned {} from {}", path, victim.command.handle()),
            Ok(false) => debug!("{} already gone from {}", path, victim.command.handle()),
            Err(e) => warn!("Pruning {} from {} failed: {}", path, victim.command.handle(), e),
        }
    }
}
