//! Naming server state and operations
//!
//! The tree, the lock table, the access counters and the registry of
//! storage servers each sit behind their own synchronization boundary.
//! Structural changes at a path happen while holding the exclusive path lock
//! on it or on its parent; the tree's own `RwLock` is only ever held for the
//! duration of one in-memory lookup or mutation, never across a remote call.

use crate::lock::{ChainGuard, LockError, LockTable};
use crate::replication::{self, AccessCounters};
use crate::tree::{Node, Replica};
use futures::future::join_all;
use parking_lot::RwLock;
use rand::Rng;
use rand::seq::SliceRandom;
use rmifs_common::config::ReplicationConfig;
use rmifs_common::{FsError, Path, Result};
use rmifs_proto::{Command, CommandStub, StorageStub};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directory tree with locking, registration and replica management
pub struct Namespace {
    tree: RwLock<Node>,
    locks: LockTable,
    counters: AccessCounters,
    registry: RwLock<Vec<Replica>>,
    policy: ReplicationConfig,
}

impl Namespace {
    /// Empty namespace holding only the root directory
    #[must_use]
    pub fn new(policy: ReplicationConfig) -> Self {
        Self {
            tree: RwLock::new(Node::directory()),
            locks: LockTable::new(),
            counters: AccessCounters::new(),
            registry: RwLock::new(Vec::new()),
            policy,
        }
    }

    pub const fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub const fn counters(&self) -> &AccessCounters {
        &self.counters
    }

    /// Storage servers registered so far
    pub fn registered(&self) -> Vec<Replica> {
        self.registry.read().clone()
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.tree.read().get(path).is_some()
    }

    /// `None` when `path` is missing, `Some(None)` for a directory and the
    /// replica set for a file
    pub fn node_replicas(&self, path: &Path) -> Option<Option<Vec<Replica>>> {
        self.tree
            .read()
            .get(path)
            .map(|node| node.replicas().map(<[Replica]>::to_vec))
    }

    /// Replica set of a file, or `None` for a missing path or a directory
    pub fn replicas(&self, path: &Path) -> Option<Vec<Replica>> {
        self.node_replicas(path).flatten()
    }

    /// Every file in the namespace
    pub fn files(&self) -> Vec<Path> {
        self.tree.read().files(&Path::root())
    }

    /// Lock `path` for a client
    ///
    /// The lock stays held after this returns, until the client calls
    /// [`Namespace::unlock`]. Locking a file drives replication: shared
    /// locks count towards the read threshold and an exclusive lock prunes
    /// the file down to one replica.
    pub async fn lock(self: &Arc<Self>, path: &Path, exclusive: bool) -> Result<()> {
        if !self.exists(path) {
            return Err(FsError::not_found(path));
        }

        let guard = self.locks.lock(path, exclusive).await;
        // Deleted while waiting; dropping the guard releases the chain
        let is_file = match self.node_replicas(path) {
            Some(replicas) => replicas.is_some(),
            None => return Err(FsError::not_found(path)),
        };

        if is_file && self.policy.enabled {
            if exclusive {
                self.schedule_prune(path);
            } else {
                self.record_read(path);
            }
        }

        guard.detach();
        Ok(())
    }

    /// Release a lock taken with [`Namespace::lock`]
    pub fn unlock(&self, path: &Path, exclusive: bool) -> Result<()> {
        if !self.exists(path) {
            return Err(FsError::illegal_argument(format!("no such path: {path}")));
        }
        self.locks
            .unlock(path, exclusive)
            .map_err(|e: LockError| FsError::illegal_state(e.to_string()))
    }

    pub fn is_directory(&self, path: &Path) -> Result<bool> {
        self.tree
            .read()
            .get(path)
            .map(Node::is_directory)
            .ok_or_else(|| FsError::not_found(path))
    }

    /// Names of the children of `directory`
    pub async fn list(&self, directory: &Path) -> Result<Vec<String>> {
        if !self.is_directory(directory)? {
            return Err(FsError::not_found(directory));
        }
        let _guard = self.locks.lock(directory, false).await;
        self.tree
            .read()
            .get(directory)
            .and_then(Node::children)
            .ok_or_else(|| FsError::not_found(directory))
    }

    pub async fn create_directory(&self, directory: &Path) -> Result<bool> {
        let Some(_guard) = self.lock_parent(directory).await? else {
            return Ok(false);
        };
        self.tree.write().insert(directory, Node::directory())
    }

    /// Create an empty file on one randomly chosen storage server
    pub async fn create_file(&self, file: &Path) -> Result<bool> {
        let Some(_guard) = self.lock_parent(file).await? else {
            return Ok(false);
        };

        let replica = {
            let registry = self.registry.read();
            registry.choose(&mut rand::thread_rng()).cloned()
        };
        let Some(replica) = replica else {
            return Err(FsError::illegal_state("no storage servers are registered"));
        };

        if !replica.command.create(file.clone()).await? {
            debug!("{} reported {} as already present", replica.command.handle(), file);
        }
        self.tree.write().insert(file, Node::file(replica))
    }

    /// Exclusively lock the parent of a path about to be created
    ///
    /// `None` when the path is the root or already exists. Fails with
    /// not-found when the parent is missing or is a file.
    async fn lock_parent(&self, path: &Path) -> Result<Option<ChainGuard>> {
        let Some(parent) = path.parent() else {
            return Ok(None);
        };
        self.check_parent(&parent)?;

        let guard = self.locks.lock(&parent, true).await;
        self.check_parent(&parent)?;
        if self.exists(path) {
            return Ok(None);
        }
        Ok(Some(guard))
    }

    fn check_parent(&self, parent: &Path) -> Result<()> {
        match self.tree.read().get(parent) {
            Some(node) if node.is_directory() => Ok(()),
            _ => Err(FsError::not_found(parent)),
        }
    }

    /// Delete a file or directory from the namespace and from every storage
    /// server holding it
    ///
    /// The node is detached even when some storage server cannot be
    /// reached; the returned flag reports whether all of them confirmed.
    pub async fn delete(&self, path: &Path) -> Result<bool> {
        if path.is_root() {
            return Err(FsError::illegal_argument("cannot delete the root directory"));
        }
        if !self.exists(path) {
            return Err(FsError::not_found(path));
        }

        let _guard = self.locks.lock(path, true).await;
        let targets = match self.node_replicas(path) {
            Some(Some(replicas)) => replicas,
            Some(None) => self.registered(),
            None => return Err(FsError::not_found(path)),
        };

        let results = join_all(
            targets
                .iter()
                .map(|replica| replica.command.delete(path.clone())),
        )
        .await;

        let mut confirmed = true;
        for (replica, result) in targets.iter().zip(results) {
            match result {
                Ok(true) => {}
                Ok(false) => {
                    debug!("{} did not hold {}", replica.command.handle(), path);
                    confirmed = false;
                }
                Err(e) => {
                    warn!("Delete of {} on {} failed: {}", path, replica.command.handle(), e);
                    confirmed = false;
                }
            }
        }

        self.tree.write().remove(path);
        self.counters.remove_under(path);
        Ok(confirmed)
    }

    /// Client stub of one randomly chosen storage server holding `file`
    pub fn get_storage(&self, file: &Path) -> Result<StorageStub> {
        let tree = self.tree.read();
        tree.get(file)
            .and_then(Node::replicas)
            .and_then(|replicas| replicas.choose(&mut rand::thread_rng()))
            .map(|replica| replica.storage.clone())
            .ok_or_else(|| FsError::not_found(file))
    }

    /// Add a storage server and bind the offered files it is first to hold
    ///
    /// Returns the offered paths that were already taken.
    pub fn register(
        &self,
        storage: StorageStub,
        command: CommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>> {
        let replica = Replica::new(storage, command);
        {
            let mut registry = self.registry.write();
            if registry.contains(&replica) {
                return Err(FsError::illegal_state(format!(
                    "duplicate registration of {}",
                    replica.storage.handle()
                )));
            }
            registry.push(replica.clone());
        }

        let mut duplicates = Vec::new();
        {
            let mut tree = self.tree.write();
            for file in files.into_iter().filter(|file| !file.is_root()) {
                if !tree.graft(&file, replica.clone()) {
                    duplicates.push(file);
                }
            }
        }

        info!(
            "Registered storage server {} ({} duplicate files)",
            replica.storage.handle(),
            duplicates.len()
        );
        Ok(duplicates)
    }

    fn record_read(self: &Arc<Self>, path: &Path) {
        if self.counters.increment(path) < self.policy.read_threshold {
            return;
        }
        self.counters.reset(path);
        debug!("Scheduling replication of {}", path);
        tokio::spawn(replication::replicate(Arc::clone(self), path.clone()));
    }

    /// Shrink a file written under the caller's exclusive lock to one
    /// replica and schedule deletion of the others
    fn schedule_prune(self: &Arc<Self>, path: &Path) {
        let victims = self.shrink_replicas(path);
        self.counters.reset(path);
        if victims.is_empty() {
            return;
        }
        debug!("Scheduling pruning of {} from {} servers", path, victims.len());
        tokio::spawn(replication::prune(Arc::clone(self), path.clone(), victims));
    }

    fn shrink_replicas(&self, path: &Path) -> Vec<Replica> {
        let mut tree = self.tree.write();
        let Some(Node::File(replicas)) = tree.get_mut(path) else {
            return Vec::new();
        };
        if replicas.len() <= 1 {
            return Vec::new();
        }
        let keeper = replicas.swap_remove(rand::thread_rng().gen_range(0..replicas.len()));
        std::mem::replace(replicas, vec![keeper])
    }

    /// Pick a current holder of `path` to copy from and a registered
    /// storage server that does not hold it yet
    pub(crate) fn pick_copy(&self, path: &Path) -> Option<(Replica, Replica)> {
        let current = self.replicas(path)?;
        let candidates: Vec<Replica> = self
            .registered()
            .into_iter()
            .filter(|replica| !current.contains(replica))
            .collect();

        let mut rng = rand::thread_rng();
        let source = current.choose(&mut rng)?.clone();
        let target = candidates.choose(&mut rng)?.clone();
        Some((source, target))
    }

    pub(crate) fn add_replica(&self, path: &Path, replica: Replica) {
        if let Some(Node::File(replicas)) = self.tree.write().get_mut(path)
            && !replicas.contains(&replica)
        {
            replicas.push(replica);
        }
    }
}
