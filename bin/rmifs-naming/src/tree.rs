//! Directory tree
//!
//! Every node is either a directory or a file for its whole life. A file
//! node holds the storage servers hosting its bytes and is never left
//! without one.

use rmifs_common::{FsError, Path};
use rmifs_proto::{CommandStub, StorageStub};
use std::collections::BTreeMap;

/// One storage server hosting a file
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Replica {
    /// Client-facing interface of the storage server
    pub storage: StorageStub,
    /// Command interface used by the naming server
    pub command: CommandStub,
}

impl Replica {
    pub const fn new(storage: StorageStub, command: CommandStub) -> Self {
        Self { storage, command }
    }
}

/// Node of the directory tree
#[derive(Debug)]
pub enum Node {
    Directory(BTreeMap<String, Node>),
    File(Vec<Replica>),
}

impl Node {
    /// Empty directory
    #[must_use]
    pub const fn directory() -> Self {
        Self::Directory(BTreeMap::new())
    }

    /// File hosted on one storage server
    #[must_use]
    pub fn file(replica: Replica) -> Self {
        Self::File(vec![replica])
    }

    #[must_use]
    pub const fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    /// Node at `path` below this one
    pub fn get(&self, path: &Path) -> Option<&Self> {
        path.components().try_fold(self, |node, name| match node {
            Self::Directory(children) => children.get(name),
            Self::File(_) => None,
        })
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Self> {
        path.components().try_fold(self, |node, name| match node {
            Self::Directory(children) => children.get_mut(name),
            Self::File(_) => None,
        })
    }

    /// Names of a directory's children, in order
    #[must_use]
    pub fn children(&self) -> Option<Vec<String>> {
        match self {
            Self::Directory(children) => Some(children.keys().cloned().collect()),
            Self::File(_) => None,
        }
    }

    /// Storage servers hosting a file
    #[must_use]
    pub fn replicas(&self) -> Option<&[Replica]> {
        match self {
            Self::File(replicas) => Some(replicas),
            Self::Directory(_) => None,
        }
    }

    /// Add `node` at `path`
    ///
    /// Returns `false` when the path is the root or already exists, and
    /// fails with not-found when the parent is missing or is a file.
    pub fn insert(&mut self, path: &Path, node: Self) -> Result<bool, FsError> {
        let (Some(parent), Some(name)) = (path.parent(), path.last()) else {
            return Ok(false);
        };
        match self.get_mut(&parent) {
            Some(Self::Directory(children)) => {
                if children.contains_key(name) {
                    return Ok(false);
                }
                children.insert(name.to_string(), node);
                Ok(true)
            }
            _ => Err(FsError::not_found(&parent)),
        }
    }

    /// Detach the node at `path` from its parent
    pub fn remove(&mut self, path: &Path) -> Option<Self> {
        let parent = path.parent()?;
        let name = path.last()?;
        match self.get_mut(&parent)? {
            Self::Directory(children) => children.remove(name),
            Self::File(_) => None,
        }
    }

    /// Bind a newly registered file, creating missing ancestor directories
    ///
    /// Returns `false` without changing the tree when the file's position is
    /// already occupied: the file itself exists, or an ancestor is a file.
    pub fn graft(&mut self, path: &Path, replica: Replica) -> bool {
        let components: Vec<&str> = path.components().collect();
        if components.is_empty() {
            return false;
        }
        graft_at(self, &components, replica)
    }

    /// Every file at or below this node, with `base` as this node's path
    #[must_use]
    pub fn files(&self, base: &Path) -> Vec<Path> {
        let mut out = Vec::new();
        collect_files(self, base, &mut out);
        out
    }
}

fn graft_at(node: &mut Node, components: &[&str], replica: Replica) -> bool {
    let Node::Directory(children) = node else {
        return false;
    };
    let Some((first, rest)) = components.split_first() else {
        return false;
    };
    if rest.is_empty() {
        if children.contains_key(*first) {
            return false;
        }
        children.insert((*first).to_string(), Node::file(replica));
        return true;
    }
    match children.get_mut(*first) {
        Some(child) => graft_at(child, rest, replica),
        None => {
            let mut directory = Node::directory();
            let grafted = graft_at(&mut directory, rest, replica);
            children.insert((*first).to_string(), directory);
            grafted
        }
    }
}

fn collect_files(node: &Node, path: &Path, out: &mut Vec<Path>) {
    match node {
        Node::File(_) => out.push(path.clone()),
        Node::Directory(children) => {
            for (name, child) in children {
                if let Ok(child_path) = path.child(name) {
                    collect_files(child, &child_path, out);
                }
            }
        }
    }
}
