//! File-service paths
//!
//! A [`Path`] is an absolute, slash-separated sequence of components. Paths
//! order component by component, so every ancestor sorts before its
//! descendants.

use rmifs_rmi::{RmiError, Value, Wire};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

/// Absolute path in the distributed namespace
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path {
    components: Vec<String>,
}

/// Errors that can occur when building a path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path must start with '/': {0:?}")]
    NotAbsolute(String),
    #[error("invalid path component: {0:?}")]
    InvalidComponent(String),
}

fn is_valid_component(name: &str) -> bool {
    !matches!(name, "" | "." | "..")
}

impl Path {
    /// The root directory
    #[must_use]
    pub const fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse an absolute path; empty components are ignored
    ///
    /// `.` and `..` are rejected, so a path never escapes the directory it
    /// is resolved against.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let Some(rest) = s.strip_prefix('/') else {
            return Err(PathError::NotAbsolute(s.to_string()));
        };
        if s.contains(':') {
            return Err(PathError::InvalidComponent(s.to_string()));
        }
        let components = rest
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| {
                if is_valid_component(c) {
                    Ok(c.to_string())
                } else {
                    Err(PathError::InvalidComponent(c.to_string()))
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { components })
    }

    /// Path of the child `name` of this directory
    pub fn child(&self, name: &str) -> Result<Self, PathError> {
        if name.contains('/') || name.contains(':') || !is_valid_component(name) {
            return Err(PathError::InvalidComponent(name.to_string()));
        }
        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(Self { components })
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Parent directory, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.components.split_last()?;
        Some(Self {
            components: init.to_vec(),
        })
    }

    /// Final component, `None` for the root
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    /// Whether `self` is `other` or lies beneath it
    #[must_use]
    pub fn is_subpath(&self, other: &Self) -> bool {
        self.components.starts_with(&other.components)
    }

    /// The root, every intermediate directory and `self`, in sorted order
    #[must_use]
    pub fn chain(&self) -> Vec<Self> {
        (0..=self.components.len())
            .map(|n| Self {
                components: self.components[..n].to_vec(),
            })
            .collect()
    }

    /// Location of this path under a local directory
    #[must_use]
    pub fn to_local(&self, root: &std::path::Path) -> PathBuf {
        let mut local = root.to_path_buf();
        local.extend(&self.components);
        local
    }

    /// Every regular file beneath a local directory, as paths relative to it
    pub fn list(root: &std::path::Path) -> io::Result<Vec<Self>> {
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            ));
        }
        let mut files = Vec::new();
        collect_files(root, &Self::root(), &mut files)?;
        files.sort();
        Ok(files)
    }
}

fn collect_files(dir: &std::path::Path, prefix: &Path, out: &mut Vec<Path>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Ok(path) = prefix.child(name) else {
            continue;
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), &path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

impl Wire for Path {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("Path")
    }

    fn into_value(self) -> Value {
        Value::Path(self.to_string())
    }

    fn from_value(value: Value) -> Result<Self, RmiError> {
        match value {
            Value::Path(s) => Self::parse(&s).map_err(|e| RmiError::protocol(e.to_string())),
            other => Err(other.mismatch("path")),
        }
    }
}
