//! rmifs Common - Shared types and configuration
//!
//! This crate provides the file-service path type, the application error
//! type carried by every file-service interface, and the configuration
//! structures read by the naming and storage servers.

pub mod config;
pub mod error;
pub mod hooks;
pub mod path;

pub use config::Config;
pub use error::{FsError, Result};
pub use hooks::LogHooks;
pub use path::{Path, PathError};
