//! rmifs storage server
//!
//! Serves the files under one local directory: clients read and write them
//! through the storage interface, and the naming server creates, deletes
//! and replicates them through the command interface.

pub mod files;
pub mod server;

pub use files::LocalFiles;
pub use server::{StorageServer, StorageService};
