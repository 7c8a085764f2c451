//! rmifs naming server
//!
//! Owns the directory namespace of the file service: which paths exist,
//! which are directories, and which storage servers hold each file. Clients
//! lock paths and resolve files here; storage servers register here at
//! startup.

pub mod lock;
pub mod namespace;
pub mod replication;
pub mod service;
pub mod tree;

pub use namespace::Namespace;
pub use service::{NamingServer, NamingService};
pub use tree::{Node, Replica};
