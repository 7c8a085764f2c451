//! rmifs Protocol - remote interface definitions
//!
//! This crate declares the remote interfaces shared by clients, the naming
//! server and storage servers.

/// Naming server interfaces (client service and storage registration)
pub mod naming;

/// Storage server interfaces (client data access and naming server commands)
pub mod storage;

pub use naming::{Registration, RegistrationStub, Service, ServiceStub};
pub use storage::{Command, CommandStub, Storage, StorageStub};
