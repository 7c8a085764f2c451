//! Configuration types for rmifs
//!
//! Every structure deserializes from TOML with per-field defaults, so a
//! configuration file only needs the settings it changes.

use rmifs_rmi::RmiConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default port of the naming server's client-facing service interface
pub const DEFAULT_SERVICE_PORT: u16 = 6000;

/// Default port of the naming server's registration interface
pub const DEFAULT_REGISTRATION_PORT: u16 = 6001;

/// Root configuration for rmifs processes
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Naming server configuration
    pub naming: NamingConfig,
    /// Storage server configuration
    pub storage: StorageConfig,
    /// Remote call substrate configuration
    pub rmi: RmiConfig,
}

/// Naming server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Host to bind both interfaces on
    pub host: String,
    /// Port of the client-facing service interface
    pub service_port: u16,
    /// Port storage servers register on
    pub registration_port: u16,
    /// Replica management
    pub replication: ReplicationConfig,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            service_port: DEFAULT_SERVICE_PORT,
            registration_port: DEFAULT_REGISTRATION_PORT,
            replication: ReplicationConfig::default(),
        }
    }
}

/// Replication and pruning policy
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Whether shared locks on files schedule replication and exclusive
    /// locks schedule pruning
    pub enabled: bool,
    /// Shared lock acquisitions on a file that trigger a replication
    pub read_threshold: u64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            read_threshold: 2,
        }
    }
}

/// Storage server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Local directory holding the served files
    pub root: PathBuf,
    /// Externally routable hostname put into registered stubs
    pub hostname: String,
    /// Port of the client-facing storage interface (0 = system chosen)
    pub client_port: u16,
    /// Port of the command interface (0 = system chosen)
    pub command_port: u16,
    /// Naming server host to register with
    pub naming_host: String,
    /// Naming server registration port
    pub registration_port: u16,
    /// Bytes pulled per read when copying a file from another server
    pub copy_chunk_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/rmifs"),
            hostname: "127.0.0.1".to_string(),
            client_port: 0,
            command_port: 0,
            naming_host: "127.0.0.1".to_string(),
            registration_port: DEFAULT_REGISTRATION_PORT,
            copy_chunk_size: 1024 * 1024,
        }
    }
}
