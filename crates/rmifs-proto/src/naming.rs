use crate::storage::{CommandStub, StorageStub};
use rmifs_common::config::{DEFAULT_REGISTRATION_PORT, DEFAULT_SERVICE_PORT};
use rmifs_common::{FsError, Path};
use rmifs_rmi::{RmiError, Stub, remote_interface};

/// Well-known port of the naming server's service interface
pub const SERVICE_PORT: u16 = DEFAULT_SERVICE_PORT;

/// Well-known port of the naming server's registration interface
pub const REGISTRATION_PORT: u16 = DEFAULT_REGISTRATION_PORT;

remote_interface! {
    /// Client-facing interface of the naming server
    ///
    /// Clients lock a path before using it: shared to read a file or list a
    /// directory, exclusive to write or delete. Locking a path also locks
    /// every ancestor for shared access.
    pub trait Service {
        type Error = FsError;

        /// Lock `path`; blocks until granted. Fails with not-found when the
        /// path does not exist
        fn lock(&self, path: Path, exclusive: bool) -> ();

        /// Release a lock taken with [`Service::lock`]. Fails with illegal
        /// argument when the path does not exist and with illegal state
        /// when no such lock is held
        fn unlock(&self, path: Path, exclusive: bool) -> ();

        fn is_directory(&self, path: Path) -> bool;

        /// Names of the children of a directory
        fn list(&self, directory: Path) -> Vec<String>;

        /// Create an empty file on one storage server; `false` when the path
        /// already exists
        fn create_file(&self, file: Path) -> bool;

        fn create_directory(&self, directory: Path) -> bool;

        /// Delete a file or directory on every storage server holding it
        fn delete(&self, path: Path) -> bool;

        /// Stub for one storage server holding `file`
        fn get_storage(&self, file: Path) -> StorageStub;
    }
}

remote_interface! {
    /// Interface storage servers use to join the file service
    pub trait Registration {
        type Error = FsError;

        /// Register a storage server and the files it holds; returns the
        /// offered files the naming server already knows about, which the
        /// storage server should delete
        fn register(
            &self,
            client_stub: StorageStub,
            command_stub: CommandStub,
            files: Vec<Path>,
        ) -> Vec<Path>;
    }
}

/// Stub for the naming server's service interface
pub type ServiceStub = Stub<dyn Service>;

/// Stub for the naming server's registration interface
pub type RegistrationStub = Stub<dyn Registration>;

/// Stub for the service interface of the naming server on `host`
pub fn service_stub(host: &str) -> Result<ServiceStub, RmiError> {
    Stub::connect_to(host, SERVICE_PORT)
}

/// Stub for the registration interface of the naming server on `host`
pub fn registration_stub(host: &str) -> Result<RegistrationStub, RmiError> {
    Stub::connect_to(host, REGISTRATION_PORT)
}
