use bytes::Bytes;
use rmifs_common::{FsError, Path};
use rmifs_rmi::{Stub, remote_interface};

/// Largest `length` a single [`Storage::read`] accepts
///
/// Keeps every response well inside the substrate's frame limit; larger
/// reads must be split by the caller.
pub const MAX_READ_LENGTH: u32 = 16 * 1024 * 1024;

remote_interface! {
    /// Client-facing interface of a storage server
    pub trait Storage {
        type Error = FsError;

        /// Length of a file in bytes; fails with not-found for a missing
        /// file or a directory
        fn size(&self, file: Path) -> u64;

        /// Read `length` bytes starting at `offset`; fails with
        /// index-out-of-bounds when the range does not lie inside the file
        /// and with illegal argument when `length` exceeds
        /// [`MAX_READ_LENGTH`]
        fn read(&self, file: Path, offset: u64, length: u32) -> Bytes;

        /// Write `data` at `offset`, extending the file as needed
        fn write(&self, file: Path, offset: u64, data: Bytes) -> ();
    }
}

remote_interface! {
    /// Interface through which the naming server manages a storage server
    pub trait Command {
        type Error = FsError;

        /// Create an empty file, creating missing parent directories;
        /// `false` when the file exists or is the root
        fn create(&self, file: Path) -> bool;

        /// Delete a file or directory tree; `false` when it does not exist
        /// or is the root
        fn delete(&self, path: Path) -> bool;

        /// Pull `file` from another storage server, replacing any local copy
        fn copy(&self, file: Path, server: StorageStub) -> bool;
    }
}

/// Stub for a storage server's client interface
pub type StorageStub = Stub<dyn Storage>;

/// Stub for a storage server's command interface
pub type CommandStub = Stub<dyn Command>;
