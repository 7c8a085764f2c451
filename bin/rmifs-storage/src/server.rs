//! Storage server remote interfaces and lifecycle

use crate::files::LocalFiles;
use async_trait::async_trait;
use bytes::Bytes;
use rmifs_common::config::StorageConfig;
use rmifs_common::{FsError, LogHooks, Path, Result};
use rmifs_proto::storage::MAX_READ_LENGTH;
use rmifs_proto::{Command, CommandStub, Registration, Storage, StorageStub};
use rmifs_rmi::{RmiConfig, RmiError, Skeleton, Stub};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info};

/// Target object of both storage server skeletons
pub struct StorageService {
    files: LocalFiles,
    copy_chunk_size: u32,
}

impl StorageService {
    pub fn new(files: LocalFiles, copy_chunk_size: u32) -> Self {
        Self {
            files,
            copy_chunk_size: copy_chunk_size.clamp(1, MAX_READ_LENGTH),
        }
    }

    pub const fn files(&self) -> &LocalFiles {
        &self.files
    }
}

#[async_trait]
impl Storage for StorageService {
    async fn size(&self, file: Path) -> Result<u64> {
        self.files.size(&file)
    }

    async fn read(&self, file: Path, offset: u64, length: u32) -> Result<Bytes> {
        if length > MAX_READ_LENGTH {
            return Err(FsError::illegal_argument(format!(
                "read of {length} bytes exceeds the limit of {MAX_READ_LENGTH}"
            )));
        }
        self.files.read(&file, offset, length)
    }

    async fn write(&self, file: Path, offset: u64, data: Bytes) -> Result<()> {
        self.files.write(&file, offset, &data)
    }
}

#[async_trait]
impl Command for StorageService {
    async fn create(&self, file: Path) -> Result<bool> {
        Ok(self.files.create(&file))
    }

    async fn delete(&self, path: Path) -> Result<bool> {
        Ok(self.files.delete(&path))
    }

    /// Pull `file` from `server` chunk by chunk
    ///
    /// The bytes land in a staging file that replaces the local copy only
    /// once complete, so a failed pull leaves the previous copy untouched.
    /// The local lock is only held for each local step, never across a call
    /// to the source server.
    async fn copy(&self, file: Path, server: StorageStub) -> Result<bool> {
        if file.is_root() {
            return Ok(false);
        }
        let size = server.size(file.clone()).await?;
        let staged = self.files.stage()?;

        match self.pull(&file, &staged, size, &server).await {
            Ok(()) => {
                if let Err(e) = self.files.commit(&staged, &file) {
                    self.files.delete(&staged);
                    return Err(e);
                }
            }
            Err(e) => {
                self.files.delete(&staged);
                return Err(e);
            }
        }

        debug!("Copied {} ({} bytes) from {}", file, size, server.handle());
        Ok(true)
    }
}

impl StorageService {
    async fn pull(&self, file: &Path, staged: &Path, size: u64, server: &StorageStub) -> Result<()> {
        let mut offset = 0;
        while offset < size {
            let length = u32::try_from(size - offset)
                .unwrap_or(u32::MAX)
                .min(self.copy_chunk_size);
            let data = server.read(file.clone(), offset, length).await?;
            self.files.write(staged, offset, &data)?;
            offset += u64::from(length);
        }
        Ok(())
    }
}

/// Storage server: local files served on the client and command ports
pub struct StorageServer {
    service: Arc<StorageService>,
    storage: Skeleton<dyn Storage>,
    command: Skeleton<dyn Command>,
}

impl StorageServer {
    pub fn new(config: &StorageConfig, rmi: &RmiConfig) -> Result<Self> {
        let host: IpAddr = rmi.bind_host.parse().map_err(|_| {
            FsError::from(RmiError::InvalidArgument(format!(
                "invalid bind host: {}",
                rmi.bind_host
            )))
        })?;

        let service = Arc::new(StorageService::new(
            LocalFiles::new(&config.root),
            config.copy_chunk_size,
        ));

        let storage_target: Arc<dyn Storage> = service.clone();
        let storage = Skeleton::bound_to(storage_target, SocketAddr::new(host, config.client_port))?
            .with_hooks(Arc::new(LogHooks::new("storage")))
            .with_config(rmi.clone());

        let command_target: Arc<dyn Command> = service.clone();
        let command = Skeleton::bound_to(command_target, SocketAddr::new(host, config.command_port))?
            .with_hooks(Arc::new(LogHooks::new("command")))
            .with_config(rmi.clone());

        Ok(Self {
            service,
            storage,
            command,
        })
    }

    /// Start serving and register with the naming server
    ///
    /// Files the naming server already knows from another storage server
    /// are deleted locally, together with directories left empty. The stubs
    /// handed to the naming server carry `hostname`.
    pub async fn start(&self, hostname: &str, naming: &dyn Registration) -> Result<()> {
        let files = self.service.files();
        files.check_root()?;

        self.storage.start().await?;
        if let Err(e) = self.command.start().await {
            self.storage.stop().await;
            return Err(e.into());
        }

        let storage_stub: StorageStub = Stub::from_skeleton_with_hostname(&self.storage, hostname)?;
        let command_stub: CommandStub = Stub::from_skeleton_with_hostname(&self.command, hostname)?;

        let offered = files.list()?;
        let offered_count = offered.len();
        let duplicates = naming.register(storage_stub, command_stub, offered).await?;
        for duplicate in &duplicates {
            files.delete(duplicate);
        }
        files.prune_empty_dirs();

        info!(
            "Storage server for {} registered as {} ({} files offered, {} duplicates removed)",
            files.root().display(),
            hostname,
            offered_count,
            duplicates.len()
        );
        Ok(())
    }

    /// Stop both interfaces
    pub async fn stop(&self) {
        self.storage.stop().await;
        self.command.stop().await;
    }

    pub fn storage_address(&self) -> Option<SocketAddr> {
        self.storage.address()
    }

    pub fn command_address(&self) -> Option<SocketAddr> {
        self.command.address()
    }

    pub fn files(&self) -> &LocalFiles {
        self.service.files()
    }
}
