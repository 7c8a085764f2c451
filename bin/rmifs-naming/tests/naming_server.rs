//! Naming server tests against in-memory storage servers over loopback

use bytes::Bytes;
use parking_lot::Mutex;
use rmifs_common::config::{NamingConfig, ReplicationConfig};
use rmifs_common::{FsError, Path};
use rmifs_naming::NamingServer;
use rmifs_proto::{
    Command, CommandStub, Registration, Service, ServiceStub, Storage, StorageStub,
};
use rmifs_rmi::{RmiConfig, Skeleton, Stub, async_trait};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn p(s: &str) -> Path {
    Path::parse(s).unwrap()
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Storage server keeping its files in memory
#[derive(Default)]
struct MemoryStorage {
    files: Mutex<BTreeMap<Path, Vec<u8>>>,
}

impl MemoryStorage {
    fn holds(&self, path: &Path) -> bool {
        self.files.lock().contains_key(path)
    }

    fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn size(&self, file: Path) -> Result<u64, FsError> {
        self.files
            .lock()
            .get(&file)
            .map(|data| data.len() as u64)
            .ok_or_else(|| FsError::not_found(&file))
    }

    async fn read(&self, file: Path, offset: u64, length: u32) -> Result<Bytes, FsError> {
        let files = self.files.lock();
        let data = files.get(&file).ok_or_else(|| FsError::not_found(&file))?;
        let start = usize::try_from(offset).unwrap();
        let end = start + length as usize;
        if end > data.len() {
            return Err(FsError::IndexOutOfBounds(format!("{start}..{end}")));
        }
        Ok(Bytes::copy_from_slice(&data[start..end]))
    }

    async fn write(&self, file: Path, offset: u64, data: Bytes) -> Result<(), FsError> {
        let mut files = self.files.lock();
        let contents = files.get_mut(&file).ok_or_else(|| FsError::not_found(&file))?;
        let start = usize::try_from(offset).unwrap();
        if contents.len() < start + data.len() {
            contents.resize(start + data.len(), 0);
        }
        contents[start..start + data.len()].copy_from_slice(&data);
        Ok(())
    }
}

#[async_trait]
impl Command for MemoryStorage {
    async fn create(&self, file: Path) -> Result<bool, FsError> {
        let mut files = self.files.lock();
        if files.contains_key(&file) {
            return Ok(false);
        }
        files.insert(file, Vec::new());
        Ok(true)
    }

    async fn delete(&self, path: Path) -> Result<bool, FsError> {
        let mut files = self.files.lock();
        let before = files.len();
        files.retain(|file, _| !file.is_subpath(&path));
        Ok(files.len() < before)
    }

    async fn copy(&self, file: Path, server: StorageStub) -> Result<bool, FsError> {
        let size = server.size(file.clone()).await?;
        let data = server.read(file.clone(), 0, u32::try_from(size).unwrap()).await?;
        self.files.lock().insert(file, data.to_vec());
        Ok(true)
    }
}

struct StorageNode {
    target: Arc<MemoryStorage>,
    storage: Skeleton<dyn Storage>,
    command: Skeleton<dyn Command>,
}

impl StorageNode {
    async fn start(files: &[&str]) -> Self {
        let target = Arc::new(MemoryStorage::default());
        for file in files {
            target.files.lock().insert(p(file), file.as_bytes().to_vec());
        }

        let storage_target: Arc<dyn Storage> = target.clone();
        let storage = Skeleton::bound_to(storage_target, loopback()).unwrap();
        storage.start().await.unwrap();

        let command_target: Arc<dyn Command> = target.clone();
        let command = Skeleton::bound_to(command_target, loopback()).unwrap();
        command.start().await.unwrap();

        Self {
            target,
            storage,
            command,
        }
    }

    fn storage_stub(&self) -> StorageStub {
        Stub::from_skeleton(&self.storage).unwrap()
    }

    fn command_stub(&self) -> CommandStub {
        Stub::from_skeleton(&self.command).unwrap()
    }

    /// Register with the naming server offering every file held
    async fn register(&self, server: &NamingServer) -> Result<Vec<Path>, FsError> {
        let files: Vec<Path> = self.target.files.lock().keys().cloned().collect();
        server
            .registration_stub()
            .unwrap()
            .register(self.storage_stub(), self.command_stub(), files)
            .await
    }

    async fn stop(&self) {
        self.storage.stop().await;
        self.command.stop().await;
    }
}

async fn naming_server(enabled: bool) -> NamingServer {
    let config = NamingConfig {
        host: "127.0.0.1".to_string(),
        service_port: 0,
        registration_port: 0,
        replication: ReplicationConfig {
            enabled,
            ..ReplicationConfig::default()
        },
    };
    let server = NamingServer::new(&config, &RmiConfig::default()).unwrap();
    server.start().await.unwrap();
    server
}

/// Poll `check` until it holds or five seconds pass
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_registration_reports_duplicates() {
    let server = naming_server(false).await;
    let s1 = StorageNode::start(&["/a", "/b"]).await;
    let s2 = StorageNode::start(&["/a", "/c"]).await;

    assert!(s1.register(&server).await.unwrap().is_empty());
    assert_eq!(s2.register(&server).await.unwrap(), vec![p("/a")]);

    let namespace = server.namespace();
    let s1_stub = s1.storage_stub();
    let s2_stub = s2.storage_stub();
    let storages = |path: &str| -> Vec<StorageStub> {
        namespace
            .replicas(&p(path))
            .unwrap()
            .into_iter()
            .map(|replica| replica.storage)
            .collect()
    };
    assert_eq!(storages("/a"), vec![s1_stub.clone()]);
    assert_eq!(storages("/b"), vec![s1_stub]);
    assert_eq!(storages("/c"), vec![s2_stub]);

    // The same stub pair may not register twice
    let err = s1.register(&server).await.unwrap_err();
    assert!(matches!(err, FsError::IllegalState(_)));

    server.stop().await;
    s1.stop().await;
    s2.stop().await;
}

#[tokio::test]
async fn test_create_list_delete() {
    let server = naming_server(false).await;
    let s1 = StorageNode::start(&[]).await;
    s1.register(&server).await.unwrap();
    let service: ServiceStub = server.service_stub().unwrap();

    assert!(service.create_file(p("/x")).await.unwrap());
    assert!(!service.create_file(p("/x")).await.unwrap());
    assert!(s1.target.holds(&p("/x")));
    assert!(service.list(Path::root()).await.unwrap().contains(&"x".to_string()));
    assert_eq!(service.get_storage(p("/x")).await.unwrap(), s1.storage_stub());

    assert!(service.create_directory(p("/d")).await.unwrap());
    assert!(service.is_directory(p("/d")).await.unwrap());
    assert!(!service.is_directory(p("/x")).await.unwrap());
    assert!(service.create_file(p("/d/y")).await.unwrap());
    assert!(service.create_file(p("/nope/y")).await.unwrap_err().is_not_found());
    assert!(service.list(p("/x")).await.unwrap_err().is_not_found());

    assert!(service.delete(p("/x")).await.unwrap());
    assert!(!service.list(Path::root()).await.unwrap().contains(&"x".to_string()));
    assert!(!s1.target.holds(&p("/x")));
    assert!(service.delete(p("/x")).await.unwrap_err().is_not_found());

    // Deleting a directory reaches every registered server
    assert!(service.delete(p("/d")).await.unwrap());
    assert!(!s1.target.holds(&p("/d/y")));
    assert!(service.list(Path::root()).await.unwrap().is_empty());

    server.stop().await;
    s1.stop().await;
}

#[tokio::test]
async fn test_lock_errors_over_the_wire() {
    let server = naming_server(false).await;
    let s1 = StorageNode::start(&["/a/f"]).await;
    s1.register(&server).await.unwrap();
    let service = server.service_stub().unwrap();

    assert!(service.lock(p("/missing"), false).await.unwrap_err().is_not_found());
    service.lock(p("/a/f"), false).await.unwrap();
    assert!(matches!(
        service.unlock(p("/a/f"), true).await,
        Err(FsError::IllegalState(_))
    ));
    service.unlock(p("/a/f"), false).await.unwrap();
    assert!(matches!(
        service.unlock(p("/missing"), false).await,
        Err(FsError::IllegalArgument(_))
    ));

    server.stop().await;
    s1.stop().await;
}

#[tokio::test]
async fn test_opposite_order_locking_completes() {
    let server = naming_server(false).await;
    let s1 = StorageNode::start(&["/a/b"]).await;
    s1.register(&server).await.unwrap();

    let mut tasks = Vec::new();
    for reversed in [false, true] {
        let service = server.service_stub().unwrap();
        tasks.push(tokio::spawn(async move {
            let order = if reversed {
                [p("/a"), p("/a/b")]
            } else {
                [p("/a/b"), p("/a")]
            };
            for _ in 0..25 {
                for path in &order {
                    service.lock(path.clone(), true).await.unwrap();
                    service.unlock(path.clone(), true).await.unwrap();
                }
            }
        }));
    }
    for task in tasks {
        tokio::time::timeout(Duration::from_secs(20), task)
            .await
            .unwrap()
            .unwrap();
    }

    server.stop().await;
    s1.stop().await;
}

#[tokio::test]
async fn test_read_pressure_replicates_and_write_prunes() {
    let server = naming_server(true).await;
    let s1 = StorageNode::start(&["/f"]).await;
    let s2 = StorageNode::start(&[]).await;
    s1.register(&server).await.unwrap();
    s2.register(&server).await.unwrap();
    let service = server.service_stub().unwrap();
    let namespace = Arc::clone(server.namespace());

    for _ in 0..3 {
        service.lock(p("/f"), false).await.unwrap();
        service.unlock(p("/f"), false).await.unwrap();
    }
    assert!(eventually(|| namespace.replicas(&p("/f")).is_some_and(|r| r.len() == 2)).await);
    assert_eq!(s2.target.contents(&p("/f")), Some(b"/f".to_vec()));

    // Either replica may now serve the file
    let s2_stub = s2.storage_stub();
    let mut served_by_s2 = false;
    for _ in 0..200 {
        if service.get_storage(p("/f")).await.unwrap() == s2_stub {
            served_by_s2 = true;
            break;
        }
    }
    assert!(served_by_s2);

    // A writer shrinks the file to one replica right away; the dropped copy
    // goes once the writer is done
    service.lock(p("/f"), true).await.unwrap();
    let kept = namespace.replicas(&p("/f")).unwrap();
    assert_eq!(kept.len(), 1);
    service.unlock(p("/f"), true).await.unwrap();

    let victim = if kept[0].storage == s2_stub { &s1 } else { &s2 };
    assert!(eventually(|| !victim.target.holds(&p("/f"))).await);

    server.stop().await;
    s1.stop().await;
    s2.stop().await;
}

#[tokio::test]
async fn test_replication_disabled() {
    let server = naming_server(false).await;
    let s1 = StorageNode::start(&["/f"]).await;
    let s2 = StorageNode::start(&[]).await;
    s1.register(&server).await.unwrap();
    s2.register(&server).await.unwrap();
    let service = server.service_stub().unwrap();

    for _ in 0..4 {
        service.lock(p("/f"), false).await.unwrap();
        service.unlock(p("/f"), false).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.namespace().replicas(&p("/f")).unwrap().len(), 1);
    assert!(!s2.target.holds(&p("/f")));

    server.stop().await;
    s1.stop().await;
    s2.stop().await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let server = naming_server(false).await;
    let service = server.service_stub().unwrap();
    assert!(service.is_directory(Path::root()).await.unwrap());

    server.stop().await;
    server.stop().await;
    assert!(service.is_directory(Path::root()).await.unwrap_err().is_rmi());
}
