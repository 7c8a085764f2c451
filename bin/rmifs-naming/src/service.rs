//! Naming server remote interfaces and lifecycle

use crate::namespace::Namespace;
use async_trait::async_trait;
use rmifs_common::config::NamingConfig;
use rmifs_common::{FsError, LogHooks, Path, Result};
use rmifs_proto::{CommandStub, Registration, RegistrationStub, Service, ServiceStub, StorageStub};
use rmifs_rmi::{RmiConfig, RmiError, Skeleton, Stub};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::info;

/// Target object of both naming server skeletons
pub struct NamingService {
    namespace: Arc<Namespace>,
}

impl NamingService {
    pub const fn new(namespace: Arc<Namespace>) -> Self {
        Self { namespace }
    }
}

#[async_trait]
impl Service for NamingService {
    async fn lock(&self, path: Path, exclusive: bool) -> Result<()> {
        self.namespace.lock(&path, exclusive).await
    }

    async fn unlock(&self, path: Path, exclusive: bool) -> Result<()> {
        self.namespace.unlock(&path, exclusive)
    }

    async fn is_directory(&self, path: Path) -> Result<bool> {
        self.namespace.is_directory(&path)
    }

    async fn list(&self, directory: Path) -> Result<Vec<String>> {
        self.namespace.list(&directory).await
    }

    async fn create_file(&self, file: Path) -> Result<bool> {
        self.namespace.create_file(&file).await
    }

    async fn create_directory(&self, directory: Path) -> Result<bool> {
        self.namespace.create_directory(&directory).await
    }

    async fn delete(&self, path: Path) -> Result<bool> {
        self.namespace.delete(&path).await
    }

    async fn get_storage(&self, file: Path) -> Result<StorageStub> {
        self.namespace.get_storage(&file)
    }
}

#[async_trait]
impl Registration for NamingService {
    async fn register(
        &self,
        client_stub: StorageStub,
        command_stub: CommandStub,
        files: Vec<Path>,
    ) -> Result<Vec<Path>> {
        self.namespace.register(client_stub, command_stub, files)
    }
}

/// Naming server: the namespace served on the service and registration
/// ports
pub struct NamingServer {
    namespace: Arc<Namespace>,
    service: Skeleton<dyn Service>,
    registration: Skeleton<dyn Registration>,
}

impl NamingServer {
    pub fn new(config: &NamingConfig, rmi: &RmiConfig) -> Result<Self> {
        let host: IpAddr = config.host.parse().map_err(|_| {
            FsError::from(RmiError::InvalidArgument(format!(
                "invalid naming server host: {}",
                config.host
            )))
        })?;

        let namespace = Arc::new(Namespace::new(config.replication.clone()));
        let target = Arc::new(NamingService::new(Arc::clone(&namespace)));

        let service_target: Arc<dyn Service> = target.clone();
        let service =
            Skeleton::bound_to(service_target, SocketAddr::new(host, config.service_port))?
                .with_hooks(Arc::new(LogHooks::new("service")))
                .with_config(rmi.clone());

        let registration_target: Arc<dyn Registration> = target;
        let registration = Skeleton::bound_to(
            registration_target,
            SocketAddr::new(host, config.registration_port),
        )?
        .with_hooks(Arc::new(LogHooks::new("registration")))
        .with_config(rmi.clone());

        Ok(Self {
            namespace,
            service,
            registration,
        })
    }

    /// Start both interfaces
    pub async fn start(&self) -> Result<()> {
        self.service.start().await?;
        if let Err(e) = self.registration.start().await {
            self.service.stop().await;
            return Err(e.into());
        }
        info!(
            "Naming server started (service: {:?}, registration: {:?})",
            self.service.address(),
            self.registration.address()
        );
        Ok(())
    }

    /// Stop both interfaces; stopping twice is harmless
    pub async fn stop(&self) {
        self.service.stop().await;
        self.registration.stop().await;
    }

    /// Stub for the service interface, once started
    pub fn service_stub(&self) -> Result<ServiceStub> {
        Ok(Stub::from_skeleton(&self.service)?)
    }

    /// Stub for the registration interface, once started
    pub fn registration_stub(&self) -> Result<RegistrationStub> {
        Ok(Stub::from_skeleton(&self.registration)?)
    }

    pub const fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }
}
