//! Server-side skeletons
//!
//! A [`Skeleton`] serves one remote interface for one target object. Its
//! accept loop runs as a background task and hands every connection to its
//! own handler task; a semaphore bounds how many handlers run at once.

use crate::codec::{self, CallRequest, CallResponse};
use crate::config::RmiConfig;
use crate::dispatch::MethodTable;
use crate::error::{Fault, FaultKind, Result, RmiError};
use crate::interface::{Remote, validate};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Lifecycle of a skeleton
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkeletonState {
    Created,
    Started,
    Stopped,
}

/// Notifications raised by a running skeleton
///
/// The defaults are silent; servers override them to log.
pub trait SkeletonHooks: Send + Sync + 'static {
    /// Called exactly once each time the accept loop exits, with `None` when
    /// the stop was requested
    fn stopped(&self, _cause: Option<&io::Error>) {}

    /// Called when accepting a connection fails; return `true` to keep
    /// accepting
    fn listen_error(&self, _error: &io::Error) -> bool {
        false
    }

    /// Called when a handler could not read a request or write a response
    fn service_error(&self, _error: &RmiError) {}
}

/// Hooks that do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl SkeletonHooks for NoHooks {}

struct Running {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Dispatcher serving remote interface `T` for one target
pub struct Skeleton<T: ?Sized + Remote> {
    target: Arc<T>,
    table: Arc<MethodTable<T>>,
    hooks: Arc<dyn SkeletonHooks>,
    config: RmiConfig,
    address: Mutex<Option<SocketAddr>>,
    state: Arc<Mutex<SkeletonState>>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl<T: ?Sized + Remote> Skeleton<T> {
    /// Skeleton listening on a system-chosen port once started
    pub fn new(target: Arc<T>) -> Result<Self> {
        validate(T::DESCRIPTOR)?;
        Ok(Self {
            target,
            table: Arc::new(T::method_table()),
            hooks: Arc::new(NoHooks),
            config: RmiConfig::default(),
            address: Mutex::new(None),
            state: Arc::new(Mutex::new(SkeletonState::Created)),
            running: tokio::sync::Mutex::new(None),
        })
    }

    /// Skeleton listening on `address` once started
    pub fn bound_to(target: Arc<T>, address: SocketAddr) -> Result<Self> {
        let skeleton = Self::new(target)?;
        *skeleton.address.lock() = Some(address);
        Ok(skeleton)
    }

    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn SkeletonHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: RmiConfig) -> Self {
        self.config = config;
        self
    }

    /// Address the skeleton listens on, fixed at the first successful start
    pub fn address(&self) -> Option<SocketAddr> {
        *self.address.lock()
    }

    pub fn state(&self) -> SkeletonState {
        *self.state.lock()
    }

    /// Bind the listening socket and launch the accept loop
    ///
    /// Does nothing when already started.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if self.state() == SkeletonState::Started {
            return Ok(());
        }
        // Reap a loop that exited on its own
        if let Some(previous) = running.take() {
            let _ = previous.task.await;
        }

        let listener = match self.address() {
            Some(address) => TcpListener::bind(address).await?,
            None => TcpListener::bind((self.config.bind_host.as_str(), 0)).await?,
        };
        let bound = listener.local_addr()?;
        {
            let mut address = self.address.lock();
            if address.is_none_or(|a| a.port() == 0) {
                *address = Some(bound);
            }
        }
        *self.state.lock() = SkeletonState::Started;

        info!("Serving {} on {}", T::DESCRIPTOR.name, bound);

        let (shutdown, shutdown_rx) = oneshot::channel();
        let accept = AcceptLoop {
            listener,
            target: Arc::clone(&self.target),
            table: Arc::clone(&self.table),
            hooks: Arc::clone(&self.hooks),
            permits: Arc::new(Semaphore::new(self.config.max_connections.max(1))),
            max_frame_size: self.config.max_frame_size,
            state: Arc::clone(&self.state),
        };
        let task = tokio::spawn(accept.run(shutdown_rx));
        *running = Some(Running { shutdown, task });
        Ok(())
    }

    /// Close the listening socket and wait for the accept loop to exit
    ///
    /// Handlers already dispatched run to completion.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        if let Some(Running { shutdown, task }) = running.take() {
            let _ = shutdown.send(());
            let _ = task.await;
        }
    }
}

struct AcceptLoop<T: ?Sized + Remote> {
    listener: TcpListener,
    target: Arc<T>,
    table: Arc<MethodTable<T>>,
    hooks: Arc<dyn SkeletonHooks>,
    permits: Arc<Semaphore>,
    max_frame_size: usize,
    state: Arc<Mutex<SkeletonState>>,
}

impl<T: ?Sized + Remote> AcceptLoop<T> {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let cause = loop {
            // Backpressure: a connection is only accepted once a handler slot
            // is free
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => break None,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break None,
                },
            };

            let (stream, peer) = tokio::select! {
                biased;
                _ = &mut shutdown => break None,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        if self.hooks.listen_error(&e) {
                            continue;
                        }
                        break Some(e);
                    }
                },
            };

            debug!("Accepted connection from {} for {}", peer, T::DESCRIPTOR.name);

            let target = Arc::clone(&self.target);
            let table = Arc::clone(&self.table);
            let hooks = Arc::clone(&self.hooks);
            let max_frame_size = self.max_frame_size;
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, target, &table, max_frame_size).await {
                    hooks.service_error(&e);
                }
                drop(permit);
            });
        };

        drop(self.listener);
        *self.state.lock() = SkeletonState::Stopped;
        info!("Stopped serving {}", T::DESCRIPTOR.name);
        self.hooks.stopped(cause.as_ref());
    }
}

async fn serve_connection<T: ?Sized + Remote>(
    mut stream: TcpStream,
    target: Arc<T>,
    table: &MethodTable<T>,
    max_frame_size: usize,
) -> Result<()> {
    let response = match codec::read_frame::<_, CallRequest>(&mut stream, max_frame_size).await {
        Ok(request) => dispatch(table, target, request).await,
        Err(e) if e.is_transport() => return Err(e),
        Err(e) => CallResponse::Failure(Fault::from(&e)),
    };
    codec::write_frame(&mut stream, &response).await
}

async fn dispatch<T: ?Sized + Remote>(
    table: &MethodTable<T>,
    target: Arc<T>,
    request: CallRequest,
) -> CallResponse {
    if !table.accepts(&request.interface) {
        return CallResponse::Failure(Fault::new(
            FaultKind::InterfaceMismatch,
            format!(
                "skeleton serves {}, request names {}",
                table.interface(),
                request.interface
            ),
        ));
    }
    if request.param_types.len() != request.args.len() {
        return CallResponse::Failure(Fault::new(
            FaultKind::Protocol,
            format!(
                "{} parameter types for {} arguments",
                request.param_types.len(),
                request.args.len()
            ),
        ));
    }

    let arity = request.args.len();
    let Some(call) = table.call(target, &request.method, request.args) else {
        return CallResponse::Failure(Fault::new(
            FaultKind::MethodNotFound,
            format!("{}.{}/{}", request.interface, request.method, arity),
        ));
    };

    debug!("Dispatching {}.{}", request.interface, request.method);

    match call.await {
        Ok(value) => CallResponse::Success(value),
        Err(fault) => CallResponse::Failure(fault),
    }
}
