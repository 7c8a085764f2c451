//! End-to-end stub/skeleton tests over loopback TCP

use parking_lot::Mutex;
use rmifs_rmi::codec::{self, DEFAULT_MAX_FRAME_SIZE};
use rmifs_rmi::{
    CallRequest, CallResponse, Fault, FaultKind, RmiError, Skeleton, SkeletonHooks,
    SkeletonState, Stub, Transmissible, Value, async_trait, remote_interface,
};
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[derive(Debug)]
pub enum PingError {
    Rmi(RmiError),
    Negative(i64),
}

impl From<RmiError> for PingError {
    fn from(e: RmiError) -> Self {
        Self::Rmi(e)
    }
}

impl Transmissible for PingError {
    fn to_fault(&self) -> Fault {
        match self {
            Self::Rmi(e) => e.to_fault(),
            Self::Negative(n) => Fault::new(FaultKind::Application("Negative".into()), n.to_string()),
        }
    }

    fn from_fault(fault: Fault) -> Self {
        match &fault.kind {
            FaultKind::Application(tag) if tag == "Negative" => fault
                .message
                .parse()
                .map_or_else(|_| Self::Rmi(RmiError::Remote(fault.clone())), Self::Negative),
            _ => Self::Rmi(RmiError::from_fault(fault)),
        }
    }
}

remote_interface! {
    /// Test interface
    pub trait Ping {
        type Error = PingError;
        fn ping(&self, id: i64) -> String;
        fn echo_all(&self, words: Vec<String>) -> Vec<String>;
    }
}

remote_interface! {
    pub trait PingPong: Ping {
        type Error = PingError;
        fn pong(&self, id: i64) -> i64;
    }
}

remote_interface! {
    pub trait Relay {
        type Error = PingError;
        fn forward(&self, target: Stub<dyn Ping>, id: i64) -> String;
    }
}

struct Pinger;

#[async_trait]
impl Ping for Pinger {
    async fn ping(&self, id: i64) -> Result<String, PingError> {
        if id < 0 {
            return Err(PingError::Negative(id));
        }
        Ok(format!("pong {id}"))
    }

    async fn echo_all(&self, words: Vec<String>) -> Result<Vec<String>, PingError> {
        Ok(words.into_iter().rev().collect())
    }
}

#[async_trait]
impl PingPong for Pinger {
    async fn pong(&self, id: i64) -> Result<i64, PingError> {
        Ok(id * 2)
    }
}

struct Relayer;

#[async_trait]
impl Relay for Relayer {
    async fn forward(&self, target: Stub<dyn Ping>, id: i64) -> Result<String, PingError> {
        target.ping(id).await
    }
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn ping_skeleton() -> Skeleton<dyn Ping> {
    let target: Arc<dyn Ping> = Arc::new(Pinger);
    let skeleton = Skeleton::bound_to(target, loopback()).unwrap();
    skeleton.start().await.unwrap();
    skeleton
}

#[derive(Default)]
struct RecordingHooks {
    stops: Mutex<Vec<Option<String>>>,
    service_errors: Mutex<Vec<bool>>,
}

impl SkeletonHooks for RecordingHooks {
    fn stopped(&self, cause: Option<&io::Error>) {
        self.stops.lock().push(cause.map(ToString::to_string));
    }

    fn service_error(&self, error: &RmiError) {
        self.service_errors.lock().push(error.is_transport());
    }
}

#[tokio::test]
async fn test_remote_call_and_application_fault() {
    let skeleton = ping_skeleton().await;
    let stub = Stub::<dyn Ping>::from_skeleton(&skeleton).unwrap();

    assert_eq!(stub.ping(7).await.unwrap(), "pong 7");
    assert_eq!(
        stub.echo_all(vec!["a".into(), "b".into()]).await.unwrap(),
        vec!["b".to_string(), "a".to_string()]
    );

    match stub.ping(-3).await {
        Err(PingError::Negative(n)) => assert_eq!(n, -3),
        other => panic!("expected Negative, got {other:?}"),
    }

    skeleton.stop().await;
}

#[tokio::test]
async fn test_inherited_methods_dispatch_through_derived_skeleton() {
    let target: Arc<dyn PingPong> = Arc::new(Pinger);
    let skeleton = Skeleton::bound_to(target, loopback()).unwrap();
    skeleton.start().await.unwrap();

    let stub = Stub::<dyn PingPong>::from_skeleton(&skeleton).unwrap();
    assert_eq!(stub.pong(21).await.unwrap(), 42);
    assert_eq!(stub.ping(1).await.unwrap(), "pong 1");

    // A stub of the parent interface is served by the derived skeleton
    let parent = Stub::<dyn Ping>::create(skeleton.address().unwrap()).unwrap();
    assert_eq!(parent.ping(2).await.unwrap(), "pong 2");

    skeleton.stop().await;
}

#[tokio::test]
async fn test_interface_mismatch_is_reported() {
    let target: Arc<dyn Relay> = Arc::new(Relayer);
    let skeleton = Skeleton::bound_to(target, loopback()).unwrap();
    skeleton.start().await.unwrap();

    let wrong = Stub::<dyn Ping>::create(skeleton.address().unwrap()).unwrap();
    match wrong.ping(1).await {
        Err(PingError::Rmi(RmiError::Remote(fault))) => {
            assert_eq!(fault.kind, FaultKind::InterfaceMismatch);
        }
        other => panic!("expected interface mismatch, got {other:?}"),
    }

    skeleton.stop().await;
}

#[tokio::test]
async fn test_stub_travels_as_argument() {
    let pings = ping_skeleton().await;
    let ping_stub = Stub::<dyn Ping>::from_skeleton(&pings).unwrap();

    let target: Arc<dyn Relay> = Arc::new(Relayer);
    let relays = Skeleton::bound_to(target, loopback()).unwrap();
    relays.start().await.unwrap();
    let relay = Stub::<dyn Relay>::from_skeleton(&relays).unwrap();

    assert_eq!(relay.forward(ping_stub.clone(), 5).await.unwrap(), "pong 5");
    assert!(matches!(
        relay.forward(ping_stub, -1).await,
        Err(PingError::Negative(-1))
    ));

    relays.stop().await;
    pings.stop().await;
}

#[tokio::test]
async fn test_transport_failure_surfaces_as_rmi_error() {
    let skeleton = ping_skeleton().await;
    let stub = Stub::<dyn Ping>::from_skeleton(&skeleton).unwrap();
    skeleton.stop().await;

    match stub.ping(1).await {
        Err(PingError::Rmi(e)) => assert!(e.is_transport()),
        other => panic!("expected transport failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stub_requires_resolved_address() {
    let target: Arc<dyn Ping> = Arc::new(Pinger);
    let skeleton = Skeleton::new(target).unwrap();
    assert_eq!(skeleton.state(), SkeletonState::Created);

    let err = Stub::<dyn Ping>::from_skeleton(&skeleton).unwrap_err();
    assert!(matches!(err, RmiError::IllegalState(_)));

    // Bound to a system-chosen port but not started: still unresolved
    let target: Arc<dyn Ping> = Arc::new(Pinger);
    let pending = Skeleton::bound_to(target, loopback()).unwrap();
    assert!(matches!(
        Stub::<dyn Ping>::from_skeleton(&pending),
        Err(RmiError::IllegalState(_))
    ));
    assert!(matches!(
        Stub::<dyn Ping>::from_skeleton_with_hostname(&pending, "localhost"),
        Err(RmiError::IllegalState(_))
    ));
    pending.start().await.unwrap();
    let resolved = Stub::<dyn Ping>::from_skeleton(&pending).unwrap();
    assert_ne!(resolved.handle().port, 0);
    assert_eq!(resolved.ping(4).await.unwrap(), "pong 4");
    pending.stop().await;

    skeleton.start().await.unwrap();
    let err = Stub::<dyn Ping>::from_skeleton_with_hostname(&skeleton, "").unwrap_err();
    assert!(matches!(err, RmiError::InvalidArgument(_)));

    let named = Stub::<dyn Ping>::from_skeleton_with_hostname(&skeleton, "localhost").unwrap();
    assert_eq!(named.handle().host, "localhost");
    assert_eq!(Some(named.handle().port), skeleton.address().map(|a| a.port()));

    // Wildcard bind address is advertised as loopback
    let local = Stub::<dyn Ping>::from_skeleton(&skeleton).unwrap();
    assert_eq!(local.handle().host, "127.0.0.1");
    assert_eq!(local.ping(3).await.unwrap(), "pong 3");

    skeleton.stop().await;
}

#[tokio::test]
async fn test_restart_keeps_address_and_notifies_once_per_stop() {
    let hooks = Arc::new(RecordingHooks::default());
    let target: Arc<dyn Ping> = Arc::new(Pinger);
    let skeleton = Skeleton::bound_to(target, loopback())
        .unwrap()
        .with_hooks(Arc::clone(&hooks) as Arc<dyn SkeletonHooks>);

    skeleton.start().await.unwrap();
    let first = skeleton.address().unwrap();
    assert_ne!(first.port(), 0);

    // Starting twice is a no-op
    skeleton.start().await.unwrap();
    assert_eq!(skeleton.address(), Some(first));

    skeleton.stop().await;
    assert_eq!(skeleton.state(), SkeletonState::Stopped);
    assert_eq!(hooks.stops.lock().clone(), vec![None]);

    skeleton.start().await.unwrap();
    assert_eq!(skeleton.address(), Some(first));
    assert_eq!(skeleton.state(), SkeletonState::Started);

    let stub = Stub::<dyn Ping>::from_skeleton(&skeleton).unwrap();
    assert_eq!(stub.ping(9).await.unwrap(), "pong 9");

    skeleton.stop().await;
    assert_eq!(hooks.stops.lock().len(), 2);
}

#[test]
fn test_stub_identity_is_local() {
    let a: SocketAddr = "10.0.0.1:7000".parse().unwrap();
    let b: SocketAddr = "10.0.0.1:7001".parse().unwrap();

    let first = Stub::<dyn Ping>::create(a).unwrap();
    let same = Stub::<dyn Ping>::create(a).unwrap();
    let other = Stub::<dyn Ping>::create(b).unwrap();

    assert_eq!(first, same);
    assert_ne!(first, other);
    assert_eq!(first.to_string(), "Ping 10.0.0.1:7000");

    let set: HashSet<_> = [first, same, other].into_iter().collect();
    assert_eq!(set.len(), 2);
}

fn request(method: &str, param_types: &[&str], args: Vec<Value>) -> CallRequest {
    CallRequest {
        interface: "Ping".to_string(),
        method: method.to_string(),
        param_types: param_types.iter().map(ToString::to_string).collect(),
        args,
    }
}

/// Send one hand-built request frame and read the response
async fn raw_call(address: SocketAddr, request: &CallRequest) -> CallResponse {
    let mut stream = TcpStream::connect(address).await.unwrap();
    codec::write_frame(&mut stream, request).await.unwrap();
    codec::read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE).await.unwrap()
}

fn fault_kind(response: CallResponse) -> FaultKind {
    match response {
        CallResponse::Failure(fault) => fault.kind,
        CallResponse::Success(value) => panic!("expected a fault, got {value:?}"),
    }
}

#[tokio::test]
async fn test_unknown_method_or_arity_is_method_not_found() {
    let skeleton = ping_skeleton().await;
    let address = skeleton.address().unwrap();

    let ok = raw_call(address, &request("ping", &["i64"], vec![Value::I64(1)])).await;
    assert_eq!(ok, CallResponse::Success(Value::Str("pong 1".into())));

    let unknown = raw_call(address, &request("frob", &["i64"], vec![Value::I64(1)])).await;
    assert_eq!(fault_kind(unknown), FaultKind::MethodNotFound);

    let wrong_arity = raw_call(
        address,
        &request("ping", &["i64", "i64"], vec![Value::I64(1), Value::I64(2)]),
    )
    .await;
    assert_eq!(fault_kind(wrong_arity), FaultKind::MethodNotFound);

    skeleton.stop().await;
}

#[tokio::test]
async fn test_mismatched_parameter_types_are_a_protocol_fault() {
    let skeleton = ping_skeleton().await;
    let address = skeleton.address().unwrap();

    let missing_arg = raw_call(address, &request("ping", &["i64"], Vec::new())).await;
    assert_eq!(fault_kind(missing_arg), FaultKind::Protocol);

    let missing_type = raw_call(address, &request("ping", &[], vec![Value::I64(1)])).await;
    assert_eq!(fault_kind(missing_type), FaultKind::Protocol);

    // A header-sized run of garbage is answered with a protocol fault too
    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(b"GARBAGE!!!").await.unwrap();
    let response: CallResponse = codec::read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE)
        .await
        .unwrap();
    assert_eq!(fault_kind(response), FaultKind::Protocol);

    skeleton.stop().await;
}

#[tokio::test]
async fn test_handler_io_failure_reaches_service_error_hook() {
    let hooks = Arc::new(RecordingHooks::default());
    let target: Arc<dyn Ping> = Arc::new(Pinger);
    let skeleton = Skeleton::bound_to(target, loopback())
        .unwrap()
        .with_hooks(Arc::clone(&hooks) as Arc<dyn SkeletonHooks>);
    skeleton.start().await.unwrap();

    // Connect and hang up without sending a request
    drop(TcpStream::connect(skeleton.address().unwrap()).await.unwrap());

    let mut reported = false;
    for _ in 0..500 {
        if !hooks.service_errors.lock().is_empty() {
            reported = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reported);
    // The hang-up surfaces as a transport fault
    assert_eq!(hooks.service_errors.lock().clone(), vec![true]);

    // The skeleton keeps serving after a failed handler
    let stub = Stub::<dyn Ping>::from_skeleton(&skeleton).unwrap();
    assert_eq!(stub.ping(5).await.unwrap(), "pong 5");
    assert!(hooks.stops.lock().is_empty());

    skeleton.stop().await;
}
