//! Client-side stubs
//!
//! A [`Stub`] is an immutable handle naming a remote interface and the address
//! of a skeleton serving it. Identity operations are answered locally; every
//! remote method opens a fresh connection, sends one request and reads one
//! response.

use crate::codec::{self, CallRequest, CallResponse, DEFAULT_MAX_FRAME_SIZE};
use crate::error::{Result, RmiError, Transmissible};
use crate::interface::{Remote, validate};
use crate::skeleton::Skeleton;
use crate::value::{Argument, Value, Wire};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::TcpStream;
use tracing::debug;

/// Interface name plus server address: everything needed to rebuild a stub
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StubHandle {
    pub interface: String,
    pub host: String,
    pub port: u16,
}

impl StubHandle {
    pub fn new(interface: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            interface: interface.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for StubHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.interface, self.host, self.port)
    }
}

/// Client proxy for remote interface `I`
///
/// `I` is the `dyn Trait` of a remote interface; the trait itself is
/// implemented for `Stub<dyn Trait>` by `remote_interface!`.
pub struct Stub<I: ?Sized> {
    handle: StubHandle,
    marker: PhantomData<fn(&I)>,
}

impl<I: ?Sized + Remote> Stub<I> {
    /// Stub for a skeleton listening at `address`
    pub fn create(address: SocketAddr) -> Result<Self> {
        validate(I::DESCRIPTOR)?;
        Ok(Self::from_handle(StubHandle::new(
            I::DESCRIPTOR.name,
            advertised_ip(address.ip()).to_string(),
            address.port(),
        )))
    }

    /// Stub for a skeleton reachable at `host:port`, resolving `host` per call
    pub fn connect_to(host: &str, port: u16) -> Result<Self> {
        if host.is_empty() {
            return Err(RmiError::InvalidArgument("empty hostname".into()));
        }
        validate(I::DESCRIPTOR)?;
        Ok(Self::from_handle(StubHandle::new(
            I::DESCRIPTOR.name,
            host,
            port,
        )))
    }

    /// Stub for the address a skeleton is bound to
    ///
    /// A wildcard address is advertised as loopback.
    pub fn from_skeleton(skeleton: &Skeleton<I>) -> Result<Self> {
        validate(I::DESCRIPTOR)?;
        let address = skeleton_address(skeleton)?;
        Ok(Self::from_handle(StubHandle::new(
            I::DESCRIPTOR.name,
            advertised_ip(address.ip()).to_string(),
            address.port(),
        )))
    }

    /// Stub for a skeleton's port on an externally routable `hostname`
    pub fn from_skeleton_with_hostname(skeleton: &Skeleton<I>, hostname: &str) -> Result<Self> {
        if hostname.is_empty() {
            return Err(RmiError::InvalidArgument("empty hostname".into()));
        }
        validate(I::DESCRIPTOR)?;
        let address = skeleton_address(skeleton)?;
        Ok(Self::from_handle(StubHandle::new(
            I::DESCRIPTOR.name,
            hostname,
            address.port(),
        )))
    }
}

/// Address of a skeleton, once its port is known
///
/// A skeleton bound to port 0 has no usable address until it is started.
fn skeleton_address<I: ?Sized + Remote>(skeleton: &Skeleton<I>) -> Result<SocketAddr> {
    skeleton.address().filter(|a| a.port() != 0).ok_or_else(|| {
        RmiError::illegal_state(format!(
            "skeleton for {} has no address yet",
            I::DESCRIPTOR.name
        ))
    })
}

fn advertised_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        other => other,
    }
}

impl<I: ?Sized> Stub<I> {
    const fn from_handle(handle: StubHandle) -> Self {
        Self {
            handle,
            marker: PhantomData,
        }
    }

    #[must_use]
    pub const fn handle(&self) -> &StubHandle {
        &self.handle
    }

    /// Perform one remote call
    ///
    /// Transport and protocol faults are reported through `E`'s
    /// [`RmiError`] conversion; a failure carried by the response is rebuilt
    /// with [`Transmissible::from_fault`].
    pub async fn invoke<R, E>(&self, method: &str, args: Vec<Argument>) -> std::result::Result<R, E>
    where
        R: Wire,
        E: Transmissible,
    {
        let (param_types, args): (Vec<String>, Vec<Value>) =
            args.into_iter().map(|a| (a.type_name, a.value)).unzip();
        let request = CallRequest {
            interface: self.handle.interface.clone(),
            method: method.to_string(),
            param_types,
            args,
        };

        debug!("Calling {}.{} on {}", request.interface, method, self.handle);

        match self.exchange(&request).await? {
            CallResponse::Success(value) => Ok(R::from_value(value)?),
            CallResponse::Failure(fault) => Err(E::from_fault(fault)),
        }
    }

    async fn exchange(&self, request: &CallRequest) -> Result<CallResponse> {
        let mut stream = TcpStream::connect((self.handle.host.as_str(), self.handle.port)).await?;
        stream.set_nodelay(true)?;
        codec::write_frame(&mut stream, request).await?;
        codec::read_frame(&mut stream, DEFAULT_MAX_FRAME_SIZE).await
    }
}

impl<I: ?Sized> Clone for Stub<I> {
    fn clone(&self) -> Self {
        Self::from_handle(self.handle.clone())
    }
}

impl<I: ?Sized> PartialEq for Stub<I> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<I: ?Sized> Eq for Stub<I> {}

impl<I: ?Sized> Hash for Stub<I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.handle.hash(state);
    }
}

impl<I: ?Sized> fmt::Debug for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Stub").field(&self.handle).finish()
    }
}

impl<I: ?Sized> fmt::Display for Stub<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.handle.fmt(f)
    }
}

impl Wire for StubHandle {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("StubHandle")
    }

    fn into_value(self) -> Value {
        Value::Stub(self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Stub(handle) => Ok(handle),
            other => Err(other.mismatch("stub")),
        }
    }
}

impl<I: ?Sized + Remote> Wire for Stub<I> {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed(I::DESCRIPTOR.name)
    }

    fn into_value(self) -> Value {
        Value::Stub(self.handle)
    }

    fn from_value(value: Value) -> Result<Self> {
        let handle = StubHandle::from_value(value)?;
        if handle.interface != I::DESCRIPTOR.name {
            return Err(RmiError::protocol(format!(
                "expected stub for {}, got {}",
                I::DESCRIPTOR.name,
                handle.interface
            )));
        }
        Ok(Self::from_handle(handle))
    }
}
