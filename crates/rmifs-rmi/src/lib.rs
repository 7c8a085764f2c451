//! rmifs RMI substrate
//!
//! Location-transparent remote calls over TCP. A remote interface is declared
//! with [`remote_interface!`]; a [`Skeleton`] serves it for a target object
//! and a [`Stub`] implements it on the client side, one connection per call.
//!
//! Calls travel as framed, versioned bincode records (see [`codec`]).

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod interface;
mod macros;
pub mod skeleton;
pub mod stub;
pub mod value;

pub use async_trait::async_trait;
pub use codec::{CallRequest, CallResponse, DEFAULT_MAX_FRAME_SIZE, PROTOCOL_VERSION};
pub use config::RmiConfig;
pub use dispatch::{MethodFuture, MethodTable};
pub use error::{Fault, FaultKind, Result, RmiError, Transmissible};
pub use interface::{
    Extends, InterfaceDescriptor, MethodDescriptor, Remote, is_remote_interface, validate,
};
pub use skeleton::{NoHooks, Skeleton, SkeletonHooks, SkeletonState};
pub use stub::{Stub, StubHandle};
pub use value::{Argument, Value, Wire, take_arg};
