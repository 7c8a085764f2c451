//! Wire values
//!
//! Arguments and return values travel as a closed set of tagged records.
//! The [`Wire`] trait maps Rust types onto that set and names the parameter
//! type descriptor sent alongside each argument.

use crate::error::{Fault, FaultKind, RmiError};
use crate::stub::StubHandle;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Encoded argument or return value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Unit,
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    Str(String),
    Bytes(Vec<u8>),
    /// Absolute slash-separated path
    Path(String),
    List(Vec<Value>),
    Stub(StubHandle),
}

impl Value {
    /// Short name of the variant, for error messages
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Path(_) => "path",
            Self::List(_) => "list",
            Self::Stub(_) => "stub",
        }
    }

    /// Error for a value that does not have the expected shape
    pub fn mismatch(&self, expected: &str) -> RmiError {
        RmiError::protocol(format!("expected {expected}, got {}", self.tag()))
    }
}

/// A type that can be passed to or returned from a remote method
pub trait Wire: Sized + Send + 'static {
    /// Parameter type descriptor written into call requests
    fn type_name() -> Cow<'static, str>;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, RmiError>;
}

macro_rules! scalar_wire {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl Wire for $ty {
            fn type_name() -> Cow<'static, str> {
                Cow::Borrowed($name)
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, RmiError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(other.mismatch($name)),
                }
            }
        }
    };
}

scalar_wire!(bool, Bool, "bool");
scalar_wire!(i32, I32, "i32");
scalar_wire!(i64, I64, "i64");
scalar_wire!(u32, U32, "u32");
scalar_wire!(u64, U64, "u64");
scalar_wire!(String, Str, "String");

impl Wire for () {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("()")
    }

    fn into_value(self) -> Value {
        Value::Unit
    }

    fn from_value(value: Value) -> Result<Self, RmiError> {
        match value {
            Value::Unit => Ok(()),
            other => Err(other.mismatch("unit")),
        }
    }
}

impl Wire for Bytes {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("bytes")
    }

    fn into_value(self) -> Value {
        Value::Bytes(self.to_vec())
    }

    fn from_value(value: Value) -> Result<Self, RmiError> {
        match value {
            Value::Bytes(v) => Ok(Self::from(v)),
            other => Err(other.mismatch("bytes")),
        }
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("{}[]", T::type_name()))
    }

    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(Wire::into_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, RmiError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(other.mismatch("list")),
        }
    }
}

/// One argument of an outgoing call: its type descriptor and encoded value
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Argument {
    pub type_name: String,
    pub value: Value,
}

impl Argument {
    pub fn new<T: Wire>(value: T) -> Self {
        Self {
            type_name: T::type_name().into_owned(),
            value: value.into_value(),
        }
    }
}

/// Pull the next argument off a decoded request.
///
/// Used by generated dispatch handlers; failures are reported to the caller
/// as protocol faults.
pub fn take_arg<T: Wire>(args: &mut impl Iterator<Item = Value>) -> Result<T, Fault> {
    let value = args.next().ok_or_else(|| {
        Fault::new(
            FaultKind::Protocol,
            format!("missing argument of type {}", T::type_name()),
        )
    })?;
    T::from_value(value).map_err(|e| Fault::from(&e))
}
