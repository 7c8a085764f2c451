//! Remote interface descriptors
//!
//! Every remote interface carries a static [`InterfaceDescriptor`] naming its
//! methods and the interfaces it extends. Stubs and skeletons validate the
//! descriptor once, at construction.

use crate::dispatch::MethodTable;
use crate::error::{Result, RmiError};

/// Static description of one method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub arity: usize,
    /// Whether the method can signal the remote-call failure kind
    pub remote: bool,
}

/// Static description of an interface and its direct parents
#[derive(Debug)]
pub struct InterfaceDescriptor {
    pub name: &'static str,
    pub methods: &'static [MethodDescriptor],
    pub extends: &'static [&'static InterfaceDescriptor],
}

impl InterfaceDescriptor {
    /// Find a method by name and arity, own methods first, then parents
    #[must_use]
    pub fn find_method(&self, name: &str, arity: usize) -> Option<&'static MethodDescriptor> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.arity == arity)
            .or_else(|| {
                self.extends
                    .iter()
                    .find_map(|parent| parent.find_method(name, arity))
            })
    }

    /// Whether this interface is `name` or extends it, directly or not
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.extends.iter().any(|parent| parent.is_a(name))
    }
}

/// Check that every method of the interface, and of every interface it
/// extends, can signal the remote-call failure kind
#[must_use]
pub fn is_remote_interface(descriptor: &InterfaceDescriptor) -> bool {
    descriptor.methods.iter().all(|m| m.remote)
        && descriptor.extends.iter().all(|parent| is_remote_interface(parent))
}

/// Reject an interface that is not remote-callable
pub fn validate(descriptor: &InterfaceDescriptor) -> Result<()> {
    if is_remote_interface(descriptor) {
        Ok(())
    } else {
        Err(RmiError::NotRemoteInterface {
            interface: descriptor.name.to_string(),
        })
    }
}

/// Implemented for `dyn Trait` of every remote interface
pub trait Remote: Send + Sync + 'static {
    const DESCRIPTOR: &'static InterfaceDescriptor;

    /// Build the dispatch table used by a skeleton serving this interface
    fn method_table() -> MethodTable<Self>;
}

/// Marker: a stub of `Self` can be used where interface `P` is expected.
///
/// Implemented reflexively and for every direct parent interface.
pub trait Extends<P: ?Sized> {}

#[cfg(test)]
mod tests {
    use super::*;

    const fn method(name: &'static str, arity: usize, remote: bool) -> MethodDescriptor {
        MethodDescriptor {
            name,
            arity,
            remote,
        }
    }

    static BASE: InterfaceDescriptor = InterfaceDescriptor {
        name: "Base",
        methods: &[method("ping", 1, true)],
        extends: &[],
    };

    static BROKEN_BASE: InterfaceDescriptor = InterfaceDescriptor {
        name: "BrokenBase",
        methods: &[method("ping", 1, true), method("local_only", 0, false)],
        extends: &[],
    };

    static DERIVED: InterfaceDescriptor = InterfaceDescriptor {
        name: "Derived",
        methods: &[method("pong", 2, true)],
        extends: &[&BASE],
    };

    static DERIVED_FROM_BROKEN: InterfaceDescriptor = InterfaceDescriptor {
        name: "DerivedFromBroken",
        methods: &[method("pong", 2, true)],
        extends: &[&BROKEN_BASE],
    };

    #[test]
    fn test_remote_interface_check_is_recursive() {
        assert!(is_remote_interface(&BASE));
        assert!(is_remote_interface(&DERIVED));
        assert!(!is_remote_interface(&BROKEN_BASE));
        assert!(!is_remote_interface(&DERIVED_FROM_BROKEN));
    }

    #[test]
    fn test_validate_names_interface() {
        assert!(validate(&DERIVED).is_ok());
        let err = validate(&DERIVED_FROM_BROKEN).unwrap_err();
        assert!(matches!(
            err,
            RmiError::NotRemoteInterface { interface } if interface == "DerivedFromBroken"
        ));
    }

    #[test]
    fn test_find_method_prefers_own_then_parent() {
        assert_eq!(DERIVED.find_method("pong", 2).map(|m| m.arity), Some(2));
        assert!(DERIVED.find_method("ping", 1).is_some());
        assert!(DERIVED.find_method("ping", 2).is_none());
        assert!(DERIVED.is_a("Base"));
        assert!(!BASE.is_a("Derived"));
    }
}
