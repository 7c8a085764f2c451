//! Method dispatch tables
//!
//! A skeleton resolves each request against a [`MethodTable`]: the
//! interface's own methods first, then each inherited table in declaration
//! order.

use crate::error::Fault;
use crate::value::Value;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Future returned by a dispatch handler
pub type MethodFuture = BoxFuture<'static, Result<Value, Fault>>;

type Handler<T> = Arc<dyn Fn(Arc<T>, Vec<Value>) -> MethodFuture + Send + Sync>;

// Inherited tables are already expressed over the parent type, so one
// upcast rebases a parent together with everything it inherits
type Upcast<C, T> = Arc<dyn Fn(Arc<C>) -> Arc<T> + Send + Sync>;

struct Entry<T: ?Sized> {
    name: &'static str,
    arity: usize,
    handler: Handler<T>,
}

/// Handlers for one interface, keyed by method name and arity
pub struct MethodTable<T: ?Sized> {
    interface: &'static str,
    entries: Vec<Entry<T>>,
    parents: Vec<MethodTable<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> MethodTable<T> {
    #[must_use]
    pub const fn new(interface: &'static str) -> Self {
        Self {
            interface,
            entries: Vec::new(),
            parents: Vec::new(),
        }
    }

    /// Interface this table was built for
    #[must_use]
    pub const fn interface(&self) -> &'static str {
        self.interface
    }

    /// Add a handler for `name` taking `arity` arguments
    pub fn register<F>(&mut self, name: &'static str, arity: usize, handler: F)
    where
        F: Fn(Arc<T>, Vec<Value>) -> MethodFuture + Send + Sync + 'static,
    {
        self.entries.push(Entry {
            name,
            arity,
            handler: Arc::new(handler),
        });
    }

    /// Add the table of a parent interface, reached through `upcast`
    #[must_use]
    pub fn inherit<P>(mut self, parent: MethodTable<P>, upcast: fn(Arc<T>) -> Arc<P>) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
    {
        let upcast: Upcast<T, P> = Arc::new(upcast);
        self.parents.push(parent.rebase(upcast));
        self
    }

    fn rebase<C>(self, upcast: Upcast<C, T>) -> MethodTable<C>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let entries = self
            .entries
            .into_iter()
            .map(|entry| {
                let handler = entry.handler;
                let upcast = Arc::clone(&upcast);
                let rebased: Handler<C> = Arc::new(move |target: Arc<C>, args: Vec<Value>| {
                    handler(upcast(target), args)
                });
                Entry {
                    name: entry.name,
                    arity: entry.arity,
                    handler: rebased,
                }
            })
            .collect();

        let parents = self
            .parents
            .into_iter()
            .map(|grandparent| grandparent.rebase(Arc::clone(&upcast)))
            .collect();

        MethodTable {
            interface: self.interface,
            entries,
            parents,
        }
    }

    /// Whether calls addressed to `interface` can be served by this table
    #[must_use]
    pub fn accepts(&self, interface: &str) -> bool {
        self.interface == interface || self.parents.iter().any(|p| p.accepts(interface))
    }

    /// Start a call of `name` with `args` on `target`
    ///
    /// Returns `None` when no method of that name takes `args.len()`
    /// arguments.
    pub fn call(&self, target: Arc<T>, name: &str, args: Vec<Value>) -> Option<MethodFuture> {
        let handler = self.resolve(name, args.len())?;
        Some(handler(target, args))
    }

    fn resolve(&self, name: &str, arity: usize) -> Option<&Handler<T>> {
        self.entries
            .iter()
            .find(|e| e.name == name && e.arity == arity)
            .map(|e| &e.handler)
            .or_else(|| self.parents.iter().find_map(|p| p.resolve(name, arity)))
    }

    /// Number of methods reachable through this table
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() + self.parents.iter().map(Self::len).sum::<usize>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
