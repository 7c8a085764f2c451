//! Remote interface adapter generation

/// Declare a remote interface.
///
/// ```ignore
/// remote_interface! {
///     pub trait Storage {
///         type Error = FsError;
///         fn size(&self, file: Path) -> u64;
///     }
/// }
/// ```
///
/// expands to
///
/// * an `async_trait` trait whose methods all return `Result<_, Error>`;
///   `Error` must implement [`Transmissible`](crate::Transmissible), so every
///   method can report the remote-call failure kind
/// * `impl Remote for dyn Trait`, carrying the interface descriptor and the
///   skeleton dispatch table
/// * an implementation of the trait for [`Stub<I>`](crate::Stub) that
///   encodes each call and sends it to the stub's server
/// * [`Extends`](crate::Extends) markers for the interface itself and each
///   listed parent, so a stub of a derived interface implements its parents
///
/// Parents must be in scope and declared with this macro. Interfaces deeper
/// than one level list every ancestor after the colon.
#[macro_export]
macro_rules! remote_interface {
    (
        $(#[$attr:meta])*
        $vis:vis trait $name:ident $(: $($parent:ident),+)? {
            type Error = $err:ty;
            $(
                $(#[$mattr:meta])*
                fn $method:ident(&self $(, $arg:ident : $ty:ty)* $(,)?) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$attr])*
        #[$crate::async_trait]
        $vis trait $name: $($($parent +)+)? ::core::marker::Send + ::core::marker::Sync {
            $(
                $(#[$mattr])*
                async fn $method(&self $(, $arg: $ty)*) -> ::core::result::Result<$ret, $err>;
            )*
        }

        impl $crate::Remote for dyn $name {
            const DESCRIPTOR: &'static $crate::InterfaceDescriptor = &$crate::InterfaceDescriptor {
                name: ::core::stringify!($name),
                methods: &[$(
                    $crate::MethodDescriptor {
                        name: ::core::stringify!($method),
                        arity: $crate::__arity!($($arg)*),
                        remote: true,
                    }
                ),*],
                extends: &[$($(<dyn $parent as $crate::Remote>::DESCRIPTOR),+)?],
            };

            #[allow(unused_mut)]
            fn method_table() -> $crate::MethodTable<Self> {
                let mut table: $crate::MethodTable<Self> =
                    $crate::MethodTable::new(::core::stringify!($name));
                $($(
                    table = table.inherit(<dyn $parent as $crate::Remote>::method_table(), {
                        fn upcast(
                            target: ::std::sync::Arc<dyn $name>,
                        ) -> ::std::sync::Arc<dyn $parent> {
                            target
                        }
                        upcast
                    });
                )+)?
                $(
                    table.register(
                        ::core::stringify!($method),
                        $crate::__arity!($($arg)*),
                        |target: ::std::sync::Arc<dyn $name>,
                         args: ::std::vec::Vec<$crate::Value>|
                         -> $crate::MethodFuture {
                            ::std::boxed::Box::pin(async move {
                                #[allow(unused_mut, unused_variables)]
                                let mut args = args.into_iter();
                                $(let $arg: $ty = $crate::take_arg(&mut args)?;)*
                                match $name::$method(&*target $(, $arg)*).await {
                                    ::core::result::Result::Ok(value) => {
                                        ::core::result::Result::Ok($crate::Wire::into_value(value))
                                    }
                                    ::core::result::Result::Err(error) => ::core::result::Result::Err(
                                        $crate::Transmissible::to_fault(&error),
                                    ),
                                }
                            })
                        },
                    );
                )*
                table
            }
        }

        #[$crate::async_trait]
        impl<I: ?Sized + $crate::Extends<dyn $name> + 'static> $name for $crate::Stub<I>
        where
            $($($crate::Stub<I>: $parent,)+)?
        {
            $(
                async fn $method(&self $(, $arg: $ty)*) -> ::core::result::Result<$ret, $err> {
                    self.invoke(
                        ::core::stringify!($method),
                        ::std::vec![$($crate::Argument::new($arg)),*],
                    )
                    .await
                }
            )*
        }

        impl $crate::Extends<dyn $name> for dyn $name {}
        $($(impl $crate::Extends<dyn $parent> for dyn $name {})+)?
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __arity {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + $crate::__arity!($($tail)*) };
}
