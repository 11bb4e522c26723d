//! Deferred per-instance binding for callbacks subscribed against a type's
//! methods before any instance exists.
//!
//! A type opts in by implementing [`Intercepted`]: a closed table of its
//! hookable methods plus a per-instance [`InstanceBindings`] holder. Its
//! constructor must call `HookRegistry::bind_instance` right after building
//! the instance; that is the construction interception point, and it is a
//! required, visible step rather than an implicit side effect of class
//! decoration. A type whose constructor skips the call silently never
//! activates pending registrations for it.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::BoxFuture;
use serde_json::Value;

use crate::args::CallArgs;
use crate::callback::{Callback, PreOutcome};
use crate::error::BoxError;
use crate::hook::{HookType, PipelineMode};

/// A method thunk taking the receiver first, one per role x mode kind.
///
/// All arms are plain function pointers so method tables can live in
/// `'static` slices.
pub enum MethodThunk<T> {
    Pre(fn(&T, &CallArgs) -> Result<PreOutcome, BoxError>),
    PreAsync(fn(Arc<T>, CallArgs) -> BoxFuture<'static, Result<PreOutcome, BoxError>>),
    Filter(fn(&T, Value, &CallArgs) -> Result<Value, BoxError>),
    FilterAsync(fn(Arc<T>, Value, CallArgs) -> BoxFuture<'static, Result<Value, BoxError>>),
    Post(fn(&T, &Value, &CallArgs) -> Result<(), BoxError>),
    PostAsync(fn(Arc<T>, Value, CallArgs) -> BoxFuture<'static, Result<(), BoxError>>),
}

impl<T> Clone for MethodThunk<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MethodThunk<T> {}

/// One entry in a type's hookable-method table.
pub struct MethodSpec<T> {
    /// The method name `subscribe_unbound` matches against.
    pub name: &'static str,
    /// The receiver-first thunk invoked once bound to an instance.
    pub thunk: MethodThunk<T>,
}

impl<T> MethodSpec<T> {
    /// The phase this method's signature fits.
    pub fn role(&self) -> HookType {
        match self.thunk {
            MethodThunk::Pre(_) | MethodThunk::PreAsync(_) => HookType::Precall,
            MethodThunk::Filter(_) | MethodThunk::FilterAsync(_) => HookType::Filtercall,
            MethodThunk::Post(_) | MethodThunk::PostAsync(_) => HookType::Postcall,
        }
    }

    /// Whether the method is synchronous or asynchronous.
    pub fn mode(&self) -> PipelineMode {
        match self.thunk {
            MethodThunk::Pre(_) | MethodThunk::Filter(_) | MethodThunk::Post(_) => {
                PipelineMode::Sync
            }
            MethodThunk::PreAsync(_) | MethodThunk::FilterAsync(_) | MethodThunk::PostAsync(_) => {
                PipelineMode::Async
            }
        }
    }
}

impl<T: Intercepted> MethodSpec<T> {
    /// Bind the thunk to one receiver, yielding the owning callback.
    ///
    /// The receiver is held weakly, so the callback never extends the
    /// instance's life. If the instance is torn down on another thread
    /// while a phase snapshot still holds the callback, the bound thunk is
    /// inert: pass, identity, or no-op by role.
    pub(crate) fn bind(&self, receiver: Weak<T>) -> Callback {
        match self.thunk {
            MethodThunk::Pre(f) => Callback::precall(move |args| match receiver.upgrade() {
                Some(instance) => f(&instance, args),
                None => Ok(PreOutcome::Pass),
            }),
            MethodThunk::PreAsync(f) => {
                Callback::precall_async(move |args| match receiver.upgrade() {
                    Some(instance) => f(instance, args),
                    None => Box::pin(async { Ok(PreOutcome::Pass) }),
                })
            }
            MethodThunk::Filter(f) => {
                Callback::filtercall(move |value, args| match receiver.upgrade() {
                    Some(instance) => f(&instance, value, args),
                    None => Ok(value),
                })
            }
            MethodThunk::FilterAsync(f) => {
                Callback::filtercall_async(move |value, args| match receiver.upgrade() {
                    Some(instance) => f(instance, value, args),
                    None => Box::pin(async move { Ok(value) }),
                })
            }
            MethodThunk::Post(f) => Callback::postcall(move |value, args| {
                match receiver.upgrade() {
                    Some(instance) => f(&instance, value, args),
                    None => Ok(()),
                }
            }),
            MethodThunk::PostAsync(f) => {
                Callback::postcall_async(move |value, args| match receiver.upgrade() {
                    Some(instance) => f(instance, value, args),
                    None => Box::pin(async { Ok(()) }),
                })
            }
        }
    }
}

impl<T> fmt::Debug for MethodSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSpec")
            .field("name", &self.name)
            .field("role", &self.role())
            .field("mode", &self.mode())
            .finish()
    }
}

/// Per-instance holder for the callbacks activated at construction.
///
/// Owns the bound callbacks, so every activated registration expires
/// exactly when the instance is dropped.
#[derive(Default)]
pub struct InstanceBindings {
    held: Mutex<Vec<Callback>>,
}

impl InstanceBindings {
    /// An empty holder, for use in constructors.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn hold(&self, callback: Callback) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    /// Number of activations currently held.
    pub fn len(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True when construction activated nothing for this instance.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InstanceBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceBindings")
            .field("held", &self.len())
            .finish()
    }
}

/// A type whose instances can activate pending unbound-method
/// registrations at construction.
pub trait Intercepted: Send + Sync + 'static {
    /// The closed table of hookable methods.
    fn hook_methods() -> &'static [MethodSpec<Self>]
    where
        Self: Sized;

    /// The per-instance holder field.
    fn bindings(&self) -> &InstanceBindings;
}
