//! Callback handles and the non-owning slots stored inside hooks.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use futures::future::BoxFuture;
use serde_json::Value;

use crate::args::CallArgs;
use crate::error::BoxError;
use crate::hook::{HookType, PipelineMode};

/// What a PRECALL callback decided about the call.
#[derive(Debug, Clone, PartialEq)]
pub enum PreOutcome {
    /// Did not intercept; the phase continues.
    Pass,
    /// Supply the return value and suppress the target call.
    ShortCircuit(Value),
}

impl PreOutcome {
    /// Shorthand for [`PreOutcome::Pass`].
    pub fn pass() -> Self {
        PreOutcome::Pass
    }

    /// Shorthand for [`PreOutcome::ShortCircuit`].
    pub fn short_circuit(value: impl Into<Value>) -> Self {
        PreOutcome::ShortCircuit(value.into())
    }
}

pub(crate) type PreFn = dyn Fn(&CallArgs) -> Result<PreOutcome, BoxError> + Send + Sync;
pub(crate) type PreAsyncFn =
    dyn Fn(CallArgs) -> BoxFuture<'static, Result<PreOutcome, BoxError>> + Send + Sync;
pub(crate) type FilterFn = dyn Fn(Value, &CallArgs) -> Result<Value, BoxError> + Send + Sync;
pub(crate) type FilterAsyncFn =
    dyn Fn(Value, CallArgs) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;
pub(crate) type PostFn = dyn Fn(&Value, &CallArgs) -> Result<(), BoxError> + Send + Sync;
pub(crate) type PostAsyncFn =
    dyn Fn(Value, CallArgs) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

/// The six role x mode callable kinds.
enum Callable {
    Pre(Box<PreFn>),
    PreAsync(Box<PreAsyncFn>),
    Filter(Box<FilterFn>),
    FilterAsync(Box<FilterAsyncFn>),
    Post(Box<PostFn>),
    PostAsync(Box<PostAsyncFn>),
}

impl Callable {
    fn role(&self) -> HookType {
        match self {
            Callable::Pre(_) | Callable::PreAsync(_) => HookType::Precall,
            Callable::Filter(_) | Callable::FilterAsync(_) => HookType::Filtercall,
            Callable::Post(_) | Callable::PostAsync(_) => HookType::Postcall,
        }
    }

    fn mode(&self) -> PipelineMode {
        match self {
            Callable::Pre(_) | Callable::Filter(_) | Callable::Post(_) => PipelineMode::Sync,
            Callable::PreAsync(_) | Callable::FilterAsync(_) | Callable::PostAsync(_) => {
                PipelineMode::Async
            }
        }
    }
}

struct Inner {
    callable: Callable,
    /// `(hook name, phase)` recorded at subscribe time, read by `unsubscribe`.
    subscription: Mutex<Option<(String, HookType)>>,
}

/// The owning handle a subscriber keeps for as long as the subscription
/// should stay alive.
///
/// Cloning is cheap and shares the same identity; the subscription inside a
/// hook expires once every clone is dropped. Equality is pointer identity.
#[derive(Clone)]
pub struct Callback {
    inner: Arc<Inner>,
}

impl Callback {
    fn from_callable(callable: Callable) -> Self {
        Self {
            inner: Arc::new(Inner {
                callable,
                subscription: Mutex::new(None),
            }),
        }
    }

    /// A synchronous PRECALL callback.
    pub fn precall<F>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<PreOutcome, BoxError> + Send + Sync + 'static,
    {
        Self::from_callable(Callable::Pre(Box::new(f)))
    }

    /// An asynchronous PRECALL callback.
    pub fn precall_async<F>(f: F) -> Self
    where
        F: Fn(CallArgs) -> BoxFuture<'static, Result<PreOutcome, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        Self::from_callable(Callable::PreAsync(Box::new(f)))
    }

    /// A synchronous FILTERCALL callback.
    pub fn filtercall<F>(f: F) -> Self
    where
        F: Fn(Value, &CallArgs) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::from_callable(Callable::Filter(Box::new(f)))
    }

    /// An asynchronous FILTERCALL callback.
    pub fn filtercall_async<F>(f: F) -> Self
    where
        F: Fn(Value, CallArgs) -> BoxFuture<'static, Result<Value, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        Self::from_callable(Callable::FilterAsync(Box::new(f)))
    }

    /// A synchronous POSTCALL callback.
    pub fn postcall<F>(f: F) -> Self
    where
        F: Fn(&Value, &CallArgs) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::from_callable(Callable::Post(Box::new(f)))
    }

    /// An asynchronous POSTCALL callback.
    pub fn postcall_async<F>(f: F) -> Self
    where
        F: Fn(Value, CallArgs) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync + 'static,
    {
        Self::from_callable(Callable::PostAsync(Box::new(f)))
    }

    /// The phase this callback's signature fits.
    pub fn role(&self) -> HookType {
        self.inner.callable.role()
    }

    /// Whether this callback is synchronous or asynchronous.
    pub fn mode(&self) -> PipelineMode {
        self.inner.callable.mode()
    }

    /// The non-owning form stored inside a hook's phase list.
    pub fn slot(&self) -> CallbackSlot {
        CallbackSlot {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The `(hook name, phase)` recorded at subscribe time, if any.
    pub fn subscription(&self) -> Option<(String, HookType)> {
        self.inner
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn record_subscription(&self, hook: &str, phase: HookType) {
        *self
            .inner
            .subscription
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some((hook.to_string(), phase));
    }

    pub(crate) async fn invoke_pre(&self, args: &CallArgs) -> Result<PreOutcome, BoxError> {
        match &self.inner.callable {
            Callable::Pre(f) => f(args),
            Callable::PreAsync(f) => f(args.clone()).await,
            // Registration confines each callable kind to its own phase list.
            _ => unreachable!("non-precall callable in the precall list"),
        }
    }

    pub(crate) async fn invoke_filter(
        &self,
        value: Value,
        args: &CallArgs,
    ) -> Result<Value, BoxError> {
        match &self.inner.callable {
            Callable::Filter(f) => f(value, args),
            Callable::FilterAsync(f) => f(value, args.clone()).await,
            _ => unreachable!("non-filtercall callable in the filtercall list"),
        }
    }

    pub(crate) async fn invoke_post(&self, value: &Value, args: &CallArgs) -> Result<(), BoxError> {
        match &self.inner.callable {
            Callable::Post(f) => f(value, args),
            Callable::PostAsync(f) => f(value.clone(), args.clone()).await,
            _ => unreachable!("non-postcall callable in the postcall list"),
        }
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("role", &self.role())
            .field("mode", &self.mode())
            .field("subscription", &self.subscription())
            .finish()
    }
}

/// Non-owning reference to a [`Callback`], stored inside a hook's phase list.
///
/// Resolves to absent once every owning handle is gone; dead slots are pruned
/// lazily under the hook's lock.
#[derive(Clone)]
pub struct CallbackSlot {
    inner: Weak<Inner>,
}

impl CallbackSlot {
    /// The owning handle, or `None` if the referent is gone.
    pub(crate) fn upgrade(&self) -> Option<Callback> {
        self.inner.upgrade().map(|inner| Callback { inner })
    }

    /// True when this slot refers to `callback`.
    pub(crate) fn refers_to(&self, callback: &Callback) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&callback.inner))
    }

    /// True when this slot and `other` share a referent (live or not).
    pub(crate) fn same_referent(&self, other: &CallbackSlot) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for CallbackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(cb) => write!(f, "CallbackSlot({:?}, {:?})", cb.role(), cb.mode()),
            None => write!(f, "CallbackSlot(<dead>)"),
        }
    }
}
