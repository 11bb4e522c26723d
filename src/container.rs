//! Containers whose members can be hooked anonymously.
//!
//! The capability surface is deliberately closed: a container exposes
//! `get(key)` and `set(key)` over a small set of member kinds, nothing more.
//! The registry only ever asks it for the member at a key and writes the
//! wrapped form back.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::args::CallArgs;
use crate::error::BoxError;
use crate::pipeline::{WrappedAsyncFn, WrappedFn};

/// A shared synchronous callable member.
pub type SyncFn = Arc<dyn Fn(&CallArgs) -> Result<Value, BoxError> + Send + Sync>;

/// A shared asynchronous callable member.
pub type AsyncFn =
    Arc<dyn Fn(CallArgs) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync>;

/// One member of a hookable container.
#[derive(Clone)]
pub enum Member {
    /// A synchronous callable, not yet hooked.
    Sync(SyncFn),
    /// An asynchronous callable, not yet hooked.
    Async(AsyncFn),
    /// A callable already wrapped by a hook's pipeline.
    Wrapped(Arc<WrappedFn>),
    /// An async callable already wrapped by a hook's pipeline.
    WrappedAsync(Arc<WrappedAsyncFn>),
    /// A plain data member. Hooking it fails with `NotCallable`.
    Data(Value),
}

impl Member {
    /// Wrap a closure as a synchronous callable member.
    pub fn sync_fn<F>(f: F) -> Self
    where
        F: Fn(&CallArgs) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Member::Sync(Arc::new(f))
    }

    /// Wrap a closure as an asynchronous callable member.
    pub fn async_fn<F>(f: F) -> Self
    where
        F: Fn(CallArgs) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync + 'static,
    {
        Member::Async(Arc::new(f))
    }

    /// The hook name, when this member is already wrapped.
    pub fn hook_name(&self) -> Option<&str> {
        match self {
            Member::Wrapped(w) => Some(w.hook_name()),
            Member::WrappedAsync(w) => Some(w.hook_name()),
            _ => None,
        }
    }

    /// The wrapped sync pipeline, if that is what this member holds.
    pub fn as_wrapped(&self) -> Option<&WrappedFn> {
        match self {
            Member::Wrapped(w) => Some(w),
            _ => None,
        }
    }

    /// The wrapped async pipeline, if that is what this member holds.
    pub fn as_wrapped_async(&self) -> Option<&WrappedAsyncFn> {
        match self {
            Member::WrappedAsync(w) => Some(w),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Member::Sync(_) => f.write_str("Member::Sync"),
            Member::Async(_) => f.write_str("Member::Async"),
            Member::Wrapped(w) => write!(f, "Member::Wrapped({:?})", w.hook_name()),
            Member::WrappedAsync(w) => write!(f, "Member::WrappedAsync({:?})", w.hook_name()),
            Member::Data(v) => write!(f, "Member::Data({v})"),
        }
    }
}

/// A container whose members can be hooked by key.
pub trait HookContainer {
    /// The member under `key`, if present.
    fn member(&self, key: &str) -> Option<&Member>;

    /// Replace (or insert) the member under `key`.
    fn set_member(&mut self, key: &str, member: Member);
}

/// A keyed table of named members, the simplest hookable container.
#[derive(Debug, Default)]
pub struct FnTable {
    members: HashMap<String, Member>,
}

impl FnTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member, replacing any existing one under the same key.
    pub fn insert(&mut self, key: impl Into<String>, member: Member) {
        self.members.insert(key.into(), member);
    }

    /// The keys currently present, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

impl HookContainer for FnTable {
    fn member(&self, key: &str) -> Option<&Member> {
        self.members.get(key)
    }

    fn set_member(&mut self, key: &str, member: Member) {
        self.members.insert(key.to_string(), member);
    }
}
