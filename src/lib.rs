//! Named call-interception hooks with weak subscriptions and dual
//! sync/async pipelines.
//!
//! A target callable is wrapped once under a named extension point (a
//! [`Hook`]); any number of independent callbacks subscribe to run before
//! it, after it, or to transform its result, without the target knowing
//! about them in advance. Subscriptions are non-owning and expire passively
//! when their owner disappears, so hooking a method on an object never
//! keeps that object alive.
//!
//! # The three phases
//!
//! ```text
//!   call(args)
//!      │
//!      ▼
//!   PRECALL ──── first short-circuit supplies the value, target skipped
//!      │
//!      ▼
//!   target(args)
//!      │
//!      ▼
//!   FILTERCALL ─ left-to-right value transformation
//!      │
//!      ▼
//!   POSTCALL ─── observation only
//!      │
//!      ▼
//!   final value
//! ```
//!
//! # Example
//!
//! ```
//! use grapnel::prelude::*;
//! use serde_json::json;
//!
//! let registry = HookRegistry::new();
//! let hook = registry.declare("double").unwrap();
//!
//! // The registry holds hooks weakly; the handle keeps "double" alive
//! // until the wrapped callable takes over ownership.
//! let doubled = hook
//!     .wrap(|args: &CallArgs| {
//!         let x = args.get(0).and_then(|v| v.as_i64()).unwrap_or(0);
//!         Ok(json!(x * 2))
//!     })
//!     .unwrap();
//!
//! let plus_one = Callback::filtercall(|value, _args| {
//!     Ok(json!(value.as_i64().unwrap_or(0) + 1))
//! });
//! registry
//!     .subscribe("double", HookType::Filtercall, &plus_one)
//!     .unwrap();
//!
//! let result = doubled.call(&CallArgs::new().arg(5)).unwrap();
//! assert_eq!(result, json!(11));
//! ```
//!
//! Asynchronous targets use [`HookRegistry::wrap_async`] and the `*_async`
//! callback constructors; the pipeline's ordering and short-circuit
//! semantics are the same code path for both modes. A hook's mode is fixed
//! at the first wrap, and callbacks of the other mode are rejected at
//! subscribe time.
//!
//! Callbacks subscribed against a type's methods before any instance
//! exists are parked and activated per instance at construction; see
//! [`intercept`] and [`HookRegistry::subscribe_unbound`].

pub mod args;
pub mod callback;
pub mod container;
pub mod error;
pub mod hook;
pub mod intercept;
pub mod pipeline;
pub mod registry;
pub mod testing;

pub use args::CallArgs;
pub use callback::{Callback, CallbackSlot, PreOutcome};
pub use container::{FnTable, HookContainer, Member};
pub use error::{BoxError, HookError, Result};
pub use hook::{Hook, HookType, PipelineMode};
pub use intercept::{InstanceBindings, Intercepted, MethodSpec, MethodThunk};
pub use pipeline::{WrappedAsyncFn, WrappedFn};
pub use registry::HookRegistry;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::args::CallArgs;
    pub use crate::callback::{Callback, PreOutcome};
    pub use crate::container::{FnTable, HookContainer, Member};
    pub use crate::error::{BoxError, HookError, Result};
    pub use crate::hook::{Hook, HookType, PipelineMode};
    pub use crate::intercept::{InstanceBindings, Intercepted, MethodSpec, MethodThunk};
    pub use crate::registry::HookRegistry;
}
