//! Error types for grapnel.

use crate::hook::{HookType, PipelineMode};

/// Errors raised by registration and lookup surfaces.
///
/// Every variant reflects a programming-time usage error, rejected
/// synchronously at the offending call with no partial state left behind.
/// Failures *inside* a callback or target during invocation are not part of
/// this taxonomy; they travel as [`BoxError`] through the pipeline to the
/// wrapped callable's caller.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("hook {name:?} already exists")]
    DuplicateHookName { name: String },

    #[error("no hook named {name:?}")]
    UnknownHookName { name: String },

    #[error("{phase} is not allowed on hook {hook:?}")]
    PhaseNotAllowed { hook: String, phase: HookType },

    #[error("a {role} callback cannot be registered for the {phase} phase")]
    CallableKindMismatch { role: HookType, phase: HookType },

    #[error("callback was already dropped before registration completed")]
    ReferentAlreadyGone,

    #[error("hook {hook:?} is {expected}, but the callable is {found}")]
    SyncAsyncMismatch {
        hook: String,
        expected: PipelineMode,
        found: PipelineMode,
    },

    #[error("member {key:?} is not callable")]
    NotCallable { key: String },

    #[error("container has no member {key:?}")]
    MissingMember { key: String },

    #[error("construction interception is not enabled for {type_name}")]
    ConstructionNotIntercepted { type_name: &'static str },

    #[error("{type_name} has no hookable method {method:?}")]
    UnknownMethod {
        type_name: &'static str,
        method: String,
    },
}

/// Result alias for registration and lookup surfaces.
pub type Result<T> = std::result::Result<T, HookError>;

/// Error type carried through the invocation path.
///
/// Callbacks and targets are user code; their failures propagate to the
/// original caller of the wrapped callable exactly as if the target itself
/// had failed.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
