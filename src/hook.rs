//! Named extension points with three ordered callback phases.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::args::CallArgs;
use crate::callback::{Callback, CallbackSlot};
use crate::error::{BoxError, HookError, Result};
use crate::pipeline::{WrappedAsyncFn, WrappedFn};

/// The three callback phases of a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    /// Runs before the target; may short-circuit and supply the return value.
    Precall,
    /// Runs after the final value is known; observation only.
    Postcall,
    /// Transforms the return value in a left-to-right pipeline.
    Filtercall,
}

impl HookType {
    /// All three phases, in pipeline order.
    pub const ALL: [HookType; 3] = [HookType::Precall, HookType::Filtercall, HookType::Postcall];
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookType::Precall => "precall",
            HookType::Postcall => "postcall",
            HookType::Filtercall => "filtercall",
        };
        f.write_str(name)
    }
}

/// Whether a hook's pipeline is driven synchronously or asynchronously.
///
/// Fixed at the first wrap of a target callable; every callback registered
/// against the hook must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    Sync,
    Async,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMode::Sync => f.write_str("sync"),
            PipelineMode::Async => f.write_str("async"),
        }
    }
}

#[derive(Default)]
struct PhaseLists {
    precall: Vec<CallbackSlot>,
    filtercall: Vec<CallbackSlot>,
    postcall: Vec<CallbackSlot>,
}

impl PhaseLists {
    fn list_mut(&mut self, phase: HookType) -> &mut Vec<CallbackSlot> {
        match phase {
            HookType::Precall => &mut self.precall,
            HookType::Filtercall => &mut self.filtercall,
            HookType::Postcall => &mut self.postcall,
        }
    }
}

/// One named extension point.
///
/// Owns three ordered lists of non-owning callback slots (one per phase), an
/// allow-list restricting which phases may be used, and a sync/async mode
/// fixed at the first wrap. The mutex guards list mutation only; callbacks
/// are always invoked outside it, so a callback that registers or
/// deregisters on its own hook mid-call cannot deadlock.
pub struct Hook {
    name: String,
    allowed: HashSet<HookType>,
    mode: OnceLock<PipelineMode>,
    phases: Mutex<PhaseLists>,
}

impl Hook {
    pub(crate) fn new(name: String, allowed: HashSet<HookType>) -> Arc<Self> {
        Arc::new(Self {
            name,
            allowed,
            mode: OnceLock::new(),
            phases: Mutex::new(PhaseLists::default()),
        })
    }

    /// The hook's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The phases callbacks may subscribe to.
    pub fn allowed_phases(&self) -> &HashSet<HookType> {
        &self.allowed
    }

    /// The pipeline mode, or `None` before the first wrap.
    pub fn mode(&self) -> Option<PipelineMode> {
        self.mode.get().copied()
    }

    /// The mode used for registration checks. Before the first wrap an
    /// unset mode compares as sync, so async callbacks cannot sneak into a
    /// hook that may still become synchronous.
    fn effective_mode(&self) -> PipelineMode {
        self.mode().unwrap_or(PipelineMode::Sync)
    }

    fn lock_phases(&self) -> MutexGuard<'_, PhaseLists> {
        self.phases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a callback slot for `phase`.
    ///
    /// Validates the phase against the allow-list, the referent's liveness,
    /// its role against the phase, and its calling convention against the
    /// hook's mode. Registering the same callback twice for the same phase
    /// is a no-op.
    pub fn register(&self, phase: HookType, slot: CallbackSlot) -> Result<()> {
        if !self.allowed.contains(&phase) {
            return Err(HookError::PhaseNotAllowed {
                hook: self.name.clone(),
                phase,
            });
        }
        let callback = slot.upgrade().ok_or(HookError::ReferentAlreadyGone)?;
        if callback.role() != phase {
            return Err(HookError::CallableKindMismatch {
                role: callback.role(),
                phase,
            });
        }
        let expected = self.effective_mode();
        if callback.mode() != expected {
            return Err(HookError::SyncAsyncMismatch {
                hook: self.name.clone(),
                expected,
                found: callback.mode(),
            });
        }

        let mut phases = self.lock_phases();
        let list = phases.list_mut(phase);
        if list.iter().any(|existing| existing.same_referent(&slot)) {
            tracing::debug!(hook = %self.name, %phase, "callback already registered, skipping");
            return Ok(());
        }
        list.push(slot);
        tracing::debug!(hook = %self.name, %phase, "registered callback");
        Ok(())
    }

    /// Remove the first slot for `phase` that refers to `callback`.
    ///
    /// Returns `false` when no such slot exists.
    pub fn deregister(&self, phase: HookType, callback: &Callback) -> bool {
        let mut phases = self.lock_phases();
        let list = phases.list_mut(phase);
        match list.iter().position(|slot| slot.refers_to(callback)) {
            Some(index) => {
                list.remove(index);
                tracing::debug!(hook = %self.name, %phase, "deregistered callback");
                true
            }
            None => false,
        }
    }

    /// The currently-live callbacks for `phase`, in registration order.
    ///
    /// As a side effect, permanently removes every slot whose referent has
    /// been destroyed. The returned handles are a consistent snapshot as of
    /// the start of the phase; registrations made while the snapshot is
    /// being consumed are picked up by the next phase or call.
    pub fn snapshot(&self, phase: HookType) -> Vec<Callback> {
        let mut phases = self.lock_phases();
        let list = phases.list_mut(phase);
        let mut live = Vec::with_capacity(list.len());
        list.retain(|slot| match slot.upgrade() {
            Some(callback) => {
                live.push(callback);
                true
            }
            None => false,
        });
        live
    }

    /// True when any phase still holds a live slot. Dead slots are pruned.
    fn any_live_callbacks(&self) -> bool {
        HookType::ALL
            .iter()
            .any(|&phase| !self.snapshot(phase).is_empty())
    }

    /// Fix the pipeline mode at wrap time.
    ///
    /// The first wrap decides permanently; a later wrap of the other mode
    /// fails. The first wrap of an async target also fails when callbacks
    /// are already registered, since those are necessarily sync.
    fn fix_mode(&self, requested: PipelineMode) -> Result<()> {
        if requested == PipelineMode::Async
            && self.mode().is_none()
            && self.any_live_callbacks()
        {
            return Err(HookError::SyncAsyncMismatch {
                hook: self.name.clone(),
                expected: PipelineMode::Sync,
                found: PipelineMode::Async,
            });
        }
        let fixed = *self.mode.get_or_init(|| requested);
        if fixed != requested {
            return Err(HookError::SyncAsyncMismatch {
                hook: self.name.clone(),
                expected: fixed,
                found: requested,
            });
        }
        Ok(())
    }

    /// Wrap a synchronous target callable with this hook's pipeline.
    ///
    /// Consumes the handle; the returned pipeline keeps the hook alive.
    pub fn wrap<F>(self: Arc<Self>, target: F) -> Result<WrappedFn>
    where
        F: Fn(&CallArgs) -> std::result::Result<serde_json::Value, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.fix_mode(PipelineMode::Sync)?;
        Ok(WrappedFn::new(self, Box::new(target)))
    }

    /// Wrap an asynchronous target callable with this hook's pipeline.
    ///
    /// Consumes the handle; the returned pipeline keeps the hook alive.
    pub fn wrap_async<F>(self: Arc<Self>, target: F) -> Result<WrappedAsyncFn>
    where
        F: Fn(
                CallArgs,
            ) -> futures::future::BoxFuture<
                'static,
                std::result::Result<serde_json::Value, BoxError>,
            > + Send
            + Sync
            + 'static,
    {
        self.fix_mode(PipelineMode::Async)?;
        Ok(WrappedAsyncFn::new(self, Box::new(target)))
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phases = self.lock_phases();
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("mode", &self.mode.get())
            .field("precall", &phases.precall.len())
            .field("filtercall", &phases.filtercall.len())
            .field("postcall", &phases.postcall.len())
            .finish()
    }
}
