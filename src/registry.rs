//! The process-wide (or per-test) table of named hooks.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::args::CallArgs;
use crate::callback::Callback;
use crate::container::{HookContainer, Member};
use crate::error::{BoxError, HookError, Result};
use crate::hook::{Hook, HookType};
use crate::intercept::Intercepted;
use crate::pipeline::{WrappedAsyncFn, WrappedFn};

/// A registration parked until instances of the target type exist.
#[derive(Debug, Clone)]
struct PendingUnbound {
    hook: String,
    phase: HookType,
}

/// Mapping from hook name to hook, non-owning toward each hook.
///
/// A hook stays alive only while something holds its invocation wrapper
/// (or the handle returned by [`declare`](Self::declare)); the registry's
/// entry goes stale with it and is reclaimed opportunistically. Construct
/// one registry per process, or one per test, and pass it by reference;
/// nothing here is ambient global state.
///
/// The registry also owns the two deferred-binding tables, so independent
/// registries never share pending registrations or interception markers.
pub struct HookRegistry {
    hooks: Mutex<HashMap<String, Weak<Hook>>>,
    /// `(type, method name) -> (hook name, phase)`, consumed on every bind.
    pending: Mutex<HashMap<(TypeId, String), PendingUnbound>>,
    /// Types with construction interception enabled.
    intercepted: Mutex<HashSet<TypeId>>,
}

impl HookRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            intercepted: Mutex::new(HashSet::new()),
        }
    }

    fn lock_hooks(&self) -> MutexGuard<'_, HashMap<String, Weak<Hook>>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a hook allowing all three phases.
    ///
    /// The returned handle is a strong reference; the hook dies once every
    /// handle and every pipeline wrapping it are gone. The registry itself
    /// holds hooks weakly, so hold the handle at least until something else
    /// (typically the wrapped callable) owns the hook, or later lookups by
    /// name fail with `UnknownHookName`.
    pub fn declare(&self, name: &str) -> Result<Arc<Hook>> {
        self.declare_restricted(name, HookType::ALL)
    }

    /// Declare a hook restricted to the given phases.
    pub fn declare_restricted(
        &self,
        name: &str,
        phases: impl IntoIterator<Item = HookType>,
    ) -> Result<Arc<Hook>> {
        let mut hooks = self.lock_hooks();
        if let Some(existing) = hooks.get(name) {
            if existing.strong_count() > 0 {
                return Err(HookError::DuplicateHookName {
                    name: name.to_string(),
                });
            }
            // Dead entry under this name; reclaim it.
        }
        let hook = Hook::new(name.to_string(), phases.into_iter().collect());
        hooks.insert(name.to_string(), Arc::downgrade(&hook));
        tracing::debug!(hook = %name, "declared hook");
        Ok(hook)
    }

    /// The live hook under `name`.
    pub fn lookup(&self, name: &str) -> Result<Arc<Hook>> {
        self.lock_hooks()
            .get(name)
            .and_then(Weak::upgrade)
            .ok_or_else(|| HookError::UnknownHookName {
                name: name.to_string(),
            })
    }

    /// Names of all currently-live hooks. Stale entries are pruned.
    pub fn hook_names(&self) -> Vec<String> {
        let mut hooks = self.lock_hooks();
        hooks.retain(|_, weak| weak.strong_count() > 0);
        hooks.keys().cloned().collect()
    }

    /// Wrap a synchronous target with the named hook's pipeline.
    pub fn wrap<F>(&self, name: &str, target: F) -> Result<WrappedFn>
    where
        F: Fn(&CallArgs) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.lookup(name)?.wrap(target)
    }

    /// Wrap an asynchronous target with the named hook's pipeline.
    pub fn wrap_async<F>(&self, name: &str, target: F) -> Result<WrappedAsyncFn>
    where
        F: Fn(CallArgs) -> BoxFuture<'static, std::result::Result<Value, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        self.lookup(name)?.wrap_async(target)
    }

    /// Register `callback` for `phase` on the named hook, recording the
    /// subscription on the callback for later [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, name: &str, phase: HookType, callback: &Callback) -> Result<()> {
        let hook = self.lookup(name)?;
        hook.register(phase, callback.slot())?;
        callback.record_subscription(name, phase);
        Ok(())
    }

    /// Remove the registration recorded on `callback` at subscribe time.
    ///
    /// Returns `false` when the callback was never subscribed, its hook has
    /// died, or the slot was already pruned.
    pub fn unsubscribe(&self, callback: &Callback) -> bool {
        let Some((name, phase)) = callback.subscription() else {
            return false;
        };
        let Some(hook) = self.lock_hooks().get(&name).and_then(Weak::upgrade) else {
            return false;
        };
        hook.deregister(phase, callback)
    }

    /// Diagnostics snapshot of the named hook's live callbacks for `phase`.
    pub fn inspect(&self, name: &str, phase: HookType) -> Result<Vec<Callback>> {
        Ok(self.lookup(name)?.snapshot(phase))
    }

    /// Alias for [`inspect`](Self::inspect).
    pub fn list_callbacks(&self, name: &str, phase: HookType) -> Result<Vec<Callback>> {
        self.inspect(name, phase)
    }

    /// Hook `container`'s member at `key`, creating an anonymous hook on
    /// demand.
    ///
    /// Idempotent: when the member is already wrapped, its existing hook
    /// name is returned and nothing changes. Otherwise a fresh uniquely
    /// named hook is declared, the callable is wrapped, and the wrapped
    /// form is written back into the container.
    pub fn hook_member(&self, container: &mut dyn HookContainer, key: &str) -> Result<String> {
        let member = container
            .member(key)
            .ok_or_else(|| HookError::MissingMember {
                key: key.to_string(),
            })?;

        if let Some(existing) = member.hook_name() {
            return Ok(existing.to_string());
        }

        let member = member.clone();
        let name = anonymous_hook_name(key);
        match member {
            Member::Sync(f) => {
                let hook = self.declare(&name)?;
                let wrapped = hook.wrap(move |args| f(args))?;
                container.set_member(key, Member::Wrapped(Arc::new(wrapped)));
            }
            Member::Async(f) => {
                let hook = self.declare(&name)?;
                let wrapped = hook.wrap_async(move |args| f(args))?;
                container.set_member(key, Member::WrappedAsync(Arc::new(wrapped)));
            }
            Member::Data(_) => {
                return Err(HookError::NotCallable {
                    key: key.to_string(),
                });
            }
            // hook_name() returned None above, so these cannot be wrapped.
            Member::Wrapped(_) | Member::WrappedAsync(_) => unreachable!(),
        }
        tracing::debug!(hook = %name, member = %key, "hooked container member");
        Ok(name)
    }

    /// [`hook_member`](Self::hook_member) followed by
    /// [`subscribe`](Self::subscribe).
    pub fn subscribe_member(
        &self,
        container: &mut dyn HookContainer,
        key: &str,
        phase: HookType,
        callback: &Callback,
    ) -> Result<()> {
        let name = self.hook_member(container, key)?;
        self.subscribe(&name, phase, callback)
    }

    /// Enable construction interception for `T`. Idempotent.
    pub fn enable_interception<T: Intercepted>(&self) {
        let newly = self
            .intercepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>());
        if newly {
            tracing::debug!(r#type = std::any::type_name::<T>(), "enabled interception");
        }
    }

    fn is_intercepted<T: Intercepted>(&self) -> bool {
        self.intercepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&TypeId::of::<T>())
    }

    /// Park a registration against `T`'s method until instances exist.
    ///
    /// Fully validated here, before any instance is constructed: the type
    /// must be enabled for interception, the method must appear in `T`'s
    /// method table, the hook must be live, and the method's role and mode
    /// must satisfy the same checks direct registration would apply. A
    /// later call for the same method replaces the pending entry.
    pub fn subscribe_unbound<T: Intercepted>(
        &self,
        method: &str,
        hook_name: &str,
        phase: HookType,
    ) -> Result<()> {
        if !self.is_intercepted::<T>() {
            return Err(HookError::ConstructionNotIntercepted {
                type_name: std::any::type_name::<T>(),
            });
        }
        let spec = T::hook_methods()
            .iter()
            .find(|spec| spec.name == method)
            .ok_or_else(|| HookError::UnknownMethod {
                type_name: std::any::type_name::<T>(),
                method: method.to_string(),
            })?;
        let hook = self.lookup(hook_name)?;
        if !hook.allowed_phases().contains(&phase) {
            return Err(HookError::PhaseNotAllowed {
                hook: hook_name.to_string(),
                phase,
            });
        }
        if spec.role() != phase {
            return Err(HookError::CallableKindMismatch {
                role: spec.role(),
                phase,
            });
        }
        let expected = hook.mode().unwrap_or(crate::hook::PipelineMode::Sync);
        if spec.mode() != expected {
            return Err(HookError::SyncAsyncMismatch {
                hook: hook_name.to_string(),
                expected,
                found: spec.mode(),
            });
        }

        let replaced = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (TypeId::of::<T>(), method.to_string()),
                PendingUnbound {
                    hook: hook_name.to_string(),
                    phase,
                },
            );
        if replaced.is_some() {
            tracing::debug!(
                r#type = std::any::type_name::<T>(),
                %method,
                "replaced pending unbound registration"
            );
        }
        Ok(())
    }

    /// Activate every pending registration matching `T`'s methods for one
    /// freshly constructed instance. Returns the number of activations.
    ///
    /// This is the construction interception point: `T`'s constructor calls
    /// it right after building the instance. Each activation binds the
    /// method thunk to a weak receiver and stores the owning callback in
    /// the instance's [`InstanceBindings`](crate::intercept::InstanceBindings),
    /// so it expires exactly when the instance is dropped. Pending entries
    /// are read, never removed; every later instance activates
    /// independently.
    ///
    /// A pending entry whose hook has since died is skipped: hook death is
    /// passive and must not break construction of unrelated objects.
    pub fn bind_instance<T: Intercepted>(&self, instance: &Arc<T>) -> Result<usize> {
        if !self.is_intercepted::<T>() {
            return Err(HookError::ConstructionNotIntercepted {
                type_name: std::any::type_name::<T>(),
            });
        }

        let mut activated = 0;
        for spec in T::hook_methods() {
            let pending = {
                let table = self
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                table
                    .get(&(TypeId::of::<T>(), spec.name.to_string()))
                    .cloned()
            };
            let Some(PendingUnbound { hook: name, phase }) = pending else {
                continue;
            };
            let Some(hook) = self.lock_hooks().get(&name).and_then(Weak::upgrade) else {
                tracing::debug!(hook = %name, method = spec.name, "pending hook died, skipping");
                continue;
            };

            let callback = spec.bind(Arc::downgrade(instance));
            hook.register(phase, callback.slot())?;
            callback.record_subscription(&name, phase);
            instance.bindings().hold(callback);
            activated += 1;
            tracing::debug!(
                hook = %name,
                method = spec.name,
                r#type = std::any::type_name::<T>(),
                "activated per-instance registration"
            );
        }
        Ok(activated)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hook_names())
            .finish_non_exhaustive()
    }
}

fn anonymous_hook_name(key: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("hook_{key}_{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::PreOutcome;
    use serde_json::json;

    #[test]
    fn declare_then_lookup() {
        let registry = HookRegistry::new();
        let hook = registry.declare("metrics").unwrap();
        assert!(Arc::ptr_eq(&hook, &registry.lookup("metrics").unwrap()));
        assert_eq!(registry.hook_names(), vec!["metrics".to_string()]);
    }

    #[test]
    fn duplicate_name_rejected_while_live() {
        let registry = HookRegistry::new();
        let _hook = registry.declare("once").unwrap();
        let err = registry.declare("once").unwrap_err();
        assert!(matches!(err, HookError::DuplicateHookName { .. }));
    }

    #[test]
    fn dead_name_is_reclaimed() {
        let registry = HookRegistry::new();
        drop(registry.declare("transient").unwrap());
        assert!(matches!(
            registry.lookup("transient").unwrap_err(),
            HookError::UnknownHookName { .. }
        ));
        registry.declare("transient").unwrap();
    }

    #[test]
    fn hook_dies_with_its_last_keeper() {
        let registry = HookRegistry::new();
        let wrapped = registry
            .declare("kept")
            .unwrap()
            .wrap(|_| Ok(json!(0)))
            .unwrap();

        // The pipeline is now the hook's sole keeper.
        assert!(registry.lookup("kept").is_ok());
        drop(wrapped);
        assert!(registry.lookup("kept").is_err());
        assert!(registry.hook_names().is_empty());
    }

    #[test]
    fn unsubscribe_uses_the_recorded_subscription() {
        let registry = HookRegistry::new();
        let _hook = registry.declare("obs").unwrap();
        let cb = Callback::precall(|_| Ok(PreOutcome::Pass));

        assert!(!registry.unsubscribe(&cb));
        registry.subscribe("obs", HookType::Precall, &cb).unwrap();
        assert_eq!(registry.inspect("obs", HookType::Precall).unwrap().len(), 1);

        assert!(registry.unsubscribe(&cb));
        assert!(!registry.unsubscribe(&cb));
        assert!(registry.inspect("obs", HookType::Precall).unwrap().is_empty());
    }

    #[test]
    fn anonymous_names_are_distinct() {
        let a = anonymous_hook_name("f");
        let b = anonymous_hook_name("f");
        assert!(a.starts_with("hook_f_"));
        assert_ne!(a, b);
    }
}
