//! The invocation pipeline produced by wrapping a target callable.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use serde_json::Value;

use crate::args::CallArgs;
use crate::callback::PreOutcome;
use crate::error::BoxError;
use crate::hook::{Hook, HookType};

pub(crate) type SyncTarget = dyn Fn(&CallArgs) -> Result<Value, BoxError> + Send + Sync;
pub(crate) type AsyncTarget =
    dyn Fn(CallArgs) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;

enum Target<'a> {
    Sync(&'a SyncTarget),
    Async(&'a AsyncTarget),
}

/// The four-step dispatch shared verbatim by both pipeline surfaces, so the
/// sync and async orderings cannot drift.
///
/// PRECALL runs in registration order until the first short-circuit; if none
/// short-circuits the target runs. FILTERCALL then reduces the value left to
/// right, and POSTCALL observes the final value. Phase snapshots are taken
/// at the start of each phase, outside the hook's lock.
async fn dispatch(hook: &Hook, args: &CallArgs, target: Target<'_>) -> Result<Value, BoxError> {
    let mut short_circuit = None;
    for callback in hook.snapshot(HookType::Precall) {
        if let PreOutcome::ShortCircuit(value) = callback.invoke_pre(args).await? {
            tracing::debug!(hook = %hook.name(), "precall short-circuited the target");
            short_circuit = Some(value);
            break;
        }
    }

    let mut value = match short_circuit {
        Some(value) => value,
        None => match target {
            Target::Sync(f) => f(args)?,
            Target::Async(f) => f(args.clone()).await?,
        },
    };

    for callback in hook.snapshot(HookType::Filtercall) {
        value = callback.invoke_filter(value, args).await?;
    }

    for callback in hook.snapshot(HookType::Postcall) {
        callback.invoke_post(&value, args).await?;
    }

    Ok(value)
}

/// Poll a never-suspending future to completion without entering an
/// executor. Sync-mode dispatch awaits only immediately-ready futures, so
/// the first poll must return `Ready`.
fn drive<F: Future>(future: F) -> F::Output {
    let mut future = std::pin::pin!(future);
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    match future.as_mut().poll(&mut cx) {
        Poll::Ready(output) => output,
        Poll::Pending => unreachable!("sync-mode dispatch suspended"),
    }
}

/// A synchronous target callable wrapped with its hook's pipeline.
///
/// This is what callers actually invoke in place of the original target.
/// Holds the only strong reference the library keeps to the [`Hook`], so the
/// hook lives exactly as long as something can still call through it.
pub struct WrappedFn {
    hook: Arc<Hook>,
    target: Box<SyncTarget>,
}

impl WrappedFn {
    pub(crate) fn new(hook: Arc<Hook>, target: Box<SyncTarget>) -> Self {
        Self { hook, target }
    }

    /// Run the full pipeline for one call.
    ///
    /// A sync-mode hook holds only non-suspending callables (enforced at
    /// registration), so the shared dispatch completes on its first poll.
    /// No executor is entered, which keeps nested hooked calls (a target or
    /// callback that itself calls another wrapped callable) safe.
    pub fn call(&self, args: &CallArgs) -> Result<Value, BoxError> {
        drive(dispatch(&self.hook, args, Target::Sync(&*self.target)))
    }

    /// The name of the hook this pipeline runs through.
    pub fn hook_name(&self) -> &str {
        self.hook.name()
    }

    /// The hook this pipeline runs through.
    pub fn hook(&self) -> &Arc<Hook> {
        &self.hook
    }
}

impl fmt::Debug for WrappedFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedFn")
            .field("hook", &self.hook.name())
            .finish_non_exhaustive()
    }
}

/// An asynchronous target callable wrapped with its hook's pipeline.
pub struct WrappedAsyncFn {
    hook: Arc<Hook>,
    target: Box<AsyncTarget>,
}

impl WrappedAsyncFn {
    pub(crate) fn new(hook: Arc<Hook>, target: Box<AsyncTarget>) -> Self {
        Self { hook, target }
    }

    /// Run the full pipeline for one call, awaiting every phase callback
    /// and the target. Ordering and short-circuit semantics are the same
    /// code path as the synchronous surface.
    pub async fn call(&self, args: CallArgs) -> Result<Value, BoxError> {
        dispatch(&self.hook, &args, Target::Async(&*self.target)).await
    }

    /// The name of the hook this pipeline runs through.
    pub fn hook_name(&self) -> &str {
        self.hook.name()
    }

    /// The hook this pipeline runs through.
    pub fn hook(&self) -> &Arc<Hook> {
        &self.hook
    }
}

impl fmt::Debug for WrappedAsyncFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedAsyncFn")
            .field("hook", &self.hook.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Callback;
    use serde_json::json;

    fn open_hook(name: &str) -> Arc<Hook> {
        Hook::new(name.to_string(), HookType::ALL.into_iter().collect())
    }

    #[test]
    fn pipeline_keeps_its_hook_alive() {
        let wrapped = {
            let hook = open_hook("keeper");
            hook.wrap(|_| Ok(json!(1))).unwrap()
        };
        assert_eq!(wrapped.hook_name(), "keeper");
        assert_eq!(wrapped.call(&CallArgs::new()).unwrap(), json!(1));
    }

    #[test]
    fn hooked_targets_can_call_other_hooked_targets() {
        let inner = Arc::new(
            open_hook("inner")
                .wrap(|args: &CallArgs| {
                    let n = args.get(0).and_then(Value::as_i64).unwrap_or(0);
                    Ok(json!(n + 1))
                })
                .unwrap(),
        );

        let outer = {
            let inner = Arc::clone(&inner);
            open_hook("outer")
                .wrap(move |args: &CallArgs| {
                    let n = args.get(0).and_then(Value::as_i64).unwrap_or(0);
                    inner.call(&CallArgs::new().arg(json!(n * 10)))
                })
                .unwrap()
        };

        assert_eq!(outer.call(&CallArgs::new().arg(json!(4))).unwrap(), json!(41));
    }

    #[test]
    fn precall_registered_mid_call_applies_to_the_next_call() {
        let hook = open_hook("mid_call");
        let wrapped = Arc::clone(&hook).wrap(|_| Ok(json!("target"))).unwrap();

        // A postcall that registers a precall on its own hook must not
        // deadlock, and the new precall only fires on the following call.
        let late_pre = Callback::precall(|_| Ok(PreOutcome::short_circuit("late")));
        let registrar = {
            let hook = Arc::clone(&hook);
            let late_pre = late_pre.clone();
            Callback::postcall(move |_, _| {
                hook.register(HookType::Precall, late_pre.slot())?;
                Ok(())
            })
        };
        hook.register(HookType::Postcall, registrar.slot()).unwrap();

        assert_eq!(wrapped.call(&CallArgs::new()).unwrap(), json!("target"));
        assert_eq!(wrapped.call(&CallArgs::new()).unwrap(), json!("late"));
    }
}
