//! Asynchronous pipeline semantics and sync/async mode enforcement.

use grapnel::prelude::*;
use grapnel::testing::{CallCounter, Recorder};
use serde_json::json;

#[tokio::test]
async fn async_pipeline_mirrors_the_sync_ordering() {
    let registry = HookRegistry::new();
    let hook = registry.declare("async_full").unwrap();
    let wrapped = hook
        .wrap_async(|args: CallArgs| {
            Box::pin(async move {
                let x = args.get(0).and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(x * 10))
            })
        })
        .unwrap();

    let recorder = Recorder::new();
    let pre = {
        let recorder = recorder.clone();
        Callback::precall_async(move |_| {
            let recorder = recorder.clone();
            Box::pin(async move {
                recorder.record("pre");
                Ok(PreOutcome::Pass)
            })
        })
    };
    let filter = Callback::filtercall_async(|value, _| {
        Box::pin(async move { Ok(json!(value.as_i64().unwrap_or(0) + 1)) })
    });
    let post = {
        let recorder = recorder.clone();
        Callback::postcall_async(move |value, _| {
            let recorder = recorder.clone();
            Box::pin(async move {
                recorder.record(value);
                Ok(())
            })
        })
    };
    registry.subscribe("async_full", HookType::Precall, &pre).unwrap();
    registry.subscribe("async_full", HookType::Filtercall, &filter).unwrap();
    registry.subscribe("async_full", HookType::Postcall, &post).unwrap();

    let result = wrapped.call(CallArgs::new().arg(4)).await.unwrap();
    assert_eq!(result, json!(41));
    assert_eq!(recorder.entries(), vec![json!("pre"), json!(41)]);
}

#[tokio::test]
async fn async_precall_short_circuits_without_running_the_target() {
    let registry = HookRegistry::new();
    let hook = registry.declare("async_pre").unwrap();

    let counter = CallCounter::new();
    let wrapped = {
        let counter = counter.clone();
        hook.wrap_async(move |_| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.bump();
                    Ok(json!(true))
                })
            })
            .unwrap()
    };

    let pre = Callback::precall_async(|_| Box::pin(async { Ok(PreOutcome::short_circuit(false)) }));
    registry.subscribe("async_pre", HookType::Precall, &pre).unwrap();

    assert_eq!(wrapped.call(CallArgs::new()).await.unwrap(), json!(false));
    assert_eq!(counter.calls(), 0);
}

#[tokio::test]
async fn async_filter_chain_transforms_the_awaited_result() {
    let registry = HookRegistry::new();
    let hook = registry.declare("async_filter").unwrap();
    let wrapped = hook
        .wrap_async(|args: CallArgs| {
            Box::pin(async move {
                let x = args.get(0).and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(x))
            })
        })
        .unwrap();

    let tenfold = Callback::filtercall_async(|value, _| {
        Box::pin(async move { Ok(json!(value.as_i64().unwrap_or(0) * 10)) })
    });
    registry
        .subscribe("async_filter", HookType::Filtercall, &tenfold)
        .unwrap();

    assert_eq!(wrapped.call(CallArgs::new().arg(3)).await.unwrap(), json!(30));
}

#[tokio::test]
async fn sync_callback_on_an_async_hook_is_rejected_at_subscribe_time() {
    let registry = HookRegistry::new();
    let hook = registry.declare("async_only").unwrap();
    let _wrapped = hook
        .wrap_async(|_| Box::pin(async { Ok(json!(0)) }))
        .unwrap();

    let sync_pre = Callback::precall(|_| Ok(PreOutcome::Pass));
    let err = registry
        .subscribe("async_only", HookType::Precall, &sync_pre)
        .unwrap_err();
    assert!(matches!(
        err,
        HookError::SyncAsyncMismatch {
            expected: PipelineMode::Async,
            found: PipelineMode::Sync,
            ..
        }
    ));
    assert!(registry.inspect("async_only", HookType::Precall).unwrap().is_empty());
}

#[test]
fn async_callback_on_a_sync_hook_is_rejected_at_subscribe_time() {
    let registry = HookRegistry::new();
    let hook = registry.declare("sync_only").unwrap();
    let _wrapped = hook.wrap(|_: &CallArgs| Ok(json!(0))).unwrap();

    let async_post = Callback::postcall_async(|_, _| Box::pin(async { Ok(()) }));
    let err = registry
        .subscribe("sync_only", HookType::Postcall, &async_post)
        .unwrap_err();
    assert!(matches!(
        err,
        HookError::SyncAsyncMismatch {
            expected: PipelineMode::Sync,
            found: PipelineMode::Async,
            ..
        }
    ));
}

#[tokio::test]
async fn async_callback_errors_propagate_to_the_awaiting_caller() {
    let registry = HookRegistry::new();
    let hook = registry.declare("async_faulty").unwrap();
    let wrapped = hook
        .wrap_async(|_| Box::pin(async { Ok(json!(0)) }))
        .unwrap();

    let filter = Callback::filtercall_async(|_, _| {
        Box::pin(async { Err("filter exploded".into()) })
    });
    registry
        .subscribe("async_faulty", HookType::Filtercall, &filter)
        .unwrap();

    let err = wrapped.call(CallArgs::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "filter exploded");
}

#[tokio::test]
async fn dropped_async_callback_expires() {
    let registry = HookRegistry::new();
    let hook = registry.declare("async_expiry").unwrap();
    let wrapped = hook
        .wrap_async(|_| Box::pin(async { Ok(json!(0)) }))
        .unwrap();

    let fired = CallCounter::new();
    let post = {
        let fired = fired.clone();
        Callback::postcall_async(move |_, _| {
            let fired = fired.clone();
            Box::pin(async move {
                fired.bump();
                Ok(())
            })
        })
    };
    registry.subscribe("async_expiry", HookType::Postcall, &post).unwrap();

    wrapped.call(CallArgs::new()).await.unwrap();
    assert_eq!(fired.calls(), 1);

    drop(post);
    wrapped.call(CallArgs::new()).await.unwrap();
    assert_eq!(fired.calls(), 1);
}
