//! Concurrent invocation and registration against a shared hook.

use std::sync::Arc;
use std::thread;

use grapnel::prelude::*;
use grapnel::testing::CallCounter;
use serde_json::json;

#[test]
fn calls_and_subscriptions_race_safely() {
    let registry = Arc::new(HookRegistry::new());
    let hook = registry.declare("busy").unwrap();
    let wrapped = Arc::new(hook.wrap(|_: &CallArgs| Ok(json!(1))).unwrap());

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let wrapped = Arc::clone(&wrapped);
            thread::spawn(move || {
                for _ in 0..200 {
                    let value = wrapped.call(&CallArgs::new()).unwrap();
                    // At most one doubling filter is registered at a time.
                    let value = value.as_i64().unwrap();
                    assert!(value == 1 || value == 2, "unexpected value {value}");
                }
            })
        })
        .collect();

    let churn = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for _ in 0..50 {
                let double = Callback::filtercall(|v, _| Ok(json!(v.as_i64().unwrap_or(1) * 2)));
                registry.subscribe("busy", HookType::Filtercall, &double).unwrap();
                assert!(registry.unsubscribe(&double));
            }
        })
    };

    for caller in callers {
        caller.join().unwrap();
    }
    churn.join().unwrap();
    assert!(registry.inspect("busy", HookType::Filtercall).unwrap().is_empty());
}

#[test]
fn dropping_subscribers_mid_traffic_only_stops_their_effect() {
    let registry = Arc::new(HookRegistry::new());
    let hook = registry.declare("turnstile").unwrap();
    let wrapped = Arc::new(hook.wrap(|_: &CallArgs| Ok(json!(0))).unwrap());

    let seen = CallCounter::new();
    let post = {
        let seen = seen.clone();
        Callback::postcall(move |_, _| {
            seen.bump();
            Ok(())
        })
    };
    registry.subscribe("turnstile", HookType::Postcall, &post).unwrap();

    let caller = {
        let wrapped = Arc::clone(&wrapped);
        thread::spawn(move || {
            for _ in 0..500 {
                wrapped.call(&CallArgs::new()).unwrap();
            }
        })
    };
    drop(post);
    caller.join().unwrap();

    let settled = seen.calls();
    wrapped.call(&CallArgs::new()).unwrap();
    assert_eq!(seen.calls(), settled);
    assert!(registry.inspect("turnstile", HookType::Postcall).unwrap().is_empty());
}
