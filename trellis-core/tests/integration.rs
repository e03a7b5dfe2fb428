//! Integration Tests for Reactive System
//!
//! These tests verify that proxies, effects, computed values, watchers and
//! the job queue work together correctly.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use trellis_core::reactive::{EffectOptions, Runtime, Target, TargetKind, Value, WatchOptions};
use trellis_core::schedule::{Job, JobId};
use trellis_core::RuntimeConfig;

fn number(value: Value) -> i32 {
    value.as_f64().unwrap_or_default() as i32
}

/// Test that an effect re-runs only for the fields it read.
#[test]
fn effects_track_exactly_what_they_read() {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("f", 1), ("g", 1)]));
    let runs = Arc::new(AtomicI32::new(0));

    let s = state.clone();
    let runs_clone = runs.clone();
    let _effect = rt.effect(move || {
        let _ = s.get("f");
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    state.set("g", 2);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("f", 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that nested objects read through a proxy are reactive too.
#[test]
fn nested_reads_are_deeply_reactive() {
    let rt = Runtime::new();
    let user = Target::record([("name", "ada")]);
    let state = rt.reactive(Target::record([("user", Value::Object(user.clone()))]));
    let seen = Arc::new(Mutex::new(String::new()));

    let s = state.clone();
    let seen_clone = seen.clone();
    let _effect = rt.effect(move || {
        let user = s.get("user");
        let name = user.as_proxy().map(|u| u.get("name")).unwrap_or_default();
        *seen_clone.lock() = name.to_string();
    });

    // The same nested object always comes back as the same proxy.
    assert_eq!(state.get("user"), state.get("user"));

    let nested = rt.reactive(user);
    nested.set("name", "grace");
    assert_eq!(*seen.lock(), "grace");
}

/// Test the array length truncation rule.
#[test]
fn truncating_an_array_notifies_readers_of_removed_indices() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::array(["a", "b", "c"]));
    let runs = Arc::new(AtomicI32::new(0));

    let l = list.clone();
    let runs_clone = runs.clone();
    let _effect = rt.effect(move || {
        let _ = l.get(2);
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    list.set_len(5);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    list.set_len(1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Test that two effects pushing into the same array do not feed each other.
#[test]
fn pushing_effects_do_not_loop() {
    let rt = Runtime::new();
    let list = rt.reactive(Target::empty(TargetKind::Array));

    let a = list.clone();
    let _first = rt.effect(move || {
        a.push(1);
    });
    let b = list.clone();
    let _second = rt.effect(move || {
        b.push(2);
    });

    assert_eq!(list.len(), 2);
}

/// Test that a raw element can be found in a reactive array.
#[test]
fn searches_fall_back_to_raw_elements() {
    let rt = Runtime::new();
    let item = Target::record([("id", 1)]);
    let list = rt.reactive(Target::array([Value::Object(item.clone())]));

    assert!(list.includes(&Value::Object(item.clone())));
    assert_eq!(list.index_of(&Value::Object(item)), Some(0));
}

/// Test map iteration notifications, including writes of equal values.
#[test]
fn map_for_each_sees_every_entry_write() {
    let rt = Runtime::new();
    let map = rt.reactive(Target::map([("a", 1)]));
    let runs = Arc::new(AtomicI32::new(0));

    let m = map.clone();
    let runs_clone = runs.clone();
    let _effect = rt.effect(move || {
        m.for_each(|_, _| {});
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    map.set("b", 2);
    map.delete("a");
    map.set("b", 2);
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

/// Test that the queued scheduler batches a burst of writes into one run.
#[test]
fn queued_effects_run_once_per_flush() {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("n", 0)]));
    let runs = Arc::new(AtomicI32::new(0));

    let s = state.clone();
    let runs_clone = runs.clone();
    let options = EffectOptions::default().with_shared_scheduler(rt.queued_scheduler());
    let _effect = rt.effect_with(
        move || {
            let _ = s.get("n");
            runs_clone.fetch_add(1, Ordering::SeqCst);
        },
        options,
    );

    state.set("n", 1);
    state.set("n", 2);
    state.set("n", 3);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(rt.pending_jobs(), 1);

    rt.run_microtasks();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(rt.pending_jobs(), 0);
}

/// Test that jobs with the same id collapse and distinct jobs keep their order.
#[test]
fn job_queue_dedups_and_keeps_order() {
    let rt = Runtime::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let id = JobId::task();

    for label in ["first", "first again", "first once more"] {
        let log = log.clone();
        rt.queue_job(Job::with_id(id, move || log.lock().push(label)));
    }
    let l = log.clone();
    rt.queue_job(Job::new(move || l.lock().push("second")));

    rt.run_microtasks();
    assert_eq!(*log.lock(), vec!["first", "second"]);
}

/// Test computed memoization end to end.
#[test]
fn computed_recomputes_lazily() {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("price", 3), ("qty", 2)]));
    let evals = Arc::new(AtomicI32::new(0));

    let s = state.clone();
    let evals_clone = evals.clone();
    let total = rt.computed(move || {
        evals_clone.fetch_add(1, Ordering::SeqCst);
        number(s.get("price")) * number(s.get("qty"))
    });

    assert_eq!(total.get(), 6);
    assert_eq!(total.get(), 6);
    assert_eq!(evals.load(Ordering::SeqCst), 1);

    state.set("qty", 5);
    assert_eq!(evals.load(Ordering::SeqCst), 1);
    assert_eq!(total.get(), 15);
    assert_eq!(evals.load(Ordering::SeqCst), 2);
}

/// Test watch timing: immediate and post flush.
#[test]
fn watch_immediate_then_post_flush() {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("n", 1)]));
    let calls = Arc::new(Mutex::new(Vec::new()));

    let s = state.clone();
    let calls_clone = calls.clone();
    let _watcher = rt.watch(
        move || number(s.get("n")),
        move |old, new, _| calls_clone.lock().push((old.copied(), *new)),
        WatchOptions::default().immediate(),
    );
    assert_eq!(*calls.lock(), vec![(None, 1)]);

    state.set("n", 2);
    assert_eq!(calls.lock().len(), 1);

    rt.run_microtasks();
    assert_eq!(*calls.lock(), vec![(None, 1), (Some(1), 2)]);
}

/// Test that refs and readonly views compose.
#[test]
fn readonly_views_reject_writes_but_still_read() {
    let rt = Runtime::with_config(RuntimeConfig {
        warn_on_readonly_write: false,
        ..RuntimeConfig::default()
    });
    let count = rt.ref_value(1);
    let state = rt.reactive(Target::record([("count", Value::from(count.clone()))]));
    let view = rt.readonly(state.raw().clone());

    view.set("count", 99);
    assert_eq!(view.get("count"), Value::from(1));

    count.set(2);
    assert_eq!(view.get("count"), Value::from(2));
    assert_eq!(state.get("count"), Value::from(2));
}

/// Test that runtimes do not share tracking state.
#[test]
fn runtimes_are_independent() {
    let first = Runtime::new();
    let second = Runtime::new();
    let target = Target::record([("n", 0)]);
    let runs = Arc::new(AtomicI32::new(0));

    let observed = first.reactive(target.clone());
    let runs_clone = runs.clone();
    let _effect = first.effect(move || {
        let _ = observed.get("n");
        runs_clone.fetch_add(1, Ordering::SeqCst);
    });

    second.reactive(target).set("n", 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}
