//! Watch invalidation with asynchronous callbacks.
//!
//! A callback that starts async work can mark it stale through the
//! invalidation hook; the work checks the flag before publishing a result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use trellis_core::reactive::{Runtime, Target, WatchOptions};

#[tokio::test]
async fn stale_results_are_dropped() {
    let rt = Runtime::new();
    let search = rt.reactive(Target::record([("query", "")]));
    let published = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let s = search.clone();
    let published_clone = published.clone();
    let _watcher = rt.watch(
        move || s.get("query").to_string(),
        move |_, query, invalidation| {
            let expired = Arc::new(AtomicBool::new(false));
            let flag = expired.clone();
            invalidation.on_invalidate(move || flag.store(true, Ordering::SeqCst));

            // The first lookup is slow, so it finishes after the second.
            let delay = if query == "slow" { 50 } else { 5 };
            let query = query.clone();
            let published = published_clone.clone();
            let done = done_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if !expired.load(Ordering::SeqCst) {
                    published.lock().push(query);
                }
                let _ = done.send(());
            });
        },
        WatchOptions::default(),
    );

    search.set("query", "slow");
    rt.run_microtasks();
    search.set("query", "fast");
    rt.run_microtasks();

    done_rx.recv().await;
    done_rx.recv().await;

    assert_eq!(*published.lock(), vec![String::from("fast")]);
}

#[tokio::test]
async fn post_flush_batches_synchronous_writes() {
    let rt = Runtime::new();
    let state = rt.reactive(Target::record([("n", 0)]));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let s = state.clone();
    let seen_clone = seen.clone();
    let _watcher = rt.watch(
        move || s.get("n").as_f64().unwrap_or_default() as i32,
        move |old, new, _| seen_clone.lock().push((old.copied(), *new)),
        WatchOptions::default(),
    );

    state.set("n", 1);
    state.set("n", 2);
    tokio::task::yield_now().await;
    assert!(seen.lock().is_empty());

    rt.run_microtasks();
    // Each write queued a job; both observe the latest value.
    assert_eq!(*seen.lock(), vec![(Some(0), 2), (Some(2), 2)]);
}
