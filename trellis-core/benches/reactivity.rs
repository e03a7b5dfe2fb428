//! Benchmarks for trigger fan-out and keyed reconciliation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use trellis_core::reactive::{Effect, Runtime, Target};
use trellis_core::render::{MemoryBackend, Node, Renderer};

fn trigger_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigger_fan_out");

    for subscribers in [1usize, 16, 256] {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        let effects: Vec<Effect> = (0..subscribers)
            .map(|_| {
                let s = state.clone();
                rt.effect(move || {
                    black_box(s.get("n"));
                })
            })
            .collect();

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, _| {
            let mut n = 0;
            b.iter(|| {
                n += 1;
                state.set("n", n);
            });
        });

        drop(effects);
    }

    group.finish();
}

fn list(keys: &[i64]) -> Node {
    Node::element("ul").with_children(
        keys.iter()
            .map(|k| Node::element("li").with_key(*k).with_text(k.to_string())),
    )
}

fn keyed_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_diff");

    for len in [10i64, 100, 1000] {
        let forward: Vec<i64> = (0..len).collect();
        let mut rotated = forward.clone();
        rotated.rotate_left(1);

        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("rotate", len), &len, |b, _| {
            let mut host = MemoryBackend::new();
            let root = host.create_root();
            let mut renderer = Renderer::new(host);
            let mut flip = false;

            b.iter(|| {
                flip = !flip;
                let keys = if flip { &rotated } else { &forward };
                renderer.render(Some(list(keys)), &root).expect("render");
                renderer.backend_mut().take_ops();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, trigger_fan_out, keyed_diff);
criterion_main!(benches);
