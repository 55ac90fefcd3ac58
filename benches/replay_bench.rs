// benches/replay_bench.rs
//! Timeline construction and scrubbing cost, with and without checkpoints
//!
//! ```bash
//! cargo bench --bench replay_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keytrace_engine::recording::event::{EventKind, EventPayload, Modifiers};
use keytrace_engine::replay::document::ContentModel;
use keytrace_engine::replay::player::{PlaybackConfig, Player};
use keytrace_engine::replay::timeline::{ReplayEvent, Timeline};

/// Typing with a backspace every seventh event, 25 ms apart
fn typing_session(len: u64) -> Vec<ReplayEvent> {
    (1..=len)
        .map(|sequence| {
            let (kind, payload) = if sequence % 7 == 0 {
                (EventKind::Delete, EventPayload::default())
            } else {
                (EventKind::Insert, EventPayload::text("x".into()))
            };
            ReplayEvent {
                sequence,
                timestamp_ms: sequence * 25,
                kind,
                payload,
                modifiers: Modifiers::default(),
                target: None,
            }
        })
        .collect()
}

fn benchmark_timeline_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("timeline_build");
    let events = typing_session(20_000);

    for interval in [0usize, 500] {
        group.bench_with_input(BenchmarkId::new("checkpoint_interval", interval), &interval, |b, &interval| {
            b.iter(|| Timeline::new(black_box(events.clone()), ContentModel::AppendOnly, interval))
        });
    }
    group.finish();
}

fn benchmark_seek(c: &mut Criterion) {
    let mut group = c.benchmark_group("seek");
    let events = typing_session(20_000);
    let duration = 20_000.0 * 25.0;

    for interval in [0usize, 500] {
        let mut player = Player::new(PlaybackConfig {
            checkpoint_interval: interval,
            ..PlaybackConfig::default()
        });
        player.load_timeline(Timeline::new(events.clone(), ContentModel::AppendOnly, interval));

        group.bench_function(BenchmarkId::new("checkpoint_interval", interval), |b| {
            let mut step = 0u64;
            b.iter(|| {
                // Scrub around the timeline in uneven steps
                step = (step + 7_919) % 1_000;
                player.seek(black_box(duration * step as f64 / 1_000.0)).unwrap();
                black_box(player.content().len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_timeline_build, benchmark_seek);
criterion_main!(benches);
