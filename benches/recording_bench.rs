// benches/recording_bench.rs
//! Hot path of capture: normalize, redact, queue, seal
//!
//! ```bash
//! cargo bench --bench recording_bench
//! ```

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keytrace_engine::crypto::cipher::SessionCipher;
use keytrace_engine::recording::event::{KeystrokeEvent, RawInputEvent};
use keytrace_engine::recording::privacy::{apply_privacy, PrivacyTier};
use keytrace_engine::storage::event_queue::PendingQueue;
use keytrace_engine::storage::record::EncryptedEventRecord;

fn sample_event(sequence: u64) -> KeystrokeEvent {
    let normalized = RawInputEvent::Input {
        input_type: "insertText".into(),
        data: Some("The quick brown fox".into()),
        target: Some("editor".into()),
    }
    .normalize()
    .unwrap();

    KeystrokeEvent {
        id: format!("evt-{}", sequence),
        session_id: "bench-session".into(),
        sequence,
        relative_ms: sequence * 40,
        occurred_at: Utc::now(),
        kind: normalized.kind,
        payload: normalized.payload,
        modifiers: normalized.modifiers,
        functional_key: normalized.functional_key,
        target: normalized.target,
    }
}

fn benchmark_privacy(c: &mut Criterion) {
    let mut group = c.benchmark_group("privacy");
    let event = sample_event(1);

    for tier in [PrivacyTier::Full, PrivacyTier::Anonymized, PrivacyTier::MetadataOnly] {
        group.bench_with_input(BenchmarkId::from_parameter(tier.as_str()), &tier, |b, &tier| {
            b.iter(|| apply_privacy(black_box(event.clone()), tier))
        });
    }
    group.finish();
}

fn benchmark_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_queue");
    group.throughput(Throughput::Elements(1_000));

    group.bench_function("push_drain_1000", |b| {
        let queue = PendingQueue::new(1_000);
        let events: Vec<_> = (0..1_000).map(sample_event).collect();
        b.iter(|| {
            for event in &events {
                let _ = queue.push(event.clone());
            }
            while !queue.drain_batch(50).is_empty() {}
        })
    });
    group.finish();
}

fn benchmark_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("seal");
    let cipher = SessionCipher::new();

    for batch in [1u64, 50] {
        let events: Vec<_> = (0..batch).map(sample_event).collect();
        group.throughput(Throughput::Elements(batch));
        group.bench_with_input(BenchmarkId::new("events", batch), &events, |b, events| {
            b.iter(|| {
                for event in events {
                    black_box(EncryptedEventRecord::seal(event, &cipher).unwrap());
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_privacy, benchmark_queue, benchmark_seal);
criterion_main!(benches);
