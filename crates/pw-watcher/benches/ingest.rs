//! Ingest-path benchmarks for pw-watcher.

#![allow(clippy::unwrap_used, missing_docs)]

use std::hint::black_box;
use std::time::Duration;

use camino::Utf8PathBuf;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pw_core::{ChangeKind, NormalizedEvent, RawEvent, WatchTarget};
use pw_watcher::{ExcludeFilter, ManualSource, Normalizer, SinkError};

const KINDS: [ChangeKind; 4] = [
    ChangeKind::Created,
    ChangeKind::Modified,
    ChangeKind::Unknown,
    ChangeKind::Removed,
];

fn burst(distinct: usize, per_path: usize) -> Vec<RawEvent> {
    let mut seq = 0;
    (0..per_path)
        .flat_map(|round| (0..distinct).map(move |i| (round, i)))
        .map(|(round, i)| {
            seq += 1;
            RawEvent::new(format!("/srv/app/src/file_{i}.rs"), KINDS[round % KINDS.len()], seq)
        })
        .collect()
}

fn target() -> WatchTarget {
    WatchTarget::new(Utf8PathBuf::try_from(std::env::temp_dir()).unwrap())
}

fn noop(events: &[NormalizedEvent]) -> Result<(), SinkError> {
    black_box(events);
    Ok(())
}

fn bench_windowed_ingest(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();

    let mut group = c.benchmark_group("windowed_ingest");
    for distinct in [16usize, 256, 4096] {
        let events = burst(distinct, 4);
        group.throughput(Throughput::Elements(events.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(distinct), &events, |b, events| {
            let source = ManualSource::new();
            let mut handle = Normalizer::new(Duration::from_secs(3600))
                .start(&target(), source.clone(), noop)
                .unwrap();
            let producer = source.handle().unwrap();

            b.iter(|| {
                producer.ingest_batch(events.iter().cloned()).unwrap();
                black_box(handle.pending_paths())
            });
            handle.stop().unwrap();
        });
    }
    group.finish();
}

fn bench_immediate_ingest(c: &mut Criterion) {
    let events = burst(256, 4);
    let source = ManualSource::new();
    let mut handle = Normalizer::new(Duration::ZERO)
        .start(&target(), source.clone(), noop)
        .unwrap();
    let producer = source.handle().unwrap();

    c.bench_function("immediate_ingest_batch_1024", |b| {
        b.iter(|| producer.ingest_batch(events.iter().cloned()).unwrap());
    });
    handle.stop().unwrap();
}

fn bench_filtered_ingest(c: &mut Criterion) {
    let events = burst(256, 4);
    let source = ManualSource::new();
    let mut handle = Normalizer::new(Duration::ZERO)
        .with_filter(ExcludeFilter::new(["src", ".git"]))
        .start(&WatchTarget::new("/"), source.clone(), noop)
        .unwrap();
    let producer = source.handle().unwrap();

    c.bench_function("filtered_ingest_batch_1024", |b| {
        b.iter(|| producer.ingest_batch(events.iter().cloned()).unwrap());
    });
    handle.stop().unwrap();
}

criterion_group!(benches, bench_windowed_ingest, bench_immediate_ingest, bench_filtered_ingest);
criterion_main!(benches);
