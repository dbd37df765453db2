/// Benchmarks for the retention store.
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use equipstat::ingest;
use equipstat::models::{EnvelopeSummary, MeasurementRow};
use equipstat::retention::{
    EnvelopeBackend, MemoryBackend, RetentionStore, SledBackend, DEFAULT_CAPACITY,
};

fn get_test_summary() -> EnvelopeSummary {
    let rows: Vec<MeasurementRow> = (0..10)
        .map(|i| {
            MeasurementRow::new()
                .with("Equipment Name", format!("Pump-{}", i).as_str())
                .with("Type", "Pump")
                .with("Flowrate", 10.0 * i as f64)
                .with("Pressure", 5.0)
                .with("Temperature", 100.0)
        })
        .collect();
    ingest::build(&rows).unwrap()
}

type BackendFn = fn() -> Box<dyn EnvelopeBackend>;

fn criterion_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let summary = get_test_summary();
    let backends: [(&str, BackendFn); 2] = [
        ("memory", || Box::new(MemoryBackend::new())),
        ("sled", || Box::new(SledBackend::temporary().unwrap())),
    ];
    for (backend_name, backend) in backends {
        let store = RetentionStore::open(backend(), DEFAULT_CAPACITY).unwrap();
        let name = format!("append({})", backend_name);
        c.bench_function(&name, |b| {
            b.to_async(&runtime)
                .iter(|| async { store.append(black_box(summary.clone())).await.unwrap() })
        });
        let name = format!("list({})", backend_name);
        c.bench_function(&name, |b| {
            b.to_async(&runtime)
                .iter(|| async { store.list(black_box(5)).await })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
