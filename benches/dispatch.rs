use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dbmux::client::memory::{MemoryClient, MemoryServer};
use dbmux::client::{DatabaseType, StorageMode};
use dbmux::core::classify::classify;
use dbmux::core::connect::parse;
use dbmux::core::dispatcher::{DispatchDefaults, Dispatcher};
use dbmux::core::normalize::normalize_many;
use dbmux::core::record::{BackendRecord, BackendResult, BackendValue, RecordId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Record with scalars, links, a nested map and a binary payload
fn create_test_record(position: i64) -> BackendRecord {
    let mut meta = BTreeMap::new();
    meta.insert("thumb".to_string(), BackendValue::Binary(Bytes::from_static(b"BLOB")));
    meta.insert("label".to_string(), BackendValue::String("vertex".to_string()));

    BackendRecord::new("V")
        .with_rid(RecordId::new(9, position))
        .with_version(1)
        .with_property("name", format!("node_{}", position))
        .with_property("rank", position)
        .with_property("next", RecordId::new(9, position + 1))
        .with_property(
            "friends",
            BackendValue::List((0..8).map(|i| BackendValue::Link(RecordId::new(9, i))).collect()),
        )
        .with_property("meta", BackendValue::Map(meta))
}

fn bench_parse_and_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("front_end");

    let inputs = [
        ("full", "u:p@localhost:2424/mydb\nselect from V where name = 'x'"),
        ("alias", "u@mydb list classes"),
        ("bare", "insert into V set name = 'x'"),
    ];

    for (name, input) in inputs.iter() {
        group.bench_with_input(BenchmarkId::new("parse", name), input, |b, input| {
            b.iter(|| black_box(parse(black_box(input))));
        });
    }

    group.bench_function("classify", |b| {
        b.iter(|| {
            black_box(classify(black_box("create database foo plocal graph"), false));
            black_box(classify(black_box("select from V"), false));
            black_box(classify(black_box("g.V().count()"), true));
        });
    });

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for record_count in [10, 100, 1000].iter() {
        let raws: Vec<BackendResult> = (0..*record_count)
            .map(|i| BackendResult::Record(create_test_record(i)))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("normalize_many", record_count),
            &raws,
            |b, raws| {
                b.iter(|| black_box(normalize_many(raws)));
            },
        );
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let dispatcher = rt.block_on(async {
        let server = Arc::new(MemoryServer::new().with_user("u", "p"));
        server
            .create_database("mydb", StorageMode::Memory, DatabaseType::Graph)
            .await
            .unwrap();
        let client = MemoryClient::new().with_server("localhost", 2424, server);
        let dispatcher = Dispatcher::new(Arc::new(client), DispatchDefaults::default());

        dispatcher.dispatch("u:p@localhost/mydb", false).await.unwrap();
        for i in 0..100 {
            let insert = format!("insert into V set name = 'node_{}', rank = {}", i, i);
            dispatcher.dispatch(&insert, false).await.unwrap();
        }
        dispatcher
    });

    let mut group = c.benchmark_group("dispatch");

    group.bench_function("pooled_query", |b| {
        b.to_async(&rt).iter(|| async {
            let result = dispatcher.dispatch("select from V", false).await.unwrap();
            black_box(result);
        });
    });

    group.bench_function("pooled_alias_control", |b| {
        b.to_async(&rt).iter(|| async {
            let result = dispatcher.dispatch("u@mydb list classes", false).await.unwrap();
            black_box(result);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse_and_classify, bench_normalize, bench_dispatch);
criterion_main!(benches);
