use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use tokio::runtime::Runtime;

use chaos_proxy::chaos::{RandomSource, ShapingProfile, StreamShaper, ThreadRandom};
use chaos_proxy::config::{HeaderRules, MockRule, ProxyConfig, StatusRule};
use chaos_proxy::core::RoutingDirector;
use chaos_proxy::middleware::RuleEngine;
use chaos_proxy::monitor::Tamper;

fn bench_config(routes: usize) -> ProxyConfig {
    ProxyConfig {
        target_frontend: "http://localhost:3000".to_string(),
        target_backend: "http://localhost:4000".to_string(),
        chaos_routes: (0..routes).map(|i| format!("/svc{}", i)).collect(),
        lag_to_resp: 100,
        status_rules: (0..routes)
            .map(|i| StatusRule {
                id: String::new(),
                path_pattern: format!("/svc{}", i),
                status_code: 500,
                error_rate: 10,
            })
            .collect(),
        mock_rules: vec![MockRule {
            id: String::new(),
            path_pattern: "/mock".to_string(),
            body: "{}".to_string(),
            active: true,
        }],
        header_rules: HeaderRules {
            strip_cache: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    for routes in [1usize, 10, 100] {
        let config = bench_config(routes);
        group.bench_with_input(BenchmarkId::new("classify", routes), &config, |b, config| {
            b.iter(|| {
                let kind = RoutingDirector::classify(black_box("/svc99/orders/42"), config);
                RoutingDirector::resolve(kind, config).len()
            })
        });
    }
    group.finish();
}

fn bench_rules(c: &mut Criterion) {
    let random: Arc<dyn RandomSource> = Arc::new(ThreadRandom);
    let engine = RuleEngine::new(random);

    let mut group = c.benchmark_group("rules");
    for routes in [1usize, 10, 100] {
        let config = bench_config(routes);
        group.bench_with_input(BenchmarkId::new("evaluate", routes), &config, |b, config| {
            b.iter(|| engine.evaluate(black_box("/mock/users"), config))
        });
    }
    group.finish();

    let config = bench_config(10);
    c.bench_function("tamper_classify", |b| {
        b.iter(|| Tamper::classify(black_box(&config)))
    });
}

fn bench_shaper_passthrough(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let random: Arc<dyn RandomSource> = Arc::new(ThreadRandom);
    let frames: Vec<Bytes> = (0..64).map(|_| Bytes::from(vec![0u8; 16 * 1024])).collect();
    let total: usize = frames.iter().map(Bytes::len).sum();

    let mut group = c.benchmark_group("shaper");
    group.throughput(Throughput::Bytes(total as u64));
    group.bench_function("passthrough_1mib", |b| {
        b.to_async(&rt).iter(|| {
            let inner = stream::iter(
                frames
                    .clone()
                    .into_iter()
                    .map(Ok::<_, std::io::Error>),
            );
            let mut shaper = StreamShaper::new(inner, ShapingProfile::default(), random.clone());
            async move {
                let mut received = 0;
                while let Some(Ok(chunk)) = shaper.next_chunk().await {
                    received += chunk.len();
                }
                received
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_routing, bench_rules, bench_shaper_passthrough);
criterion_main!(benches);
