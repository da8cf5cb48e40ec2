//! 告警分发基准测试
//!
//! 测试告警决策、状态更新和消息模板渲染的性能

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use endpoint_watcher::config::AlerterConfig;
use endpoint_watcher::health::{CheckOutcome, EndpointStatus, StatusEvent};
use endpoint_watcher::notification::{AlertRecord, AlertTemplate, Dispatcher};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// 告警决策基准测试
fn dispatcher_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let _guard = runtime.enter();

    c.bench_function("process_event_suppressed", |b| {
        let (_tx, rx) = mpsc::channel(1);
        let mut dispatcher = Dispatcher::new(&AlerterConfig::default(), vec![], rx);

        let mut status = EndpointStatus::new();
        status.record(CheckOutcome::nok("down"), Utc::now());
        status.record(CheckOutcome::nok("down"), Utc::now());
        let event = StatusEvent::new("api", Arc::new(status));

        let now = Instant::now();
        dispatcher.process_event(&event, now);
        b.iter(|| black_box(dispatcher.process_event(black_box(&event), now)));
    });

    c.bench_function("process_event_many_endpoints", |b| {
        let (_tx, rx) = mpsc::channel(1);
        let mut dispatcher = Dispatcher::new(&AlerterConfig::default(), vec![], rx);

        let events: Vec<_> = (0..100)
            .map(|i| {
                let mut status = EndpointStatus::new();
                status.record(CheckOutcome::nok("down"), Utc::now());
                StatusEvent::new(format!("endpoint-{i}"), Arc::new(status))
            })
            .collect();

        let start = Instant::now();
        let mut offset = 0u64;
        b.iter(|| {
            offset += 1;
            let now = start + Duration::from_secs(offset);
            for event in &events {
                black_box(dispatcher.process_event(event, now));
            }
        });
    });
}

/// 状态更新基准测试
fn status_benchmark(c: &mut Criterion) {
    c.bench_function("status_record_and_snapshot", |b| {
        let mut status = EndpointStatus::new();
        let outcomes = [CheckOutcome::ok(), CheckOutcome::nok("timeout")];
        let mut i = 0usize;
        b.iter(|| {
            status.record(outcomes[i % 2].clone(), Utc::now());
            i += 1;
            black_box(Arc::new(status.clone()))
        });
    });
}

/// 模板渲染基准测试
fn template_benchmark(c: &mut Criterion) {
    c.bench_function("alert_template_rendering", |b| {
        let template = AlertTemplate::new(None).unwrap();
        let record = AlertRecord {
            endpoint_name: "production-api".to_string(),
            ok: false,
            error: "expected status code (200) differs from actual (503)".to_string(),
            output_url: "https://watcher.example.com/endpoints/production-api/output".to_string(),
            consecutive: 3,
            latest_ok_at: Some(Utc::now()),
            latest_nok_at: Some(Utc::now()),
        };

        b.iter(|| black_box(template.render(black_box(&record)).unwrap()));
    });
}

criterion_group!(
    benches,
    dispatcher_benchmark,
    status_benchmark,
    template_benchmark
);
criterion_main!(benches);
