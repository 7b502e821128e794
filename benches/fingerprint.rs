//! 指纹与匹配路径基准测试

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::{Duration, Utc};
use deeplinker::attribution::select_match;
use deeplinker::config::AttributionConfig;
use deeplinker::fingerprint::{ClientSignals, FingerprintDeriver, FingerprintInput};
use deeplinker::storage::{ClickEvent, OpenEvent, Platform, ResolutionOutcome};

// ============== 指纹派生 ==============

fn bench_derive(c: &mut Criterion) {
    let plain = FingerprintDeriver::new(&AttributionConfig::default());
    let with_signals = FingerprintDeriver::new(&AttributionConfig {
        include_browser_family: true,
        signal_keys: vec!["screen".into(), "tz".into(), "apps".into()],
        ..Default::default()
    });

    let mut signals = ClientSignals::new();
    signals.insert("screen".into(), "1170x2532".into());
    signals.insert("tz".into(), "Europe/Berlin".into());
    signals.insert("apps".into(), "maps,mail,photos,music".into());

    let input = FingerprintInput {
        platform: Platform::Ios,
        os_version: Some("17.4.1"),
        ip: "203.0.113.7".parse().ok(),
        browser: Some("Safari"),
        signals: Some(&signals),
    };

    c.bench_function("fingerprint/derive_plain", |b| {
        b.iter(|| plain.derive(black_box(&input)))
    });
    c.bench_function("fingerprint/derive_signals", |b| {
        b.iter(|| with_signals.derive(black_box(&input)))
    });

    let v6 = FingerprintInput {
        ip: "2001:db8:1234:5678::1".parse().ok(),
        ..input
    };
    c.bench_function("fingerprint/derive_ipv6", |b| {
        b.iter(|| plain.derive(black_box(&v6)))
    });
}

// ============== 候选选择 ==============

fn click(i: usize, country: &str) -> ClickEvent {
    ClickEvent {
        id: format!("click-{:05}", i),
        dedup_key: format!("click-{:05}", i),
        link_id: "promo".into(),
        platform: Platform::Android,
        browser: "Chrome".into(),
        user_agent: String::new(),
        ip_address: None,
        country: Some(country.into()),
        state: None,
        city: None,
        fingerprint: "fp".into(),
        outcome: ResolutionOutcome::AppInstallPrompt,
        deep_path: None,
        classifier_degraded: false,
        created_at: Utc::now() - Duration::seconds(i as i64),
    }
}

fn bench_select_match(c: &mut Criterion) {
    let open = OpenEvent {
        id: "open".into(),
        dedup_key: "open".into(),
        device_id: None,
        platform: Platform::Android,
        os_version: Some("14".into()),
        browser: "unknown".into(),
        user_agent: String::new(),
        ip_address: None,
        country: Some("DE".into()),
        state: None,
        city: None,
        fingerprint: "fp".into(),
        deep_path: None,
        success: true,
        classifier_degraded: false,
        created_at: Utc::now(),
    };

    let mut group = c.benchmark_group("matcher/select");
    for size in [2usize, 50, 1000] {
        let candidates: Vec<_> = (0..size)
            .map(|i| click(i, if i % 3 == 0 { "DE" } else { "FR" }))
            .collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &candidates, |b, cands| {
            b.iter(|| select_match(black_box(&open), black_box(cands)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_derive, bench_select_match);
criterion_main!(benches);
