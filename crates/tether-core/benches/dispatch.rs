//! Dispatch benchmarks for Tether.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tether_core::{PeerHandle, Router, Session};

const ACTIVATE: &str = r#"{"kind":"activate","sender":"viewer-1","target":"device-9","timestamp":1700000000000}"#;

fn connect(router: &Router, identity: &str) -> (Session, tokio::sync::mpsc::Receiver<tether_core::Frame>) {
    let (peer, rx) = PeerHandle::channel(1024);
    let mut session = Session::accept(peer);
    let register = format!(r#"{{"kind":"register","sender":"{}"}}"#, identity);
    router.dispatch(&mut session, &register);
    (session, rx)
}

/// Benchmark forwarding to a registered target.
fn bench_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward");

    group.bench_function("activate", |b| {
        let router = Router::new();
        let (mut viewer, _viewer_rx) = connect(&router, "viewer-1");
        let (_device, mut device_rx) = connect(&router, "device-9");

        b.iter(|| {
            let outcome = router.dispatch(&mut viewer, black_box(ACTIVATE));
            let _ = device_rx.try_recv();
            outcome
        });
    });

    group.bench_function("offer_4k_sdp", |b| {
        let router = Router::new();
        let (mut viewer, _viewer_rx) = connect(&router, "viewer-1");
        let (_device, mut device_rx) = connect(&router, "device-9");
        let offer = format!(
            r#"{{"kind":"offer","sender":"viewer-1","target":"device-9","sdp":{{"type":"offer","sdp":"{}"}}}}"#,
            "a".repeat(4096)
        );

        b.iter(|| {
            let outcome = router.dispatch(&mut viewer, black_box(&offer));
            let _ = device_rx.try_recv();
            outcome
        });
    });

    group.bench_function("offline_target", |b| {
        let router = Router::new();
        let (mut viewer, _viewer_rx) = connect(&router, "viewer-1");

        b.iter(|| router.dispatch(&mut viewer, black_box(ACTIVATE)));
    });

    group.finish();
}

/// Benchmark registration churn against a populated registry.
fn bench_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("register");

    for peers in [10usize, 1000] {
        group.bench_function(format!("{}_peers", peers), |b| {
            let router = Router::new();
            let _sessions: Vec<_> = (0..peers)
                .map(|i| connect(&router, &format!("device-{}", i)))
                .collect();
            let (peer, _rx) = PeerHandle::channel(1);
            let mut session = Session::accept(peer);

            b.iter(|| {
                router.dispatch(
                    &mut session,
                    black_box(r#"{"kind":"register","sender":"viewer-1"}"#),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_forward, bench_register);
criterion_main!(benches);
