//! Benchmarks for direct channel hot paths
//!
//! Run with: cargo bench -p direct-channel-core
//!
//! These benchmarks establish performance baselines for:
//! - Channel ID derivation
//! - Sender filtering
//! - In-memory send/receive

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use direct_channel_core::transport::memory::MemoryNetwork;
use direct_channel_core::{ChannelConfig, ChannelId, DirectChannel, InboundMessage, MessageGate, PeerId};

const ALICE: &str = "k51qzi5uqu5dlvj2baxnqndepeb86cbk3ng7n3i46uzyxzyqj2xjonzllnv0v8";
const BOB: &str = "k51qzi5uqu5dhuc1pto6x98woksrqgwhq6d1lff2hfymxmlk4qd7vqgtf980yl";

// ============================================================================
// Identity Benchmarks
// ============================================================================

fn bench_derive(c: &mut Criterion) {
    let alice = PeerId::new(ALICE);
    let bob = PeerId::new(BOB);

    c.bench_function("derive_channel_id", |b| {
        b.iter(|| black_box(ChannelId::derive("direct-channel-v1", &alice, &bob).unwrap()))
    });
}

// ============================================================================
// Gate Benchmarks
// ============================================================================

fn bench_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate");
    let gate = MessageGate::new(PeerId::new(BOB));

    let accepted = InboundMessage::new(BOB, vec![0u8; 64], "/direct-channel-v1/a/b");
    group.bench_function("accept_counterpart", |b| {
        b.iter(|| black_box(gate.accept(&accepted)))
    });

    let rejected = InboundMessage::new(ALICE, vec![0u8; 64], "/direct-channel-v1/a/b");
    group.bench_function("reject_third_party", |b| {
        b.iter(|| black_box(gate.accept(&rejected)))
    });

    group.finish();
}

// ============================================================================
// Channel Benchmarks
// ============================================================================

fn bench_memory_send_receive(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory_channel");

    for size in [64usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("send_receive_{}", size), |b| {
            b.iter_batched(
                || {
                    rt.block_on(async {
                        let net = MemoryNetwork::new();
                        let config = ChannelConfig::default().with_poll_interval(Duration::from_millis(1));
                        let a = DirectChannel::open_with_node(&net.node(ALICE), BOB, config.clone())
                            .await
                            .unwrap();
                        let b = DirectChannel::open_with_node(&net.node(BOB), ALICE, config)
                            .await
                            .unwrap();
                        let inbox = b.messages().unwrap();
                        (a, b, inbox)
                    })
                },
                |(a, b, mut inbox)| {
                    rt.block_on(async move {
                        a.send(vec![0u8; size]).await.unwrap();
                        black_box(inbox.recv().await.unwrap());
                        // Drop inside the runtime so both unsubscribes run
                        drop(a);
                        drop(b);
                    })
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(identity_benches, bench_derive,);

criterion_group!(gate_benches, bench_gate,);

criterion_group!(channel_benches, bench_memory_send_receive,);

criterion_main!(identity_benches, gate_benches, channel_benches);
