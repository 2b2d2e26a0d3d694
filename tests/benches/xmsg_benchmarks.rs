//! # Xmsg Orchestration Benchmarks
//!
//! | Component | Operation |
//! |-----------|-----------|
//! | BallotBox | votes until a weighted ballot finalizes |
//! | NonceAllocator | sequential allocation on one pair |
//! | CrossChainService | inbound approval through dispatch |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use parking_lot::RwLock;
use rand::Rng;
use shared_types::{BlockContext, Digest, InMemoryKVStore, StoreTx};
use xc_01_observer::{
    BallotBox, ChainParams, CrosschainFlags, NodeAccount, NonceAllocator, ObservationType,
    ObserverConfig, ObserverGenesis, ObserverService, RelayerSet, Tss, VoteRequest,
};
use xc_02_crosschain::{
    BroadcastEventPublisher, CrossChainService, DefaultXmsgPolicy, InboundObservation,
    LoggingSigner, OrchestratorConfig, RevertOptions,
};

fn relayer(i: usize) -> String {
    format!("relayer-{}", i)
}

fn relayer_set(n: usize) -> RelayerSet {
    RelayerSet::new(0, (1..=n).map(|i| (relayer(i), 1)).collect())
}

// ============================================================================
// BallotBox
// ============================================================================

fn bench_ballot_finalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("xc-01-ballot-box");
    group.measurement_time(Duration::from_secs(5));
    let ballots = BallotBox::default();
    let ctx = BlockContext::new(10, 60);

    for size in [4usize, 16, 64, 128] {
        let voters = relayer_set(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("votes_to_finalize", size), &voters, |b, voters| {
            b.iter_batched(
                || RwLock::new(InMemoryKVStore::new()),
                |store| {
                    let mut tx = StoreTx::begin(&store);
                    let mut finalized = false;
                    for i in 1..=size {
                        let request = VoteRequest {
                            ballot_index: Digest::of_bytes("bench-ballot", b"event"),
                            observation_type: ObservationType::InboundTx,
                            chain_id: 1,
                            voter: relayer(i),
                            payload: b"claim".to_vec(),
                            value_key: None,
                        };
                        match ballots.cast_vote(&mut tx, &ctx, request, voters, None) {
                            Ok(result) if result.finalized_now => {
                                finalized = true;
                                break;
                            }
                            Ok(_) => {}
                            Err(_) => break,
                        }
                    }
                    black_box(tx.commit().is_ok() && finalized)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// NonceAllocator
// ============================================================================

fn bench_nonce_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("xc-01-nonce-allocator");
    let allocator = NonceAllocator::new();
    let store = RwLock::new(InMemoryKVStore::new());
    let mut rng = rand::thread_rng();

    group.bench_function("allocate_commit", |b| {
        b.iter(|| {
            let index = Digest::of("bench-xmsg", &[&rng.gen::<u64>().to_be_bytes()]);
            let mut tx = StoreTx::begin(&store);
            let nonce = allocator.allocate(&mut tx, 101, "pk1", index);
            black_box(tx.commit().is_ok() && nonce.is_ok())
        })
    });

    group.finish();
}

// ============================================================================
// CrossChainService
// ============================================================================

type BenchService =
    CrossChainService<InMemoryKVStore, LoggingSigner, DefaultXmsgPolicy, BroadcastEventPublisher>;

fn service() -> BenchService {
    let store = Arc::new(RwLock::new(InMemoryKVStore::new()));
    let observer = Arc::new(ObserverService::new(store, ObserverConfig::default()));
    let genesis = ObserverGenesis {
        relayers: (1..=5).map(|i| (relayer(i), 1)).collect::<BTreeMap<_, _>>(),
        node_accounts: (1..=3)
            .map(|i| NodeAccount::new(relayer(i), format!("signer-{}", i)))
            .collect(),
        chain_params: vec![ChainParams::supported(1, 0), ChainParams::supported(101, 0)],
        flags: CrosschainFlags::default(),
        tss: Some(Tss {
            pubkey: "pk1".into(),
            participants: (1..=3).map(|i| format!("signer-{}", i)).collect(),
            operators: (1..=3).map(relayer).collect(),
            finalized_height: 0,
            keygen_height: 0,
        }),
    };
    let _ = observer.init_genesis(&BlockContext::new(0, 0), genesis);
    CrossChainService::new(
        observer,
        Arc::new(LoggingSigner::new()),
        DefaultXmsgPolicy::new(),
        Arc::new(BroadcastEventPublisher::new()),
        OrchestratorConfig::default(),
    )
}

fn bench_inbound_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("xc-02-crosschain");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let service = service();
    let ctx = BlockContext::new(5, 30);
    let mut sequence = 0u64;

    group.bench_function("inbound_approval_to_dispatch", |b| {
        b.iter(|| {
            sequence += 1;
            let observation = InboundObservation {
                sender_chain_id: 1,
                sender: "0xsender".into(),
                tx_origin: "0xsender".into(),
                receiver_chain_id: 101,
                receiver: "0xreceiver".into(),
                amount: 1_000,
                message: String::new(),
                tx_hash: format!("0x{:x}", sequence),
                tx_height: 100,
                event_index: 0,
                revert_options: Some(RevertOptions::default()),
            };
            runtime.block_on(async {
                for i in 1..=4 {
                    let result = service
                        .vote_inbound(&ctx, &relayer(i), observation.clone())
                        .await;
                    black_box(result.is_ok());
                }
            })
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_ballot_finalization,
    bench_nonce_allocation,
    bench_inbound_pipeline,
);

criterion_main!(benches);
