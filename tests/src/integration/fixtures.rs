//! Shared wiring for the integration tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::{BlockContext, InMemoryKVStore};
use tokio_test::assert_ok;
use xc_01_observer::{
    ChainParams, CrosschainFlags, NodeAccount, ObserverConfig, ObserverGenesis, ObserverService,
    Tss,
};
use xc_02_crosschain::{
    BroadcastEventPublisher, CrossChainService, DefaultXmsgPolicy, InboundObservation,
    LoggingSigner, OrchestratorConfig, OutboundObservation, ReceiveStatus, RevertOptions, Xmsg,
    XmsgVoteResult,
};

pub type Node =
    CrossChainService<InMemoryKVStore, LoggingSigner, DefaultXmsgPolicy, BroadcastEventPublisher>;

pub const RELAYERS: usize = 5;

pub struct TestNode {
    pub service: Arc<Node>,
    pub observer: Arc<ObserverService<InMemoryKVStore>>,
    pub publisher: Arc<BroadcastEventPublisher>,
    pub signer: Arc<LoggingSigner>,
}

pub fn relayer(i: usize) -> String {
    format!("relayer-{}", i)
}

pub fn genesis_tss(pubkey: &str) -> Tss {
    Tss {
        pubkey: pubkey.to_string(),
        participants: (1..=3).map(|i| format!("signer-{}", i)).collect(),
        operators: (1..=3).map(relayer).collect(),
        finalized_height: 0,
        keygen_height: 0,
    }
}

/// Five weight-1 relayers, the first three node accounts, key `pk1`.
pub fn node_with(chains: Vec<ChainParams>, timeout_blocks: u64) -> TestNode {
    let store = Arc::new(RwLock::new(InMemoryKVStore::new()));
    let observer = Arc::new(ObserverService::new(store, ObserverConfig::default()));
    let genesis = ObserverGenesis {
        relayers: (1..=RELAYERS).map(|i| (relayer(i), 1)).collect::<BTreeMap<_, _>>(),
        node_accounts: (1..=3)
            .map(|i| NodeAccount::new(relayer(i), format!("signer-{}", i)))
            .collect(),
        chain_params: chains,
        flags: CrosschainFlags::default(),
        tss: Some(genesis_tss("pk1")),
    };
    assert_ok!(observer.init_genesis(&BlockContext::new(0, 0), genesis));

    let signer = Arc::new(LoggingSigner::new());
    let publisher = Arc::new(BroadcastEventPublisher::with_capacity(4096));
    let service = Arc::new(CrossChainService::new(
        Arc::clone(&observer),
        Arc::clone(&signer),
        DefaultXmsgPolicy::new(),
        Arc::clone(&publisher),
        OrchestratorConfig {
            outbound_timeout_blocks: timeout_blocks,
        },
    ));
    TestNode {
        service,
        observer,
        publisher,
        signer,
    }
}

/// Chains 1 and 101, no confirmations required, 20-block timeout.
pub fn node() -> TestNode {
    node_with(
        vec![ChainParams::supported(1, 0), ChainParams::supported(101, 0)],
        20,
    )
}

/// Transfer from chain 1 to chain 101.
pub fn transfer(tx_hash: &str, revertible: bool) -> InboundObservation {
    InboundObservation {
        sender_chain_id: 1,
        sender: "0xsender".into(),
        tx_origin: "0xorigin".into(),
        receiver_chain_id: 101,
        receiver: "0xreceiver".into(),
        amount: 2_500_000,
        message: "payload".into(),
        tx_hash: tx_hash.to_string(),
        tx_height: 100,
        event_index: 0,
        revert_options: revertible.then(RevertOptions::default),
    }
}

/// Observation of the attempt currently in flight.
pub fn mined(xmsg: &Xmsg, status: ReceiveStatus) -> OutboundObservation {
    let attempt = xmsg.current_outbound().cloned().unwrap();
    OutboundObservation {
        xmsg_index: xmsg.index,
        chain_id: attempt.receiver_chain_id,
        nonce: attempt.nonce,
        tx_hash: format!("0xmined-{}-{}", attempt.receiver_chain_id, attempt.nonce),
        external_height: 500,
        gas_used: 42_000,
        status,
    }
}

/// Vote with relayers 1..=4 and return the committed Xmsg.
pub async fn approve_inbound(
    node: &TestNode,
    ctx: &BlockContext,
    observation: InboundObservation,
) -> Xmsg {
    let mut last: Option<XmsgVoteResult> = None;
    for i in 1..=4 {
        last = Some(assert_ok!(
            node.service
                .vote_inbound(ctx, &relayer(i), observation.clone())
                .await
        ));
    }
    last.and_then(|r| r.xmsg).unwrap()
}

/// Vote with relayers 1..=4 and return the committed Xmsg.
pub async fn approve_outbound(
    node: &TestNode,
    ctx: &BlockContext,
    observation: OutboundObservation,
) -> Xmsg {
    let mut last: Option<XmsgVoteResult> = None;
    for i in 1..=4 {
        last = Some(assert_ok!(
            node.service
                .vote_outbound(ctx, &relayer(i), observation.clone())
                .await
        ));
    }
    last.and_then(|r| r.xmsg).unwrap()
}
