//! # Subsystem Container
//!
//! Holds the subsystem instances over one shared in-memory store.
//!
//! ## Initialization Order
//!
//! ```text
//! Level 0: store, lifecycle event publisher, signer
//! Level 1: Observer (xc-01) over the store, genesis written
//! Level 2: Cross-Chain (xc-02) over the observer
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use shared_types::InMemoryKVStore;
use tracing::{info, instrument};

use xc_01_observer::ObserverService;
use xc_02_crosschain::{
    BroadcastEventPublisher, CrossChainService, DefaultXmsgPolicy, LoggingSigner,
};

use crate::container::config::{ConfigError, NodeConfig};
use crate::genesis::GenesisBuilder;

/// Observer service with the in-memory backend.
pub type ConcreteObserverService = ObserverService<InMemoryKVStore>;

/// Cross-chain service with the in-memory backend and replay adapters.
pub type ConcreteCrossChainService =
    CrossChainService<InMemoryKVStore, LoggingSigner, DefaultXmsgPolicy, BroadcastEventPublisher>;

/// Container errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Writing the genesis state failed.
    #[error("Failed to write genesis state: {0}")]
    Genesis(#[from] xc_01_observer::ObserverError),
}

/// Central container holding all subsystem instances.
pub struct SubsystemContainer {
    /// Shared store.
    pub store: Arc<RwLock<InMemoryKVStore>>,

    /// Observer consensus (Subsystem 1).
    pub observer: Arc<ConcreteObserverService>,

    /// Xmsg orchestration (Subsystem 2).
    pub crosschain: Arc<ConcreteCrossChainService>,

    /// Lifecycle event fan-out.
    pub publisher: Arc<BroadcastEventPublisher>,

    /// Outbound signer.
    pub signer: Arc<LoggingSigner>,

    /// Node configuration (immutable after initialization).
    pub config: NodeConfig,
}

impl SubsystemContainer {
    /// Validate `config`, create every subsystem and write genesis.
    #[instrument(name = "subsystem_init", skip(config))]
    pub fn new(config: NodeConfig) -> Result<Self, ContainerError> {
        config.validate()?;
        let genesis = GenesisBuilder::new(config.genesis.clone())
            .build()
            .map_err(ConfigError::from)?;

        info!("Phase 1: Creating shared infrastructure");
        let store = Arc::new(RwLock::new(InMemoryKVStore::new()));
        let publisher = Arc::new(BroadcastEventPublisher::with_capacity(
            config.replay.event_capacity,
        ));
        let signer = Arc::new(LoggingSigner::new());

        info!("Phase 2: Initializing observer");
        let observer = Arc::new(ObserverService::new(
            Arc::clone(&store),
            config.observer.clone(),
        ));
        observer.init_genesis(&genesis.context, genesis.observer)?;
        info!(
            relayers = config.genesis.relayers.len(),
            chains = config.genesis.chain_params.len(),
            "  [xc-01] Observer initialized"
        );

        info!("Phase 3: Initializing crosschain orchestrator");
        let crosschain = Arc::new(CrossChainService::new(
            Arc::clone(&observer),
            Arc::clone(&signer),
            DefaultXmsgPolicy::new(),
            Arc::clone(&publisher),
            config.orchestrator.clone(),
        ));
        info!(
            timeout_blocks = config.orchestrator.outbound_timeout_blocks,
            "  [xc-02] Cross-chain orchestrator initialized"
        );

        Ok(Self {
            store,
            observer,
            crosschain,
            publisher,
            signer,
            config,
        })
    }

    /// Create a container with the devnet defaults.
    #[cfg(test)]
    pub fn new_for_testing() -> Self {
        match Self::new(NodeConfig::default()) {
            Ok(container) => container,
            Err(e) => panic!("devnet container: {e}"),
        }
    }
}
