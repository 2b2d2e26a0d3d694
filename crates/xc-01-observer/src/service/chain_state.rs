//! # Chain State Tracker
//!
//! Latest confirmed height per external chain, chain params, observer gas
//! price reports, and the global crosschain flags.

use super::keys;
use crate::domain::{
    BlockObservation, ChainParams, ChainState, CrosschainFlags, GasPrice, GasPriceEntry,
    GasPriceObservation,
};
use crate::error::{ObserverError, ObserverResult};
use shared_types::{BlockContext, ChainId, Height, KeyValueStore, StoreTx};
use tracing::{debug, info};

/// External chain bookkeeping.
#[derive(Default)]
pub struct ChainStateTracker;

impl ChainStateTracker {
    /// Create a tracker.
    pub fn new() -> Self {
        Self
    }

    /// Insert or replace the params of a chain.
    pub fn set_params<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        params: &ChainParams,
    ) -> ObserverResult<()> {
        tx.put_typed(keys::chain_params(params.chain_id), params)?;
        info!(
            chain_id = params.chain_id,
            supported = params.is_supported,
            confirmations = params.confirmation_count,
            "[xc-01] Chain params updated"
        );
        Ok(())
    }

    /// Params of a chain, if any.
    pub fn params<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
    ) -> ObserverResult<Option<ChainParams>> {
        Ok(tx.get_typed(&keys::chain_params(chain_id))?)
    }

    /// Params of a chain that must be supported.
    ///
    /// # Errors
    ///
    /// `UnsupportedChain` if the chain is unknown or disabled.
    pub fn supported_params<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
    ) -> ObserverResult<ChainParams> {
        match self.params(tx, chain_id)? {
            Some(params) if params.is_supported => Ok(params),
            _ => Err(ObserverError::UnsupportedChain { chain_id }),
        }
    }

    /// Params with the gas price replaced by the observers' median, once any
    /// observer has reported one.
    pub fn outbound_params<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
    ) -> ObserverResult<Option<ChainParams>> {
        let Some(mut params) = self.params(tx, chain_id)? else {
            return Ok(None);
        };
        if let Some(gas) = self.gas_price(tx, chain_id)? {
            if !gas.entries.is_empty() {
                params.gas_price = gas.median;
            }
        }
        Ok(Some(params))
    }

    /// [`outbound_params`](Self::outbound_params) of a chain that must be
    /// supported.
    ///
    /// # Errors
    ///
    /// `UnsupportedChain` if the chain is unknown or disabled.
    pub fn supported_outbound_params<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
    ) -> ObserverResult<ChainParams> {
        match self.outbound_params(tx, chain_id)? {
            Some(params) if params.is_supported => Ok(params),
            _ => Err(ObserverError::UnsupportedChain { chain_id }),
        }
    }

    /// Store an observer's gas price report and recompute the median.
    ///
    /// The caller checks that the reporter is an observer.
    ///
    /// # Errors
    ///
    /// `UnsupportedChain` if the chain is unknown or disabled.
    pub fn report_gas_price<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        observer: &str,
        observation: &GasPriceObservation,
    ) -> ObserverResult<GasPrice> {
        let chain_id = observation.chain_id;
        self.supported_params(tx, chain_id)?;
        let mut gas = self
            .gas_price(tx, chain_id)?
            .unwrap_or_else(|| GasPrice::new(chain_id));
        gas.report(
            observer,
            GasPriceEntry {
                price: observation.price,
                external_height: observation.external_height,
            },
            ctx.height,
        );
        tx.put_typed(keys::gas_price(chain_id), &gas)?;
        debug!(
            chain_id,
            observer,
            price = %observation.price,
            median = %gas.median,
            "[xc-01] Gas price reported"
        );
        Ok(gas)
    }

    /// Gas price reports of a chain.
    pub fn gas_price<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
    ) -> ObserverResult<Option<GasPrice>> {
        Ok(tx.get_typed(&keys::gas_price(chain_id))?)
    }

    /// All chain params, ordered by chain id.
    pub fn all_params<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
    ) -> ObserverResult<Vec<ChainParams>> {
        Ok(tx.scan_typed(keys::CHAIN_PARAMS_PREFIX.as_bytes())?)
    }

    /// Current crosschain flags; both enabled when never set.
    pub fn flags<S: KeyValueStore>(&self, tx: &StoreTx<'_, S>) -> ObserverResult<CrosschainFlags> {
        Ok(tx
            .get_typed(keys::CROSSCHAIN_FLAGS.as_bytes())?
            .unwrap_or_default())
    }

    /// Replace the crosschain flags.
    pub fn set_flags<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        flags: CrosschainFlags,
    ) -> ObserverResult<()> {
        tx.put_typed(keys::CROSSCHAIN_FLAGS, &flags)?;
        info!(
            inbound = flags.inbound_enabled,
            outbound = flags.outbound_enabled,
            "[xc-01] Crosschain flags updated"
        );
        Ok(())
    }

    /// Advance a chain's tip to an approved block header.
    ///
    /// # Errors
    ///
    /// `StaleChainState` if the block is not above the tracked tip.
    pub fn apply_block<S: KeyValueStore>(
        &self,
        tx: &mut StoreTx<'_, S>,
        ctx: &BlockContext,
        block: &BlockObservation,
    ) -> ObserverResult<ChainState> {
        let key = keys::chain_state(block.chain_id);
        let next = match tx.get_typed::<ChainState>(&key)? {
            Some(current) if block.height <= current.latest_height => {
                return Err(ObserverError::StaleChainState {
                    chain_id: block.chain_id,
                    height: block.height,
                    latest: current.latest_height,
                });
            }
            Some(current) => ChainState {
                latest_height: block.height,
                latest_hash: block.hash,
                updated_at: ctx.height,
                ..current
            },
            None => ChainState {
                chain_id: block.chain_id,
                latest_height: block.height,
                latest_hash: block.hash,
                earliest_height: block.height,
                updated_at: ctx.height,
            },
        };
        tx.put_typed(key, &next)?;
        debug!(
            chain_id = next.chain_id,
            height = next.latest_height,
            "[xc-01] Chain tip advanced"
        );
        Ok(next)
    }

    /// Tracked tip of a chain.
    pub fn state<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
    ) -> ObserverResult<Option<ChainState>> {
        Ok(tx.get_typed(&keys::chain_state(chain_id))?)
    }

    /// Whether an event at external `height` has the confirmations its chain
    /// requires.
    ///
    /// A zero confirmation count means ballot approval alone suffices. Without
    /// a tracked tip nothing else is confirmed.
    pub fn is_confirmed<S: KeyValueStore>(
        &self,
        tx: &StoreTx<'_, S>,
        chain_id: ChainId,
        height: Height,
    ) -> ObserverResult<bool> {
        let required = match self.params(tx, chain_id)? {
            Some(params) => params.confirmation_count,
            None => return Ok(false),
        };
        if required == 0 {
            return Ok(true);
        }
        Ok(self
            .state(tx, chain_id)?
            .map(|state| state.confirmations(height) >= required)
            .unwrap_or(false))
    }
}
