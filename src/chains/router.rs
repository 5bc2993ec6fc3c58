use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use crate::error::{ReconcileError, ReconcileResult};
use crate::ledger::models::{AssetKind, BountyLedgerEntry, Chain, Identifier};
use crate::reconcile::aggregator::RedeemedPolicy;
use crate::reconcile::dispatcher::{ClaimReceipt, ClaimRequest, RewardDispatcher};
use crate::reconcile::engine::ReconciliationEngine;

/// BountyRouter - routes queries and claims to the engine for a chain
///
/// Reads go to the chain's engine; claims go to its dispatcher. A chain with
/// an engine but no dispatcher is read-only.
#[derive(Default)]
pub struct BountyRouter {
    engines: HashMap<Chain, ReconciliationEngine>,
    dispatchers: HashMap<Chain, Arc<RewardDispatcher>>,
}

impl BountyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the read side for a chain. Only call during initialization.
    pub fn register_engine(&mut self, engine: ReconciliationEngine) {
        info!("Registering engine for chain: {}", engine.chain());
        self.engines.insert(engine.chain(), engine);
    }

    /// Register the payout side for a chain. Only call during initialization.
    pub fn register_dispatcher(&mut self, dispatcher: Arc<RewardDispatcher>) {
        info!("Registering dispatcher for chain: {}", dispatcher.chain());
        self.dispatchers.insert(dispatcher.chain(), dispatcher);
    }

    pub fn engine(&self, chain: Chain) -> ReconcileResult<&ReconciliationEngine> {
        self.engines
            .get(&chain)
            .ok_or(ReconcileError::UnsupportedChain(chain))
    }

    #[instrument(skip(self), fields(identifier = %identifier))]
    pub async fn query(
        &self,
        chain: Chain,
        identifier: &Identifier,
        asset: Option<AssetKind>,
    ) -> ReconcileResult<BountyLedgerEntry> {
        self.engine(chain)?.query(identifier, asset).await
    }

    pub async fn list(&self, chain: Chain, policy: RedeemedPolicy) -> ReconcileResult<Vec<BountyLedgerEntry>> {
        self.engine(chain)?.list(policy).await
    }

    #[instrument(skip(self, request), fields(identifier = %request.identifier))]
    pub async fn claim(&self, chain: Chain, request: ClaimRequest) -> ReconcileResult<ClaimReceipt> {
        info!("Routing claim for {} to chain {}", request.identifier, chain);

        let dispatcher = self
            .dispatchers
            .get(&chain)
            .ok_or(ReconcileError::UnsupportedChain(chain))?;
        dispatcher.claim(request).await
    }

    /// Get all chains with a registered engine
    pub fn registered_chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.engines.keys().copied().collect();
        chains.sort_by_key(|c| c.as_str());
        chains
    }

    pub fn supports_claims(&self, chain: Chain) -> bool {
        self.dispatchers.contains_key(&chain)
    }
}
