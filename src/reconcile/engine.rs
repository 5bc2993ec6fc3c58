use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use crate::adapters::traits::TransactionSpec;
use crate::error::ReconcileResult;
use crate::ledger::models::{AssetKind, BountyLedgerEntry, Chain, Identifier};
use crate::reconcile::aggregator::{fold_records, AggregationScope, BountyLedger, RedeemedPolicy};
use crate::reconcile::scanner::RecordStream;

/// Chain-specific half of reconciliation.
///
/// Implementations know where a chain keeps bounty records and how to pay
/// one out. Everything else (matching, redemption, aggregation) is shared.
#[async_trait]
pub trait BountyChain: Send + Sync {
    fn chain(&self) -> Chain;

    /// Asset used when a query names none.
    fn default_asset(&self) -> AssetKind;

    /// Records that may concern `identifier`, or every bounty record when
    /// `None`. The stream may contain records for other bounties.
    async fn records(&self, identifier: Option<&Identifier>) -> ReconcileResult<RecordStream>;

    /// One transaction that moves the entry's spendable balance to
    /// `destination` and carries the redemption marker.
    async fn payout(&self, entry: &BountyLedgerEntry, destination: &str) -> ReconcileResult<TransactionSpec>;
}

/// Derives bounty state for one chain from a fresh scan on every call.
#[derive(Clone)]
pub struct ReconciliationEngine {
    chain: Arc<dyn BountyChain>,
}

impl ReconciliationEngine {
    pub fn new(chain: Arc<dyn BountyChain>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> Chain {
        self.chain.chain()
    }

    pub fn default_asset(&self) -> AssetKind {
        self.chain.default_asset()
    }

    async fn bounty_ledger(&self, identifier: &Identifier, asset: Option<AssetKind>) -> ReconcileResult<BountyLedger> {
        let scope = AggregationScope::bounty(identifier.clone(), asset);
        let records = self.chain.records(Some(identifier)).await?;
        fold_records(records, &scope).await
    }

    fn entry_of(ledger: &BountyLedger, identifier: &Identifier, asset: AssetKind) -> BountyLedgerEntry {
        ledger
            .entry(identifier, &asset)
            .cloned()
            .unwrap_or_else(|| BountyLedgerEntry::open(identifier.clone(), asset))
    }

    /// Current state of one bounty in one asset, as far as the scan window
    /// reaches. A bounty with no records comes back as an open entry with
    /// nothing deposited; a redeemed one reports nothing deposited.
    #[instrument(skip(self), fields(chain = %self.chain.chain(), identifier = %identifier))]
    pub async fn query(
        &self,
        identifier: &Identifier,
        asset: Option<AssetKind>,
    ) -> ReconcileResult<BountyLedgerEntry> {
        let asset = asset.unwrap_or_else(|| self.chain.default_asset());
        let ledger = self.bounty_ledger(identifier, Some(asset.clone())).await?;
        if let Some(truncation) = ledger.truncation() {
            warn!("⚠️ {} may be out of date: {}", identifier, truncation);
        }

        let derived = Self::entry_of(&ledger, identifier, asset);
        debug!(
            "{} in {}: deposited {} over {} deposits, redeemed: {}",
            identifier, derived.asset, derived.total_deposited, derived.deposit_count, derived.redeemed
        );

        // Zero never omits
        Ok(RedeemedPolicy::Zero.apply(derived.clone()).unwrap_or(derived))
    }

    /// The entry a payout may be based on. Unlike [`query`](Self::query) this
    /// refuses a partial history, since a payout marker past the window cut
    /// would go unseen.
    #[instrument(skip(self), fields(chain = %self.chain.chain(), identifier = %identifier))]
    pub async fn claimable(
        &self,
        identifier: &Identifier,
        asset: Option<AssetKind>,
    ) -> ReconcileResult<BountyLedgerEntry> {
        let asset = asset.unwrap_or_else(|| self.chain.default_asset());
        let ledger = self
            .bounty_ledger(identifier, Some(asset.clone()))
            .await?
            .complete()?;

        Ok(Self::entry_of(&ledger, identifier, asset))
    }

    /// One entry per asset the bounty was funded in, redeemed ones zeroed.
    #[instrument(skip(self), fields(chain = %self.chain.chain(), identifier = %identifier))]
    pub async fn query_all_assets(&self, identifier: &Identifier) -> ReconcileResult<Vec<BountyLedgerEntry>> {
        let ledger = self.bounty_ledger(identifier, None).await?;
        if let Some(truncation) = ledger.truncation() {
            warn!("⚠️ {} may be out of date: {}", identifier, truncation);
        }

        Ok(ledger
            .entries_for(identifier)
            .into_iter()
            .cloned()
            .filter_map(|entry| RedeemedPolicy::Zero.apply(entry))
            .collect())
    }

    /// Every bounty visible in the scan window.
    #[instrument(skip(self), fields(chain = %self.chain.chain()))]
    pub async fn list(&self, policy: RedeemedPolicy) -> ReconcileResult<Vec<BountyLedgerEntry>> {
        let records = self.chain.records(None).await?;
        let ledger = fold_records(records, &AggregationScope::all()).await?;
        if let Some(truncation) = ledger.truncation() {
            warn!("⚠️ Listing only covers part of the history: {}", truncation);
        }
        let entries = ledger.into_entries(policy);

        info!("📋 {} bounties on {}", entries.len(), self.chain.chain());
        Ok(entries)
    }

    pub async fn payout_spec(
        &self,
        entry: &BountyLedgerEntry,
        destination: &str,
    ) -> ReconcileResult<TransactionSpec> {
        self.chain.payout(entry, destination).await
    }
}
