use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, instrument};
use crate::adapters::abi::{same_address, AbiDecoder, BountySelectors, CallDecoder};
use crate::adapters::traits::{ChainReader, ExplorerTransaction, TransactionSpec};
use crate::audit::auditor::{assess_contract_balance, AuditFinding, Auditable};
use crate::error::{DecodeError, ReconcileError, ReconcileResult};
use crate::ledger::models::{AssetKind, BountyLedgerEntry, Chain, ContractBinding, Identifier, LedgerRecord};
use crate::reconcile::aggregator::{fold_records, AggregationScope};
use crate::reconcile::engine::BountyChain;
use crate::reconcile::entitlement::EntitlementSource;
use crate::reconcile::resolver::BountyResolver;
use crate::reconcile::scanner::{LedgerScanner, RecordDecoder, RecordStream};

/// Decodes the history of one bounty contract.
///
/// Plain value transfers in are deposits. A successful `reward(address)`
/// call is the payout and the marker at once. Other payable calls count as
/// deposits of their value.
pub struct ContractRecordDecoder {
    identifier: Identifier,
    contract_address: String,
    selectors: BountySelectors,
    decoder: Arc<AbiDecoder>,
}

impl ContractRecordDecoder {
    pub fn new(binding: &ContractBinding, selectors: BountySelectors, decoder: Arc<AbiDecoder>) -> Self {
        Self {
            identifier: binding.identifier.clone(),
            contract_address: binding.contract_address.clone(),
            selectors,
            decoder,
        }
    }

    fn deposit(&self, tx: &ExplorerTransaction) -> Option<LedgerRecord> {
        (tx.value > Decimal::ZERO).then(|| {
            LedgerRecord::deposit(
                tx.hash.as_str(),
                self.identifier.clone(),
                tx.value,
                AssetKind::NativeCurrency,
            )
            .observed_at(tx.timestamp)
        })
    }
}

impl RecordDecoder for ContractRecordDecoder {
    type Raw = ExplorerTransaction;

    fn decode(&self, tx: &ExplorerTransaction) -> Result<Option<LedgerRecord>, DecodeError> {
        let to_contract = tx
            .to
            .as_deref()
            .map_or(false, |to| same_address(to, &self.contract_address));
        if tx.is_error || !to_contract {
            return Ok(None);
        }

        let input = tx.input.trim_start_matches("0x");
        if input.is_empty() {
            return Ok(self.deposit(tx));
        }

        match self.decoder.decode(&tx.input) {
            Ok(call) if call.selector == self.selectors.reward => Ok(Some(
                LedgerRecord::redemption(
                    tx.hash.as_str(),
                    self.identifier.clone(),
                    tx.value,
                    AssetKind::NativeCurrency,
                )
                .observed_at(tx.timestamp),
            )),
            Ok(_) => Ok(self.deposit(tx)),
            Err(DecodeError::UnknownSelector(_)) => Ok(self.deposit(tx)),
            Err(e) => Err(e),
        }
    }
}

/// Bounties held one per contract, created through a factory.
pub struct ContractChain<R> {
    resolver: Arc<BountyResolver<R>>,
    scanner: LedgerScanner<R>,
    selectors: BountySelectors,
    decoder: Arc<AbiDecoder>,
}

impl<R> ContractChain<R>
where
    R: ChainReader + 'static,
{
    pub fn new(scanner: LedgerScanner<R>, resolver: Arc<BountyResolver<R>>, selectors: BountySelectors) -> Self {
        Self {
            resolver,
            scanner,
            selectors,
            decoder: Arc::new(AbiDecoder::for_bounties(&selectors)),
        }
    }

    pub fn resolver(&self) -> &Arc<BountyResolver<R>> {
        &self.resolver
    }

    fn contract_records(&self, binding: &ContractBinding) -> RecordStream {
        let decoder = ContractRecordDecoder::new(binding, self.selectors, self.decoder.clone());
        self.scanner.scan(&binding.contract_address, Arc::new(decoder))
    }

    async fn contract_entry(&self, binding: &ContractBinding) -> ReconcileResult<BountyLedgerEntry> {
        let scope = AggregationScope::bounty(binding.identifier.clone(), Some(AssetKind::NativeCurrency));
        let ledger = fold_records(self.contract_records(binding), &scope)
            .await?
            .complete()?;
        Ok(ledger
            .entry(&binding.identifier, &AssetKind::NativeCurrency)
            .cloned()
            .unwrap_or_else(|| BountyLedgerEntry::open(binding.identifier.clone(), AssetKind::NativeCurrency)))
    }
}

#[async_trait]
impl<R> BountyChain for ContractChain<R>
where
    R: ChainReader + 'static,
{
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    fn default_asset(&self) -> AssetKind {
        AssetKind::NativeCurrency
    }

    /// One contract's history for a single bounty, or every bound contract
    /// in creation order. An unknown identifier is `NotFound`.
    async fn records(&self, identifier: Option<&Identifier>) -> ReconcileResult<RecordStream> {
        match identifier {
            Some(identifier) => {
                let binding = self.resolver.resolve(identifier).await?;
                Ok(self.contract_records(&binding))
            }
            None => {
                let streams: Vec<RecordStream> = self
                    .resolver
                    .bindings()
                    .await?
                    .iter()
                    .map(|binding| self.contract_records(binding))
                    .collect();
                Ok(stream::iter(streams).flatten().boxed())
            }
        }
    }

    async fn payout(&self, entry: &BountyLedgerEntry, destination: &str) -> ReconcileResult<TransactionSpec> {
        if !entry.asset.is_native() {
            return Err(ReconcileError::InvalidInput(format!(
                "bounty contracts only hold the native asset, not {}",
                entry.asset
            )));
        }

        let binding = self.resolver.resolve(&entry.identifier).await?;
        let data = self
            .selectors
            .encode_reward(destination)
            .map_err(|e| ReconcileError::InvalidInput(format!("bad payout address: {}", e)))?;

        Ok(TransactionSpec::ContractCall {
            to: binding.contract_address,
            data,
            value: Decimal::ZERO,
        })
    }
}

#[async_trait]
impl<R> EntitlementSource for ContractChain<R>
where
    R: ChainReader + 'static,
{
    /// Replays `assignReward` calls on the bounty contract; the latest
    /// successful one names the claimant.
    #[instrument(skip(self), fields(identifier = %identifier))]
    async fn entitled_claimant(&self, identifier: &Identifier) -> ReconcileResult<Option<String>> {
        let binding = self.resolver.resolve(identifier).await?;
        let decoder = self.decoder.clone();
        let assign = self.selectors.assign_reward;
        let contract = binding.contract_address.clone();

        let assignments: Vec<String> = self
            .scanner
            .raw(&binding.contract_address)
            .try_filter_map(move |tx| {
                let to_contract = tx.to.as_deref().map_or(false, |to| same_address(to, &contract));
                let claimant = (!tx.is_error && to_contract)
                    .then(|| decoder.decode(&tx.input).ok())
                    .flatten()
                    .filter(|call| call.selector == assign)
                    .and_then(|call| call.first_str().map(str::to_string));
                futures::future::ready(Ok(claimant))
            })
            .try_collect()
            .await?;

        debug!("{} has {} claimant assignments", identifier, assignments.len());
        Ok(assignments.into_iter().last())
    }
}

#[async_trait]
impl<R> Auditable for ContractChain<R>
where
    R: ChainReader + 'static,
{
    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn audit(&self) -> ReconcileResult<Vec<AuditFinding>> {
        let mut findings = Vec::new();
        for binding in self.resolver.bindings().await? {
            let entry = self.contract_entry(&binding).await?;
            let observed = self.scanner.source().balance(&binding.contract_address).await?;
            if let Some(finding) = assess_contract_balance(&binding, &entry, observed) {
                findings.push(finding);
            }
        }
        Ok(findings)
    }
}
