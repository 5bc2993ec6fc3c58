use futures::future;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use crate::adapters::abi::{same_address, AbiDecoder, BountySelectors, CallDecoder, DecodedCall, Selector};
use crate::adapters::traits::{ChainReader, ExplorerTransaction};
use crate::error::{ReconcileError, ReconcileResult};
use crate::ledger::models::{ContractBinding, Identifier};
use crate::reconcile::matcher::matches_call_args;
use crate::reconcile::retry::{with_backoff, RetryPolicy};
use crate::reconcile::scanner::LedgerScanner;

/// Maps identifiers to bounty contracts by replaying factory calls.
///
/// Two steps: the `createBounty` call on the factory, then the internal
/// trace of that call for the address it created.
pub struct BountyResolver<R> {
    scanner: LedgerScanner<R>,
    factory: String,
    decoder: Arc<AbiDecoder>,
    selectors: BountySelectors,
    retry: RetryPolicy,
}

impl<R> BountyResolver<R>
where
    R: ChainReader + 'static,
{
    pub fn new(
        scanner: LedgerScanner<R>,
        factory: impl Into<String>,
        selectors: BountySelectors,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            scanner,
            factory: factory.into(),
            decoder: Arc::new(AbiDecoder::for_bounties(&selectors)),
            selectors,
            retry,
        }
    }

    pub fn factory(&self) -> &str {
        &self.factory
    }

    /// Successful `createBounty` calls on the factory, oldest first, with
    /// the hash of the transaction that made each one.
    fn creations(&self) -> BoxStream<'static, ReconcileResult<(DecodedCall, String)>> {
        let factory = self.factory.clone();
        let decoder = self.decoder.clone();
        let create = self.selectors.create_bounty;

        self.scanner
            .raw(&self.factory)
            .try_filter_map(move |tx| {
                let found = creation_call(&tx, &factory, &*decoder, create)
                    .map(|call| (call, tx.hash.clone()));
                future::ready(Ok(found))
            })
            .boxed()
    }

    async fn created_address(&self, identifier: &Identifier, tx_hash: &str) -> ReconcileResult<String> {
        let reader = self.scanner.source().clone();
        let trace = with_backoff(&self.retry, "fetch internal transactions", || {
            reader.internal_transactions(tx_hash)
        })
        .await?;

        trace
            .into_iter()
            .filter(|entry| !entry.is_error)
            .find_map(|entry| entry.contract_address.filter(|a| !a.is_empty()))
            .ok_or_else(|| ReconcileError::ResolutionIncomplete {
                identifier: identifier.clone(),
                reason: format!("trace of {} shows no created contract", tx_hash),
            })
    }

    /// First factory creation for `identifier`, followed to its contract.
    #[instrument(skip(self), fields(identifier = %identifier))]
    pub async fn resolve(&self, identifier: &Identifier) -> ReconcileResult<ContractBinding> {
        let wanted = identifier.clone();
        let creation = self
            .creations()
            .try_filter(move |(call, _)| future::ready(matches_call_args(call, &wanted)))
            .boxed()
            .try_next()
            .await?;

        let Some((_, creation_tx)) = creation else {
            debug!("No createBounty call for {} on factory {}", identifier, self.factory);
            return Err(ReconcileError::NotFound(identifier.clone()));
        };

        let contract_address = self.created_address(identifier, &creation_tx).await?;
        info!("🔗 {} is bound to contract {}", identifier, contract_address);

        Ok(ContractBinding {
            identifier: identifier.clone(),
            contract_address,
            creation_tx,
        })
    }

    /// Every bounty the factory created, first creation per identifier.
    /// Creations whose trace shows no contract are logged and left out, and
    /// so are creations past the scan window.
    pub async fn bindings(&self) -> ReconcileResult<Vec<ContractBinding>> {
        let mut creations: Vec<(DecodedCall, String)> = Vec::new();
        let mut stream = self.creations();
        while let Some(item) = stream.next().await {
            match item {
                Ok(creation) => creations.push(creation),
                Err(ReconcileError::HistoryTruncated(truncation)) => {
                    warn!("⚠️ Listing factory bounties from partial history: {}", truncation);
                }
                Err(e) => return Err(e),
            }
        }

        let mut seen = HashSet::new();
        let mut bindings = Vec::new();
        for (call, creation_tx) in creations {
            let Some(identifier) = call.first_str().map(Identifier::new) else {
                continue;
            };
            if !seen.insert(identifier.clone()) {
                continue;
            }

            match self.created_address(&identifier, &creation_tx).await {
                Ok(contract_address) => bindings.push(ContractBinding {
                    identifier,
                    contract_address,
                    creation_tx,
                }),
                Err(ReconcileError::ResolutionIncomplete { identifier, reason }) => {
                    warn!("⚠️ Skipping {}: {}", identifier, reason);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(bindings)
    }
}

fn creation_call<D>(
    tx: &ExplorerTransaction,
    factory: &str,
    decoder: &D,
    create: Selector,
) -> Option<DecodedCall>
where
    D: CallDecoder + ?Sized,
{
    if tx.is_error || !tx.to.as_deref().map_or(false, |to| same_address(to, factory)) {
        return None;
    }
    match decoder.decode(&tx.input) {
        Ok(call) if call.selector == create => Some(call),
        Ok(_) => None,
        Err(e) => {
            debug!("Ignoring factory transaction {}: {}", tx.hash, e);
            None
        }
    }
}
