use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use crate::adapters::abi::BountySelectors;
use crate::adapters::traits::{ChainReader, ChainWriter, TransactionSpec};
use crate::error::{ReconcileError, ReconcileResult};
use crate::ledger::models::{Chain, Identifier};
use crate::reconcile::redemption::collides_with_marker;
use crate::reconcile::resolver::BountyResolver;

/// Creates bounty contracts and names their claimants.
///
/// Write path only: every error is returned to the caller and nothing is
/// retried.
pub struct BountyRegistrar<R> {
    resolver: Arc<BountyResolver<R>>,
    writer: Arc<dyn ChainWriter>,
    selectors: BountySelectors,
}

impl<R> BountyRegistrar<R>
where
    R: ChainReader + 'static,
{
    pub fn new(
        resolver: Arc<BountyResolver<R>>,
        writer: Arc<dyn ChainWriter>,
        selectors: BountySelectors,
    ) -> ReconcileResult<Self> {
        if writer.chain() != Chain::Ethereum {
            return Err(ReconcileError::Config(format!(
                "bounty contracts are registered on {}, not {}",
                Chain::Ethereum,
                writer.chain()
            )));
        }

        Ok(Self {
            resolver,
            writer,
            selectors,
        })
    }

    /// Submit `createBounty(identifier)` to the factory.
    #[instrument(skip(self), fields(identifier = %identifier))]
    pub async fn create_bounty(&self, identifier: &Identifier) -> ReconcileResult<String> {
        if identifier.as_str().is_empty() || collides_with_marker(identifier) {
            return Err(ReconcileError::InvalidInput(format!(
                "{:?} cannot be registered as a bounty identifier",
                identifier.as_str()
            )));
        }

        // ResolutionIncomplete also refuses: created, but the trace is not indexed yet
        match self.resolver.resolve(identifier).await {
            Ok(binding) => {
                return Err(ReconcileError::InvalidInput(format!(
                    "{} is already bound to {}",
                    identifier, binding.contract_address
                )));
            }
            Err(ReconcileError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let spec = TransactionSpec::ContractCall {
            to: self.resolver.factory().to_string(),
            data: self.selectors.encode_create_bounty(identifier.as_str()),
            value: Decimal::ZERO,
        };
        let tx = self.submit(&spec).await?;

        info!("📝 Registered bounty {} in {}", identifier, tx);
        Ok(tx)
    }

    /// Submit `assignReward(username)` to the bound contract.
    #[instrument(skip(self), fields(identifier = %identifier))]
    pub async fn assign_claimant(&self, identifier: &Identifier, username: &str) -> ReconcileResult<String> {
        if username.is_empty() {
            return Err(ReconcileError::InvalidInput("claimant must not be empty".into()));
        }

        let binding = self.resolver.resolve(identifier).await?;
        let spec = TransactionSpec::ContractCall {
            to: binding.contract_address,
            data: self.selectors.encode_assign_reward(username),
            value: Decimal::ZERO,
        };
        let tx = self.submit(&spec).await?;

        info!("👤 Assigned {} to {} in {}", identifier, username, tx);
        Ok(tx)
    }

    async fn submit(&self, spec: &TransactionSpec) -> ReconcileResult<String> {
        let signed = self.writer.build_and_sign(spec).await?;
        Ok(self.writer.broadcast(&signed).await?)
    }
}
