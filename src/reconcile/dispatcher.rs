use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;
use crate::adapters::traits::ChainWriter;
use crate::error::{ReconcileError, ReconcileResult};
use crate::ledger::models::{AssetKind, Chain, Identifier};
use crate::reconcile::engine::ReconciliationEngine;
use crate::reconcile::entitlement::EntitlementSource;
use crate::reconcile::redemption::collides_with_marker;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClaimRequest {
    #[validate(length(min = 1, message = "identifier must not be empty"))]
    pub identifier: String,
    #[validate(length(min = 1, message = "claimant must not be empty"))]
    pub claimant: String,
    #[validate(length(min = 1, message = "payout address must not be empty"))]
    pub payout_address: String,
    /// Defaults to the chain's native asset.
    #[serde(default)]
    pub asset: Option<AssetKind>,
}

impl ClaimRequest {
    pub fn new(
        identifier: impl Into<String>,
        claimant: impl Into<String>,
        payout_address: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            claimant: claimant.into(),
            payout_address: payout_address.into(),
            asset: None,
        }
    }

    pub fn in_asset(mut self, asset: AssetKind) -> Self {
        self.asset = Some(asset);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub claim_id: Uuid,
    pub chain: Chain,
    pub identifier: Identifier,
    pub asset: AssetKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub destination: String,
    pub transaction_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// One in-flight claim per identifier.
#[derive(Debug, Default)]
pub struct ClaimLocks {
    locks: Mutex<HashMap<Identifier, Arc<tokio::sync::Mutex<()>>>>,
}

impl ClaimLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another claim for `identifier` holds the lock.
    pub fn try_acquire(&self, identifier: &Identifier) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock();
            // unheld locks are only referenced by the map
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(identifier.clone()).or_default().clone()
        };
        lock.try_lock_owned().ok()
    }
}

/// Pays out bounties.
///
/// A claim checks entitlement, derives the spendable balance and submits a
/// single payout that also carries the redemption marker. Submission errors
/// are returned as is and never retried: a broadcast that timed out may still
/// have landed.
pub struct RewardDispatcher {
    engine: ReconciliationEngine,
    entitlement: Arc<dyn EntitlementSource>,
    writer: Arc<dyn ChainWriter>,
    locks: ClaimLocks,
}

impl RewardDispatcher {
    pub fn new(
        engine: ReconciliationEngine,
        entitlement: Arc<dyn EntitlementSource>,
        writer: Arc<dyn ChainWriter>,
    ) -> ReconcileResult<Self> {
        if writer.chain() != engine.chain() {
            return Err(ReconcileError::Config(format!(
                "writer for {} cannot pay out {} bounties",
                writer.chain(),
                engine.chain()
            )));
        }

        Ok(Self {
            engine,
            entitlement,
            writer,
            locks: ClaimLocks::new(),
        })
    }

    pub fn chain(&self) -> Chain {
        self.engine.chain()
    }

    #[instrument(
        skip(self, request),
        fields(chain = %self.engine.chain(), identifier = %request.identifier, claimant = %request.claimant)
    )]
    pub async fn claim(&self, request: ClaimRequest) -> ReconcileResult<ClaimReceipt> {
        request.validate()?;

        let identifier = Identifier::new(request.identifier.clone());
        if collides_with_marker(&identifier) {
            return Err(ReconcileError::InvalidInput(format!(
                "identifier {} ends with the reserved redemption suffix",
                identifier
            )));
        }

        let Some(_guard) = self.locks.try_acquire(&identifier) else {
            warn!("⚠️ Rejecting concurrent claim for {}", identifier);
            return Err(ReconcileError::ClaimInProgress(identifier));
        };

        // STEP 1: entitlement
        let entitled = self.entitlement.entitled_claimant(&identifier).await?;
        if entitled.as_deref() != Some(request.claimant.as_str()) {
            return Err(ReconcileError::NotEntitled {
                identifier,
                claimant: request.claimant,
                entitled,
            });
        }

        // STEP 2: spendable balance, from a scan that reached the end of history
        let entry = self.engine.claimable(&identifier, request.asset.clone()).await?;
        let amount = entry.spendable();
        if amount <= Decimal::ZERO {
            return Err(ReconcileError::NoFunds {
                identifier,
                asset: entry.asset,
                redeemed: entry.redeemed,
            });
        }

        // STEP 3: one payout carrying the marker
        let spec = self
            .engine
            .payout_spec(&entry, &request.payout_address)
            .await?;
        let signed = self.writer.build_and_sign(&spec).await?;

        let transaction_id = match self.writer.broadcast(&signed).await {
            Ok(id) => id,
            Err(e) => {
                error!(
                    "❌ Payout for {} signed as {} but broadcast failed; check the ledger before claiming again: {}",
                    identifier, signed.hash, e
                );
                return Err(e.into());
            }
        };

        info!(
            "💸 Paid {} {} for {} to {} in {}",
            amount, entry.asset, identifier, request.payout_address, transaction_id
        );

        Ok(ClaimReceipt {
            claim_id: Uuid::new_v4(),
            chain: self.engine.chain(),
            identifier,
            asset: entry.asset,
            amount,
            destination: request.payout_address,
            transaction_id,
            submitted_at: Utc::now(),
        })
    }
}
