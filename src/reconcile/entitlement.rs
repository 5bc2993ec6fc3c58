use async_trait::async_trait;
use std::collections::HashMap;
use crate::error::ReconcileResult;
use crate::ledger::models::Identifier;

/// Who may claim a bounty.
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    /// The claimant currently assigned to `identifier`, if any.
    async fn entitled_claimant(&self, identifier: &Identifier) -> ReconcileResult<Option<String>>;
}

/// Fixed assignments, for deployments that settle entitlement off-chain.
#[derive(Debug, Clone, Default)]
pub struct StaticEntitlements {
    assignments: HashMap<Identifier, String>,
}

impl StaticEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(mut self, identifier: impl Into<Identifier>, claimant: impl Into<String>) -> Self {
        self.assignments.insert(identifier.into(), claimant.into());
        self
    }
}

#[async_trait]
impl EntitlementSource for StaticEntitlements {
    async fn entitled_claimant(&self, identifier: &Identifier) -> ReconcileResult<Option<String>> {
        Ok(self.assignments.get(identifier).cloned())
    }
}
