use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};
use crate::error::ReconcileResult;
use crate::ledger::models::{AssetKind, BountyLedgerEntry, Chain, ContractBinding, Identifier};

/// A disagreement between derived bounty state and what the chain holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditFinding {
    /// The contract is empty but no marker was seen: paid without the
    /// marker landing, or drained some other way.
    PaidButUnmarked {
        identifier: Identifier,
        contract_address: String,
        derived: Decimal,
    },
    BalanceMismatch {
        identifier: Identifier,
        contract_address: String,
        derived: Decimal,
        observed: Decimal,
    },
    /// Open bounties owe more of an asset than the custody account holds.
    CustodyShortfall {
        asset: AssetKind,
        owed: Decimal,
        held: Decimal,
    },
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditFinding::PaidButUnmarked {
                identifier,
                contract_address,
                derived,
            } => write!(
                f,
                "{} ({}) is empty but unredeemed, derived balance {}",
                identifier, contract_address, derived
            ),
            AuditFinding::BalanceMismatch {
                identifier,
                contract_address,
                derived,
                observed,
            } => write!(
                f,
                "{} ({}) holds {} but derived balance is {}",
                identifier, contract_address, observed, derived
            ),
            AuditFinding::CustodyShortfall { asset, owed, held } => {
                write!(f, "custody owes {} {} but holds {}", owed, asset, held)
            }
        }
    }
}

/// Compare one bounty contract's balance with its derived entry.
pub fn assess_contract_balance(
    binding: &ContractBinding,
    entry: &BountyLedgerEntry,
    observed: Decimal,
) -> Option<AuditFinding> {
    let derived = entry.spendable();

    if !entry.redeemed && derived > Decimal::ZERO && observed.is_zero() {
        return Some(AuditFinding::PaidButUnmarked {
            identifier: binding.identifier.clone(),
            contract_address: binding.contract_address.clone(),
            derived,
        });
    }
    if derived != observed {
        return Some(AuditFinding::BalanceMismatch {
            identifier: binding.identifier.clone(),
            contract_address: binding.contract_address.clone(),
            derived,
            observed,
        });
    }
    None
}

/// Per asset, flag where open bounties owe more than custody holds.
pub fn assess_custody(
    owed: &HashMap<AssetKind, Decimal>,
    held: &HashMap<AssetKind, Decimal>,
) -> Vec<AuditFinding> {
    let mut findings: Vec<AuditFinding> = owed
        .iter()
        .filter_map(|(asset, owed)| {
            let held = held.get(asset).copied().unwrap_or(Decimal::ZERO);
            (*owed > held).then(|| AuditFinding::CustodyShortfall {
                asset: asset.clone(),
                owed: *owed,
                held,
            })
        })
        .collect();

    findings.sort_by(|a, b| match (a, b) {
        (
            AuditFinding::CustodyShortfall { asset: x, .. },
            AuditFinding::CustodyShortfall { asset: y, .. },
        ) => x.cmp(y),
        _ => std::cmp::Ordering::Equal,
    });
    findings
}

/// A chain that can check its derived state against observed balances.
#[async_trait]
pub trait Auditable: Send + Sync {
    fn chain(&self) -> Chain;

    async fn audit(&self) -> ReconcileResult<Vec<AuditFinding>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub run_at: DateTime<Utc>,
    pub findings: Vec<(Chain, AuditFinding)>,
    /// Chains whose audit could not complete.
    pub failures: Vec<(Chain, String)>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty() && self.failures.is_empty()
    }
}

/// Runs every registered chain's audit and collects the results.
#[derive(Default)]
pub struct Auditor {
    targets: Vec<Arc<dyn Auditable>>,
}

impl Auditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: Arc<dyn Auditable>) {
        info!("Registering audit for chain: {}", target.chain());
        self.targets.push(target);
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub async fn run(&self) -> AuditReport {
        let mut report = AuditReport {
            run_at: Utc::now(),
            findings: Vec::new(),
            failures: Vec::new(),
        };

        for target in &self.targets {
            let chain = target.chain();
            match target.audit().await {
                Ok(findings) => {
                    for finding in findings {
                        warn!("🚨 Audit finding on {}: {}", chain, finding);
                        report.findings.push((chain, finding));
                    }
                }
                Err(e) => {
                    error!("❌ Audit of {} failed: {}", chain, e);
                    report.failures.push((chain, e.to_string()));
                }
            }
        }

        info!(
            "✓ Audit completed: {} findings, {} failed chains",
            report.findings.len(),
            report.failures.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use rust_decimal_macros::dec;

    fn binding() -> ContractBinding {
        ContractBinding {
            identifier: "issue/3".into(),
            contract_address: "0xb0".into(),
            creation_tx: "0x01".into(),
        }
    }

    fn entry(total: Decimal, redeemed: bool) -> BountyLedgerEntry {
        let mut entry = BountyLedgerEntry::open("issue/3".into(), AssetKind::NativeCurrency);
        entry.total_deposited = total;
        entry.redeemed = redeemed;
        entry
    }

    #[test]
    fn test_contract_balance_assessment() {
        assert_eq!(assess_contract_balance(&binding(), &entry(dec!(1), false), dec!(1)), None);
        assert_eq!(assess_contract_balance(&binding(), &entry(dec!(1), true), dec!(0)), None);

        assert!(matches!(
            assess_contract_balance(&binding(), &entry(dec!(1), false), dec!(0)),
            Some(AuditFinding::PaidButUnmarked { .. })
        ));
        // deposit after the payout is stuck in the contract
        assert!(matches!(
            assess_contract_balance(&binding(), &entry(dec!(3), true), dec!(2)),
            Some(AuditFinding::BalanceMismatch { .. })
        ));
    }

    #[test]
    fn test_custody_assessment() {
        let usdc = AssetKind::issued("USDC", "GI");
        let owed = HashMap::from([(AssetKind::NativeCurrency, dec!(5)), (usdc.clone(), dec!(2))]);
        let held = HashMap::from([(AssetKind::NativeCurrency, dec!(5))]);

        assert_eq!(
            assess_custody(&owed, &held),
            vec![AuditFinding::CustodyShortfall {
                asset: usdc,
                owed: dec!(2),
                held: dec!(0),
            }]
        );
    }

    struct Fixed(Chain, ReconcileResult<Vec<AuditFinding>>);

    #[async_trait]
    impl Auditable for Fixed {
        fn chain(&self) -> Chain {
            self.0
        }

        async fn audit(&self) -> ReconcileResult<Vec<AuditFinding>> {
            match &self.1 {
                Ok(f) => Ok(f.clone()),
                Err(e) => Err(ReconcileError::unavailable(self.0, e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_run_collects_findings_and_failures() {
        let mut auditor = Auditor::new();
        auditor.register(Arc::new(Fixed(
            Chain::Ethereum,
            Ok(vec![AuditFinding::PaidButUnmarked {
                identifier: "issue/3".into(),
                contract_address: "0xb0".into(),
                derived: dec!(1),
            }]),
        )));
        auditor.register(Arc::new(Fixed(
            Chain::Stellar,
            Err(ReconcileError::unavailable(Chain::Stellar, "down")),
        )));

        let report = auditor.run().await;
        assert!(!report.is_clean());
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.failures[0].0, Chain::Stellar);
    }
}
