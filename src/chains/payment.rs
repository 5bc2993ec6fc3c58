use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use crate::adapters::horizon::parse_asset;
use crate::adapters::traits::{PaymentLedgerReader, PaymentOperation, TransactionSpec};
use crate::audit::auditor::{assess_custody, AuditFinding, Auditable};
use crate::error::{DecodeError, ReconcileError, ReconcileResult};
use crate::ledger::models::{AssetKind, BountyLedgerEntry, Chain, Direction, Identifier, LedgerRecord};
use crate::reconcile::aggregator::{fold_records, AggregationScope};
use crate::reconcile::engine::BountyChain;
use crate::reconcile::redemption::{classify_memo, marker_memo, MemoTag};
use crate::reconcile::scanner::{LedgerScanner, RecordDecoder, RecordStream};

/// Text memos on the payment ledger hold at most this many bytes.
pub const MAX_MEMO_BYTES: usize = 28;

/// Operations that move value. `create_account` is how a new account gets
/// funded, custody included.
const PAYMENT_KINDS: [&str; 4] = [
    "create_account",
    "payment",
    "path_payment_strict_receive",
    "path_payment_strict_send",
];

/// Turns custody-account payments into ledger records.
#[derive(Debug, Clone)]
pub struct PaymentDecoder {
    custody_account: String,
}

impl PaymentDecoder {
    pub fn new(custody_account: impl Into<String>) -> Self {
        Self {
            custody_account: custody_account.into(),
        }
    }
}

impl RecordDecoder for PaymentDecoder {
    type Raw = PaymentOperation;

    fn decode(&self, op: &PaymentOperation) -> Result<Option<LedgerRecord>, DecodeError> {
        if !PAYMENT_KINDS.contains(&op.kind.as_str()) || !op.successful {
            return Ok(None);
        }

        let direction = if op.to == self.custody_account {
            Direction::Inbound
        } else if op.from == self.custody_account {
            Direction::Outbound
        } else {
            return Ok(None);
        };

        let amount =
            Decimal::from_str_exact(&op.amount).map_err(|_| DecodeError::Amount(op.amount.clone()))?;
        if amount.is_sign_negative() {
            return Err(DecodeError::Amount(op.amount.clone()));
        }
        let asset = parse_asset(
            &op.asset_type,
            op.asset_code.as_deref(),
            op.asset_issuer.as_deref(),
        )
        .ok_or_else(|| DecodeError::AssetType(op.asset_type.clone()))?;

        let record = match classify_memo(op.memo.as_deref(), direction) {
            Some(MemoTag::Deposit(id)) => LedgerRecord::deposit(op.id.as_str(), id, amount, asset),
            Some(MemoTag::Redemption(id)) => LedgerRecord::redemption(op.id.as_str(), id, amount, asset),
            None if direction == Direction::Inbound => LedgerRecord::untagged(op.id.as_str(), amount, asset),
            // ordinary outflow, not a payout
            None => return Ok(None),
        };

        Ok(Some(record.observed_at(op.created_at)))
    }
}

/// Bounties held as memo-tagged payments into one custody account.
pub struct PaymentChain<R> {
    scanner: LedgerScanner<R>,
    custody_account: String,
    decoder: Arc<PaymentDecoder>,
}

impl<R> PaymentChain<R>
where
    R: PaymentLedgerReader + 'static,
{
    pub fn new(scanner: LedgerScanner<R>, custody_account: impl Into<String>) -> Self {
        let custody_account = custody_account.into();
        Self {
            scanner,
            decoder: Arc::new(PaymentDecoder::new(custody_account.clone())),
            custody_account,
        }
    }
}

#[async_trait]
impl<R> BountyChain for PaymentChain<R>
where
    R: PaymentLedgerReader + 'static,
{
    fn chain(&self) -> Chain {
        Chain::Stellar
    }

    fn default_asset(&self) -> AssetKind {
        AssetKind::NativeCurrency
    }

    /// The whole custody history; every bounty shares the one account.
    async fn records(&self, _identifier: Option<&Identifier>) -> ReconcileResult<RecordStream> {
        Ok(self.scanner.scan(&self.custody_account, self.decoder.clone()))
    }

    async fn payout(&self, entry: &BountyLedgerEntry, destination: &str) -> ReconcileResult<TransactionSpec> {
        let memo = marker_memo(&entry.identifier);
        if memo.len() > MAX_MEMO_BYTES {
            return Err(ReconcileError::InvalidInput(format!(
                "redemption memo {} is {} bytes, the ledger allows {}",
                memo,
                memo.len(),
                MAX_MEMO_BYTES
            )));
        }

        Ok(TransactionSpec::Payment {
            source: self.custody_account.clone(),
            destination: destination.to_string(),
            asset: entry.asset.clone(),
            amount: entry.spendable(),
            memo,
        })
    }
}

#[async_trait]
impl<R> Auditable for PaymentChain<R>
where
    R: PaymentLedgerReader + 'static,
{
    fn chain(&self) -> Chain {
        Chain::Stellar
    }

    #[instrument(skip(self), fields(custody = %self.custody_account))]
    async fn audit(&self) -> ReconcileResult<Vec<AuditFinding>> {
        let ledger = fold_records(self.records(None).await?, &AggregationScope::all())
            .await?
            .complete()?;

        let mut owed: HashMap<AssetKind, Decimal> = HashMap::new();
        for entry in ledger.iter() {
            *owed.entry(entry.asset.clone()).or_default() += entry.spendable();
        }

        let held: HashMap<AssetKind, Decimal> = self
            .scanner
            .source()
            .account_balances(&self.custody_account)
            .await?
            .into_iter()
            .map(|b| (b.asset, b.balance))
            .collect();

        Ok(assess_custody(&owed, &held))
    }
}
