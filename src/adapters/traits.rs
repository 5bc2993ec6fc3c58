use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::error::{ReconcileResult, SubmissionError};
use crate::ledger::models::{AssetKind, Chain};

/// One page of ledger history plus the cursor for the next one.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` when the ledger has nothing further.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// Raw ledger item with a stable identity, used when logging skipped items.
pub trait RawTransaction {
    fn raw_id(&self) -> String;
}

/// Paged, oldest-first history of one account.
#[async_trait]
pub trait HistorySource: Send + Sync {
    type Raw: RawTransaction + Send + Sync + 'static;

    fn chain(&self) -> Chain;

    async fn fetch_page(
        &self,
        account: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> ReconcileResult<Page<Self::Raw>>;
}

/// A payment operation as the payment ledger reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentOperation {
    pub id: String,
    pub paging_token: String,
    pub transaction_hash: String,
    /// Operation type, e.g. `payment` or `create_account`.
    pub kind: String,
    pub from: String,
    pub to: String,
    /// Decimal string with the ledger's own precision.
    pub amount: String,
    pub asset_type: String,
    pub asset_code: Option<String>,
    pub asset_issuer: Option<String>,
    /// Text memo of the enclosing transaction.
    pub memo: Option<String>,
    pub successful: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl RawTransaction for PaymentOperation {
    fn raw_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBalance {
    pub asset: AssetKind,
    pub balance: Decimal,
}

/// Account-based payment ledger, read side.
#[async_trait]
pub trait PaymentLedgerReader: HistorySource<Raw = PaymentOperation> {
    async fn account_balances(&self, account: &str) -> ReconcileResult<Vec<AssetBalance>>;
}

/// A transaction from the explorer's account listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExplorerTransaction {
    pub hash: String,
    pub from: String,
    /// Empty for contract deployments.
    pub to: Option<String>,
    /// Native value in whole units.
    pub value: Decimal,
    /// 0x-prefixed call data.
    pub input: String,
    pub is_error: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawTransaction for ExplorerTransaction {
    fn raw_id(&self) -> String {
        self.hash.clone()
    }
}

/// One entry of an internal-transaction trace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternalTransaction {
    pub from: String,
    pub to: Option<String>,
    /// Set on `create` entries.
    pub contract_address: Option<String>,
    pub kind: String,
    pub is_error: bool,
}

/// Smart-contract chain, read side.
#[async_trait]
pub trait ChainReader: HistorySource<Raw = ExplorerTransaction> {
    async fn internal_transactions(&self, tx_hash: &str) -> ReconcileResult<Vec<InternalTransaction>>;

    async fn balance(&self, address: &str) -> ReconcileResult<Decimal>;
}

/// Unsigned description of what a writer should submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionSpec {
    /// A single payment carrying a text memo in the same transaction.
    Payment {
        source: String,
        destination: String,
        asset: AssetKind,
        amount: Decimal,
        memo: String,
    },
    /// A contract call with 0x-prefixed call data.
    ContractCall {
        to: String,
        data: String,
        value: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub chain: Chain,
    pub hash: String,
    /// Encoded envelope ready for broadcast.
    pub payload: String,
}

/// Signing capability injected per deployment. Keys never live in this crate.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, spec: &TransactionSpec) -> Result<SignedTransaction, SubmissionError>;
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Returns the ledger's transaction id.
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String, SubmissionError>;
}

/// Write side of a chain. Neither step is retried by callers.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    fn chain(&self) -> Chain;

    async fn build_and_sign(&self, spec: &TransactionSpec) -> Result<SignedTransaction, SubmissionError>;

    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String, SubmissionError>;
}
