//! In-memory fakes for the capability traits, shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use crate::adapters::abi::same_address;
use crate::adapters::traits::{
    AssetBalance, ChainReader, ChainWriter, ExplorerTransaction, HistorySource,
    InternalTransaction, Page, PaymentLedgerReader, PaymentOperation, SignedTransaction,
    TransactionSpec,
};
use crate::error::{ReconcileError, ReconcileResult, SubmissionError};
use crate::ledger::models::{AssetKind, BountyLedgerEntry, Chain, Identifier, LedgerRecord, Truncation};
use crate::reconcile::engine::BountyChain;
use crate::reconcile::redemption::marker_memo;
use crate::reconcile::scanner::RecordStream;

pub const FACTORY: &str = "0x000000000000000000000000000000000000fac7";
pub const CUSTODY: &str = "GCUSTODY";

fn page_of<T: Clone>(items: &[T], cursor: Option<&str>, limit: u32) -> ReconcileResult<Page<T>> {
    let start: usize = match cursor {
        Some(c) => c
            .parse()
            .map_err(|_| ReconcileError::InvalidInput(format!("bad cursor {}", c)))?,
        None => 0,
    };
    let end = (start + limit as usize).min(items.len());
    let slice = items.get(start..end).map(|s| s.to_vec()).unwrap_or_default();
    let next_cursor = (end < items.len()).then(|| end.to_string());
    Ok(Page {
        items: slice,
        next_cursor,
    })
}

/// Explorer holding a flat transaction list; `txlist` for an address returns
/// the transactions it sent or received.
#[derive(Default)]
pub struct FakeExplorer {
    txs: Mutex<Vec<ExplorerTransaction>>,
    traces: Mutex<HashMap<String, Vec<InternalTransaction>>>,
    balances: Mutex<HashMap<String, Decimal>>,
    failing_pages: AtomicU32,
}

impl FakeExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_tx(&self, tx: ExplorerTransaction) {
        self.txs.lock().push(tx);
    }

    pub fn push_trace(&self, hash: &str, trace: Vec<InternalTransaction>) {
        self.traces.lock().insert(hash.to_string(), trace);
    }

    pub fn set_balance(&self, address: &str, balance: Decimal) {
        self.balances.lock().insert(address.to_lowercase(), balance);
    }

    /// The next `n` page fetches fail as unavailable.
    pub fn fail_pages(&self, n: u32) {
        self.failing_pages.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl HistorySource for FakeExplorer {
    type Raw = ExplorerTransaction;

    fn chain(&self) -> Chain {
        Chain::Ethereum
    }

    async fn fetch_page(
        &self,
        account: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> ReconcileResult<Page<ExplorerTransaction>> {
        if self
            .failing_pages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ReconcileError::unavailable(Chain::Ethereum, "explorer is down"));
        }

        let touching: Vec<ExplorerTransaction> = self
            .txs
            .lock()
            .iter()
            .filter(|tx| {
                same_address(&tx.from, account)
                    || tx.to.as_deref().map_or(false, |to| same_address(to, account))
            })
            .cloned()
            .collect();
        page_of(&touching, cursor, limit)
    }
}

#[async_trait]
impl ChainReader for FakeExplorer {
    async fn internal_transactions(&self, tx_hash: &str) -> ReconcileResult<Vec<InternalTransaction>> {
        Ok(self.traces.lock().get(tx_hash).cloned().unwrap_or_default())
    }

    async fn balance(&self, address: &str) -> ReconcileResult<Decimal> {
        Ok(self
            .balances
            .lock()
            .get(&address.to_lowercase())
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}

pub fn explorer_tx(hash: &str, from: &str, to: &str, value: Decimal, input: &str) -> ExplorerTransaction {
    ExplorerTransaction {
        hash: hash.to_string(),
        from: from.to_string(),
        to: Some(to.to_string()),
        value,
        input: input.to_string(),
        is_error: false,
        timestamp: None,
    }
}

pub fn created(contract: &str) -> InternalTransaction {
    InternalTransaction {
        from: FACTORY.to_string(),
        to: None,
        contract_address: Some(contract.to_string()),
        kind: "create".to_string(),
        is_error: false,
    }
}

/// Payment ledger holding a flat operation list.
#[derive(Default)]
pub struct FakePaymentLedger {
    ops: Mutex<Vec<PaymentOperation>>,
    balances: Mutex<Vec<AssetBalance>>,
}

impl FakePaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_op(&self, op: PaymentOperation) {
        self.ops.lock().push(op);
    }

    pub fn set_balance(&self, asset: AssetKind, balance: Decimal) {
        let mut balances = self.balances.lock();
        balances.retain(|b| b.asset != asset);
        balances.push(AssetBalance { asset, balance });
    }
}

#[async_trait]
impl HistorySource for FakePaymentLedger {
    type Raw = PaymentOperation;

    fn chain(&self) -> Chain {
        Chain::Stellar
    }

    async fn fetch_page(
        &self,
        account: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> ReconcileResult<Page<PaymentOperation>> {
        let touching: Vec<PaymentOperation> = self
            .ops
            .lock()
            .iter()
            .filter(|op| op.from == account || op.to == account)
            .cloned()
            .collect();
        page_of(&touching, cursor, limit)
    }
}

#[async_trait]
impl PaymentLedgerReader for FakePaymentLedger {
    async fn account_balances(&self, _account: &str) -> ReconcileResult<Vec<AssetBalance>> {
        Ok(self.balances.lock().clone())
    }
}

pub fn payment_op(
    id: &str,
    from: &str,
    to: &str,
    amount: &str,
    asset: &AssetKind,
    memo: Option<&str>,
) -> PaymentOperation {
    let (asset_type, asset_code, asset_issuer) = match asset {
        AssetKind::NativeCurrency => ("native".to_string(), None, None),
        AssetKind::IssuedAsset { issuer, code } => (
            if code.len() <= 4 { "credit_alphanum4" } else { "credit_alphanum12" }.to_string(),
            Some(code.clone()),
            Some(issuer.clone()),
        ),
    };

    PaymentOperation {
        id: id.to_string(),
        paging_token: id.to_string(),
        transaction_hash: format!("tx-{}", id),
        kind: "payment".to_string(),
        from: from.to_string(),
        to: to.to_string(),
        amount: amount.to_string(),
        asset_type,
        asset_code,
        asset_issuer,
        memo: memo.map(str::to_string),
        successful: true,
        created_at: None,
    }
}

/// Chain over a fixed record list.
pub struct RecordedChain {
    chain: Chain,
    records: Vec<LedgerRecord>,
    truncation: Option<Truncation>,
}

impl RecordedChain {
    pub fn new(chain: Chain, records: Vec<LedgerRecord>) -> Self {
        Self {
            chain,
            records,
            truncation: None,
        }
    }

    /// The record list ends at a window cut.
    pub fn truncated_by(mut self, truncation: Truncation) -> Self {
        self.truncation = Some(truncation);
        self
    }
}

#[async_trait]
impl BountyChain for RecordedChain {
    fn chain(&self) -> Chain {
        self.chain
    }

    fn default_asset(&self) -> AssetKind {
        AssetKind::NativeCurrency
    }

    async fn records(&self, _identifier: Option<&Identifier>) -> ReconcileResult<RecordStream> {
        use futures::StreamExt;
        let mut items: Vec<ReconcileResult<LedgerRecord>> = self.records.iter().cloned().map(Ok).collect();
        if let Some(truncation) = &self.truncation {
            items.push(Err(ReconcileError::HistoryTruncated(truncation.clone())));
        }
        Ok(futures::stream::iter(items).boxed())
    }

    async fn payout(&self, entry: &BountyLedgerEntry, destination: &str) -> ReconcileResult<TransactionSpec> {
        Ok(TransactionSpec::Payment {
            source: CUSTODY.to_string(),
            destination: destination.to_string(),
            asset: entry.asset.clone(),
            amount: entry.spendable(),
            memo: marker_memo(&entry.identifier),
        })
    }
}

/// Writer that records what it was asked to sign.
pub struct RecordingWriter {
    chain: Chain,
    signed: Mutex<Vec<TransactionSpec>>,
    broadcasts: AtomicU32,
    fail_broadcast: bool,
    delay: Duration,
}

impl RecordingWriter {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            signed: Mutex::new(Vec::new()),
            broadcasts: AtomicU32::new(0),
            fail_broadcast: false,
            delay: Duration::ZERO,
        }
    }

    pub fn failing_broadcast(mut self) -> Self {
        self.fail_broadcast = true;
        self
    }

    /// Signing sleeps this long, to hold a claim open.
    pub fn with_delay(mut self, millis: u64) -> Self {
        self.delay = Duration::from_millis(millis);
        self
    }

    pub fn signed(&self) -> Vec<TransactionSpec> {
        self.signed.lock().clone()
    }

    pub fn broadcasts(&self) -> u32 {
        self.broadcasts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainWriter for RecordingWriter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn build_and_sign(&self, spec: &TransactionSpec) -> Result<SignedTransaction, SubmissionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let n = {
            let mut signed = self.signed.lock();
            signed.push(spec.clone());
            signed.len()
        };
        Ok(SignedTransaction {
            chain: self.chain,
            hash: format!("signed-{}", n),
            payload: format!("envelope-{}", n),
        })
    }

    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String, SubmissionError> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        if self.fail_broadcast {
            return Err(SubmissionError::broadcast(self.chain, signed.hash.clone(), "connection reset"));
        }
        Ok(format!("tx-{}", signed.hash))
    }
}
