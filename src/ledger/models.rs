use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledgers the engine knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Operation-based payment ledger; bounties are memo-tagged payments
    /// into one custody account.
    Stellar,
    /// Account-based smart-contract chain; one contract per bounty.
    Ethereum,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Stellar => "stellar",
            Chain::Ethereum => "ethereum",
        }
    }
}

/// Bounty identifier, in practice an issue URL.
///
/// Compared byte for byte. `https://x/1` and `https://x/1/` are two bounties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Asset a deposit was made in. Part of the aggregation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetKind {
    NativeCurrency,
    IssuedAsset { issuer: String, code: String },
}

impl AssetKind {
    pub fn issued(code: impl Into<String>, issuer: impl Into<String>) -> Self {
        AssetKind::IssuedAsset {
            issuer: issuer.into(),
            code: code.into(),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, AssetKind::NativeCurrency)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::NativeCurrency => f.write_str("native"),
            AssetKind::IssuedAsset { issuer, code } => write!(f, "{}:{}", code, issuer),
        }
    }
}

/// Identity of the ledger effect a record was decoded from: an operation id
/// on the payment ledger, a transaction hash on the contract chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which way a payment moved relative to the custody account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One observed deposit or redemption marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: RecordId,
    /// Decoded memo or call argument. `None` never matches anything.
    pub identifier_candidate: Option<Identifier>,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub asset: AssetKind,
    pub is_redemption_marker: bool,
    /// Ordering hint only.
    pub observed_at: Option<DateTime<Utc>>,
}

impl LedgerRecord {
    pub fn deposit(
        id: impl Into<RecordId>,
        identifier: Identifier,
        amount: Decimal,
        asset: AssetKind,
    ) -> Self {
        Self {
            id: id.into(),
            identifier_candidate: Some(identifier),
            amount,
            asset,
            is_redemption_marker: false,
            observed_at: None,
        }
    }

    pub fn redemption(
        id: impl Into<RecordId>,
        identifier: Identifier,
        amount: Decimal,
        asset: AssetKind,
    ) -> Self {
        Self {
            is_redemption_marker: true,
            ..Self::deposit(id, identifier, amount, asset)
        }
    }

    /// A payment with no usable tag.
    pub fn untagged(id: impl Into<RecordId>, amount: Decimal, asset: AssetKind) -> Self {
        Self {
            id: id.into(),
            identifier_candidate: None,
            amount,
            asset,
            is_redemption_marker: false,
            observed_at: None,
        }
    }

    pub fn observed_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.observed_at = at;
        self
    }
}

/// Derived state of one `(identifier, asset)` bounty. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BountyLedgerEntry {
    pub identifier: Identifier,
    pub asset: AssetKind,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_deposited: Decimal,
    pub deposit_count: u32,
    pub redeemed: bool,
}

impl BountyLedgerEntry {
    pub fn open(identifier: Identifier, asset: AssetKind) -> Self {
        Self {
            identifier,
            asset,
            total_deposited: Decimal::ZERO,
            deposit_count: 0,
            redeemed: false,
        }
    }

    /// Amount a claim may pay out. Always zero once redeemed.
    pub fn spendable(&self) -> Decimal {
        if self.redeemed {
            Decimal::ZERO
        } else {
            self.total_deposited
        }
    }
}

/// A scan that hit its page window while the account had more history.
/// What lies past the window (newer deposits, payout markers) was not seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truncation {
    pub chain: Chain,
    pub account: String,
    pub pages: u32,
}

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} history of {} continues past the {} page scan window",
            self.chain, self.account, self.pages
        )
    }
}

/// Identifier to bounty contract mapping on the contract chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractBinding {
    pub identifier: Identifier,
    pub contract_address: String,
    /// Factory call that created the contract.
    pub creation_tx: String,
}
