use crate::ledger::models::{AssetKind, Chain, Identifier, Truncation};
use std::fmt;
use thiserror::Error;

/// Top-level error type for reconciliation and claims
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Bounty not found: {0}")]
    NotFound(Identifier),

    #[error("Bounty {identifier} is only partially resolved: {reason}")]
    ResolutionIncomplete { identifier: Identifier, reason: String },

    #[error("{}", not_entitled_message(.identifier, .claimant, .entitled))]
    NotEntitled {
        identifier: Identifier,
        claimant: String,
        entitled: Option<String>,
    },

    #[error("No funds to claim for {identifier} in {asset} (redeemed: {redeemed})")]
    NoFunds {
        identifier: Identifier,
        asset: AssetKind,
        redeemed: bool,
    },

    #[error("A claim for {0} is already in progress")]
    ClaimInProgress(Identifier),

    #[error("Submission error: {0}")]
    Submission(#[from] SubmissionError),

    #[error("Incomplete history: {0}")]
    HistoryTruncated(Truncation),

    #[error("Ledger unavailable on {chain}: {message}")]
    LedgerUnavailable { chain: Chain, message: String },

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(Chain),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn not_entitled_message(
    identifier: &Identifier,
    claimant: &str,
    entitled: &Option<String>,
) -> String {
    match entitled {
        Some(user) => format!(
            "username {} is not entitled to {}, it is user \"{}\"",
            claimant, identifier, user
        ),
        None => format!(
            "username {} is not entitled to {}, no claimant has been assigned",
            claimant, identifier
        ),
    }
}

impl ReconcileError {
    pub fn unavailable(chain: Chain, message: impl Into<String>) -> Self {
        ReconcileError::LedgerUnavailable {
            chain,
            message: message.into(),
        }
    }

    /// Only transient ledger failures are worth another attempt. Everything
    /// else is a statement about ledger contents or caller input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReconcileError::LedgerUnavailable { .. })
    }
}

/// A raw ledger item that could not be turned into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed call data: {0}")]
    CallData(String),

    #[error("Unknown selector: {0}")]
    UnknownSelector(String),

    #[error("Unparseable amount: {0}")]
    Amount(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unsupported asset type: {0}")]
    AssetType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Signing,
    Broadcast,
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStage::Signing => f.write_str("signing"),
            SubmissionStage::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// Failure while signing or broadcasting a payout.
///
/// A broadcast failure carries the signed hash: the transaction may still
/// land, so the caller must check the ledger before trying again.
#[derive(Error, Debug, Clone)]
#[error("{stage} failed on {chain}: {message}")]
pub struct SubmissionError {
    pub chain: Chain,
    pub stage: SubmissionStage,
    pub signed_hash: Option<String>,
    pub message: String,
}

impl SubmissionError {
    pub fn signing(chain: Chain, message: impl Into<String>) -> Self {
        Self {
            chain,
            stage: SubmissionStage::Signing,
            signed_hash: None,
            message: message.into(),
        }
    }

    pub fn broadcast(chain: Chain, signed_hash: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            chain,
            stage: SubmissionStage::Broadcast,
            signed_hash: Some(signed_hash.into()),
            message: message.into(),
        }
    }

    pub fn may_have_landed(&self) -> bool {
        self.stage == SubmissionStage::Broadcast
    }
}

impl From<config::ConfigError> for ReconcileError {
    fn from(error: config::ConfigError) -> Self {
        ReconcileError::Config(error.to_string())
    }
}

impl From<rust_decimal::Error> for ReconcileError {
    fn from(error: rust_decimal::Error) -> Self {
        ReconcileError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<validator::ValidationErrors> for ReconcileError {
    fn from(error: validator::ValidationErrors) -> Self {
        let mut fields = error
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let error_messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<String>>();
        fields.sort();

        ReconcileError::InvalidInput(format!("Validation failed: {}", fields.join("; ")))
    }
}

/// Result type alias for the crate
pub type ReconcileResult<T> = Result<T, ReconcileError>;
