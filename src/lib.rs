//! Bounty ledger reconciliation.
//!
//! Bounty state is never stored. Every query replays the chain history it
//! concerns: a memo-tagged custody account on a payment ledger, or one
//! factory-created contract per bounty on a contract chain.

pub mod adapters;
pub mod audit;
pub mod bootstrap;
pub mod chains;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reconcile;

#[cfg(test)]
mod testing;

pub use error::{ReconcileError, ReconcileResult, SubmissionError};
pub use ledger::models::{
    AssetKind, BountyLedgerEntry, Chain, ContractBinding, Identifier, LedgerRecord, Truncation,
};
