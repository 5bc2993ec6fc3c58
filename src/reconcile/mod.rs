pub mod aggregator;
pub mod dispatcher;
pub mod engine;
pub mod entitlement;
pub mod matcher;
pub mod redemption;
pub mod resolver;
pub mod retry;
pub mod scanner;

pub use aggregator::{AggregationScope, BountyLedger, RedeemedPolicy};
pub use dispatcher::{ClaimReceipt, ClaimRequest, RewardDispatcher};
pub use engine::{BountyChain, ReconciliationEngine};
pub use entitlement::{EntitlementSource, StaticEntitlements};
pub use resolver::BountyResolver;
pub use retry::RetryPolicy;
pub use scanner::{LedgerScanner, RecordDecoder, RecordStream, ScanWindow};
