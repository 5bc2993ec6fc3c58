pub mod contract;
pub mod payment;
pub mod registrar;
pub mod router;

pub use contract::{ContractChain, ContractRecordDecoder};
pub use payment::{PaymentChain, PaymentDecoder};
pub use registrar::BountyRegistrar;
pub use router::BountyRouter;
