pub mod auditor;
pub mod scheduler;

pub use auditor::{AuditFinding, AuditReport, Auditable, Auditor};
pub use scheduler::{AuditScheduleConfig, AuditScheduler};
