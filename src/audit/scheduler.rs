// Audit Scheduler - periodically compares derived bounty state with chain balances
//
// - Runs the first pass immediately, then every `interval`
// - Findings are logged; nothing is corrected automatically
// - A failed chain does not stop the others or later passes

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;
use crate::audit::auditor::{AuditReport, Auditor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditScheduleConfig {
    pub interval: Duration,
}

impl Default for AuditScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
        }
    }
}

/// Audit scheduler - runs the auditor on a fixed interval in the background
pub struct AuditScheduler {
    config: AuditScheduleConfig,
    auditor: Arc<Auditor>,
    reports: Arc<watch::Sender<Option<AuditReport>>>,
}

impl AuditScheduler {
    pub fn new(config: AuditScheduleConfig, auditor: Arc<Auditor>) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            config,
            auditor,
            reports: Arc::new(reports),
        }
    }

    /// Latest report, updated after every pass.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuditReport>> {
        self.reports.subscribe()
    }

    /// Start the audit loop (runs in background)
    pub fn start(&self) -> JoinHandle<()> {
        let period = self.config.interval.max(Duration::from_millis(1));
        let auditor = self.auditor.clone();
        let reports = self.reports.clone();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                info!("🔄 Starting audit cycle");
                let report = auditor.run().await;
                if report.is_clean() {
                    info!("✓ Audit cycle clean");
                }
                reports.send_replace(Some(report));
            }
        })
    }
}
