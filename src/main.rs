use anyhow::Context;
use bounty_ledger::audit::AuditScheduler;
use bounty_ledger::bootstrap::{self, Signers};
use bounty_ledger::config::Config;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,bounty_ledger=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting bounty ledger reconciler");

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Signing keys are injected by embedding services; the binary only reads
    let services = bootstrap::initialize(&config, Signers::default())
        .context("failed to initialize services")?;

    if !config.audit.enabled || services.auditor.is_empty() {
        warn!("⚠️  Audit disabled, nothing to do");
        return Ok(());
    }

    let scheduler = AuditScheduler::new(config.audit_schedule(), Arc::clone(&services.auditor));
    let handle = scheduler.start();
    info!(
        "🔄 Audit scheduler started (every {}s) for chains: {:?}",
        config.audit.interval_secs,
        services.router.registered_chains()
    );

    tokio::select! {
        result = handle => {
            result.context("audit scheduler stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            info!("🛑 Shutting down");
        }
    }

    Ok(())
}
