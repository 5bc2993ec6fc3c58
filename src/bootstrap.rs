use std::sync::Arc;
use tracing::{error, info, warn};
use crate::adapters::abi::BountySelectors;
use crate::adapters::explorer::ExplorerClient;
use crate::adapters::horizon::HorizonClient;
use crate::adapters::traits::{ChainWriter, TransactionSigner};
use crate::adapters::writer::SigningWriter;
use crate::audit::auditor::Auditor;
use crate::chains::contract::ContractChain;
use crate::chains::payment::PaymentChain;
use crate::chains::registrar::BountyRegistrar;
use crate::chains::router::BountyRouter;
use crate::config::{Config, ContractConfig, StellarConfig};
use crate::error::{ReconcileError, ReconcileResult};
use crate::ledger::models::Chain;
use crate::reconcile::dispatcher::RewardDispatcher;
use crate::reconcile::engine::ReconciliationEngine;
use crate::reconcile::entitlement::{EntitlementSource, StaticEntitlements};
use crate::reconcile::resolver::BountyResolver;
use crate::reconcile::retry::RetryPolicy;
use crate::reconcile::scanner::LedgerScanner;

/// Signing capabilities supplied by the deployment. A chain without a
/// signer is wired read-only.
#[derive(Default, Clone)]
pub struct Signers {
    pub stellar: Option<Arc<dyn TransactionSigner>>,
    pub ethereum: Option<Arc<dyn TransactionSigner>>,
}

/// Everything the binary (or an embedding service) needs.
pub struct Services {
    pub router: Arc<BountyRouter>,
    pub registrar: Option<Arc<BountyRegistrar<ExplorerClient>>>,
    pub auditor: Arc<Auditor>,
}

struct ContractWiring {
    chain: Arc<ContractChain<ExplorerClient>>,
    client: Arc<ExplorerClient>,
    selectors: BountySelectors,
}

pub fn initialize(config: &Config, signers: Signers) -> ReconcileResult<Services> {
    info!("Initializing reconciliation components ...");

    let retry = config.retry_policy();
    let mut router = BountyRouter::new();
    let mut auditor = Auditor::new();
    let mut registrar = None;

    // Contract chain first: the payment chain borrows its entitlement
    let contract = match &config.contract {
        Some(section) => Some(wire_contract(section, retry)?),
        None => {
            warn!("⚠️  [contract] not configured - contract bounties disabled");
            None
        }
    };

    if let Some(wiring) = &contract {
        let engine = ReconciliationEngine::new(wiring.chain.clone());
        router.register_engine(engine.clone());
        auditor.register(wiring.chain.clone());

        if let Some(signer) = signers.ethereum.clone() {
            let writer: Arc<dyn ChainWriter> =
                Arc::new(SigningWriter::new(Chain::Ethereum, signer, wiring.client.clone()));
            let dispatcher = RewardDispatcher::new(engine, wiring.chain.clone(), writer.clone())?;
            router.register_dispatcher(Arc::new(dispatcher));

            registrar = Some(Arc::new(BountyRegistrar::new(
                wiring.chain.resolver().clone(),
                writer,
                wiring.selectors,
            )?));
            info!("✅ Ethereum dispatcher registered");
        } else {
            error!("⚠️  Ethereum signer not provided - contract claims disabled");
        }
    }

    if let Some(section) = &config.stellar {
        let (chain, client) = wire_stellar(section, retry)?;
        let engine = ReconciliationEngine::new(chain.clone());
        router.register_engine(engine.clone());
        auditor.register(chain);

        if let Some(signer) = signers.stellar.clone() {
            let entitlement: Arc<dyn EntitlementSource> = match &contract {
                Some(wiring) => wiring.chain.clone(),
                None => Arc::new(static_entitlements(section)),
            };
            let writer = Arc::new(SigningWriter::new(Chain::Stellar, signer, client));
            let dispatcher = RewardDispatcher::new(engine, entitlement, writer)?;
            router.register_dispatcher(Arc::new(dispatcher));
            info!("✅ Stellar dispatcher registered");
        } else {
            error!("⚠️  Stellar signer not provided - payment claims disabled");
        }
    } else {
        warn!("⚠️  [stellar] not configured - payment bounties disabled");
    }

    if router.registered_chains().is_empty() {
        return Err(ReconcileError::Config(
            "no chain configured; set [stellar] and/or [contract]".to_string(),
        ));
    }

    info!(
        "🔗 Bounty router initialized with chains: {:?}",
        router.registered_chains()
    );

    Ok(Services {
        router: Arc::new(router),
        registrar,
        auditor: Arc::new(auditor),
    })
}

fn wire_contract(section: &ContractConfig, retry: RetryPolicy) -> ReconcileResult<ContractWiring> {
    let selectors = section.selectors()?;
    let client = Arc::new(ExplorerClient::new(
        section.explorer_url.clone(),
        section.api_key.clone(),
        section.requests_per_second,
        section.timeout(),
    )?);

    let scanner = LedgerScanner::new(client.clone(), section.window(), retry);
    let resolver = Arc::new(BountyResolver::new(
        scanner.clone(),
        section.factory_address.clone(),
        selectors,
        retry,
    ));
    info!("✅ Contract chain wired to factory {}", section.factory_address);

    Ok(ContractWiring {
        chain: Arc::new(ContractChain::new(scanner, resolver, selectors)),
        client,
        selectors,
    })
}

fn wire_stellar(
    section: &StellarConfig,
    retry: RetryPolicy,
) -> ReconcileResult<(Arc<PaymentChain<HorizonClient>>, Arc<HorizonClient>)> {
    let client = Arc::new(HorizonClient::new(section.horizon_url.clone(), section.timeout())?);
    let scanner = LedgerScanner::new(client.clone(), section.window(), retry);
    info!("✅ Payment chain wired to custody {}", section.custody_account);

    Ok((
        Arc::new(PaymentChain::new(scanner, section.custody_account.clone())),
        client,
    ))
}

fn static_entitlements(section: &StellarConfig) -> StaticEntitlements {
    section
        .claimants
        .iter()
        .fold(StaticEntitlements::new(), |acc, (identifier, claimant)| {
            acc.assign(identifier.as_str(), claimant.as_str())
        })
}
