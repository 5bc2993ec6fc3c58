use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;
use crate::adapters::abi::{BountySelectors, Selector};
use crate::audit::scheduler::AuditScheduleConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::reconcile::retry::RetryPolicy;
use crate::reconcile::scanner::ScanWindow;

/// Optional config file, looked up without extension.
pub const CONFIG_FILE: &str = "bounty-ledger";
pub const ENV_PREFIX: &str = "BOUNTY";

/// Explorers refuse `txlist` requests whose `page * offset` exceeds this.
pub const EXPLORER_MAX_RESULTS: u64 = 10_000;

/// Service configuration.
///
/// Layered: `bounty-ledger.toml` if present, then `BOUNTY__SECTION__KEY`
/// environment variables. A chain whose section is absent is not wired.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    pub stellar: Option<StellarConfig>,
    pub contract: Option<ContractConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StellarConfig {
    #[serde(default = "default_horizon_url")]
    #[validate(length(min = 1, message = "horizon url must not be empty"))]
    pub horizon_url: String,
    #[validate(length(min = 1, message = "custody account must not be empty"))]
    pub custody_account: String,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 200, message = "page size must be between 1 and 200"))]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    #[validate(range(min = 1, message = "max pages must be positive"))]
    pub max_pages: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Identifier to claimant, used when no contract chain is configured.
    #[serde(default)]
    pub claimants: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContractConfig {
    #[serde(default = "default_explorer_url")]
    #[validate(length(min = 1, message = "explorer url must not be empty"))]
    pub explorer_url: String,
    #[serde(default)]
    pub api_key: String,
    #[validate(length(min = 1, message = "factory address must not be empty"))]
    pub factory_address: String,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default = "default_requests_per_second")]
    #[validate(range(min = 1, message = "requests per second must be positive"))]
    pub requests_per_second: u32,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 10000, message = "page size must be between 1 and 10000"))]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    #[validate(range(min = 1, message = "max pages must be positive"))]
    pub max_pages: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Four-byte selectors as `0x` hex.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectorConfig {
    pub create_bounty: String,
    pub assign_reward: String,
    pub reward: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        let defaults = BountySelectors::default();
        Self {
            create_bounty: defaults.create_bounty.to_string(),
            assign_reward: defaults.assign_reward.to_string(),
            reward: defaults.reward.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_interval_secs")]
    pub interval_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_audit_interval_secs(),
        }
    }
}

fn default_horizon_url() -> String {
    "https://horizon.stellar.org".to_string()
}

fn default_explorer_url() -> String {
    "https://api.etherscan.io/api".to_string()
}

fn default_page_size() -> u32 {
    200
}

fn default_max_pages() -> u32 {
    25
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_requests_per_second() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_audit_interval_secs() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

fn invalid_section(section: &str, errors: validator::ValidationErrors) -> ReconcileError {
    ReconcileError::Config(format!("[{}] {}", section, ReconcileError::from(errors)))
}

impl Config {
    /// Load from `bounty-ledger.toml` (if any) and `BOUNTY__*` variables.
    pub fn load() -> ReconcileResult<Self> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(file: &str) -> ReconcileResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_settings(settings)
    }

    pub(crate) fn from_settings(settings: config::Config) -> ReconcileResult<Self> {
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Section-level checks the field attributes cannot express.
    pub fn validate(&self) -> ReconcileResult<()> {
        if let Some(stellar) = &self.stellar {
            Validate::validate(stellar).map_err(|e| invalid_section("stellar", e))?;
        }
        if let Some(contract) = &self.contract {
            Validate::validate(contract).map_err(|e| invalid_section("contract", e))?;
            let depth = u64::from(contract.page_size) * u64::from(contract.max_pages);
            if depth > EXPLORER_MAX_RESULTS {
                return Err(ReconcileError::Config(format!(
                    "[contract] page_size * max_pages is {}, the explorer serves at most {}",
                    depth, EXPLORER_MAX_RESULTS
                )));
            }
            contract.selectors()?;
        }
        if self.retry.max_attempts == 0 {
            return Err(ReconcileError::Config("[retry] max_attempts must be positive".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn audit_schedule(&self) -> AuditScheduleConfig {
        AuditScheduleConfig {
            interval: Duration::from_secs(self.audit.interval_secs),
        }
    }
}

impl StellarConfig {
    pub fn window(&self) -> ScanWindow {
        ScanWindow {
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ContractConfig {
    pub fn window(&self) -> ScanWindow {
        ScanWindow {
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn selectors(&self) -> ReconcileResult<BountySelectors> {
        let parse = |name: &str, raw: &str| {
            raw.parse::<Selector>()
                .map_err(|e| ReconcileError::Config(format!("[contract] selector {}: {}", name, e)))
        };
        Ok(BountySelectors {
            create_bounty: parse("create_bounty", &self.selectors.create_bounty)?,
            assign_reward: parse("assign_reward", &self.selectors.assign_reward)?,
            reward: parse("reward", &self.selectors.reward)?,
        })
    }
}
