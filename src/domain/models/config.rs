//! Root application configuration shape.
//!
//! Populated by `infrastructure::config::ConfigLoader` (figment: defaults
//! -> YAML file -> env). Every field has a sensible default so the
//! orchestrator can start with zero configuration in dev.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::budget::BudgetConfig;
use super::pricing::ModelRate;
use super::rate_window::{Tier, TierLimits};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".taskforge/taskforge.db".to_string(),
            max_connections: 10,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub api_key: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8088".to_string(),
            api_key: None,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub buffer_factor: f64,
    pub min_api_delay_sec: f64,
    pub debug: bool,
    pub limits: HashMap<String, TierLimits>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut limits = HashMap::new();
        limits.insert(
            Tier::Grok.as_str().to_string(),
            TierLimits { rpm: 60, input_tpm: 200_000, output_tpm: 100_000 },
        );
        limits.insert(
            Tier::Haiku.as_str().to_string(),
            TierLimits { rpm: 50, input_tpm: 150_000, output_tpm: 80_000 },
        );
        limits.insert(
            Tier::Sonnet.as_str().to_string(),
            TierLimits { rpm: 50, input_tpm: 100_000, output_tpm: 50_000 },
        );
        limits.insert(
            Tier::Opus.as_str().to_string(),
            TierLimits { rpm: 20, input_tpm: 50_000, output_tpm: 25_000 },
        );
        Self {
            buffer_factor: 0.8,
            min_api_delay_sec: 0.5,
            debug: false,
            limits,
        }
    }
}

/// Model pricing, keyed the same way `RateTable` looks rates up: an exact
/// normalized model name, or a family substring token. Ships with sane
/// defaults for the documented model families; deployments override
/// per-model via YAML or `TASKFORGE_PRICING__*` env vars as prices change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub families: HashMap<String, ModelRate>,
    pub exact: HashMap<String, ModelRate>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let mut families = HashMap::new();
        families.insert("local-free".to_string(), ModelRate { input_cents_per_million: 0.0, output_cents_per_million: 0.0 });
        families.insert("grok".to_string(), ModelRate { input_cents_per_million: 200.0, output_cents_per_million: 500.0 });
        families.insert("haiku".to_string(), ModelRate { input_cents_per_million: 80.0, output_cents_per_million: 400.0 });
        families.insert("sonnet".to_string(), ModelRate { input_cents_per_million: 300.0, output_cents_per_million: 1_500.0 });
        families.insert("opus".to_string(), ModelRate { input_cents_per_million: 1_500.0, output_cents_per_million: 7_500.0 });

        let mut exact = HashMap::new();
        exact.insert("haiku-4-5".to_string(), ModelRate { input_cents_per_million: 100.0, output_cents_per_million: 500.0 });

        Self { families, exact }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StuckTaskConfig {
    pub timeout_ms: i64,
    pub check_interval_ms: u64,
}

impl Default for StuckTaskConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 600_000,
            check_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoolingConfig {
    pub rest_ms: u64,
    pub extended_rest_ms: u64,
    pub reset_every_n: u32,
}

impl Default for CoolingConfig {
    fn default() -> Self {
        Self {
            rest_ms: 3_000,
            extended_rest_ms: 8_000,
            reset_every_n: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub enabled: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    pub auto_code_review: bool,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self { auto_code_review: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubsubConfig {
    pub enabled: bool,
    pub url: Option<String>,
}

impl Default for PubsubConfig {
    fn default() -> Self {
        Self { enabled: false, url: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for LogFormat {
    fn default() -> Self {
        Self::Pretty
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsRuntimeConfig {
    pub base_url: String,
    pub execute_timeout_sec: u64,
    pub abort_timeout_sec: u64,
    pub health_timeout_sec: u64,
}

impl Default for AgentsRuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090".to_string(),
            execute_timeout_sec: 600,
            abort_timeout_sec: 15,
            health_timeout_sec: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub pricing: PricingConfig,
    pub budget: BudgetConfig,
    pub stuck_task: StuckTaskConfig,
    pub cooling: CoolingConfig,
    pub validation: ValidationConfig,
    pub review: ReviewConfig,
    pub pubsub: PubsubConfig,
    pub logging: LoggingConfig,
    pub agents_runtime: AgentsRuntimeConfig,
}
