//! Budget ledger state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single day's archived spend, used by `getHistory`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetHistoryEntry {
    pub date: NaiveDate,
    pub spent_cents: f64,
}

/// Tunable budget policy, loaded from `AppConfig` and mutable at runtime
/// via `setConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub daily_limit_cents: f64,
    pub warning_threshold: f64,
    pub enabled: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit_cents: 1_000.0,
            warning_threshold: 0.8,
            enabled: true,
        }
    }
}

/// Singleton budget counters. Owned by `BudgetLedger`; this struct is the
/// persisted/snapshot shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetState {
    pub daily_spent_cents: f64,
    pub all_time_spent_cents: f64,
    pub day_start: DateTime<Utc>,
    pub config: BudgetConfig,
    pub history: Vec<BudgetHistoryEntry>,
}

impl BudgetState {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            daily_spent_cents: 0.0,
            all_time_spent_cents: 0.0,
            day_start: Utc::now(),
            config,
            history: Vec::new(),
        }
    }

    pub fn is_cloud_blocked(&self) -> bool {
        self.config.enabled && self.daily_spent_cents >= self.config.daily_limit_cents
    }

    pub fn is_warning(&self) -> bool {
        self.config.enabled
            && self.daily_spent_cents >= self.config.daily_limit_cents * self.config.warning_threshold
    }
}
