//! Cost Calculator.
//!
//! Pure pricing of `ExecutionLog` entries against a model rate table. No
//! side effects; the rate table is configuration, never hardcoded into the
//! pricing logic itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use crate::domain::models::ModelRate;
use crate::domain::models::{ExecutionLog, PricingConfig, Tier};

/// Two-step lookup table: exact model name, else longest-prefix match on
/// family tokens.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    exact: HashMap<String, ModelRate>,
    families: Vec<(String, ModelRate)>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exact(mut self, model: impl Into<String>, rate: ModelRate) -> Self {
        self.exact.insert(normalize(&model.into()), rate);
        self
    }

    /// Register a family token (e.g. "haiku", "sonnet", "local-free").
    /// Longer tokens are preferred on tie during lookup, so registration
    /// order does not matter; the lookup sorts by token length.
    pub fn with_family(mut self, token: impl Into<String>, rate: ModelRate) -> Self {
        self.families.push((normalize(&token.into()), rate));
        self
    }

    /// Default table covering the documented model families. Ships as a
    /// sane fallback for tests; deployments build via `from_config` instead,
    /// so real rates always come from `AppConfig.pricing`.
    pub fn default_table() -> Self {
        Self::from_config(&PricingConfig::default())
    }

    /// Build the lookup table from the `pricing` section of `AppConfig`.
    pub fn from_config(config: &PricingConfig) -> Self {
        let mut table = Self::new();
        for (token, rate) in &config.families {
            table = table.with_family(token.clone(), *rate);
        }
        for (model, rate) in &config.exact {
            table = table.with_exact(model.clone(), *rate);
        }
        table
    }

    pub fn lookup(&self, model: &str) -> ModelRate {
        let norm = normalize(model);
        if let Some(rate) = self.exact.get(&norm) {
            return *rate;
        }
        let mut best: Option<(&str, ModelRate)> = None;
        for (token, rate) in &self.families {
            if norm.contains(token.as_str()) {
                let better = best.map_or(true, |(cur, _)| token.len() > cur.len());
                if better {
                    best = Some((token.as_str(), *rate));
                }
            }
        }
        best.map(|(_, rate)| rate).unwrap_or(ModelRate {
            input_cents_per_million: 0.0,
            output_cents_per_million: 0.0,
        })
    }
}

fn normalize(model: &str) -> String {
    model.trim().to_lowercase()
}

/// `cost(log) = inputTokens/1e6 * rate.in + outputTokens/1e6 * rate.out`.
pub fn cost_cents(log: &ExecutionLog, table: &RateTable) -> f64 {
    let rate = table.lookup(&log.model_used);
    (log.input_tokens as f64 / 1_000_000.0) * rate.input_cents_per_million
        + (log.output_tokens as f64 / 1_000_000.0) * rate.output_cents_per_million
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cents: f64,
    pub by_model: HashMap<String, f64>,
    pub by_tier: HashMap<String, f64>,
}

/// Aggregate a set of logs, grouping by model and by tier. Aggregation is
/// additive: summing cost over any partitioning of the input logs and then
/// summing those partial totals equals `aggregate(logs).total_cents`.
pub fn aggregate(logs: &[ExecutionLog], table: &RateTable) -> CostSummary {
    let mut summary = CostSummary::default();
    for log in logs {
        let cost = cost_cents(log, table);
        summary.total_cents += cost;
        *summary.by_model.entry(log.model_used.clone()).or_insert(0.0) += cost;
        let tier = Tier::from_model_name(&log.model_used);
        *summary.by_tier.entry(tier.as_str().to_string()).or_insert(0.0) += cost;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ExecutionAction;
    use uuid::Uuid;

    fn log(model: &str, input: u64, output: u64) -> ExecutionLog {
        ExecutionLog::new(Uuid::new_v4(), Uuid::new_v4(), ExecutionAction::Completed, model, input, output, 100)
    }

    #[test]
    fn unknown_model_is_free() {
        let table = RateTable::default_table();
        assert_eq!(table.lookup("mystery-model-9000").input_cents_per_million, 0.0);
    }

    #[test]
    fn exact_match_beats_family_prefix() {
        let table = RateTable::default_table();
        let exact = table.lookup("haiku-4-5");
        let family = table.lookup("haiku-3");
        assert_ne!(exact.input_cents_per_million, family.input_cents_per_million);
    }

    #[test]
    fn local_model_is_free() {
        let table = RateTable::default_table();
        let l = log("qwen-coder:16k", 1000, 500);
        assert_eq!(cost_cents(&l, &table), 0.0);
    }

    #[test]
    fn sonnet_cost_matches_formula() {
        let table = RateTable::default_table();
        let l = log("sonnet", 1_000_000, 1_000_000);
        let cost = cost_cents(&l, &table);
        assert!((cost - (300.0 + 1_500.0)).abs() < 1e-9);
    }

    #[test]
    fn aggregation_is_additive_over_partitions() {
        let table = RateTable::default_table();
        let logs = vec![
            log("sonnet", 1000, 500),
            log("opus", 2000, 1000),
            log("qwen-coder:16k", 500, 500),
        ];
        let whole = aggregate(&logs, &table);
        let (a, b) = logs.split_at(1);
        let part_a = aggregate(a, &table);
        let part_b = aggregate(b, &table);
        assert!((whole.total_cents - (part_a.total_cents + part_b.total_cents)).abs() < 1e-9);
    }
}
