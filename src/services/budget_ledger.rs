//! Budget Ledger: per-tier cost attribution and daily/all-time caps.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::models::{BudgetConfig, BudgetHistoryEntry, BudgetState, Tier};
use crate::domain::ports::{BudgetRepository, OrchestratorError, OrchestratorResult};
use crate::services::event_bus::EventBus;

const RESET_COOLDOWN: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Clone)]
pub struct BudgetLedger {
    state: Arc<Mutex<BudgetState>>,
    repo: Arc<dyn BudgetRepository>,
    events: EventBus,
    last_reset_at: Arc<Mutex<Option<chrono::DateTime<Utc>>>>,
}

impl BudgetLedger {
    pub async fn load(
        repo: Arc<dyn BudgetRepository>,
        events: EventBus,
        default_config: BudgetConfig,
    ) -> OrchestratorResult<Self> {
        let state = repo.load().await?.unwrap_or_else(|| BudgetState::new(default_config));
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            repo,
            events,
            last_reset_at: Arc::new(Mutex::new(None)),
        })
    }

    /// Roll the day over if the stored `day_start` is not today (local
    /// midnight boundary approximated in UTC here; deployments with a
    /// meaningful local timezone should configure one at the boundary
    /// layer). Archives the outgoing day to history.
    async fn maybe_roll_day(&self, state: &mut BudgetState) -> OrchestratorResult<()> {
        let today = Utc::now().date_naive();
        if state.day_start.date_naive() != today {
            let entry = BudgetHistoryEntry {
                date: state.day_start.date_naive(),
                spent_cents: state.daily_spent_cents,
            };
            self.repo.archive_day(&entry).await?;
            state.history.push(entry);
            state.daily_spent_cents = 0.0;
            state.day_start = Utc::now();
        }
        Ok(())
    }

    /// Record a charge against both the daily and all-time counters. After
    /// a terminal completion carrying cost `c`, `daily_spent_cents`
    /// increases by exactly `c` (modulo a day rollover, which archives and
    /// resets the previous day first).
    pub async fn charge(&self, cents: f64, _tier: Tier) -> OrchestratorResult<()> {
        let snapshot = {
            let mut state = self.state.lock().await;
            self.maybe_roll_day(&mut state).await?;
            state.daily_spent_cents += cents;
            state.all_time_spent_cents += cents;
            self.repo.save(&state).await?;
            state.daily_spent_cents
        };
        self.events.publish_cost_updated(snapshot).await;
        Ok(())
    }

    pub async fn is_cloud_blocked(&self) -> bool {
        self.state.lock().await.is_cloud_blocked()
    }

    pub async fn get_status(&self) -> BudgetState {
        self.state.lock().await.clone()
    }

    pub async fn get_config(&self) -> BudgetConfig {
        self.state.lock().await.config.clone()
    }

    pub async fn set_config(&self, config: BudgetConfig) -> OrchestratorResult<()> {
        let mut state = self.state.lock().await;
        state.config = config;
        self.repo.save(&state).await
    }

    /// Reset the daily counter immediately, bypassing rollover timing.
    /// Rejects the call with `Conflict` if the last reset was less than
    /// `RESET_COOLDOWN` ago, so a misbehaving client can't use this to
    /// defeat the daily cap by resetting in a tight loop.
    pub async fn reset_daily(&self) -> OrchestratorResult<()> {
        let mut last_reset = self.last_reset_at.lock().await;
        let now = Utc::now();
        if let Some(last) = *last_reset {
            let remaining = RESET_COOLDOWN - (now - last);
            if remaining > chrono::Duration::zero() {
                return Err(OrchestratorError::Conflict(format!(
                    "budget reset is on cooldown for another {}s",
                    remaining.num_seconds().max(1)
                )));
            }
        }
        let mut state = self.state.lock().await;
        state.daily_spent_cents = 0.0;
        state.day_start = now;
        self.repo.save(&state).await?;
        *last_reset = Some(now);
        Ok(())
    }

    pub async fn get_history(&self, days: u32) -> OrchestratorResult<Vec<BudgetHistoryEntry>> {
        self.repo.history(days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::pool::DatabasePool;
    use crate::adapters::sqlite::budget_repo::SqliteBudgetRepository;

    async fn ledger() -> BudgetLedger {
        let pool = DatabasePool::connect_in_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let repo: Arc<dyn BudgetRepository> = Arc::new(SqliteBudgetRepository::new(pool.clone()));
        BudgetLedger::load(repo, EventBus::new_for_test(), BudgetConfig { daily_limit_cents: 10.0, ..Default::default() })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn charge_increases_daily_by_exact_amount() {
        let ledger = ledger().await;
        ledger.charge(4.5, Tier::Sonnet).await.unwrap();
        let status = ledger.get_status().await;
        assert!((status.daily_spent_cents - 4.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn exceeding_daily_cap_blocks_cloud() {
        let ledger = ledger().await;
        assert!(!ledger.is_cloud_blocked().await);
        ledger.charge(12.0, Tier::Opus).await.unwrap();
        assert!(ledger.is_cloud_blocked().await);
    }

    #[tokio::test]
    async fn reset_daily_zeroes_counter() {
        let ledger = ledger().await;
        ledger.charge(5.0, Tier::Sonnet).await.unwrap();
        ledger.reset_daily().await.unwrap();
        let status = ledger.get_status().await;
        assert_eq!(status.daily_spent_cents, 0.0);
    }

    #[tokio::test]
    async fn reset_daily_rejects_repeat_within_cooldown() {
        let ledger = ledger().await;
        ledger.reset_daily().await.unwrap();
        let err = ledger.reset_daily().await.unwrap_err();
        assert!(matches!(err, crate::domain::ports::OrchestratorError::Conflict(_)));
    }
}
