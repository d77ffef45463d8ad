//! Task Queue & Lifecycle State Machine.
//!
//! Owns every transition a `Task` makes from creation through a terminal
//! state: admission (file locks + resource slots), dispatch to the
//! external agent runtime, completion/failure bookkeeping, retries, and
//! the Ollama-style cooling delay after local-tier coder tasks.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{
    Agent, AgentStatus, AgentType, CoolingConfig, ExecutionAction, ExecutionLog, ResourceTier,
    Task, TaskStatus,
};
use crate::domain::ports::{
    AgentRepository, AgentRuntimeClient, ExecuteRequest, ExecutionLogRepository,
    OrchestratorError, OrchestratorResult, TaskRepository,
};
use crate::services::budget_ledger::BudgetLedger;
use crate::services::cost_calculator::{self, RateTable};
use crate::services::event_bus::EventBus;
use crate::services::file_lock_manager::FileLockManager;
use crate::services::rate_governor::{resolve_tier, RateGovernor};
use crate::services::resource_pool::ResourcePool;
use crate::services::task_router::{select_tier, TaskRouter};

/// Caller-supplied overrides for a single `/execute` dispatch, layered on
/// top of whatever the Router/Agent config would otherwise decide.
#[derive(Debug, Clone, Default)]
pub struct DispatchOverrides {
    pub use_cloud: Option<bool>,
    pub model: Option<String>,
    pub allow_fallback: Option<bool>,
}

pub struct TaskQueueService {
    pub(crate) tasks: Arc<dyn TaskRepository>,
    pub(crate) agents: Arc<dyn AgentRepository>,
    pub(crate) execution_logs: Arc<dyn ExecutionLogRepository>,
    pub(crate) file_locks: FileLockManager,
    pub(crate) resources: ResourcePool,
    pub(crate) rate_governor: RateGovernor,
    pub(crate) budget: BudgetLedger,
    pub(crate) events: EventBus,
    pub(crate) router: Arc<TaskRouter>,
    pub(crate) agent_runtime: Arc<dyn AgentRuntimeClient>,
    pub(crate) rate_table: RateTable,
    pub(crate) cooling: CoolingConfig,
    pub(crate) review_enabled: bool,
}

impl TaskQueueService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        agents: Arc<dyn AgentRepository>,
        execution_logs: Arc<dyn ExecutionLogRepository>,
        file_locks: FileLockManager,
        resources: ResourcePool,
        rate_governor: RateGovernor,
        budget: BudgetLedger,
        events: EventBus,
        router: Arc<TaskRouter>,
        agent_runtime: Arc<dyn AgentRuntimeClient>,
        rate_table: RateTable,
        cooling: CoolingConfig,
        review_enabled: bool,
    ) -> Self {
        Self {
            tasks,
            agents,
            execution_logs,
            file_locks,
            resources,
            rate_governor,
            budget,
            events,
            router,
            agent_runtime,
            rate_table,
            cooling,
            review_enabled,
        }
    }

    /// Create and persist a task, assessing its complexity via the Router
    /// up front so `assign` never has to perform I/O-bound assessment
    /// while holding admission state.
    pub async fn create_task(&self, mut task: Task) -> OrchestratorResult<Task> {
        let assessment = self.router.assess(&task).await?;
        task.complexity = assessment.complexity;
        task.complexity_source = assessment.source;
        self.tasks.create(&task).await?;
        self.events.publish_task_created(task.id).await;
        Ok(task)
    }

    fn resolve_tier_and_model(&self, task: &Task, agent: &Agent) -> (ResourceTier, String, bool) {
        let decision = select_tier(task.complexity, agent.config.preferred_tier);
        let resource_tier = ResourceTier::for_use_cloud(decision.use_cloud);
        (resource_tier, decision.model, decision.use_cloud)
    }

    /// Explicit pairing: `POST /queue/assign {taskId, agentId}`. Fails with
    /// `NotFound`, `InvalidTransition` (task not pending / agent not idle /
    /// required_agent mismatch), or `AdmissionDenied` (file lock conflict
    /// or no resource slot) — all surfaced to the caller as errors, unlike
    /// the background scheduler path.
    pub async fn assign_task_to_agent(&self, task_id: Uuid, agent_id: Uuid) -> OrchestratorResult<Task> {
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(OrchestratorError::NotFound("task", task_id))?;
        let mut agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or(OrchestratorError::NotFound("agent", agent_id))?;

        if task.status != TaskStatus::Pending {
            return Err(OrchestratorError::InvalidTransition(format!(
                "task {task_id} is {:?}, not pending",
                task.status
            )));
        }
        if !agent.is_idle() {
            return Err(OrchestratorError::InvalidTransition(format!("agent {agent_id} is not idle")));
        }
        if let Some(required) = &task.required_agent {
            if agent.agent_type.as_str() != required {
                return Err(OrchestratorError::InvalidTransition(format!(
                    "agent {agent_id} is not of required type {required}"
                )));
            }
        }

        if self.file_locks.conflicts(&task.locked_files).await? {
            return Err(OrchestratorError::AdmissionDenied(format!(
                "task {task_id} has a file-lock conflict"
            )));
        }

        let (resource_tier, model, use_cloud) = self.resolve_tier_and_model(&task, &agent);
        if use_cloud && self.budget.is_cloud_blocked().await {
            return Err(OrchestratorError::BudgetExceeded(
                "daily cloud budget exhausted".to_string(),
            ));
        }
        if !self.resources.acquire(resource_tier, task_id).await {
            return Err(OrchestratorError::AdmissionDenied(format!(
                "no {} slot available",
                resource_tier.as_str()
            )));
        }

        let locks = FileLockManager::build_locks(&task.locked_files, agent_id, task_id);
        task.apply_assign(agent_id);
        agent.mark_busy(task_id);

        if let Err(err) = self.tasks.commit_assignment(&task, &agent, &locks).await {
            self.resources.release(task_id).await;
            return Err(err);
        }

        info!(task_id = %task_id, agent_id = %agent_id, model = %model, "task assigned");
        self.events.publish_task_updated(task_id, task.status.as_str()).await;
        self.events.publish_agent_status_changed(agent_id, agent.status.as_str()).await;
        Ok(task)
    }

    /// Scheduler-driven variant: given a newly-idle agent, find the
    /// highest-priority eligible pending task (priority DESC, created_at
    /// ASC) and assign it. Returns `Ok(None)` rather than an error when no
    /// task is eligible — admission failures here never surface, per the
    /// `AdmissionDenied` error-kind policy.
    pub async fn assign_next_for_agent(&self, agent_id: Uuid) -> OrchestratorResult<Option<Task>> {
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or(OrchestratorError::NotFound("agent", agent_id))?;
        if !agent.is_idle() {
            return Ok(None);
        }

        let candidates = self.tasks.list_pending_ordered().await?;
        for task in candidates {
            if let Some(required) = &task.required_agent {
                if agent.agent_type.as_str() != required {
                    continue;
                }
            }
            if self.file_locks.conflicts(&task.locked_files).await? {
                continue;
            }
            match self.assign_task_to_agent(task.id, agent_id).await {
                Ok(assigned) => return Ok(Some(assigned)),
                Err(OrchestratorError::AdmissionDenied(_)) | Err(OrchestratorError::BudgetExceeded(_)) => {
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Ok(None)
    }

    pub async fn handle_task_start(&self, task_id: Uuid) -> OrchestratorResult<Task> {
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(OrchestratorError::NotFound("task", task_id))?;
        if task.status != TaskStatus::Assigned {
            return Err(OrchestratorError::InvalidTransition(format!(
                "task {task_id} is {:?}, not assigned",
                task.status
            )));
        }
        task.apply_start();
        self.tasks.update(&task).await?;
        self.events.publish_task_updated(task_id, task.status.as_str()).await;
        Ok(task)
    }

    /// Run a task end-to-end: start it, wait for rate-governor capacity,
    /// call the external agent runtime, and record completion or failure.
    /// This is the single long-running suspension chain per task; no
    /// coordination lock is held across any of its await points.
    pub async fn dispatch(&self, task_id: Uuid, cancel: &CancellationToken) -> OrchestratorResult<Task> {
        self.dispatch_with_overrides(task_id, cancel, DispatchOverrides::default()).await
    }

    /// Same as `dispatch`, but lets a caller (the `/execute` façade route)
    /// override the tier/model decision the Router would otherwise make.
    pub async fn dispatch_with_overrides(
        &self,
        task_id: Uuid,
        cancel: &CancellationToken,
        overrides: DispatchOverrides,
    ) -> OrchestratorResult<Task> {
        let task = self.handle_task_start(task_id).await?;
        let agent_id = task
            .assigned_agent_id
            .ok_or_else(|| OrchestratorError::Internal("in-progress task missing assigned_agent_id".into()))?;
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or(OrchestratorError::NotFound("agent", agent_id))?;

        let (_, routed_model, routed_use_cloud) = self.resolve_tier_and_model(&task, &agent);
        let model = overrides.model.clone().unwrap_or(routed_model);
        let use_cloud = overrides.use_cloud.unwrap_or(routed_use_cloud);
        let allow_fallback = overrides.allow_fallback.unwrap_or(true);
        let tier = resolve_tier(&model);

        let est_in = (task.description.len() as u64 / 3).max(50);
        let est_out = est_in / 2;
        if use_cloud {
            self.rate_governor.wait_for_capacity(tier, est_in, est_out, cancel).await;
        }

        let request = ExecuteRequest {
            task_id,
            agent_id,
            task_description: task.description.clone(),
            expected_output: None,
            use_cloud,
            model: Some(model.clone()),
            allow_fallback,
        };

        let outcome = tokio::select! {
            result = self.agent_runtime.execute(request) => result,
            _ = cancel.cancelled() => Err(OrchestratorError::Upstream("execution cancelled".to_string())),
        };

        match outcome {
            Ok(response) if response.success => {
                let input_tokens = response.metrics.input_tokens.unwrap_or(0);
                let output_tokens = response.metrics.output_tokens.unwrap_or(0);
                if use_cloud {
                    self.rate_governor.record_usage(tier, input_tokens, output_tokens).await;
                }
                self.handle_task_completion(
                    task_id,
                    response.output.unwrap_or(serde_json::json!({})),
                    response.metrics.time_spent_ms,
                    &model,
                    input_tokens,
                    output_tokens,
                )
                .await
            }
            Ok(response) => {
                self.handle_task_failure(task_id, response.error.unwrap_or_else(|| "agent runtime reported failure".into()), &model).await
            }
            Err(err) => self.handle_task_failure(task_id, err.to_string(), &model).await,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn handle_task_completion(
        &self,
        task_id: Uuid,
        output: serde_json::Value,
        time_spent_ms: i64,
        model_used: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> OrchestratorResult<Task> {
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(OrchestratorError::NotFound("task", task_id))?;
        let agent_id = task.assigned_agent_id;
        let mut agent = match agent_id {
            Some(id) => self.agents.get(id).await?,
            None => None,
        };

        task.apply_completion(output, time_spent_ms);

        let log_entry = agent_id.map(|aid| {
            ExecutionLog::new(task_id, aid, ExecutionAction::Completed, model_used, input_tokens, output_tokens, time_spent_ms)
        });

        let cost = log_entry
            .as_ref()
            .map(|log| cost_calculator::cost_cents(log, &self.rate_table))
            .unwrap_or(0.0);

        let was_local_coder = agent.as_ref().is_some_and(|a| {
            a.agent_type == AgentType::Coder && !resolve_tier(model_used).is_cloud()
        });

        if let Some(a) = agent.as_mut() {
            if was_local_coder {
                a.mark_cooling();
            } else {
                a.mark_idle();
            }
        }

        self.resources.release(task_id).await;
        self.file_locks.release_for_task(task_id).await?;
        self.tasks
            .commit_terminal_transition(&task, agent.as_ref(), &task.locked_files.clone(), log_entry.as_ref())
            .await?;

        if cost > 0.0 {
            self.budget.charge(cost, resolve_tier(model_used)).await?;
        }

        self.events.publish_task_updated(task_id, task.status.as_str()).await;
        if let Some(a) = &agent {
            if !was_local_coder {
                self.events.publish_agent_status_changed(a.id, "idle").await;
            }
        }

        if self.review_enabled && task.task_type != crate::domain::models::TaskType::Review {
            info!(task_id = %task_id, "queuing post-completion review task");
            let review = Task::new(
                format!("Review: {}", task.title),
                format!("Review the output of task {task_id} for correctness."),
                crate::domain::models::TaskType::Review,
            )
            .with_parent(task.parent_task_id.unwrap_or(task.id));
            let _ = self.create_task(review).await;
        }

        if let (Some(agent_id), true) = (agent_id, was_local_coder) {
            self.cool_down(agent_id).await;
        }

        Ok(task)
    }

    pub async fn handle_task_failure(
        &self,
        task_id: Uuid,
        reason: impl Into<String>,
        model_used: &str,
    ) -> OrchestratorResult<Task> {
        let reason = reason.into();
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(OrchestratorError::NotFound("task", task_id))?;
        let agent_id = task.assigned_agent_id;
        let mut agent = match agent_id {
            Some(id) => self.agents.get(id).await?,
            None => None,
        };

        let was_local_coder = agent.as_ref().is_some_and(|a| {
            a.agent_type == AgentType::Coder && !resolve_tier(model_used).is_cloud()
        });
        let terminal = task.apply_failure(reason.clone());

        let log_entry = agent_id.map(|aid| {
            ExecutionLog::new(task_id, aid, ExecutionAction::Failed, "unknown", 0, 0, 0)
        });

        if let Some(a) = agent.as_mut() {
            if was_local_coder {
                a.mark_cooling();
            } else {
                a.mark_idle();
            }
        }

        self.resources.release(task_id).await;
        self.file_locks.release_for_task(task_id).await?;
        self.tasks
            .commit_terminal_transition(&task, agent.as_ref(), &task.locked_files.clone(), log_entry.as_ref())
            .await?;

        warn!(task_id = %task_id, terminal, reason = %reason, "task failure handled");
        self.events.publish_task_updated(task_id, task.status.as_str()).await;
        if let Some(a) = &agent {
            if !was_local_coder {
                self.events.publish_agent_status_changed(a.id, "idle").await;
            }
        }

        if let (Some(agent_id), true) = (agent_id, was_local_coder) {
            self.cool_down(agent_id).await;
        }

        Ok(task)
    }

    /// Best-effort abort from any non-terminal state. Always lands the
    /// task in `aborted`, releasing resources and locks even if the
    /// upstream abort call fails.
    pub async fn abort_task(&self, task_id: Uuid, reason: impl Into<String>) -> OrchestratorResult<Task> {
        let reason = reason.into();
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(OrchestratorError::NotFound("task", task_id))?;

        if task.status.is_terminal() {
            // Idempotent: a second abort on an already-aborted task is a no-op.
            return Ok(task);
        }

        let agent_id = task.assigned_agent_id;
        if agent_id.is_some() {
            if let Err(err) = self.agent_runtime.abort(task_id).await {
                warn!(task_id = %task_id, error = %err, "upstream abort request failed; forcing terminal state anyway");
            }
        }

        let mut agent = match agent_id {
            Some(id) => self.agents.get(id).await?,
            None => None,
        };
        task.apply_abort(reason);
        if let Some(a) = agent.as_mut() {
            a.mark_idle();
        }

        self.resources.release(task_id).await;
        self.file_locks.release_for_task(task_id).await?;
        self.tasks
            .commit_terminal_transition(&task, agent.as_ref(), &task.locked_files.clone(), None)
            .await?;

        self.events.publish_task_updated(task_id, task.status.as_str()).await;
        Ok(task)
    }

    /// Reset a `{failed, aborted}` task back to pending, clearing
    /// assignment but keeping history (iteration count, prior error).
    pub async fn return_to_pool(&self, task_id: Uuid) -> OrchestratorResult<Task> {
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(OrchestratorError::NotFound("task", task_id))?;
        if !matches!(task.status, TaskStatus::Failed | TaskStatus::Aborted) {
            return Err(OrchestratorError::InvalidTransition(format!(
                "task {task_id} is {:?}, cannot return to pool",
                task.status
            )));
        }
        task.apply_return_to_pool();
        self.tasks.update(&task).await?;
        self.events.publish_task_updated(task_id, task.status.as_str()).await;
        Ok(task)
    }

    pub async fn escalate(&self, task_id: Uuid) -> OrchestratorResult<Task> {
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(OrchestratorError::NotFound("task", task_id))?;
        if task.status != TaskStatus::InProgress {
            return Err(OrchestratorError::InvalidTransition(format!(
                "task {task_id} is {:?}, cannot escalate",
                task.status
            )));
        }
        task.apply_escalate();
        self.tasks.update(&task).await?;
        self.events.publish_task_updated(task_id, task.status.as_str()).await;
        Ok(task)
    }

    /// `needs_human ── provideInput ──► in_progress | aborted`. A human
    /// either supplies the missing input (resuming the task under its
    /// existing agent) or rejects it outright.
    pub async fn provide_human_input(&self, task_id: Uuid, approve: bool, reason: Option<String>) -> OrchestratorResult<Task> {
        let task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(OrchestratorError::NotFound("task", task_id))?;
        if task.status != TaskStatus::NeedsHuman {
            return Err(OrchestratorError::InvalidTransition(format!(
                "task {task_id} is {:?}, not awaiting human input",
                task.status
            )));
        }
        if approve {
            let mut task = task;
            task.apply_resume_from_human();
            self.tasks.update(&task).await?;
            self.events.publish_task_updated(task_id, task.status.as_str()).await;
            Ok(task)
        } else {
            self.abort_task(task_id, reason.unwrap_or_else(|| "rejected by human reviewer".to_string())).await
        }
    }

    /// Operator-forced completion, bypassing the agent runtime entirely
    /// (e.g. a human finished the work out of band). Releases the same
    /// resources/locks a normal completion would but never triggers
    /// cooling or a budget charge, since no model was actually used.
    pub async fn complete_manually(&self, task_id: Uuid, output: serde_json::Value) -> OrchestratorResult<Task> {
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or(OrchestratorError::NotFound("task", task_id))?;
        if task.status.is_terminal() {
            return Err(OrchestratorError::InvalidTransition(format!(
                "task {task_id} is already {:?}",
                task.status
            )));
        }
        let agent_id = task.assigned_agent_id;
        let mut agent = match agent_id {
            Some(id) => self.agents.get(id).await?,
            None => None,
        };

        task.apply_completion(output, 0);
        if let Some(a) = agent.as_mut() {
            a.mark_idle();
        }

        self.resources.release(task_id).await;
        self.file_locks.release_for_task(task_id).await?;
        self.tasks
            .commit_terminal_transition(&task, agent.as_ref(), &task.locked_files.clone(), None)
            .await?;

        self.events.publish_task_updated(task_id, task.status.as_str()).await;
        if let Some(a) = &agent {
            self.events.publish_agent_status_changed(a.id, "idle").await;
        }
        Ok(task)
    }

    /// Ollama cooling: defer returning `agent_id` to idle by a rest delay
    /// (3s, or 8s every `reset_every_n`th task). By the time this runs the
    /// agent has already been committed `paused` (cooling) in the same
    /// transaction that released the task, so there is no window in which
    /// the agent reads as idle-and-assignable before cooling starts. This
    /// only bumps the rest counter, publishes `agent_cooling_down`, sleeps,
    /// then returns the agent to idle.
    async fn cool_down(&self, agent_id: Uuid) {
        let Ok(Some(mut agent)) = self.agents.get(agent_id).await else {
            return;
        };
        agent.tasks_completed_since_rest += 1;
        let extended = agent.tasks_completed_since_rest % self.cooling.reset_every_n.max(1) == 0;
        let rest_ms = if extended { self.cooling.extended_rest_ms } else { self.cooling.rest_ms };

        let _ = self.agents.update(&agent).await;
        self.events.publish_agent_cooling_down(agent_id, rest_ms).await;

        tokio::time::sleep(std::time::Duration::from_millis(rest_ms)).await;

        if let Ok(Some(mut refreshed)) = self.agents.get(agent_id).await {
            refreshed.status = AgentStatus::Idle;
            refreshed.current_task_id = None;
            let _ = self.agents.update(&refreshed).await;
            self.events.publish_agent_status_changed(agent_id, "idle").await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::agent_runtime_http::StaticAgentRuntime;
    use crate::adapters::sqlite::agent_repo::SqliteAgentRepository;
    use crate::adapters::sqlite::budget_repo::SqliteBudgetRepository;
    use crate::adapters::sqlite::execution_log_repo::SqliteExecutionLogRepository;
    use crate::adapters::sqlite::file_lock_repo::SqliteFileLockRepository;
    use crate::adapters::sqlite::pool::DatabasePool;
    use crate::adapters::sqlite::task_repo::SqliteTaskRepository;
    use crate::domain::models::{AgentType, BudgetConfig, TaskType};
    use crate::domain::ports::{ExecuteMetrics, ExecuteResponse};

    async fn build_service(agent_runtime: Arc<dyn AgentRuntimeClient>) -> (TaskQueueService, Arc<dyn TaskRepository>, Arc<dyn AgentRepository>) {
        let pool = DatabasePool::connect_in_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let logs: Arc<dyn ExecutionLogRepository> = Arc::new(SqliteExecutionLogRepository::new(pool.clone()));
        let locks: Arc<dyn crate::domain::ports::FileLockRepository> = Arc::new(SqliteFileLockRepository::new(pool.clone()));
        let budget_repo: Arc<dyn crate::domain::ports::BudgetRepository> = Arc::new(SqliteBudgetRepository::new(pool.clone()));
        let events = EventBus::new_for_test();
        let budget = BudgetLedger::load(budget_repo, events.clone(), BudgetConfig::default()).await.unwrap();
        let service = TaskQueueService::new(
            tasks.clone(),
            agents.clone(),
            logs,
            FileLockManager::new(locks),
            ResourcePool::new(events.clone()),
            RateGovernor::new(Default::default()),
            budget,
            events,
            Arc::new(TaskRouter::new(None)),
            agent_runtime,
            RateTable::default_table(),
            CoolingConfig { rest_ms: 1, extended_rest_ms: 1, reset_every_n: 5 },
            false,
        );
        (service, tasks, agents)
    }

    #[tokio::test]
    async fn assign_start_and_complete_round_trip() {
        let runtime = Arc::new(StaticAgentRuntime::success(serde_json::json!({"ok": true}), 1200, 100, 50));
        let (service, tasks, agents) = build_service(runtime).await;

        let agent = Agent::new("coder-01", AgentType::Coder);
        agents.create(&agent).await.unwrap();

        let task = Task::new("double", "create function double(n)=n*2", TaskType::Code)
            .with_priority(3)
            .with_locked_files(["double.py".to_string()]);
        let task = service.create_task(task).await.unwrap();

        let assigned = service.assign_task_to_agent(task.id, agent.id).await.unwrap();
        assert_eq!(assigned.status, TaskStatus::Assigned);

        let cancel = CancellationToken::new();
        let done = service.dispatch(task.id, &cancel).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);

        let final_agent = agents.get(agent.id).await.unwrap().unwrap();
        assert_eq!(final_agent.status, AgentStatus::Idle);
        assert!(final_agent.current_task_id.is_none());

        let final_task = tasks.get(task.id).await.unwrap().unwrap();
        assert!(final_task.assignment_invariant_holds());
    }

    #[tokio::test]
    async fn failure_within_retry_budget_returns_to_pending() {
        let runtime = Arc::new(StaticAgentRuntime::failure("boom"));
        let (service, tasks, agents) = build_service(runtime).await;

        let agent = Agent::new("coder-01", AgentType::Coder);
        agents.create(&agent).await.unwrap();
        let task = Task::new("t", "d", TaskType::Code).with_max_iterations(3);
        let task = service.create_task(task).await.unwrap();

        service.assign_task_to_agent(task.id, agent.id).await.unwrap();
        let cancel = CancellationToken::new();
        let after = service.dispatch(task.id, &cancel).await.unwrap();
        assert_eq!(after.status, TaskStatus::Pending);

        let stored = tasks.get(task.id).await.unwrap().unwrap();
        assert!(stored.current_iteration <= stored.max_iterations);
    }

    #[tokio::test]
    async fn failure_at_max_iterations_becomes_failed() {
        let runtime = Arc::new(StaticAgentRuntime::failure("boom"));
        let (service, tasks, agents) = build_service(runtime).await;

        let agent = Agent::new("coder-01", AgentType::Coder);
        agents.create(&agent).await.unwrap();
        let task = Task::new("t", "d", TaskType::Code).with_max_iterations(1);
        let task = service.create_task(task).await.unwrap();

        service.assign_task_to_agent(task.id, agent.id).await.unwrap();
        let cancel = CancellationToken::new();
        let after = service.dispatch(task.id, &cancel).await.unwrap();
        assert_eq!(after.status, TaskStatus::Failed);
        let _ = tasks.get(task.id).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn file_lock_conflict_blocks_second_task_until_first_completes() {
        let runtime = Arc::new(StaticAgentRuntime::success(serde_json::json!({}), 10, 1, 1));
        let (service, _tasks, agents) = build_service(runtime).await;

        let agent_a = Agent::new("a", AgentType::Coder);
        let agent_b = Agent::new("b", AgentType::Coder);
        agents.create(&agent_a).await.unwrap();
        agents.create(&agent_b).await.unwrap();

        let task_a = Task::new("a", "d", TaskType::Code)
            .with_priority(5)
            .with_locked_files(["x.py".to_string()]);
        let task_b = Task::new("b", "d", TaskType::Code)
            .with_priority(1)
            .with_locked_files(["x.py".to_string()]);
        let task_a = service.create_task(task_a).await.unwrap();
        let task_b = service.create_task(task_b).await.unwrap();

        service.assign_task_to_agent(task_a.id, agent_a.id).await.unwrap();

        let blocked = service.assign_task_to_agent(task_b.id, agent_b.id).await;
        assert!(matches!(blocked, Err(OrchestratorError::AdmissionDenied(_))));

        let cancel = CancellationToken::new();
        service.dispatch(task_a.id, &cancel).await.unwrap();

        let now_assignable = service.assign_task_to_agent(task_b.id, agent_b.id).await;
        assert!(now_assignable.is_ok());
    }

    #[tokio::test]
    async fn abort_is_idempotent() {
        let runtime = Arc::new(StaticAgentRuntime::success(serde_json::json!({}), 1, 1, 1));
        let (service, _tasks, agents) = build_service(runtime).await;
        let agent = Agent::new("a", AgentType::Coder);
        agents.create(&agent).await.unwrap();
        let task = Task::new("t", "d", TaskType::Code);
        let task = service.create_task(task).await.unwrap();
        service.assign_task_to_agent(task.id, agent.id).await.unwrap();

        let first = service.abort_task(task.id, "cancelled").await.unwrap();
        assert_eq!(first.status, TaskStatus::Aborted);
        let second = service.abort_task(task.id, "cancelled again").await.unwrap();
        assert_eq!(second.status, TaskStatus::Aborted);
    }
}
