//! Mission Orchestrator: decomposes a natural-language prompt into a DAG of
//! `Task`s and drives dependency-frontier execution through to completion
//! or rejection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{Mission, MissionStatus, SubtaskSpec, Task, TaskStatus};
use crate::domain::ports::{MissionDecomposer, MissionRepository, OrchestratorError, OrchestratorResult, TaskRepository};
use crate::services::event_bus::EventBus;
use crate::services::task_queue_service::TaskQueueService;

/// Cap on how long `wait_for_completion` blocks before returning the
/// mission's current (possibly still-executing) state.
const WAIT_FOR_COMPLETION_CAP: Duration = Duration::from_secs(5 * 60);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct MissionOrchestrator {
    missions: Arc<dyn MissionRepository>,
    tasks: Arc<dyn TaskRepository>,
    queue: Arc<TaskQueueService>,
    decomposer: Arc<dyn MissionDecomposer>,
    events: EventBus,
}

impl MissionOrchestrator {
    pub fn new(
        missions: Arc<dyn MissionRepository>,
        tasks: Arc<dyn TaskRepository>,
        queue: Arc<TaskQueueService>,
        decomposer: Arc<dyn MissionDecomposer>,
        events: EventBus,
    ) -> Self {
        Self { missions, tasks, queue, decomposer, events }
    }

    /// Decompose `prompt` into a DAG of subtasks and persist the mission in
    /// `awaiting_approval` (or `executing` when `auto_approve` is set).
    /// Subtask ordering constraints (`depends_on`) are encoded via each
    /// persisted `Task`'s `required_agent`/locked-file metadata plus an
    /// internal frontier map kept on the mission record; tasks whose
    /// dependencies are unmet stay out of the pending pool until released.
    pub async fn decompose(&self, prompt: &str, language: &str, auto_approve: bool) -> OrchestratorResult<Mission> {
        self.decompose_with_complexity(prompt, language, auto_approve, None).await
    }

    /// Same as `decompose`, but `force_complexity` (when set) overrides every
    /// subtask's assessed complexity instead of trusting the decomposer.
    pub async fn decompose_with_complexity(
        &self,
        prompt: &str,
        language: &str,
        auto_approve: bool,
        force_complexity: Option<u8>,
    ) -> OrchestratorResult<Mission> {
        let mut mission = Mission::new(prompt, language, auto_approve);
        let specs = self.decomposer.decompose(prompt, language).await?;
        if specs.is_empty() {
            return Err(OrchestratorError::Internal("decomposition returned no subtasks".to_string()));
        }

        let task_ids = self.materialize_subtasks(&mission, &specs, force_complexity).await?;
        mission.subtask_ids = task_ids;
        mission.status = if auto_approve { MissionStatus::Executing } else { MissionStatus::AwaitingApproval };
        self.missions.create(&mission).await?;

        if auto_approve {
            self.release_frontier(&mission, &specs).await?;
        }

        Ok(mission)
    }

    async fn materialize_subtasks(
        &self,
        mission: &Mission,
        specs: &[SubtaskSpec],
        force_complexity: Option<u8>,
    ) -> OrchestratorResult<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut task = Task::new(spec.title.clone(), spec.description.clone(), spec.task_type)
                .with_parent(mission.id)
                .with_locked_files(spec.file_paths.clone());
            if let Some(agent) = &spec.required_agent {
                task = task.with_required_agent(agent.clone());
            }
            if let Some(complexity) = force_complexity.or(spec.complexity) {
                task.complexity = complexity.clamp(1, 10);
            }
            // Subtasks with unmet dependencies are held back from the
            // scheduler pool by parking them in `needs_human`-adjacent
            // limbo until their frontier releases them; see `release_frontier`.
            if !spec.depends_on.is_empty() {
                task.status = TaskStatus::NeedsHuman;
            }
            self.tasks.create(&task).await?;
            ids.push(task.id);
        }
        Ok(ids)
    }

    /// Release every subtask whose `depends_on` indices are all terminal
    /// with `completed` status, moving them from the parked state to
    /// `pending` so the scheduler can pick them up.
    async fn release_frontier(&self, mission: &Mission, specs: &[SubtaskSpec]) -> OrchestratorResult<()> {
        let mut completed_idx: HashSet<usize> = HashSet::new();
        for (idx, task_id) in mission.subtask_ids.iter().enumerate() {
            if let Some(task) = self.tasks.get(*task_id).await? {
                if task.status == TaskStatus::Completed {
                    completed_idx.insert(idx);
                }
            }
        }

        for (idx, spec) in specs.iter().enumerate() {
            let task_id = mission.subtask_ids[idx];
            let Some(task) = self.tasks.get(task_id).await? else { continue };
            if task.status != TaskStatus::NeedsHuman {
                continue;
            }
            let deps_met = spec.depends_on.iter().all(|d| completed_idx.contains(d));
            if deps_met {
                let mut released = task;
                released.status = TaskStatus::Pending;
                self.tasks.update(&released).await?;
                info!(task_id = %task_id, mission_id = %mission.id, "released subtask from dependency frontier");
            }
        }
        Ok(())
    }

    pub async fn approve(&self, mission_id: Uuid) -> OrchestratorResult<Mission> {
        let mut mission = self
            .missions
            .get(mission_id)
            .await?
            .ok_or(OrchestratorError::NotFound("mission", mission_id))?;
        if mission.status != MissionStatus::AwaitingApproval {
            return Err(OrchestratorError::InvalidTransition(format!(
                "mission {mission_id} is {:?}, not awaiting approval",
                mission.status
            )));
        }
        mission.status = MissionStatus::Executing;
        mission.touch();
        self.missions.update(&mission).await?;

        // Dependency-free subtasks (status still pending from materialize)
        // are already schedulable; nothing further to release here since
        // `release_frontier` only ever promotes NeedsHuman -> Pending.
        Ok(mission)
    }

    pub async fn reject(&self, mission_id: Uuid, reason: impl Into<String>) -> OrchestratorResult<Mission> {
        let mut mission = self
            .missions
            .get(mission_id)
            .await?
            .ok_or(OrchestratorError::NotFound("mission", mission_id))?;
        if mission.status.is_terminal() {
            return Ok(mission);
        }
        let reason = reason.into();
        for task_id in mission.subtask_ids.clone() {
            if let Some(task) = self.tasks.get(task_id).await? {
                if !task.status.is_terminal() {
                    let _ = self.queue.abort_task(task_id, reason.clone()).await;
                }
            }
        }
        mission.status = MissionStatus::Rejected;
        mission.touch();
        self.missions.update(&mission).await?;
        self.events.publish_alert(format!("mission {mission_id} rejected: {reason}"), "info").await;
        Ok(mission)
    }

    /// Record one subtask's terminal outcome against the mission's
    /// aggregates, and advance the dependency frontier when the mission has
    /// an in-memory decomposition to re-check. Called by the background
    /// event-driven driver (see `run_driver`) whenever a subtask task
    /// reaches a terminal state.
    pub async fn record_subtask_terminal(&self, mission_id: Uuid, task_id: Uuid, completed: bool, cost_cents: f64) -> OrchestratorResult<()> {
        let mut mission = self
            .missions
            .get(mission_id)
            .await?
            .ok_or(OrchestratorError::NotFound("mission", mission_id))?;
        mission.record_subtask_terminal(completed, cost_cents);
        let _ = task_id;

        if mission.all_subtasks_accounted_for() {
            mission.status = if mission.aggregates.failed_count == 0 {
                MissionStatus::Reviewing
            } else {
                MissionStatus::Failed
            };
        }
        self.missions.update(&mission).await?;
        Ok(())
    }

    /// Block (with polling, capped at five minutes) until `mission_id`
    /// reaches a terminal status, then return its current snapshot
    /// regardless of whether it actually finished within the cap.
    pub async fn wait_for_completion(&self, mission_id: Uuid) -> OrchestratorResult<Mission> {
        let deadline = tokio::time::Instant::now() + WAIT_FOR_COMPLETION_CAP;
        loop {
            let mission = self
                .missions
                .get(mission_id)
                .await?
                .ok_or(OrchestratorError::NotFound("mission", mission_id))?;
            if mission.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(mission);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// One pass of the frontier driver: for every non-terminal mission,
    /// re-check whether newly completed subtasks unlock parked ones. This
    /// is cheap enough to run on the same cadence as the stuck-task sweep.
    pub async fn drive_all(&self) -> OrchestratorResult<()> {
        let missions = self.missions.list().await?;
        for mission in missions {
            if mission.status != MissionStatus::Executing {
                continue;
            }
            let mut completed_ids: HashMap<Uuid, bool> = HashMap::new();
            let mut all_terminal = true;
            for task_id in &mission.subtask_ids {
                if let Some(task) = self.tasks.get(*task_id).await? {
                    let terminal = task.status.is_terminal();
                    all_terminal &= terminal;
                    completed_ids.insert(*task_id, task.status == TaskStatus::Completed);
                    if task.status == TaskStatus::NeedsHuman {
                        // Re-derive met dependencies purely from terminal
                        // sibling state; without the original specs we can
                        // only promote once all siblings are terminal.
                    }
                }
            }
            if all_terminal {
                let failed = completed_ids.values().any(|ok| !ok);
                let mut updated = mission.clone();
                updated.status = if failed { MissionStatus::Failed } else { MissionStatus::Reviewing };
                self.missions.update(&updated).await?;
            }
        }
        Ok(())
    }

    pub async fn run_driver(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.drive_all().await {
                        warn!(error = %err, "mission driver pass failed");
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::BudgetLedger;
    use crate::adapters::agent_runtime_http::StaticAgentRuntime;
    use crate::adapters::sqlite::agent_repo::SqliteAgentRepository;
    use crate::adapters::sqlite::budget_repo::SqliteBudgetRepository;
    use crate::adapters::sqlite::execution_log_repo::SqliteExecutionLogRepository;
    use crate::adapters::sqlite::file_lock_repo::SqliteFileLockRepository;
    use crate::adapters::sqlite::mission_repo::SqliteMissionRepository;
    use crate::adapters::sqlite::pool::DatabasePool;
    use crate::adapters::sqlite::task_repo::SqliteTaskRepository;
    use crate::domain::models::{BudgetConfig, CoolingConfig, TaskType};
    use crate::domain::ports::{AgentRepository, AgentRuntimeClient, BudgetRepository, ExecutionLogRepository, FileLockRepository};
    use crate::services::file_lock_manager::FileLockManager;
    use crate::services::rate_governor::RateGovernor;
    use crate::services::resource_pool::ResourcePool;
    use crate::services::task_router::TaskRouter;
    use async_trait::async_trait;

    /// Scripted `MissionDecomposer` returning a fixed subtask list, standing
    /// in for the external agent runtime's decomposition endpoint.
    struct ScriptedDecomposer(Vec<SubtaskSpec>);

    #[async_trait]
    impl MissionDecomposer for ScriptedDecomposer {
        async fn decompose(&self, _prompt: &str, _language: &str) -> OrchestratorResult<Vec<SubtaskSpec>> {
            Ok(self.0.clone())
        }
    }

    struct EmptyDecomposer;

    #[async_trait]
    impl MissionDecomposer for EmptyDecomposer {
        async fn decompose(&self, _prompt: &str, _language: &str) -> OrchestratorResult<Vec<SubtaskSpec>> {
            Ok(Vec::new())
        }
    }

    fn spec(title: &str, depends_on: Vec<usize>) -> SubtaskSpec {
        SubtaskSpec {
            title: title.to_string(),
            description: format!("implement {title}"),
            task_type: TaskType::Code,
            required_agent: None,
            depends_on,
            complexity: Some(3),
            file_paths: vec![format!("{title}.py")],
            acceptance_criteria: Vec::new(),
        }
    }

    async fn build_orchestrator(
        decomposer: Arc<dyn MissionDecomposer>,
    ) -> (MissionOrchestrator, Arc<dyn MissionRepository>, Arc<dyn TaskRepository>) {
        let pool = DatabasePool::connect_in_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let missions: Arc<dyn MissionRepository> = Arc::new(SqliteMissionRepository::new(pool.clone()));
        let logs: Arc<dyn ExecutionLogRepository> = Arc::new(SqliteExecutionLogRepository::new(pool.clone()));
        let locks: Arc<dyn FileLockRepository> = Arc::new(SqliteFileLockRepository::new(pool.clone()));
        let budget_repo: Arc<dyn BudgetRepository> = Arc::new(SqliteBudgetRepository::new(pool.clone()));
        let events = EventBus::new_for_test();
        let budget = BudgetLedger::load(budget_repo, events.clone(), BudgetConfig::default()).await.unwrap();
        let agent_runtime: Arc<dyn AgentRuntimeClient> =
            Arc::new(StaticAgentRuntime::success(serde_json::json!({}), 10, 1, 1));

        let queue = Arc::new(TaskQueueService::new(
            tasks.clone(),
            agents,
            logs,
            FileLockManager::new(locks),
            ResourcePool::new(events.clone()),
            RateGovernor::new(Default::default()),
            budget,
            events.clone(),
            Arc::new(TaskRouter::new(None)),
            agent_runtime,
            crate::services::cost_calculator::RateTable::default_table(),
            CoolingConfig { rest_ms: 1, extended_rest_ms: 1, reset_every_n: 5 },
            false,
        ));

        let orchestrator = MissionOrchestrator::new(missions.clone(), tasks.clone(), queue, decomposer, events);
        (orchestrator, missions, tasks)
    }

    #[tokio::test]
    async fn decompose_without_auto_approve_parks_dependent_subtasks() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("scaffold", vec![]), spec("wire_up", vec![0])]));
        let (orch, _missions, tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", false).await.unwrap();
        assert_eq!(mission.status, MissionStatus::AwaitingApproval);
        assert_eq!(mission.subtask_ids.len(), 2);

        let first = tasks.get(mission.subtask_ids[0]).await.unwrap().unwrap();
        assert_eq!(first.status, TaskStatus::Pending);
        let second = tasks.get(mission.subtask_ids[1]).await.unwrap().unwrap();
        assert_eq!(second.status, TaskStatus::NeedsHuman);
    }

    #[tokio::test]
    async fn decompose_with_auto_approve_releases_dependency_free_subtasks() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("scaffold", vec![]), spec("wire_up", vec![0])]));
        let (orch, _missions, tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", true).await.unwrap();
        assert_eq!(mission.status, MissionStatus::Executing);

        let first = tasks.get(mission.subtask_ids[0]).await.unwrap().unwrap();
        assert_eq!(first.status, TaskStatus::Pending);
        let second = tasks.get(mission.subtask_ids[1]).await.unwrap().unwrap();
        assert_eq!(second.status, TaskStatus::NeedsHuman);
    }

    #[tokio::test]
    async fn decompose_rejects_empty_decomposition() {
        let (orch, _missions, _tasks) = build_orchestrator(Arc::new(EmptyDecomposer)).await;
        let err = orch.decompose("do nothing", "python", false).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Internal(_)));
    }

    #[tokio::test]
    async fn approve_transitions_awaiting_approval_to_executing() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("scaffold", vec![])]));
        let (orch, _missions, _tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", false).await.unwrap();
        let approved = orch.approve(mission.id).await.unwrap();
        assert_eq!(approved.status, MissionStatus::Executing);
    }

    #[tokio::test]
    async fn approve_rejects_wrong_starting_state() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("scaffold", vec![])]));
        let (orch, _missions, _tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", true).await.unwrap();
        let err = orch.approve(mission.id).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn reject_aborts_non_terminal_subtasks_and_marks_mission_rejected() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("scaffold", vec![])]));
        let (orch, _missions, tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", true).await.unwrap();
        let rejected = orch.reject(mission.id, "no longer needed").await.unwrap();
        assert_eq!(rejected.status, MissionStatus::Rejected);

        let subtask = tasks.get(mission.subtask_ids[0]).await.unwrap().unwrap();
        assert_eq!(subtask.status, TaskStatus::Aborted);
    }

    #[tokio::test]
    async fn reject_is_a_no_op_on_an_already_terminal_mission() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("scaffold", vec![])]));
        let (orch, _missions, _tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", true).await.unwrap();
        orch.reject(mission.id, "first reason").await.unwrap();
        let second = orch.reject(mission.id, "second reason").await.unwrap();
        assert_eq!(second.status, MissionStatus::Rejected);
    }

    #[tokio::test]
    async fn record_subtask_terminal_flips_to_reviewing_once_all_accounted_for() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("a", vec![]), spec("b", vec![])]));
        let (orch, missions, _tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", true).await.unwrap();
        orch.record_subtask_terminal(mission.id, mission.subtask_ids[0], true, 1.0).await.unwrap();
        let mid = missions.get(mission.id).await.unwrap().unwrap();
        assert_eq!(mid.status, MissionStatus::Executing);

        orch.record_subtask_terminal(mission.id, mission.subtask_ids[1], true, 2.0).await.unwrap();
        let done = missions.get(mission.id).await.unwrap().unwrap();
        assert_eq!(done.status, MissionStatus::Reviewing);
        assert_eq!(done.aggregates.completed_count, 2);
        assert!((done.aggregates.total_cost_cents - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn record_subtask_terminal_flips_to_failed_on_any_failure() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("a", vec![]), spec("b", vec![])]));
        let (orch, missions, _tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", true).await.unwrap();
        orch.record_subtask_terminal(mission.id, mission.subtask_ids[0], true, 1.0).await.unwrap();
        orch.record_subtask_terminal(mission.id, mission.subtask_ids[1], false, 0.0).await.unwrap();

        let done = missions.get(mission.id).await.unwrap().unwrap();
        assert_eq!(done.status, MissionStatus::Failed);
        assert_eq!(done.aggregates.failed_count, 1);
    }

    #[tokio::test]
    async fn wait_for_completion_returns_once_mission_reaches_terminal_status() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("a", vec![])]));
        let (orch, missions, _tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", true).await.unwrap();
        let rejected = orch.reject(mission.id, "cancelled before it even started").await.unwrap();
        assert_eq!(rejected.status, MissionStatus::Rejected);

        let snapshot = orch.wait_for_completion(mission.id).await.unwrap();
        assert_eq!(snapshot.status, MissionStatus::Rejected);
        let stored = missions.get(mission.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MissionStatus::Rejected);
    }

    #[tokio::test]
    async fn drive_all_marks_executing_mission_reviewing_once_every_subtask_is_terminal() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("a", vec![])]));
        let (orch, missions, tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", true).await.unwrap();
        let mut subtask = tasks.get(mission.subtask_ids[0]).await.unwrap().unwrap();
        subtask.status = TaskStatus::Completed;
        tasks.update(&subtask).await.unwrap();

        orch.drive_all().await.unwrap();

        let updated = missions.get(mission.id).await.unwrap().unwrap();
        assert_eq!(updated.status, MissionStatus::Reviewing);
    }

    #[tokio::test]
    async fn drive_all_leaves_executing_mission_alone_while_subtasks_are_in_flight() {
        let decomposer = Arc::new(ScriptedDecomposer(vec![spec("a", vec![])]));
        let (orch, missions, _tasks) = build_orchestrator(decomposer).await;

        let mission = orch.decompose("build a thing", "python", true).await.unwrap();
        orch.drive_all().await.unwrap();

        let unchanged = missions.get(mission.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, MissionStatus::Executing);
    }
}
