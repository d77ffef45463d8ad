//! Task Router: complexity assessment, tier selection, agent selection.

use std::sync::Arc;

use crate::domain::models::{Agent, AgentStatus, ComplexitySource, Task, TierOverride};
use crate::domain::ports::{OrchestratorResult, SemanticComplexityAssessor};

/// Heuristic complexity score from task description shape: length,
/// keyword density, and step count, folded into an integer 1..=10.
pub fn heuristic_complexity(description: &str) -> u8 {
    let len_score = (description.len() as f64 / 80.0).min(4.0);

    const COMPLEX_KEYWORDS: &[&str] = &[
        "architecture", "refactor", "migrate", "concurrent", "distributed",
        "security", "optimize", "performance", "integration", "database",
        "schema", "protocol", "async", "thread", "race condition",
    ];
    let lower = description.to_lowercase();
    let keyword_hits = COMPLEX_KEYWORDS.iter().filter(|k| lower.contains(*k)).count();
    let keyword_score = (keyword_hits as f64 * 0.75).min(3.0);

    let step_count = description
        .lines()
        .filter(|l| {
            let t = l.trim_start();
            t.starts_with(|c: char| c.is_ascii_digit()) || t.starts_with('-') || t.starts_with('*')
        })
        .count();
    let step_score = (step_count as f64 * 0.4).min(3.0);

    let raw = 1.0 + len_score + keyword_score + step_score;
    raw.round().clamp(1.0, 10.0) as u8
}

#[derive(Debug, Clone)]
pub struct ComplexityAssessment {
    pub complexity: u8,
    pub source: ComplexitySource,
    pub reasoning: String,
}

/// Apply the dual rule: if the heuristic and an available semantic
/// assessment disagree by >= 2, the semantic opinion wins (source=dual);
/// otherwise the heuristic wins (source=router). When no semantic
/// assessor is configured, or it returns `None`, fall back to the
/// heuristic with an explanatory reasoning string.
pub async fn assess_complexity(
    description: &str,
    assessor: Option<&dyn SemanticComplexityAssessor>,
) -> OrchestratorResult<ComplexityAssessment> {
    let h = heuristic_complexity(description);

    let semantic = match assessor {
        Some(a) => a.assess(description).await?,
        None => None,
    };

    Ok(match semantic {
        Some(s) => {
            let clamped = s.complexity.clamp(1, 10);
            if (clamped as i16 - h as i16).abs() >= 2 {
                ComplexityAssessment {
                    complexity: clamped,
                    source: ComplexitySource::Dual,
                    reasoning: s.reasoning,
                }
            } else {
                ComplexityAssessment {
                    complexity: h,
                    source: ComplexitySource::Router,
                    reasoning: "heuristic and semantic assessment agreed within tolerance".to_string(),
                }
            }
        }
        None => ComplexityAssessment {
            complexity: h,
            source: ComplexitySource::Router,
            reasoning: "assessment unavailable".to_string(),
        },
    })
}

/// Tier + model name pair, as chosen by `select_tier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    pub use_cloud: bool,
    pub model: String,
}

/// Default tier selection by complexity, overridable per-agent.
///
/// c < 7 -> local/qwen-coder:16k; 7 <= c < 10 -> local/qwen-coder:32k;
/// c >= 10 -> cloud/sonnet. An explicit per-agent override short-circuits
/// this ladder entirely.
pub fn select_tier(complexity: u8, override_tier: TierOverride) -> RoutingDecision {
    match override_tier {
        TierOverride::Auto => {
            if complexity < 7 {
                RoutingDecision { use_cloud: false, model: "qwen-coder:16k".to_string() }
            } else if complexity < 10 {
                RoutingDecision { use_cloud: false, model: "qwen-coder:32k".to_string() }
            } else {
                RoutingDecision { use_cloud: true, model: "sonnet".to_string() }
            }
        }
        TierOverride::Local => RoutingDecision { use_cloud: false, model: "qwen-coder:16k".to_string() },
        TierOverride::RemoteLocal => RoutingDecision { use_cloud: false, model: "remote-local".to_string() },
        TierOverride::Grok => RoutingDecision { use_cloud: true, model: "grok".to_string() },
        TierOverride::Haiku => RoutingDecision { use_cloud: true, model: "haiku".to_string() },
        TierOverride::Sonnet => RoutingDecision { use_cloud: true, model: "sonnet".to_string() },
        TierOverride::Opus => RoutingDecision { use_cloud: true, model: "opus".to_string() },
    }
}

/// Pick an eligible agent for `task`: filter by `required_agent` if set,
/// prefer idle status, tie-break by least `inflight` then oldest
/// `updated_at`. Returns `None` when all candidates are busy — the task
/// remains pending.
pub fn select_agent<'a>(task: &Task, agents: &'a [Agent]) -> Option<&'a Agent> {
    let mut candidates: Vec<&Agent> = agents
        .iter()
        .filter(|a| match &task.required_agent {
            Some(required) => a.agent_type.as_str() == required,
            None => true,
        })
        .collect();

    candidates.sort_by(|a, b| {
        let idle_rank = |s: AgentStatus| if s == AgentStatus::Idle { 0 } else { 1 };
        idle_rank(a.status)
            .cmp(&idle_rank(b.status))
            .then(a.inflight.cmp(&b.inflight))
            .then(a.updated_at.cmp(&b.updated_at))
    });

    candidates.into_iter().find(|a| a.status == AgentStatus::Idle)
}

pub struct TaskRouter {
    assessor: Option<Arc<dyn SemanticComplexityAssessor>>,
}

impl TaskRouter {
    pub fn new(assessor: Option<Arc<dyn SemanticComplexityAssessor>>) -> Self {
        Self { assessor }
    }

    pub async fn assess(&self, task: &Task) -> OrchestratorResult<ComplexityAssessment> {
        assess_complexity(&task.description, self.assessor.as_deref()).await
    }

    pub fn route(&self, complexity: u8, override_tier: TierOverride) -> RoutingDecision {
        select_tier(complexity, override_tier)
    }

    pub fn pick_agent<'a>(&self, task: &Task, agents: &'a [Agent]) -> Option<&'a Agent> {
        select_agent(task, agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Agent, AgentType, TaskType};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedAssessor(crate::domain::ports::SemanticAssessment);

    #[async_trait]
    impl SemanticComplexityAssessor for FixedAssessor {
        async fn assess(&self, _description: &str) -> OrchestratorResult<Option<crate::domain::ports::SemanticAssessment>> {
            Ok(Some(self.0.clone()))
        }
    }

    #[test]
    fn heuristic_is_deterministic() {
        let desc = "Implement a concurrent database migration with schema validation";
        assert_eq!(heuristic_complexity(desc), heuristic_complexity(desc));
    }

    #[test]
    fn short_simple_description_is_low_complexity() {
        let c = heuristic_complexity("fix typo");
        assert!(c <= 3);
    }

    #[tokio::test]
    async fn no_assessor_falls_back_to_heuristic_router_source() {
        let assessment = assess_complexity("fix typo", None).await.unwrap();
        assert_eq!(assessment.source, ComplexitySource::Router);
        assert_eq!(assessment.reasoning, "assessment unavailable");
    }

    #[tokio::test]
    async fn large_disagreement_uses_semantic_dual_source() {
        let assessor = FixedAssessor(crate::domain::ports::SemanticAssessment {
            complexity: 9,
            reasoning: "touches auth and payments".to_string(),
            factors: vec!["security".to_string()],
        });
        let assessment = assess_complexity("fix typo", Some(&assessor)).await.unwrap();
        assert_eq!(assessment.source, ComplexitySource::Dual);
        assert_eq!(assessment.complexity, 9);
    }

    #[tokio::test]
    async fn small_disagreement_keeps_heuristic() {
        let h = heuristic_complexity("fix typo");
        let assessor = FixedAssessor(crate::domain::ports::SemanticAssessment {
            complexity: h + 1,
            reasoning: "close call".to_string(),
            factors: vec![],
        });
        let assessment = assess_complexity("fix typo", Some(&assessor)).await.unwrap();
        assert_eq!(assessment.source, ComplexitySource::Router);
        assert_eq!(assessment.complexity, h);
    }

    #[test]
    fn tier_ladder_matches_spec_thresholds() {
        assert_eq!(select_tier(3, TierOverride::Auto).model, "qwen-coder:16k");
        assert!(!select_tier(3, TierOverride::Auto).use_cloud);
        assert_eq!(select_tier(8, TierOverride::Auto).model, "qwen-coder:32k");
        assert!(select_tier(10, TierOverride::Auto).use_cloud);
        assert_eq!(select_tier(10, TierOverride::Auto).model, "sonnet");
    }

    #[test]
    fn override_short_circuits_ladder() {
        let decision = select_tier(1, TierOverride::Opus);
        assert!(decision.use_cloud);
        assert_eq!(decision.model, "opus");
    }

    #[test]
    fn selects_idle_agent_over_busy() {
        let mut a1 = Agent::new("a1", AgentType::Coder);
        a1.status = AgentStatus::Busy;
        let a2 = Agent::new("a2", AgentType::Coder);
        let task = Task::new("t", "d", TaskType::Code);
        let candidates = [a1.clone(), a2.clone()];
        let picked = select_agent(&task, &candidates).unwrap();
        assert_eq!(picked.id, a2.id);
    }

    #[test]
    fn returns_none_when_all_busy() {
        let mut a1 = Agent::new("a1", AgentType::Coder);
        a1.status = AgentStatus::Busy;
        let task = Task::new("t", "d", TaskType::Code);
        assert!(select_agent(&task, &[a1]).is_none());
    }

    #[test]
    fn required_agent_filters_candidates() {
        let a_coder = Agent::new("coder", AgentType::Coder);
        let a_qa = Agent::new("qa", AgentType::Qa);
        let task = Task::new("t", "d", TaskType::Review).with_required_agent("qa");
        let candidates = [a_coder, a_qa.clone()];
        let picked = select_agent(&task, &candidates).unwrap();
        assert_eq!(picked.id, a_qa.id);
    }

    #[test]
    fn tie_break_prefers_least_inflight_then_oldest_updated() {
        let mut a1 = Agent::new("a1", AgentType::Coder);
        let mut a2 = Agent::new("a2", AgentType::Coder);
        a1.inflight = 2;
        a2.inflight = 0;
        std::thread::sleep(Duration::from_millis(2));
        a2.updated_at = chrono::Utc::now();
        let task = Task::new("t", "d", TaskType::Code);
        let candidates = [a1.clone(), a2.clone()];
        let picked = select_agent(&task, &candidates).unwrap();
        assert_eq!(picked.id, a2.id);
    }
}
