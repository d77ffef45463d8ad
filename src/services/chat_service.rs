//! Chat Service: streams a conversational reply through the agent runtime
//! and, when the message reads as a decision on a pending mission, drives
//! mission approval/rejection the same way the `/missions/{id}/approve` and
//! `/missions/{id}/reject` routes do.

use std::sync::Arc;

use futures::StreamExt;
use uuid::Uuid;

use crate::domain::ports::{AgentRuntimeClient, MissionRepository, OrchestratorResult};
use crate::domain::models::MissionStatus;
use crate::services::event_bus::EventBus;
use crate::services::mission_orchestrator::MissionOrchestrator;

const APPROVE_WORDS: &[&str] = &["approve", "approved", "yes", "lgtm", "looks good", "ship it"];
const REJECT_WORDS: &[&str] = &["reject", "rejected", "no", "cancel", "stop"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Approve,
    Reject,
}

pub struct ChatService {
    runtime: Arc<dyn AgentRuntimeClient>,
    missions: Arc<dyn MissionRepository>,
    mission_orchestrator: Arc<MissionOrchestrator>,
    events: EventBus,
}

impl ChatService {
    pub fn new(
        runtime: Arc<dyn AgentRuntimeClient>,
        missions: Arc<dyn MissionRepository>,
        mission_orchestrator: Arc<MissionOrchestrator>,
        events: EventBus,
    ) -> Self {
        Self { runtime, missions, mission_orchestrator, events }
    }

    /// Handle one chat turn: classify it as a mission decision or a plain
    /// message, act on the decision if any, then stream the runtime's reply
    /// through the event bus chunk by chunk.
    pub async fn send(&self, conversation_id: Uuid, message: &str) -> OrchestratorResult<()> {
        if let Some(decision) = classify(message) {
            if let Some(mission) = self.find_pending_mission(conversation_id).await? {
                match decision {
                    Decision::Approve => {
                        let _ = self.mission_orchestrator.approve(mission.id).await;
                    }
                    Decision::Reject => {
                        let _ = self.mission_orchestrator.reject(mission.id, "rejected via chat").await;
                    }
                }
            }
        }

        let stream = match self.runtime.chat(conversation_id, message).await {
            Ok(stream) => stream,
            Err(err) => {
                self.events.publish_chat_error(conversation_id, err.to_string()).await;
                return Err(err);
            }
        };

        let mut stream = stream;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => self.events.publish_chat_chunk(conversation_id, chunk).await,
                Err(err) => {
                    self.events.publish_chat_error(conversation_id, err.to_string()).await;
                    return Ok(());
                }
            }
        }
        self.events.publish_chat_complete(conversation_id).await;
        Ok(())
    }

    async fn find_pending_mission(&self, conversation_id: Uuid) -> OrchestratorResult<Option<crate::domain::models::Mission>> {
        let missions = self.missions.list().await?;
        Ok(missions.into_iter().find(|m| {
            m.conversation_id == Some(conversation_id) && m.status == MissionStatus::AwaitingApproval
        }))
    }
}

/// Word-boundary-safe keyword classification so "snow" doesn't read as a
/// rejection and "approximately" doesn't read as approval.
fn classify(message: &str) -> Option<Decision> {
    let lower = message.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().map(|w| w.trim_matches(|c: char| !c.is_alphanumeric())).collect();

    let has_phrase = |phrase: &str| {
        if phrase.contains(' ') {
            lower.contains(phrase)
        } else {
            words.iter().any(|w| *w == phrase)
        }
    };

    if APPROVE_WORDS.iter().any(|w| has_phrase(w)) {
        return Some(Decision::Approve);
    }
    if REJECT_WORDS.iter().any(|w| has_phrase(w)) {
        return Some(Decision::Reject);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_approval_phrases() {
        assert_eq!(classify("yes, approve it"), Some(Decision::Approve));
        assert_eq!(classify("looks good to me"), Some(Decision::Approve));
    }

    #[test]
    fn classifies_rejection_phrases() {
        assert_eq!(classify("no, reject this"), Some(Decision::Reject));
        assert_eq!(classify("please cancel"), Some(Decision::Reject));
    }

    #[test]
    fn does_not_misclassify_substrings() {
        assert_eq!(classify("it's starting to snow outside"), None);
        assert_eq!(classify("approximately three tasks left"), None);
    }

    #[test]
    fn plain_message_has_no_decision() {
        assert_eq!(classify("what's the status of task 3?"), None);
    }
}
