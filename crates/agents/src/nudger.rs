//! Nudge sender: reminds owners of stuck pull requests and stale tasks,
//! gated by reminder caps, cooldowns, and an advisory confidence floor.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use tiller_core::advisory::{Advisor, AdvisoryRequest, NUDGE_CONFIDENCE_FLOOR};
use tiller_core::domain::action::{
    ExecutionOutcome, Intervention, NudgeEntityKind, NudgeSuggestion, Priority,
};
use tiller_core::domain::agent::AgentConfiguration;
use tiller_core::domain::directory::UserId;
use tiller_core::errors::EngineError;
use tiller_db::repositories::{ActionRepository, PullRequestRepository, TaskRepository};
use tiller_notify::{delivered_to_any, failed_channels, NotificationRequest, Notifier};

pub const NUDGE_ACTION_KIND: &str = "send_nudge";

/// At this many executed reminders the next one escalates to high priority.
const ESCALATION_REMINDER_COUNT: u32 = 2;

struct NudgeCandidate {
    entity_id: String,
    entity_kind: NudgeEntityKind,
    title: String,
    owner: UserId,
}

pub struct NudgerAgent {
    configuration: AgentConfiguration,
    tasks: Arc<dyn TaskRepository>,
    pull_requests: Arc<dyn PullRequestRepository>,
    actions: Arc<dyn ActionRepository>,
    advisor: Arc<dyn Advisor>,
    notifier: Notifier,
}

impl NudgerAgent {
    pub fn new(
        configuration: AgentConfiguration,
        tasks: Arc<dyn TaskRepository>,
        pull_requests: Arc<dyn PullRequestRepository>,
        actions: Arc<dyn ActionRepository>,
        advisor: Arc<dyn Advisor>,
        notifier: Notifier,
    ) -> Self {
        Self { configuration, tasks, pull_requests, actions, advisor, notifier }
    }

    fn persistence(error: tiller_db::repositories::RepositoryError) -> EngineError {
        EngineError::Persistence(error.to_string())
    }

    async fn collect_candidates(&self) -> Result<Vec<NudgeCandidate>, EngineError> {
        let mut candidates = Vec::new();

        for pull_request in self
            .pull_requests
            .list_stuck_open(&self.configuration.org_id)
            .await
            .map_err(Self::persistence)?
        {
            candidates.push(NudgeCandidate {
                entity_id: pull_request.id.0,
                entity_kind: NudgeEntityKind::PullRequest,
                title: pull_request.title,
                owner: pull_request.author,
            });
        }

        for task in self
            .tasks
            .list_stale_in_progress(&self.configuration.org_id)
            .await
            .map_err(Self::persistence)?
        {
            let Some(owner) = task.assignee else {
                continue;
            };
            candidates.push(NudgeCandidate {
                entity_id: task.id.0,
                entity_kind: NudgeEntityKind::Task,
                title: task.title,
                owner,
            });
        }

        Ok(candidates)
    }
}

#[async_trait]
impl super::policy::PolicyAgent for NudgerAgent {
    fn configuration(&self) -> &AgentConfiguration {
        &self.configuration
    }

    async fn evaluate(&self, now: DateTime<Utc>) -> Result<Vec<Intervention>, EngineError> {
        let thresholds = self.configuration.nudger_thresholds();
        let mut interventions = Vec::new();

        for candidate in self.collect_candidates().await? {
            let prior = self
                .actions
                .count_executed_for_entity(&self.configuration.id, &candidate.entity_id)
                .await
                .map_err(Self::persistence)?;
            if prior >= thresholds.max_reminders {
                continue;
            }

            if let Some(last) = self
                .actions
                .last_executed_for_entity(&self.configuration.id, &candidate.entity_id)
                .await
                .map_err(Self::persistence)?
            {
                // Strict cooldown: elapsed must exceed the interval, not
                // merely reach it.
                if now - last <= Duration::hours(thresholds.reminder_interval_hours) {
                    continue;
                }
            }

            // The heuristic only nominates; the advisory verdict decides.
            let verdict = self
                .advisor
                .advise(AdvisoryRequest::new(
                    "This work item appears stalled. Should the owner receive a reminder now?",
                    json!({
                        "entity_id": candidate.entity_id,
                        "entity_kind": candidate.entity_kind,
                        "title": candidate.title,
                        "owner": candidate.owner.0,
                        "prior_reminders": prior,
                    }),
                ))
                .await;

            if !verdict.recommends_acting_with(NUDGE_CONFIDENCE_FLOOR) {
                continue;
            }

            let priority = if prior >= ESCALATION_REMINDER_COUNT {
                Priority::High
            } else {
                verdict.priority.unwrap_or(Priority::Medium)
            };

            let suggestion = NudgeSuggestion {
                schema_version: 1,
                entity_id: candidate.entity_id.clone(),
                entity_kind: candidate.entity_kind,
                title: candidate.title.clone(),
                owner: candidate.owner.clone(),
                reminder_count: prior,
            };

            interventions.push(Intervention {
                action_kind: NUDGE_ACTION_KIND.to_string(),
                reasoning: verdict.reasoning,
                suggestion: serde_json::to_value(&suggestion)
                    .map_err(|e| EngineError::Integration(e.to_string()))?,
                target_user: Some(candidate.owner),
                risk_id: None,
                priority,
            });
        }

        Ok(interventions)
    }

    async fn execute(&self, intervention: &Intervention) -> Result<ExecutionOutcome, EngineError> {
        let plan: NudgeSuggestion = serde_json::from_value(intervention.suggestion.clone())
            .map_err(|e| EngineError::Integration(format!("malformed nudge payload: {e}")))?;

        let receipts = self
            .notifier
            .dispatch(&NotificationRequest {
                user_id: plan.owner.clone(),
                org_id: self.configuration.org_id.clone(),
                notification_type: "nudge".to_string(),
                title: plan.title.clone(),
                item_id: plan.entity_id.clone(),
                url: None,
                reminder_count: plan.reminder_count,
            })
            .await;

        let failed = failed_channels(&receipts);
        let data = json!({ "entity_id": plan.entity_id, "receipts": receipts });

        if delivered_to_any(&receipts) {
            let mut message = format!("nudged {} about `{}`", plan.owner.0, plan.entity_id);
            if !failed.is_empty() {
                message.push_str(&format!("; failed channels: {}", failed.join(", ")));
            }
            Ok(ExecutionOutcome { success: true, message, data: Some(data) })
        } else {
            let message = if receipts.is_empty() {
                "no delivery channels configured".to_string()
            } else {
                format!("every channel rejected the nudge: {}", failed.join(", "))
            };
            Ok(ExecutionOutcome { success: false, message, data: Some(data) })
        }
    }
}
