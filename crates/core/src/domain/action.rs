use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::agent::{AgentConfiguration, AgentConfigurationId};
use crate::domain::directory::{OrgId, UserId};
use crate::domain::project::RiskSignalId;
use crate::domain::work::TaskId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentActionId(pub String);

/// Lifecycle of a persisted intervention record.
///
/// ```text
/// Pending --approve--> Approved --execute ok--> Executed
/// Pending --reject--> Rejected
/// Approved --execute error--> Failed
/// ```
///
/// Executed, Failed, and Rejected are terminal. Approved is transient when
/// the owning configuration auto-approves and durable when a human must
/// approve out of band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Executed,
    Failed,
    Rejected,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Executed => "executed",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "executed" => Some(Self::Executed),
            "failed" => Some(Self::Failed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Failed | Self::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Proposal produced by `evaluate()`. Ephemeral; exists only between
/// evaluation and persistence as an [`AgentAction`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub action_kind: String,
    pub reasoning: String,
    pub suggestion: serde_json::Value,
    pub target_user: Option<UserId>,
    pub risk_id: Option<RiskSignalId>,
    pub priority: Priority,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ExecutionOutcome {
    pub fn ok(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self { success: true, message: message.into(), data }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None }
    }
}

fn schema_version_one() -> u32 {
    1
}

/// Suggestion payload for one task moved off an overloaded assignee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignmentSuggestion {
    #[serde(default = "schema_version_one")]
    pub schema_version: u32,
    /// Entity the dedup invariant keys on; the reassigned task.
    pub entity_id: String,
    pub task_title: String,
    pub from_user: UserId,
    pub to_user: UserId,
    pub from_load: u32,
    pub to_load: u32,
}

impl ReassignmentSuggestion {
    pub fn task_id(&self) -> TaskId {
        TaskId(self.entity_id.clone())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeEntityKind {
    Task,
    PullRequest,
}

/// Suggestion payload for one reminder sent about a stalled entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NudgeSuggestion {
    #[serde(default = "schema_version_one")]
    pub schema_version: u32,
    /// Entity the dedup invariant keys on; task or pull request id.
    pub entity_id: String,
    pub entity_kind: NudgeEntityKind,
    pub title: String,
    pub owner: UserId,
    /// Executed nudges already on record for this entity before this one.
    pub reminder_count: u32,
}

/// Suggestion payload for a batch of tasks deferred out of a threatened
/// project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferralSuggestion {
    #[serde(default = "schema_version_one")]
    pub schema_version: u32,
    /// Entity the dedup invariant keys on; the project.
    pub entity_id: String,
    pub task_ids: Vec<String>,
    pub remaining_open: u32,
    pub cap: u32,
}

/// The persisted, auditable record of one intervention and its outcome.
/// This table is the engine's primary externally observable output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub id: AgentActionId,
    pub configuration_id: AgentConfigurationId,
    pub org_id: OrgId,
    pub action_kind: String,
    pub reasoning: String,
    pub suggestion_json: serde_json::Value,
    pub target_user: Option<UserId>,
    pub risk_id: Option<RiskSignalId>,
    pub status: ActionStatus,
    pub result_json: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl AgentAction {
    pub fn from_intervention(
        configuration: &AgentConfiguration,
        intervention: Intervention,
        auto_approved: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AgentActionId(Uuid::new_v4().to_string()),
            configuration_id: configuration.id.clone(),
            org_id: configuration.org_id.clone(),
            action_kind: intervention.action_kind,
            reasoning: intervention.reasoning,
            suggestion_json: intervention.suggestion,
            target_user: intervention.target_user,
            risk_id: intervention.risk_id,
            status: if auto_approved { ActionStatus::Approved } else { ActionStatus::Pending },
            result_json: None,
            created_at: now,
            approved_at: auto_approved.then_some(now),
            executed_at: None,
        }
    }

    /// Rebuild the ephemeral proposal from the persisted record, for the
    /// deferred-execution path (human approval out of band).
    pub fn to_intervention(&self) -> Intervention {
        Intervention {
            action_kind: self.action_kind.clone(),
            reasoning: self.reasoning.clone(),
            suggestion: self.suggestion_json.clone(),
            target_user: self.target_user.clone(),
            risk_id: self.risk_id.clone(),
            priority: Priority::Medium,
        }
    }

    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        matches!(
            (self.status, next),
            (ActionStatus::Pending, ActionStatus::Approved)
                | (ActionStatus::Pending, ActionStatus::Rejected)
                | (ActionStatus::Approved, ActionStatus::Executed)
                | (ActionStatus::Approved, ActionStatus::Failed)
        )
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to(ActionStatus::Approved)?;
        self.approved_at = Some(now);
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), DomainError> {
        self.transition_to(ActionStatus::Rejected)
    }

    pub fn mark_executed(
        &mut self,
        outcome: &ExecutionOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition_to(ActionStatus::Executed)?;
        self.result_json = Some(serde_json::json!({
            "success": true,
            "message": outcome.message,
            "data": outcome.data,
        }));
        self.executed_at = Some(now);
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition_to(ActionStatus::Failed)?;
        let error: String = error.into();
        self.result_json = Some(serde_json::json!({
            "success": false,
            "error": error,
        }));
        self.executed_at = Some(now);
        Ok(())
    }

    fn transition_to(&mut self, next: ActionStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidActionTransition { from: self.status, to: next })
    }

    /// Entity id referenced by the suggestion payload, used for dedup
    /// counting. Every payload schema carries a top-level `entity_id`.
    pub fn suggestion_entity_id(&self) -> Option<&str> {
        self.suggestion_json.get("entity_id").and_then(|value| value.as_str())
    }
}
