//! Task reassigner: spots overloaded assignees and moves one task per
//! overloaded user per cycle to the least-loaded teammate who shares a team.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use tiller_core::advisory::{Advisor, AdvisoryRequest};
use tiller_core::domain::action::{
    ExecutionOutcome, Intervention, Priority, ReassignmentSuggestion,
};
use tiller_core::domain::agent::AgentConfiguration;
use tiller_core::domain::directory::{User, UserId};
use tiller_core::domain::work::Task;
use tiller_core::errors::EngineError;
use tiller_db::repositories::{TaskRepository, UserRepository};
use tiller_notify::{failed_channels, NotificationRequest, Notifier};

pub const REASSIGN_ACTION_KIND: &str = "reassign_task";

/// A confident advisory "don't" at or above this bar vetoes a candidate.
/// The degraded silent verdict (confidence 0) never vetoes, so the
/// deterministic heuristic stands on its own without an advisor.
const VETO_CONFIDENCE_FLOOR: f64 = 0.5;

pub struct ReassignerAgent {
    configuration: AgentConfiguration,
    tasks: Arc<dyn TaskRepository>,
    users: Arc<dyn UserRepository>,
    advisor: Arc<dyn Advisor>,
    notifier: Notifier,
}

impl ReassignerAgent {
    pub fn new(
        configuration: AgentConfiguration,
        tasks: Arc<dyn TaskRepository>,
        users: Arc<dyn UserRepository>,
        advisor: Arc<dyn Advisor>,
        notifier: Notifier,
    ) -> Self {
        Self { configuration, tasks, users, advisor, notifier }
    }

    fn pick_target<'a>(
        overloaded: &User,
        teammates: &[&'a User],
        projected_load: &HashMap<UserId, u32>,
    ) -> Option<&'a User> {
        teammates
            .iter()
            .filter(|candidate| candidate.id != overloaded.id)
            .filter(|candidate| candidate.shares_team_with(overloaded))
            .copied()
            .min_by_key(|candidate| {
                (projected_load.get(&candidate.id).copied().unwrap_or(0), candidate.id.0.clone())
            })
    }

    /// Oldest-created reassignable task keeps the ordering deterministic and
    /// fair across cycles.
    fn pick_task<'a>(tasks: &[&'a Task]) -> Option<&'a Task> {
        tasks
            .iter()
            .filter(|task| task.is_reassignable())
            .copied()
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)))
    }

    fn persistence(error: tiller_db::repositories::RepositoryError) -> EngineError {
        EngineError::Persistence(error.to_string())
    }
}

#[async_trait]
impl super::policy::PolicyAgent for ReassignerAgent {
    fn configuration(&self) -> &AgentConfiguration {
        &self.configuration
    }

    async fn evaluate(&self, _now: DateTime<Utc>) -> Result<Vec<Intervention>, EngineError> {
        let thresholds = self.configuration.reassigner_thresholds();
        let users = self
            .users
            .list_for_org(&self.configuration.org_id)
            .await
            .map_err(Self::persistence)?;
        let active_tasks = self
            .tasks
            .list_active(&self.configuration.org_id)
            .await
            .map_err(Self::persistence)?;

        let mut load: HashMap<UserId, u32> = HashMap::new();
        let mut by_assignee: HashMap<UserId, Vec<&Task>> = HashMap::new();
        for task in &active_tasks {
            if let Some(assignee) = &task.assignee {
                *load.entry(assignee.clone()).or_default() += 1;
                by_assignee.entry(assignee.clone()).or_default().push(task);
            }
        }

        // Later picks see earlier picks, so one cycle never piles every
        // reassignment onto the same teammate.
        let mut projected_load = load.clone();
        let teammates: Vec<&User> = users.iter().collect();
        let mut interventions = Vec::new();

        for user in &users {
            let user_load = load.get(&user.id).copied().unwrap_or(0);
            if user_load <= thresholds.overload_threshold {
                continue;
            }

            let Some(target) = Self::pick_target(user, &teammates, &projected_load) else {
                tracing::debug!(user = %user.id.0, "overloaded but no teammate shares a team");
                continue;
            };

            let owned = by_assignee.get(&user.id).map(Vec::as_slice).unwrap_or(&[]);
            let Some(task) = Self::pick_task(owned) else {
                tracing::debug!(user = %user.id.0, "overloaded but no reassignable task");
                continue;
            };

            let target_load = projected_load.get(&target.id).copied().unwrap_or(0);
            let verdict = self
                .advisor
                .advise(AdvisoryRequest::new(
                    "An assignee appears overloaded. Should this task move to the proposed \
                     teammate?",
                    json!({
                        "entity_id": task.id.0,
                        "task_title": task.title,
                        "from_user": user.id.0,
                        "from_load": user_load,
                        "to_user": target.id.0,
                        "to_load": target_load,
                        "overload_threshold": thresholds.overload_threshold,
                    }),
                ))
                .await;

            if !verdict.should_act && verdict.confidence >= VETO_CONFIDENCE_FLOOR {
                tracing::info!(
                    task = %task.id.0,
                    confidence = verdict.confidence,
                    "advisory vetoed reassignment"
                );
                continue;
            }

            let suggestion = ReassignmentSuggestion {
                schema_version: 1,
                entity_id: task.id.0.clone(),
                task_title: task.title.clone(),
                from_user: user.id.clone(),
                to_user: target.id.clone(),
                from_load: user_load,
                to_load: target_load,
            };

            interventions.push(Intervention {
                action_kind: REASSIGN_ACTION_KIND.to_string(),
                reasoning: format!(
                    "{} carries {} active tasks (threshold {}); moving oldest eligible task \
                     `{}` to {} ({} active)",
                    user.id.0,
                    user_load,
                    thresholds.overload_threshold,
                    task.title,
                    target.id.0,
                    target_load
                ),
                suggestion: serde_json::to_value(&suggestion)
                    .map_err(|e| EngineError::Integration(e.to_string()))?,
                target_user: Some(target.id.clone()),
                risk_id: None,
                priority: Priority::Medium,
            });

            *projected_load.entry(target.id.clone()).or_default() += 1;
            if let Some(count) = projected_load.get_mut(&user.id) {
                *count = count.saturating_sub(1);
            }
        }

        Ok(interventions)
    }

    async fn execute(&self, intervention: &Intervention) -> Result<ExecutionOutcome, EngineError> {
        let plan: ReassignmentSuggestion =
            serde_json::from_value(intervention.suggestion.clone()).map_err(|e| {
                EngineError::Integration(format!("malformed reassignment payload: {e}"))
            })?;

        if let Err(error) =
            self.tasks.update_assignee(&plan.task_id(), &plan.to_user, Utc::now()).await
        {
            return Ok(ExecutionOutcome::failed(format!(
                "could not persist reassignment of `{}`: {error}",
                plan.entity_id
            )));
        }

        let receipts = self
            .notifier
            .dispatch(&NotificationRequest {
                user_id: plan.to_user.clone(),
                org_id: self.configuration.org_id.clone(),
                notification_type: "task_reassigned".to_string(),
                title: plan.task_title.clone(),
                item_id: plan.entity_id.clone(),
                url: None,
                reminder_count: 0,
            })
            .await;

        let mut message = format!(
            "reassigned `{}` from {} to {}",
            plan.entity_id, plan.from_user.0, plan.to_user.0
        );
        let failed = failed_channels(&receipts);
        if !failed.is_empty() {
            message.push_str(&format!("; notification failed on: {}", failed.join(", ")));
        }

        Ok(ExecutionOutcome::ok(
            message,
            Some(json!({
                "task_id": plan.entity_id,
                "new_assignee": plan.to_user.0,
                "receipts": receipts,
            })),
        ))
    }
}
