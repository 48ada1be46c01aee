//! Scope adjuster: proposes deferring low-priority, non-blocking tasks out
//! of projects whose deadline is actively at risk. Suggestion-only; every
//! proposal waits for a human even under auto-approve configurations.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use tiller_core::advisory::{Advisor, AdvisoryRequest, DEFERRAL_CONFIDENCE_FLOOR};
use tiller_core::domain::action::{DeferralSuggestion, ExecutionOutcome, Intervention, Priority};
use tiller_core::domain::agent::AgentConfiguration;
use tiller_core::domain::work::{Task, TaskId, TaskStatus};
use tiller_core::errors::EngineError;
use tiller_db::repositories::{ProjectRepository, TaskRepository};

pub const DEFER_ACTION_KIND: &str = "defer_scope";

/// Share of a project's remaining open tasks one deferral may touch.
const DEFERRAL_FRACTION: f64 = 0.2;

const DEFERRED_TAG: &str = "deferred";

pub struct ScopeAdjusterAgent {
    configuration: AgentConfiguration,
    tasks: Arc<dyn TaskRepository>,
    projects: Arc<dyn ProjectRepository>,
    advisor: Arc<dyn Advisor>,
}

impl ScopeAdjusterAgent {
    pub fn new(
        configuration: AgentConfiguration,
        tasks: Arc<dyn TaskRepository>,
        projects: Arc<dyn ProjectRepository>,
        advisor: Arc<dyn Advisor>,
    ) -> Self {
        Self { configuration, tasks, projects, advisor }
    }

    fn persistence(error: tiller_db::repositories::RepositoryError) -> EngineError {
        EngineError::Persistence(error.to_string())
    }

    pub fn deferral_cap(remaining_open: u32) -> u32 {
        ((remaining_open as f64) * DEFERRAL_FRACTION).ceil() as u32
    }

    /// Highest-priority eligible tasks first, oldest first within a
    /// priority, truncated to the cap.
    fn select_for_deferral(mut eligible: Vec<&Task>, cap: u32) -> Vec<TaskId> {
        eligible.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        eligible.truncate(cap as usize);
        eligible.into_iter().map(|task| task.id.clone()).collect()
    }

    /// Task ids the advisory recommendation singles out, when it does.
    fn recommended_ids(recommendation: Option<&serde_json::Value>) -> Option<HashSet<String>> {
        let ids = recommendation?.get("task_ids")?.as_array()?;
        Some(
            ids.iter()
                .filter_map(|value| value.as_str().map(|id| id.to_string()))
                .collect(),
        )
    }
}

#[async_trait]
impl super::policy::PolicyAgent for ScopeAdjusterAgent {
    fn configuration(&self) -> &AgentConfiguration {
        &self.configuration
    }

    fn suggestion_only(&self) -> bool {
        true
    }

    async fn evaluate(&self, _now: DateTime<Utc>) -> Result<Vec<Intervention>, EngineError> {
        let thresholds = self.configuration.scope_thresholds();
        let projects = self
            .projects
            .list_active(&self.configuration.org_id)
            .await
            .map_err(Self::persistence)?;
        let risks = self
            .projects
            .list_active_risks(&self.configuration.org_id)
            .await
            .map_err(Self::persistence)?;

        let mut interventions = Vec::new();

        for project in &projects {
            if project.target_date.is_none() {
                continue;
            }
            let Some(risk) = risks
                .iter()
                .find(|risk| risk.project_id == project.id && risk.threatens_deadline())
            else {
                continue;
            };

            let open = self
                .tasks
                .list_open_for_project(&project.id)
                .await
                .map_err(Self::persistence)?;
            let remaining_open = open.len() as u32;
            if remaining_open == 0 {
                continue;
            }

            let eligible: Vec<&Task> = open
                .iter()
                .filter(|task| task.status != TaskStatus::Backlog)
                .filter(|task| task.priority <= thresholds.deferral_priority_ceiling)
                .filter(|task| !task.is_blocking())
                .collect();
            if eligible.is_empty() {
                continue;
            }

            let cap = Self::deferral_cap(remaining_open);
            let candidate_summaries: Vec<serde_json::Value> = eligible
                .iter()
                .map(|task| {
                    json!({
                        "task_id": task.id.0,
                        "title": task.title,
                        "priority": task.priority.as_str(),
                    })
                })
                .collect();

            let verdict = self
                .advisor
                .advise(
                    AdvisoryRequest::new(
                        "This project's deadline is at risk. Which of the candidate tasks \
                         should be deferred to the backlog?",
                        json!({
                            "entity_id": project.id.0,
                            "project_name": project.name,
                            "target_date": project.target_date,
                            "risk_severity": risk.severity.as_str(),
                            "remaining_open_tasks": remaining_open,
                            "candidates": candidate_summaries,
                        }),
                    )
                    .with_project_context(project.context_summary()),
                )
                .await;

            // Deferral reshapes a project plan; demand a stricter bar than a
            // reminder does.
            if !verdict.recommends_acting_with(DEFERRAL_CONFIDENCE_FLOOR) {
                continue;
            }

            let shortlisted: Vec<&Task> =
                match Self::recommended_ids(verdict.recommendation.as_ref()) {
                    Some(ids) if !ids.is_empty() => eligible
                        .iter()
                        .filter(|task| ids.contains(&task.id.0))
                        .copied()
                        .collect(),
                    _ => eligible,
                };
            if shortlisted.is_empty() {
                continue;
            }

            let task_ids = Self::select_for_deferral(shortlisted, cap);
            let suggestion = DeferralSuggestion {
                schema_version: 1,
                entity_id: project.id.0.clone(),
                task_ids: task_ids.iter().map(|id| id.0.clone()).collect(),
                remaining_open,
                cap,
            };

            interventions.push(Intervention {
                action_kind: DEFER_ACTION_KIND.to_string(),
                reasoning: format!(
                    "`{}` has an active {} deadline risk; deferring {} of {} open tasks \
                     (cap {}). {}",
                    project.name,
                    risk.severity.as_str(),
                    suggestion.task_ids.len(),
                    remaining_open,
                    cap,
                    verdict.reasoning
                ),
                suggestion: serde_json::to_value(&suggestion)
                    .map_err(|e| EngineError::Integration(e.to_string()))?,
                target_user: None,
                risk_id: Some(risk.id.clone()),
                priority: Priority::High,
            });
        }

        Ok(interventions)
    }

    async fn execute(&self, intervention: &Intervention) -> Result<ExecutionOutcome, EngineError> {
        let plan: DeferralSuggestion = serde_json::from_value(intervention.suggestion.clone())
            .map_err(|e| EngineError::Integration(format!("malformed deferral payload: {e}")))?;

        let now = Utc::now();
        let mut deferred = Vec::new();
        let mut failures = Vec::new();

        for task_id in &plan.task_ids {
            match self
                .tasks
                .move_to_backlog(&TaskId(task_id.clone()), DEFERRED_TAG, now)
                .await
            {
                Ok(()) => deferred.push(task_id.clone()),
                Err(error) => failures.push(format!("{task_id}: {error}")),
            }
        }

        let data = json!({
            "project_id": plan.entity_id,
            "deferred": deferred,
            "failures": failures,
        });

        if failures.is_empty() {
            Ok(ExecutionOutcome::ok(
                format!("deferred {} tasks in project `{}`", deferred.len(), plan.entity_id),
                Some(data),
            ))
        } else {
            Ok(ExecutionOutcome {
                success: false,
                message: format!(
                    "deferred {} tasks but {} failed: {}",
                    deferred.len(),
                    failures.len(),
                    failures.join("; ")
                ),
                data: Some(data),
            })
        }
    }
}
