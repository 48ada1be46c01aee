//! The policy-agent contract and the gated intervention cycle.

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};

use tiller_core::domain::action::{AgentAction, AgentActionId, ExecutionOutcome, Intervention};
use tiller_core::domain::agent::{AgentConfiguration, AgentKind};
use tiller_core::errors::EngineError;
use tiller_core::safety::{rate_limit_window_start, GateDecision, SafetyGate};
use tiller_db::repositories::{ActionRepository, RepositoryError};

/// One category of automated decision-making and its side effects.
#[async_trait]
pub trait PolicyAgent: Send + Sync {
    fn configuration(&self) -> &AgentConfiguration;

    /// Suggestion-only agents persist Pending actions even when the owning
    /// configuration auto-approves (product policy, not a technical limit).
    fn suggestion_only(&self) -> bool {
        false
    }

    /// Pure read-side analysis. Must not mutate domain state; may consult
    /// the advisory client. "No candidates" is an empty list, never an
    /// error.
    async fn evaluate(&self, now: DateTime<Utc>) -> Result<Vec<Intervention>, EngineError>;

    /// Perform the real-world side effect. At most once per intervention;
    /// callers own the not-twice guarantee.
    async fn execute(&self, intervention: &Intervention) -> Result<ExecutionOutcome, EngineError>;
}

/// What one `run` produced for one configuration.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub kind: AgentKind,
    pub gate: GateDecision,
    pub created: Vec<AgentActionId>,
    pub executed: u32,
    pub failed: u32,
}

impl CycleReport {
    fn skipped(kind: AgentKind, gate: GateDecision) -> Self {
        Self { kind, gate, created: Vec::new(), executed: 0, failed: 0 }
    }
}

fn persistence(error: RepositoryError) -> EngineError {
    EngineError::Persistence(error.to_string())
}

/// Orchestration entry point for one agent, one cycle.
///
/// Safety gate first: a denial returns immediately with zero side effects.
/// Every intervention is then persisted; auto-approved ones execute
/// synchronously and transition to Executed or Failed. Execution errors are
/// captured onto the action record and never escape. `execute` is invoked at
/// most once per intervention.
pub async fn run_cycle(
    agent: &dyn PolicyAgent,
    actions: &dyn ActionRepository,
    now: DateTime<Utc>,
) -> Result<CycleReport, EngineError> {
    let configuration = agent.configuration();

    let recent = actions
        .count_created_since(&configuration.id, rate_limit_window_start(now))
        .await
        .map_err(persistence)?;

    let gate =
        SafetyGate::check(configuration.quiet_hours.as_ref(), now.hour() as u8, recent);
    if let GateDecision::Denied { reason_code, ref detail } = gate {
        tracing::info!(
            configuration = %configuration.id.0,
            kind = configuration.kind.as_str(),
            reason_code,
            detail = %detail,
            "safety gate denied cycle"
        );
        return Ok(CycleReport::skipped(configuration.kind, gate));
    }

    let interventions = agent.evaluate(now).await?;

    let auto_approve = configuration.auto_approve && !agent.suggestion_only();
    let mut report = CycleReport {
        kind: configuration.kind,
        gate,
        created: Vec::new(),
        executed: 0,
        failed: 0,
    };

    for intervention in interventions {
        let mut action =
            AgentAction::from_intervention(configuration, intervention.clone(), auto_approve, now);
        actions.save(action.clone()).await.map_err(persistence)?;
        report.created.push(action.id.clone());

        if !auto_approve {
            continue;
        }

        match agent.execute(&intervention).await {
            Ok(outcome) if outcome.success => {
                action.mark_executed(&outcome, now)?;
                report.executed += 1;
            }
            Ok(outcome) => {
                action.mark_failed(outcome.message.clone(), now)?;
                report.failed += 1;
            }
            Err(error) => {
                tracing::warn!(
                    configuration = %configuration.id.0,
                    action = %action.id.0,
                    %error,
                    "intervention execution failed"
                );
                action.mark_failed(error.to_string(), now)?;
                report.failed += 1;
            }
        }

        actions.save(action).await.map_err(persistence)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use tiller_core::domain::action::{
        ActionStatus, ExecutionOutcome, Intervention, Priority,
    };
    use tiller_core::domain::agent::{AgentConfiguration, AgentConfigurationId, AgentKind};
    use tiller_core::domain::directory::OrgId;
    use tiller_core::errors::EngineError;
    use tiller_core::safety::{GateDecision, QuietHours, RATE_LIMIT_CEILING};
    use tiller_db::repositories::{ActionRepository, InMemoryActionRepository};

    use super::{run_cycle, PolicyAgent};

    struct FixedAgent {
        configuration: AgentConfiguration,
        interventions: Vec<Intervention>,
        execute_calls: AtomicU32,
        fail_execution: bool,
    }

    impl FixedAgent {
        fn new(configuration: AgentConfiguration, interventions: Vec<Intervention>) -> Self {
            Self {
                configuration,
                interventions,
                execute_calls: AtomicU32::new(0),
                fail_execution: false,
            }
        }
    }

    #[async_trait]
    impl PolicyAgent for FixedAgent {
        fn configuration(&self) -> &AgentConfiguration {
            &self.configuration
        }

        async fn evaluate(&self, _now: DateTime<Utc>) -> Result<Vec<Intervention>, EngineError> {
            Ok(self.interventions.clone())
        }

        async fn execute(
            &self,
            _intervention: &Intervention,
        ) -> Result<ExecutionOutcome, EngineError> {
            self.execute_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_execution {
                Err(EngineError::Integration("store unreachable".to_string()))
            } else {
                Ok(ExecutionOutcome::ok("done", None))
            }
        }
    }

    fn configuration(auto_approve: bool, quiet_hours: Option<QuietHours>) -> AgentConfiguration {
        let now = Utc::now();
        AgentConfiguration {
            id: AgentConfigurationId("cfg-1".to_string()),
            org_id: OrgId("org-1".to_string()),
            kind: AgentKind::Nudger,
            enabled: true,
            thresholds: json!({}),
            quiet_hours,
            auto_approve,
            created_at: now,
            updated_at: now,
        }
    }

    fn intervention(entity_id: &str) -> Intervention {
        Intervention {
            action_kind: "send_nudge".to_string(),
            reasoning: "stalled".to_string(),
            suggestion: json!({ "schema_version": 1, "entity_id": entity_id }),
            target_user: None,
            risk_id: None,
            priority: Priority::Medium,
        }
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, 15, 0).single().expect("valid timestamp")
    }

    #[tokio::test]
    async fn quiet_hours_produce_zero_actions_regardless_of_candidates() {
        let repo = InMemoryActionRepository::default();
        let agent = FixedAgent::new(
            configuration(true, Some(QuietHours { start_hour: 22, end_hour: 6 })),
            vec![intervention("T-1"), intervention("T-2")],
        );

        for hour in [23, 2] {
            let report = run_cycle(&agent, &repo, at_hour(hour)).await.expect("cycle");
            assert!(report.gate.is_denied());
            assert!(report.created.is_empty());
        }
        assert!(repo.all().await.is_empty());
        assert_eq!(agent.execute_calls.load(Ordering::SeqCst), 0);

        // Outside the window the same agent acts.
        let report = run_cycle(&agent, &repo, at_hour(12)).await.expect("cycle");
        assert_eq!(report.created.len(), 2);
    }

    #[tokio::test]
    async fn non_wrapping_quiet_window_blocks_only_inside_hours() {
        let repo = InMemoryActionRepository::default();
        let agent = FixedAgent::new(
            configuration(false, Some(QuietHours { start_hour: 9, end_hour: 17 })),
            vec![intervention("T-1")],
        );

        let denied = run_cycle(&agent, &repo, at_hour(12)).await.expect("cycle");
        assert!(denied.gate.is_denied());

        let allowed = run_cycle(&agent, &repo, at_hour(20)).await.expect("cycle");
        assert_eq!(allowed.gate, GateDecision::Proceed);
        assert_eq!(allowed.created.len(), 1);
    }

    #[tokio::test]
    async fn rate_ceiling_makes_the_cycle_a_noop() {
        let repo = InMemoryActionRepository::default();
        let agent =
            FixedAgent::new(configuration(true, None), vec![intervention("fresh")]);
        let now = Utc::now();

        for index in 0..RATE_LIMIT_CEILING {
            let mut action = tiller_core::domain::action::AgentAction::from_intervention(
                agent.configuration(),
                intervention(&format!("T-{index}")),
                false,
                now - Duration::minutes(5),
            );
            action.id = tiller_core::domain::action::AgentActionId(format!("seed-{index}"));
            repo.insert(action).await;
        }

        let report = run_cycle(&agent, &repo, now).await.expect("cycle");

        assert!(matches!(
            report.gate,
            GateDecision::Denied { reason_code: "rate_limited", .. }
        ));
        assert_eq!(repo.all().await.len(), RATE_LIMIT_CEILING as usize);
    }

    #[tokio::test]
    async fn auto_approve_executes_each_intervention_exactly_once() {
        let repo = InMemoryActionRepository::default();
        let agent = FixedAgent::new(
            configuration(true, None),
            vec![intervention("T-1"), intervention("T-2"), intervention("T-3")],
        );

        let report = run_cycle(&agent, &repo, Utc::now()).await.expect("cycle");

        assert_eq!(report.created.len(), 3);
        assert_eq!(report.executed, 3);
        assert_eq!(agent.execute_calls.load(Ordering::SeqCst), 3);

        let actions = repo.all().await;
        assert!(actions.iter().all(|action| action.status == ActionStatus::Executed));
        assert!(actions.iter().all(|action| action.approved_at.is_some()));
    }

    #[tokio::test]
    async fn manual_approval_path_persists_pending_without_executing() {
        let repo = InMemoryActionRepository::default();
        let agent = FixedAgent::new(configuration(false, None), vec![intervention("T-1")]);

        let report = run_cycle(&agent, &repo, Utc::now()).await.expect("cycle");

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.executed, 0);
        assert_eq!(agent.execute_calls.load(Ordering::SeqCst), 0);

        let actions = repo.all().await;
        assert_eq!(actions[0].status, ActionStatus::Pending);
        assert!(actions[0].approved_at.is_none());
    }

    #[tokio::test]
    async fn execution_errors_are_captured_as_failed_actions() {
        let repo = InMemoryActionRepository::default();
        let mut agent = FixedAgent::new(configuration(true, None), vec![intervention("T-1")]);
        agent.fail_execution = true;

        let report = run_cycle(&agent, &repo, Utc::now()).await.expect("cycle must not error");

        assert_eq!(report.failed, 1);
        let actions = repo.all().await;
        assert_eq!(actions[0].status, ActionStatus::Failed);
        let result = actions[0].result_json.clone().expect("error payload");
        assert!(result["error"].as_str().expect("error string").contains("store unreachable"));
    }
}
