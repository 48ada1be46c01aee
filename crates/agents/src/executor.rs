//! Per-organization batch pass.
//!
//! Runs every enabled configuration's cycle strictly sequentially, isolating
//! each configuration's failures, then drains actions a human approved out
//! of band. The engine assumes at most one executor process per organization;
//! the dedup count-then-insert sequence is not transactional across
//! concurrent executors.

use chrono::{DateTime, Utc};

use tiller_core::domain::action::{AgentAction, AgentActionId};
use tiller_core::domain::agent::{AgentConfigurationId, AgentKind};
use tiller_core::domain::directory::OrgId;
use tiller_core::errors::EngineError;

use crate::policy::{run_cycle, CycleReport};
use crate::registry::{build_agent, EngineServices};

#[derive(Clone, Debug)]
pub enum ConfigCycle {
    Completed { configuration_id: AgentConfigurationId, report: CycleReport },
    Failed { configuration_id: AgentConfigurationId, kind: AgentKind, error: String },
}

#[derive(Clone, Debug)]
pub struct DrainOutcome {
    pub action_id: AgentActionId,
    pub executed: bool,
    pub detail: String,
}

#[derive(Clone, Debug)]
pub struct OrgRunReport {
    pub org_id: OrgId,
    pub cycles: Vec<ConfigCycle>,
    pub drained: Vec<DrainOutcome>,
}

impl OrgRunReport {
    pub fn actions_created(&self) -> usize {
        self.cycles
            .iter()
            .map(|cycle| match cycle {
                ConfigCycle::Completed { report, .. } => report.created.len(),
                ConfigCycle::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn failed_configurations(&self) -> usize {
        self.cycles
            .iter()
            .filter(|cycle| matches!(cycle, ConfigCycle::Failed { .. }))
            .count()
    }
}

pub struct AgentExecutor {
    services: EngineServices,
}

impl AgentExecutor {
    pub fn new(services: EngineServices) -> Self {
        Self { services }
    }

    /// One scheduled tick for one organization. Per-configuration failures
    /// are isolated; the pass always reaches the end of the configuration
    /// list and the approved-action drain.
    pub async fn run_for_org(
        &self,
        org_id: &OrgId,
        now: DateTime<Utc>,
    ) -> Result<OrgRunReport, EngineError> {
        let configurations = self
            .services
            .configurations
            .list_enabled(org_id)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;

        let mut report =
            OrgRunReport { org_id: org_id.clone(), cycles: Vec::new(), drained: Vec::new() };

        for configuration in configurations {
            let configuration_id = configuration.id.clone();
            let kind = configuration.kind;
            let agent = build_agent(configuration, &self.services);

            match run_cycle(agent.as_policy_agent(), &*self.services.actions, now).await {
                Ok(cycle) => {
                    report.cycles.push(ConfigCycle::Completed { configuration_id, report: cycle });
                }
                Err(error) => {
                    tracing::warn!(
                        configuration = %configuration_id.0,
                        kind = kind.as_str(),
                        %error,
                        "configuration cycle failed; continuing batch"
                    );
                    report.cycles.push(ConfigCycle::Failed {
                        configuration_id,
                        kind,
                        error: error.to_string(),
                    });
                }
            }
        }

        match self.services.actions.list_approved(org_id).await {
            Ok(approved) => {
                for action in approved {
                    let outcome = self.drain_one(action, now).await;
                    report.drained.push(outcome);
                }
            }
            Err(error) => {
                tracing::warn!(org = %org_id.0, %error, "could not list approved actions");
            }
        }

        Ok(report)
    }

    /// Execute one action a human approved out of band. Failures land on the
    /// action record, never on the batch.
    async fn drain_one(&self, mut action: AgentAction, now: DateTime<Utc>) -> DrainOutcome {
        let action_id = action.id.clone();

        let configuration =
            match self.services.configurations.find_by_id(&action.configuration_id).await {
                Ok(Some(configuration)) => configuration,
                Ok(None) => {
                    return DrainOutcome {
                        action_id,
                        executed: false,
                        detail: format!(
                            "configuration `{}` no longer exists",
                            action.configuration_id.0
                        ),
                    };
                }
                Err(error) => {
                    return DrainOutcome {
                        action_id,
                        executed: false,
                        detail: format!("could not load configuration: {error}"),
                    };
                }
            };

        let agent = build_agent(configuration, &self.services);
        let intervention = action.to_intervention();

        let (executed, detail) = match agent.as_policy_agent().execute(&intervention).await {
            Ok(outcome) if outcome.success => {
                let detail = outcome.message.clone();
                match action.mark_executed(&outcome, now) {
                    Ok(()) => (true, detail),
                    Err(error) => (false, error.to_string()),
                }
            }
            Ok(outcome) => {
                let detail = outcome.message.clone();
                match action.mark_failed(outcome.message, now) {
                    Ok(()) => (false, detail),
                    Err(error) => (false, error.to_string()),
                }
            }
            Err(error) => {
                let detail = error.to_string();
                match action.mark_failed(detail.clone(), now) {
                    Ok(()) => (false, detail),
                    Err(transition_error) => (false, transition_error.to_string()),
                }
            }
        };

        if let Err(error) = self.services.actions.save(action).await {
            tracing::error!(action = %action_id.0, %error, "could not persist drain outcome");
            return DrainOutcome {
                action_id,
                executed: false,
                detail: format!("drain outcome not persisted: {error}"),
            };
        }

        DrainOutcome { action_id, executed, detail }
    }
}
