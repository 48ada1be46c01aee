//! Configuration-to-agent dispatch.
//!
//! Agent kind is a closed enum, so dispatch is an exhaustive match rather
//! than a dynamic type lookup; a stored kind string that fails to parse is
//! rejected before an agent is ever built, and that failure stays local to
//! its configuration.

use std::sync::Arc;

use tiller_core::advisory::Advisor;
use tiller_core::domain::agent::{AgentConfiguration, AgentKind};
use tiller_core::errors::EngineError;
use tiller_db::repositories::{
    ActionRepository, ConfigurationRepository, ProjectRepository, PullRequestRepository,
    TaskRepository, UserRepository,
};
use tiller_notify::Notifier;

use crate::nudger::NudgerAgent;
use crate::policy::PolicyAgent;
use crate::reassigner::ReassignerAgent;
use crate::scope::ScopeAdjusterAgent;

/// Everything an agent may need, injected once at engine construction.
#[derive(Clone)]
pub struct EngineServices {
    pub configurations: Arc<dyn ConfigurationRepository>,
    pub actions: Arc<dyn ActionRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub pull_requests: Arc<dyn PullRequestRepository>,
    pub users: Arc<dyn UserRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub advisor: Arc<dyn Advisor>,
    pub notifier: Notifier,
}

pub enum AgentInstance {
    Reassigner(ReassignerAgent),
    Nudger(NudgerAgent),
    ScopeAdjuster(ScopeAdjusterAgent),
}

impl AgentInstance {
    pub fn as_policy_agent(&self) -> &dyn PolicyAgent {
        match self {
            Self::Reassigner(agent) => agent,
            Self::Nudger(agent) => agent,
            Self::ScopeAdjuster(agent) => agent,
        }
    }
}

/// Stored agent-type identifier to kind. Unknown identifiers abort only the
/// configuration that carried them.
pub fn resolve_kind(raw: &str) -> Result<AgentKind, EngineError> {
    AgentKind::parse(raw).ok_or_else(|| EngineError::UnknownAgentKind(raw.to_string()))
}

pub fn build_agent(configuration: AgentConfiguration, services: &EngineServices) -> AgentInstance {
    match configuration.kind {
        AgentKind::Reassigner => AgentInstance::Reassigner(ReassignerAgent::new(
            configuration,
            services.tasks.clone(),
            services.users.clone(),
            services.advisor.clone(),
            services.notifier.clone(),
        )),
        AgentKind::Nudger => AgentInstance::Nudger(NudgerAgent::new(
            configuration,
            services.tasks.clone(),
            services.pull_requests.clone(),
            services.actions.clone(),
            services.advisor.clone(),
            services.notifier.clone(),
        )),
        AgentKind::ScopeAdjuster => AgentInstance::ScopeAdjuster(ScopeAdjusterAgent::new(
            configuration,
            services.tasks.clone(),
            services.projects.clone(),
            services.advisor.clone(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use tiller_core::domain::agent::{AgentConfiguration, AgentConfigurationId, AgentKind};
    use tiller_core::domain::directory::OrgId;
    use tiller_core::errors::EngineError;
    use tiller_db::repositories::{
        InMemoryActionRepository, InMemoryConfigurationRepository, InMemoryProjectRepository,
        InMemoryPullRequestRepository, InMemoryTaskRepository, InMemoryUserRepository,
    };
    use tiller_notify::Notifier;

    use crate::advisory::ScriptedAdvisor;

    use super::{build_agent, resolve_kind, AgentInstance, EngineServices};

    fn services() -> EngineServices {
        EngineServices {
            configurations: Arc::new(InMemoryConfigurationRepository::default()),
            actions: Arc::new(InMemoryActionRepository::default()),
            tasks: Arc::new(InMemoryTaskRepository::default()),
            pull_requests: Arc::new(InMemoryPullRequestRepository::default()),
            users: Arc::new(InMemoryUserRepository::default()),
            projects: Arc::new(InMemoryProjectRepository::default()),
            advisor: Arc::new(ScriptedAdvisor::silent()),
            notifier: Notifier::default(),
        }
    }

    fn configuration(kind: AgentKind) -> AgentConfiguration {
        let now = Utc::now();
        AgentConfiguration {
            id: AgentConfigurationId(format!("cfg-{}", kind.as_str())),
            org_id: OrgId("org-1".to_string()),
            kind,
            enabled: true,
            thresholds: json!({}),
            quiet_hours: None,
            auto_approve: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn every_kind_builds_its_matching_agent() {
        let services = services();

        let cases = [
            (AgentKind::Reassigner, "reassigner"),
            (AgentKind::Nudger, "nudger"),
            (AgentKind::ScopeAdjuster, "scope_adjuster"),
        ];

        for (kind, expected) in cases {
            let agent = build_agent(configuration(kind), &services);
            let built_kind = agent.as_policy_agent().configuration().kind;
            assert_eq!(built_kind.as_str(), expected);

            match (kind, &agent) {
                (AgentKind::Reassigner, AgentInstance::Reassigner(_))
                | (AgentKind::Nudger, AgentInstance::Nudger(_))
                | (AgentKind::ScopeAdjuster, AgentInstance::ScopeAdjuster(_)) => {}
                _ => panic!("kind {kind:?} built the wrong agent variant"),
            }
        }
    }

    #[test]
    fn only_the_scope_adjuster_is_suggestion_only() {
        let services = services();

        let scope = build_agent(configuration(AgentKind::ScopeAdjuster), &services);
        assert!(scope.as_policy_agent().suggestion_only());

        let nudger = build_agent(configuration(AgentKind::Nudger), &services);
        assert!(!nudger.as_policy_agent().suggestion_only());
    }

    #[test]
    fn unknown_kind_identifiers_are_rejected_by_name() {
        assert_eq!(resolve_kind("nudger").expect("known kind"), AgentKind::Nudger);

        let error = resolve_kind("mystery_agent").expect_err("unknown kind");
        assert_eq!(error, EngineError::UnknownAgentKind("mystery_agent".to_string()));
    }
}
