pub mod advisory;
pub mod config;
pub mod domain;
pub mod errors;
pub mod safety;

pub use advisory::{
    Advisor, AdvisoryRequest, AdvisoryVerdict, DEFERRAL_CONFIDENCE_FLOOR, NUDGE_CONFIDENCE_FLOOR,
};
pub use domain::action::{
    ActionStatus, AgentAction, AgentActionId, DeferralSuggestion, ExecutionOutcome, Intervention,
    NudgeEntityKind, NudgeSuggestion, Priority, ReassignmentSuggestion,
};
pub use domain::agent::{
    AgentConfiguration, AgentConfigurationId, AgentKind, NudgerThresholds, ReassignerThresholds,
    ScopeThresholds,
};
pub use domain::directory::{OrgId, User, UserId};
pub use domain::project::{Project, ProjectId, ProjectStatus, RiskSeverity, RiskSignal, RiskSignalId};
pub use domain::work::{PullRequest, PullRequestId, Task, TaskId, TaskPriority, TaskStatus};
pub use errors::{DomainError, EngineError};
pub use safety::{GateDecision, QuietHours, SafetyGate, RATE_LIMIT_CEILING};
