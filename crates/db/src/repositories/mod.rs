use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tiller_core::domain::action::{AgentAction, AgentActionId};
use tiller_core::domain::agent::{AgentConfiguration, AgentConfigurationId};
use tiller_core::domain::directory::{OrgId, User, UserId};
use tiller_core::domain::project::{Project, ProjectId, RiskSignal};
use tiller_core::domain::work::{PullRequest, Task, TaskId};

pub mod action;
pub mod configuration;
pub mod directory;
pub mod memory;
pub mod project;
pub mod work;

pub use action::SqlActionRepository;
pub use configuration::SqlConfigurationRepository;
pub use directory::SqlUserRepository;
pub use memory::{
    InMemoryActionRepository, InMemoryConfigurationRepository, InMemoryProjectRepository,
    InMemoryPullRequestRepository, InMemoryTaskRepository, InMemoryUserRepository,
};
pub use project::SqlProjectRepository;
pub use work::{SqlPullRequestRepository, SqlTaskRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &AgentConfigurationId,
    ) -> Result<Option<AgentConfiguration>, RepositoryError>;

    async fn list_enabled(&self, org_id: &OrgId)
        -> Result<Vec<AgentConfiguration>, RepositoryError>;

    async fn save(&self, configuration: AgentConfiguration) -> Result<(), RepositoryError>;
}

/// Persistence for the engine's audit trail. Besides plain CRUD this carries
/// the counting queries the safety gate and the dedup invariant depend on.
#[async_trait]
pub trait ActionRepository: Send + Sync {
    async fn find_by_id(&self, id: &AgentActionId) -> Result<Option<AgentAction>, RepositoryError>;

    async fn save(&self, action: AgentAction) -> Result<(), RepositoryError>;

    /// Actions created for a configuration at or after `since`, regardless of
    /// status. Feeds the rate limit.
    async fn count_created_since(
        &self,
        configuration_id: &AgentConfigurationId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError>;

    /// Executed actions whose suggestion payload references `entity_id`.
    /// Feeds the reminder-count dedup invariant.
    async fn count_executed_for_entity(
        &self,
        configuration_id: &AgentConfigurationId,
        entity_id: &str,
    ) -> Result<u32, RepositoryError>;

    /// Execution timestamp of the most recent executed action for
    /// `entity_id`. Feeds the cooldown check.
    async fn last_executed_for_entity(
        &self,
        configuration_id: &AgentConfigurationId,
        entity_id: &str,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError>;

    /// Actions awaiting deferred execution (approved out of band), oldest
    /// first.
    async fn list_approved(&self, org_id: &OrgId) -> Result<Vec<AgentAction>, RepositoryError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError>;

    /// Tasks in Todo or InProgress for the organization.
    async fn list_active(&self, org_id: &OrgId) -> Result<Vec<Task>, RepositoryError>;

    /// InProgress tasks flagged stale by the upstream activity tracker.
    async fn list_stale_in_progress(&self, org_id: &OrgId) -> Result<Vec<Task>, RepositoryError>;

    /// Tasks not yet Done for the project.
    async fn list_open_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<Task>, RepositoryError>;

    async fn update_assignee(
        &self,
        id: &TaskId,
        assignee: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Move a task to the backlog and append a tag, in one row update.
    async fn move_to_backlog(
        &self,
        id: &TaskId,
        tag: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PullRequestRepository: Send + Sync {
    /// Open pull requests flagged stuck by the upstream activity tracker.
    async fn list_stuck_open(&self, org_id: &OrgId) -> Result<Vec<PullRequest>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn list_for_org(&self, org_id: &OrgId) -> Result<Vec<User>, RepositoryError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError>;

    async fn list_active(&self, org_id: &OrgId) -> Result<Vec<Project>, RepositoryError>;

    async fn list_active_risks(&self, org_id: &OrgId) -> Result<Vec<RiskSignal>, RepositoryError>;
}
