//! In-memory repository implementations backing engine tests and local
//! experiments. Semantics mirror the SQL implementations, including the
//! payload-keyed dedup counting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use tiller_core::domain::action::{ActionStatus, AgentAction, AgentActionId};
use tiller_core::domain::agent::{AgentConfiguration, AgentConfigurationId};
use tiller_core::domain::directory::{OrgId, User, UserId};
use tiller_core::domain::project::{Project, ProjectId, RiskSignal};
use tiller_core::domain::work::{PullRequest, Task, TaskId, TaskStatus};

use super::{
    ActionRepository, ConfigurationRepository, ProjectRepository, PullRequestRepository,
    RepositoryError, TaskRepository, UserRepository,
};

#[derive(Default)]
pub struct InMemoryConfigurationRepository {
    configurations: RwLock<HashMap<String, AgentConfiguration>>,
}

impl InMemoryConfigurationRepository {
    pub async fn insert(&self, configuration: AgentConfiguration) {
        let mut configurations = self.configurations.write().await;
        configurations.insert(configuration.id.0.clone(), configuration);
    }
}

#[async_trait::async_trait]
impl ConfigurationRepository for InMemoryConfigurationRepository {
    async fn find_by_id(
        &self,
        id: &AgentConfigurationId,
    ) -> Result<Option<AgentConfiguration>, RepositoryError> {
        let configurations = self.configurations.read().await;
        Ok(configurations.get(&id.0).cloned())
    }

    async fn list_enabled(
        &self,
        org_id: &OrgId,
    ) -> Result<Vec<AgentConfiguration>, RepositoryError> {
        let configurations = self.configurations.read().await;
        let mut enabled: Vec<AgentConfiguration> = configurations
            .values()
            .filter(|config| config.org_id == *org_id && config.enabled)
            .cloned()
            .collect();
        enabled.sort_by(|a, b| a.kind.as_str().cmp(b.kind.as_str()));
        Ok(enabled)
    }

    async fn save(&self, configuration: AgentConfiguration) -> Result<(), RepositoryError> {
        let mut configurations = self.configurations.write().await;
        configurations.insert(configuration.id.0.clone(), configuration);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryActionRepository {
    actions: RwLock<HashMap<String, AgentAction>>,
}

fn entity_of(action: &AgentAction) -> Option<String> {
    action.suggestion_entity_id().map(|entity| entity.to_string())
}

impl InMemoryActionRepository {
    pub async fn insert(&self, action: AgentAction) {
        let mut actions = self.actions.write().await;
        actions.insert(action.id.0.clone(), action);
    }

    pub async fn all(&self) -> Vec<AgentAction> {
        let actions = self.actions.read().await;
        let mut all: Vec<AgentAction> = actions.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        all
    }
}

#[async_trait::async_trait]
impl ActionRepository for InMemoryActionRepository {
    async fn find_by_id(&self, id: &AgentActionId) -> Result<Option<AgentAction>, RepositoryError> {
        let actions = self.actions.read().await;
        Ok(actions.get(&id.0).cloned())
    }

    async fn save(&self, action: AgentAction) -> Result<(), RepositoryError> {
        let mut actions = self.actions.write().await;
        actions.insert(action.id.0.clone(), action);
        Ok(())
    }

    async fn count_created_since(
        &self,
        configuration_id: &AgentConfigurationId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let actions = self.actions.read().await;
        Ok(actions
            .values()
            .filter(|action| {
                action.configuration_id == *configuration_id && action.created_at >= since
            })
            .count() as u32)
    }

    async fn count_executed_for_entity(
        &self,
        configuration_id: &AgentConfigurationId,
        entity_id: &str,
    ) -> Result<u32, RepositoryError> {
        let actions = self.actions.read().await;
        Ok(actions
            .values()
            .filter(|action| {
                action.configuration_id == *configuration_id
                    && action.status == ActionStatus::Executed
                    && entity_of(action).as_deref() == Some(entity_id)
            })
            .count() as u32)
    }

    async fn last_executed_for_entity(
        &self,
        configuration_id: &AgentConfigurationId,
        entity_id: &str,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let actions = self.actions.read().await;
        Ok(actions
            .values()
            .filter(|action| {
                action.configuration_id == *configuration_id
                    && action.status == ActionStatus::Executed
                    && entity_of(action).as_deref() == Some(entity_id)
            })
            .filter_map(|action| action.executed_at)
            .max())
    }

    async fn list_approved(&self, org_id: &OrgId) -> Result<Vec<AgentAction>, RepositoryError> {
        let actions = self.actions.read().await;
        let mut approved: Vec<AgentAction> = actions
            .values()
            .filter(|action| action.org_id == *org_id && action.status == ActionStatus::Approved)
            .cloned()
            .collect();
        approved.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(approved)
    }
}

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    pub async fn insert(&self, task: Task) {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.0.clone(), task);
    }

    async fn sorted_filter(&self, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut selected: Vec<Task> = tasks.values().filter(|task| keep(task)).cloned().collect();
        selected
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        selected
    }
}

#[async_trait::async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(&id.0).cloned())
    }

    async fn list_active(&self, org_id: &OrgId) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.sorted_filter(|task| task.org_id == *org_id && task.is_active()).await)
    }

    async fn list_stale_in_progress(&self, org_id: &OrgId) -> Result<Vec<Task>, RepositoryError> {
        Ok(self
            .sorted_filter(|task| {
                task.org_id == *org_id && task.status == TaskStatus::InProgress && task.stale
            })
            .await)
    }

    async fn list_open_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<Task>, RepositoryError> {
        Ok(self
            .sorted_filter(|task| {
                task.project_id.as_ref() == Some(project_id) && task.status != TaskStatus::Done
            })
            .await)
    }

    async fn update_assignee(
        &self,
        id: &TaskId,
        assignee: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id.0) {
            task.assignee = Some(assignee.clone());
            task.updated_at = now;
        }
        Ok(())
    }

    async fn move_to_backlog(
        &self,
        id: &TaskId,
        tag: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(&id.0) {
            task.status = TaskStatus::Backlog;
            task.tags.push(tag.to_string());
            task.updated_at = now;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPullRequestRepository {
    pull_requests: RwLock<HashMap<String, PullRequest>>,
}

impl InMemoryPullRequestRepository {
    pub async fn insert(&self, pull_request: PullRequest) {
        let mut pull_requests = self.pull_requests.write().await;
        pull_requests.insert(pull_request.id.0.clone(), pull_request);
    }
}

#[async_trait::async_trait]
impl PullRequestRepository for InMemoryPullRequestRepository {
    async fn list_stuck_open(&self, org_id: &OrgId) -> Result<Vec<PullRequest>, RepositoryError> {
        let pull_requests = self.pull_requests.read().await;
        let mut stuck: Vec<PullRequest> = pull_requests
            .values()
            .filter(|pr| pr.org_id == *org_id && pr.open && pr.stuck)
            .cloned()
            .collect();
        stuck.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(stuck)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub async fn insert(&self, user: User) {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
    }
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn list_for_org(&self, org_id: &OrgId) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut for_org: Vec<User> =
            users.values().filter(|user| user.org_id == *org_id).cloned().collect();
        for_org.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(for_org)
    }
}

#[derive(Default)]
pub struct InMemoryProjectRepository {
    projects: RwLock<HashMap<String, Project>>,
    risks: RwLock<HashMap<String, RiskSignal>>,
}

impl InMemoryProjectRepository {
    pub async fn insert_project(&self, project: Project) {
        let mut projects = self.projects.write().await;
        projects.insert(project.id.0.clone(), project);
    }

    pub async fn insert_risk(&self, risk: RiskSignal) {
        let mut risks = self.risks.write().await;
        risks.insert(risk.id.0.clone(), risk);
    }
}

#[async_trait::async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn find_by_id(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        let projects = self.projects.read().await;
        Ok(projects.get(&id.0).cloned())
    }

    async fn list_active(&self, org_id: &OrgId) -> Result<Vec<Project>, RepositoryError> {
        let projects = self.projects.read().await;
        let mut active: Vec<Project> = projects
            .values()
            .filter(|project| {
                project.org_id == *org_id
                    && project.status == tiller_core::domain::project::ProjectStatus::Active
            })
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(active)
    }

    async fn list_active_risks(&self, org_id: &OrgId) -> Result<Vec<RiskSignal>, RepositoryError> {
        let risks = self.risks.read().await;
        let mut active: Vec<RiskSignal> =
            risks.values().filter(|risk| risk.org_id == *org_id && risk.active).cloned().collect();
        active.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(active)
    }
}
