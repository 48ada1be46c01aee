//! End-to-end executor passes over in-memory repositories.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde_json::json;

use tiller_agents::advisory::ScriptedAdvisor;
use tiller_agents::executor::{AgentExecutor, ConfigCycle};
use tiller_agents::registry::EngineServices;
use tiller_core::domain::action::{ActionStatus, AgentAction, AgentActionId};
use tiller_core::domain::agent::{AgentConfiguration, AgentConfigurationId, AgentKind};
use tiller_core::domain::directory::{OrgId, User, UserId};
use tiller_core::domain::project::{
    Project, ProjectId, ProjectStatus, RiskSeverity, RiskSignal, RiskSignalId, DEADLINE_RISK_KIND,
};
use tiller_core::domain::work::{
    PullRequest, PullRequestId, Task, TaskId, TaskPriority, TaskStatus,
};
use tiller_core::safety::QuietHours;
use tiller_db::repositories::{
    ActionRepository, InMemoryActionRepository, InMemoryConfigurationRepository,
    InMemoryProjectRepository, InMemoryPullRequestRepository, InMemoryTaskRepository,
    InMemoryUserRepository, RepositoryError, TaskRepository,
};
use tiller_notify::{Notifier, RecordingChannel};

struct Harness {
    services: EngineServices,
    configurations: Arc<InMemoryConfigurationRepository>,
    actions: Arc<InMemoryActionRepository>,
    tasks: Arc<InMemoryTaskRepository>,
    pull_requests: Arc<InMemoryPullRequestRepository>,
    users: Arc<InMemoryUserRepository>,
    projects: Arc<InMemoryProjectRepository>,
    channel: Arc<RecordingChannel>,
}

fn harness(advisor: ScriptedAdvisor) -> Harness {
    let configurations = Arc::new(InMemoryConfigurationRepository::default());
    let actions = Arc::new(InMemoryActionRepository::default());
    let tasks = Arc::new(InMemoryTaskRepository::default());
    let pull_requests = Arc::new(InMemoryPullRequestRepository::default());
    let users = Arc::new(InMemoryUserRepository::default());
    let projects = Arc::new(InMemoryProjectRepository::default());
    let channel = Arc::new(RecordingChannel::new("in_app"));

    let services = EngineServices {
        configurations: configurations.clone(),
        actions: actions.clone(),
        tasks: tasks.clone(),
        pull_requests: pull_requests.clone(),
        users: users.clone(),
        projects: projects.clone(),
        advisor: Arc::new(advisor),
        notifier: Notifier::new(vec![channel.clone()]),
    };

    Harness { services, configurations, actions, tasks, pull_requests, users, projects, channel }
}

fn org() -> OrgId {
    OrgId("org-1".to_string())
}

fn configuration(
    id: &str,
    kind: AgentKind,
    thresholds: serde_json::Value,
    auto_approve: bool,
    quiet_hours: Option<QuietHours>,
) -> AgentConfiguration {
    let now = Utc::now();
    AgentConfiguration {
        id: AgentConfigurationId(id.to_string()),
        org_id: org(),
        kind,
        enabled: true,
        thresholds,
        quiet_hours,
        auto_approve,
        created_at: now,
        updated_at: now,
    }
}

fn user(id: &str, teams: &[&str]) -> User {
    User {
        id: UserId(id.to_string()),
        org_id: org(),
        display_name: id.to_string(),
        team_ids: teams.iter().map(|team| team.to_string()).collect(),
    }
}

fn task(
    id: &str,
    project_id: Option<&str>,
    status: TaskStatus,
    priority: TaskPriority,
    assignee: Option<&str>,
    stale: bool,
    age_days: i64,
) -> Task {
    let now = Utc::now();
    Task {
        id: TaskId(id.to_string()),
        org_id: org(),
        project_id: project_id.map(|project| ProjectId(project.to_string())),
        title: format!("Task {id}"),
        status,
        priority,
        assignee: assignee.map(|user| UserId(user.to_string())),
        stale,
        blocks: Vec::new(),
        tags: Vec::new(),
        created_at: now - Duration::days(age_days),
        updated_at: now,
    }
}

fn stuck_pr(id: &str, author: &str) -> PullRequest {
    PullRequest {
        id: PullRequestId(id.to_string()),
        org_id: org(),
        title: format!("Change {id}"),
        author: UserId(author.to_string()),
        open: true,
        stuck: true,
        created_at: Utc::now() - Duration::days(6),
    }
}

fn project_with_risk() -> (Project, RiskSignal) {
    let project = Project {
        id: ProjectId("P-1".to_string()),
        org_id: org(),
        name: "Payments v2".to_string(),
        status: ProjectStatus::Active,
        target_date: Some(Utc::now() + Duration::days(21)),
        description: Some("Second generation payments stack".to_string()),
        goals: vec!["cut checkout latency".to_string()],
        milestones: Vec::new(),
        tech_stack: vec!["rust".to_string()],
    };
    let risk = RiskSignal {
        id: RiskSignalId("R-1".to_string()),
        org_id: org(),
        project_id: project.id.clone(),
        kind: DEADLINE_RISK_KIND.to_string(),
        severity: RiskSeverity::High,
        active: true,
        detected_at: Utc::now(),
    };
    (project, risk)
}

fn daytime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 14, 5, 0).single().expect("valid timestamp")
}

async fn seed_full_org(harness: &Harness) {
    harness.users.insert(user("alice", &["platform"])).await;
    harness.users.insert(user("bob", &["platform"])).await;

    // Alice carries four active tasks against a threshold of three.
    for index in 0..4 {
        harness
            .tasks
            .insert(task(
                &format!("A-{index}"),
                None,
                TaskStatus::Todo,
                TaskPriority::Medium,
                Some("alice"),
                false,
                10 + index,
            ))
            .await;
    }

    harness.pull_requests.insert(stuck_pr("PR-9", "bob")).await;

    let (project, risk) = project_with_risk();
    harness.projects.insert_project(project).await;
    harness.projects.insert_risk(risk).await;
    harness
        .tasks
        .insert(task(
            "T-defer",
            Some("P-1"),
            TaskStatus::Todo,
            TaskPriority::Low,
            None,
            false,
            30,
        ))
        .await;

    harness
        .configurations
        .insert(configuration(
            "cfg-reassigner",
            AgentKind::Reassigner,
            json!({ "overload_threshold": 3 }),
            true,
            None,
        ))
        .await;
    harness
        .configurations
        .insert(configuration(
            "cfg-nudger",
            AgentKind::Nudger,
            json!({ "max_reminders": 3, "reminder_interval_hours": 24 }),
            true,
            None,
        ))
        .await;
    harness
        .configurations
        .insert(configuration(
            "cfg-scope",
            AgentKind::ScopeAdjuster,
            json!({ "deferral_priority_ceiling": "medium" }),
            true,
            None,
        ))
        .await;
}

#[tokio::test]
async fn full_pass_creates_executes_and_suggests_per_agent_policy() {
    let harness = harness(ScriptedAdvisor::confident(0.9));
    seed_full_org(&harness).await;

    let executor = AgentExecutor::new(harness.services.clone());
    let report = executor.run_for_org(&org(), daytime()).await.expect("run");

    assert_eq!(report.cycles.len(), 3);
    assert_eq!(report.failed_configurations(), 0);
    assert_eq!(report.actions_created(), 3);

    let actions = harness.actions.all().await;
    let by_kind = |kind: &str| -> Vec<&AgentAction> {
        actions.iter().filter(|action| action.action_kind == kind).collect()
    };

    // Auto-approved agents executed synchronously.
    let reassignments = by_kind("reassign_task");
    assert_eq!(reassignments.len(), 1);
    assert_eq!(reassignments[0].status, ActionStatus::Executed);

    let nudges = by_kind("send_nudge");
    assert_eq!(nudges.len(), 1);
    assert_eq!(nudges[0].status, ActionStatus::Executed);

    // The scope adjuster is suggestion-only even under auto-approve.
    let deferrals = by_kind("defer_scope");
    assert_eq!(deferrals.len(), 1);
    assert_eq!(deferrals[0].status, ActionStatus::Pending);
    assert!(deferrals[0].approved_at.is_none());

    // Real side effects happened for the executed pair only.
    let moved = harness
        .tasks
        .find_by_id(&TaskId("A-3".to_string()))
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(moved.assignee, Some(UserId("bob".to_string())), "oldest eligible task moved");

    let deferred_task = harness
        .tasks
        .find_by_id(&TaskId("T-defer".to_string()))
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(deferred_task.status, TaskStatus::Todo, "deferral waits for human approval");

    // One reassignment notification + one nudge.
    assert_eq!(harness.channel.delivered().await.len(), 2);
}

#[tokio::test]
async fn org_wide_quiet_hours_suppress_every_configuration() {
    let harness = harness(ScriptedAdvisor::confident(0.9));
    seed_full_org(&harness).await;

    // Rewrite all three configurations with a window covering 14:05.
    for (id, kind, thresholds) in [
        ("cfg-reassigner", AgentKind::Reassigner, json!({ "overload_threshold": 3 })),
        ("cfg-nudger", AgentKind::Nudger, json!({})),
        ("cfg-scope", AgentKind::ScopeAdjuster, json!({})),
    ] {
        harness
            .configurations
            .insert(configuration(
                id,
                kind,
                thresholds,
                true,
                Some(QuietHours { start_hour: 9, end_hour: 17 }),
            ))
            .await;
    }

    let executor = AgentExecutor::new(harness.services.clone());
    let now = daytime();
    assert!((9..17).contains(&(now.hour() as u8)));

    let report = executor.run_for_org(&org(), now).await.expect("run");

    assert_eq!(report.actions_created(), 0);
    assert!(harness.actions.all().await.is_empty());
    assert!(harness.channel.delivered().await.is_empty());
}

/// Delegates to the in-memory repository but fails the rate-limit count for
/// one poisoned configuration, simulating a per-configuration infrastructure
/// fault.
struct PoisonedActionRepository {
    inner: Arc<InMemoryActionRepository>,
    poisoned: AgentConfigurationId,
}

#[async_trait]
impl ActionRepository for PoisonedActionRepository {
    async fn find_by_id(&self, id: &AgentActionId) -> Result<Option<AgentAction>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn save(&self, action: AgentAction) -> Result<(), RepositoryError> {
        self.inner.save(action).await
    }

    async fn count_created_since(
        &self,
        configuration_id: &AgentConfigurationId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        if *configuration_id == self.poisoned {
            return Err(RepositoryError::Decode("simulated storage fault".to_string()));
        }
        self.inner.count_created_since(configuration_id, since).await
    }

    async fn count_executed_for_entity(
        &self,
        configuration_id: &AgentConfigurationId,
        entity_id: &str,
    ) -> Result<u32, RepositoryError> {
        self.inner.count_executed_for_entity(configuration_id, entity_id).await
    }

    async fn last_executed_for_entity(
        &self,
        configuration_id: &AgentConfigurationId,
        entity_id: &str,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        self.inner.last_executed_for_entity(configuration_id, entity_id).await
    }

    async fn list_approved(&self, org_id: &OrgId) -> Result<Vec<AgentAction>, RepositoryError> {
        self.inner.list_approved(org_id).await
    }
}

#[tokio::test]
async fn one_failing_configuration_never_halts_the_batch() {
    let mut harness = harness(ScriptedAdvisor::confident(0.9));
    seed_full_org(&harness).await;

    harness.services.actions = Arc::new(PoisonedActionRepository {
        inner: harness.actions.clone(),
        poisoned: AgentConfigurationId("cfg-nudger".to_string()),
    });

    let executor = AgentExecutor::new(harness.services.clone());
    let report = executor.run_for_org(&org(), daytime()).await.expect("run");

    assert_eq!(report.failed_configurations(), 1);
    let failed_ids: Vec<&str> = report
        .cycles
        .iter()
        .filter_map(|cycle| match cycle {
            ConfigCycle::Failed { configuration_id, .. } => Some(configuration_id.0.as_str()),
            ConfigCycle::Completed { .. } => None,
        })
        .collect();
    assert_eq!(failed_ids, vec!["cfg-nudger"]);

    // The other two configurations still ran to completion.
    assert_eq!(report.actions_created(), 2);
    let actions = harness.actions.all().await;
    assert!(actions.iter().any(|action| action.action_kind == "reassign_task"));
    assert!(actions.iter().any(|action| action.action_kind == "defer_scope"));
}

#[tokio::test]
async fn approved_actions_are_drained_exactly_once() {
    let harness = harness(ScriptedAdvisor::confident(0.9));

    harness
        .configurations
        .insert(configuration(
            "cfg-nudger",
            AgentKind::Nudger,
            json!({ "max_reminders": 3, "reminder_interval_hours": 24 }),
            false,
            None,
        ))
        .await;

    // A nudge proposed in an earlier cycle and approved by a human.
    let created = Utc::now() - Duration::hours(3);
    harness
        .actions
        .insert(AgentAction {
            id: AgentActionId("act-approved".to_string()),
            configuration_id: AgentConfigurationId("cfg-nudger".to_string()),
            org_id: org(),
            action_kind: "send_nudge".to_string(),
            reasoning: "PR idle for 6 days".to_string(),
            suggestion_json: json!({
                "schema_version": 1,
                "entity_id": "PR-9",
                "entity_kind": "pull_request",
                "title": "Change PR-9",
                "owner": "bob",
                "reminder_count": 0,
            }),
            target_user: Some(UserId("bob".to_string())),
            risk_id: None,
            status: ActionStatus::Approved,
            result_json: None,
            created_at: created,
            approved_at: Some(created + Duration::hours(1)),
            executed_at: None,
        })
        .await;

    let executor = AgentExecutor::new(harness.services.clone());
    let report = executor.run_for_org(&org(), daytime()).await.expect("run");

    assert_eq!(report.drained.len(), 1);
    assert!(report.drained[0].executed);

    let drained = harness
        .actions
        .find_by_id(&AgentActionId("act-approved".to_string()))
        .await
        .expect("find")
        .expect("exists");
    assert_eq!(drained.status, ActionStatus::Executed);
    assert!(drained.executed_at.is_some());
    assert_eq!(harness.channel.delivered().await.len(), 1);

    // A second pass finds nothing left to drain.
    let second = executor.run_for_org(&org(), daytime()).await.expect("run again");
    assert!(second.drained.is_empty());
}
