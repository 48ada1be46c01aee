//! Contract between the demo fixtures and the queries the engine runs on
//! every tick. If seeding drifts away from what the agents expect to find,
//! this catches it before the CLI demo does.

use chrono::{Duration, Utc};
use serde_json::json;

use tiller_core::domain::action::{ActionStatus, AgentAction, AgentActionId};
use tiller_core::domain::agent::{AgentConfigurationId, AgentKind};
use tiller_core::domain::directory::{OrgId, UserId};
use tiller_db::fixtures::SEED_ORG_ID;
use tiller_db::repositories::{
    ActionRepository, ConfigurationRepository, ProjectRepository, PullRequestRepository,
    SqlActionRepository, SqlConfigurationRepository, SqlProjectRepository,
    SqlPullRequestRepository, SqlTaskRepository, SqlUserRepository, TaskRepository,
    UserRepository,
};
use tiller_db::{connect_with_settings, migrations, seed_demo_org};

async fn seeded_pool() -> sqlx::SqlitePool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    seed_demo_org(&pool).await.expect("seed");
    pool
}

fn org() -> OrgId {
    OrgId(SEED_ORG_ID.to_string())
}

#[tokio::test]
async fn every_agent_kind_has_an_enabled_configuration() {
    let pool = seeded_pool().await;
    let configs =
        SqlConfigurationRepository::new(pool).list_enabled(&org()).await.expect("list");

    let kinds: Vec<AgentKind> = configs.iter().map(|config| config.kind).collect();
    assert!(kinds.contains(&AgentKind::Reassigner));
    assert!(kinds.contains(&AgentKind::Nudger));
    assert!(kinds.contains(&AgentKind::ScopeAdjuster));

    let scope = configs
        .iter()
        .find(|config| config.kind == AgentKind::ScopeAdjuster)
        .expect("scope config");
    assert!(!scope.auto_approve, "deferral stays human-approved in the demo");
}

#[tokio::test]
async fn reassigner_inputs_contain_an_overloaded_assignee() {
    let pool = seeded_pool().await;

    let users = SqlUserRepository::new(pool.clone()).list_for_org(&org()).await.expect("users");
    assert!(users.iter().any(|user| user.team_ids.contains(&"payments".to_string())));

    let tasks = SqlTaskRepository::new(pool).list_active(&org()).await.expect("tasks");
    let amara_load = tasks
        .iter()
        .filter(|task| task.assignee == Some(UserId("user-amara".to_string())))
        .count();
    assert!(amara_load > 3, "demo threshold is 3; amara must exceed it");
}

#[tokio::test]
async fn nudger_inputs_contain_stuck_and_stale_work() {
    let pool = seeded_pool().await;

    let stuck = SqlPullRequestRepository::new(pool.clone())
        .list_stuck_open(&org())
        .await
        .expect("stuck prs");
    assert_eq!(stuck.len(), 1);

    let stale =
        SqlTaskRepository::new(pool).list_stale_in_progress(&org()).await.expect("stale tasks");
    assert_eq!(stale.len(), 1);
    assert!(stale[0].assignee.is_some(), "stale task needs an owner to nudge");
}

#[tokio::test]
async fn scope_inputs_contain_a_threatened_project_with_deferrable_work() {
    let pool = seeded_pool().await;
    let repo = SqlProjectRepository::new(pool.clone());

    let projects = repo.list_active(&org()).await.expect("projects");
    let project = projects.iter().find(|project| project.target_date.is_some()).expect("target");

    let risks = repo.list_active_risks(&org()).await.expect("risks");
    assert!(risks
        .iter()
        .any(|risk| risk.project_id == project.id && risk.threatens_deadline()));

    let open = SqlTaskRepository::new(pool)
        .list_open_for_project(&project.id)
        .await
        .expect("open tasks");
    assert!(open
        .iter()
        .any(|task| task.priority <= tiller_core::TaskPriority::Medium && !task.is_blocking()));
}

#[tokio::test]
async fn dedup_queries_work_against_seeded_configurations() {
    let pool = seeded_pool().await;
    let actions = SqlActionRepository::new(pool);
    let config_id = AgentConfigurationId("cfg-demo-nudger".to_string());
    let executed_at = Utc::now() - Duration::hours(2);

    actions
        .save(AgentAction {
            id: AgentActionId("act-seeded-nudge".to_string()),
            configuration_id: config_id.clone(),
            org_id: org(),
            action_kind: "send_nudge".to_string(),
            reasoning: "prior reminder".to_string(),
            suggestion_json: json!({ "schema_version": 1, "entity_id": "pr-ledger-schema" }),
            target_user: Some(UserId("user-jonas".to_string())),
            risk_id: None,
            status: ActionStatus::Executed,
            result_json: None,
            created_at: executed_at,
            approved_at: Some(executed_at),
            executed_at: Some(executed_at),
        })
        .await
        .expect("save");

    let count = actions
        .count_executed_for_entity(&config_id, "pr-ledger-schema")
        .await
        .expect("count");
    assert_eq!(count, 1);

    let last = actions
        .last_executed_for_entity(&config_id, "pr-ledger-schema")
        .await
        .expect("last")
        .expect("present");
    assert!((Utc::now() - last).num_hours() >= 1);
}
