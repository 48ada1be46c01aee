//! Deterministic demo fixtures for one organization, used by `tiller seed`
//! and local experiments. Every id is stable so repeated seeding upserts
//! instead of multiplying rows.

use chrono::{Duration, Utc};
use serde_json::json;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

pub const SEED_ORG_ID: &str = "org-demo";

struct UserSeed {
    id: &'static str,
    display_name: &'static str,
    teams: &'static [&'static str],
}

const USER_SEEDS: &[UserSeed] = &[
    UserSeed { id: "user-amara", display_name: "Amara Okafor", teams: &["platform", "payments"] },
    UserSeed { id: "user-jonas", display_name: "Jonas Weber", teams: &["platform"] },
    UserSeed { id: "user-priya", display_name: "Priya Nair", teams: &["payments"] },
    UserSeed { id: "user-tomas", display_name: "Tomas Silva", teams: &["mobile"] },
];

struct TaskSeed {
    id: &'static str,
    project_id: Option<&'static str>,
    title: &'static str,
    status: &'static str,
    priority: &'static str,
    assignee: Option<&'static str>,
    stale: bool,
    age_days: i64,
}

const TASK_SEEDS: &[TaskSeed] = &[
    TaskSeed {
        id: "task-checkout-retry",
        project_id: Some("proj-payments-v2"),
        title: "Add retry to checkout webhook",
        status: "todo",
        priority: "medium",
        assignee: Some("user-amara"),
        stale: false,
        age_days: 12,
    },
    TaskSeed {
        id: "task-ledger-export",
        project_id: Some("proj-payments-v2"),
        title: "Ledger CSV export",
        status: "todo",
        priority: "low",
        assignee: Some("user-amara"),
        stale: false,
        age_days: 9,
    },
    TaskSeed {
        id: "task-refund-flow",
        project_id: Some("proj-payments-v2"),
        title: "Refund flow edge cases",
        status: "in_progress",
        priority: "high",
        assignee: Some("user-amara"),
        stale: true,
        age_days: 20,
    },
    TaskSeed {
        id: "task-sandbox-keys",
        project_id: Some("proj-payments-v2"),
        title: "Rotate sandbox keys",
        status: "todo",
        priority: "low",
        assignee: Some("user-priya"),
        stale: false,
        age_days: 4,
    },
    TaskSeed {
        id: "task-ios-deeplinks",
        project_id: None,
        title: "iOS deep link audit",
        status: "in_progress",
        priority: "medium",
        assignee: Some("user-tomas"),
        stale: false,
        age_days: 6,
    },
    TaskSeed {
        id: "task-fraud-rules",
        project_id: Some("proj-payments-v2"),
        title: "Fraud rule tuning",
        status: "todo",
        priority: "urgent",
        assignee: Some("user-amara"),
        stale: false,
        age_days: 2,
    },
];

pub struct SeedResult {
    pub users: u32,
    pub projects: u32,
    pub risks: u32,
    pub tasks: u32,
    pub pull_requests: u32,
    pub configurations: u32,
}

impl SeedResult {
    pub fn total(&self) -> u32 {
        self.users + self.projects + self.risks + self.tasks + self.pull_requests
            + self.configurations
    }
}

pub async fn seed_demo_org(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    for seed in USER_SEEDS {
        sqlx::query(
            "INSERT INTO users (id, org_id, display_name, team_ids) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name,
                                           team_ids = excluded.team_ids",
        )
        .bind(seed.id)
        .bind(SEED_ORG_ID)
        .bind(seed.display_name)
        .bind(serde_json::to_string(seed.teams).map_err(|e| RepositoryError::Decode(e.to_string()))?)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "INSERT INTO projects (id, org_id, name, status, target_date, description, goals,
                               milestones, tech_stack)
         VALUES ('proj-payments-v2', ?, 'Payments v2', 'active', ?,
                 'Second generation payments stack',
                 '[\"cut checkout latency\",\"single ledger\"]',
                 '[\"beta in september\"]',
                 '[\"rust\",\"postgres\",\"react\"]')
         ON CONFLICT(id) DO UPDATE SET target_date = excluded.target_date",
    )
    .bind(SEED_ORG_ID)
    .bind((now + Duration::days(30)).to_rfc3339())
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO risk_signals (id, org_id, project_id, kind, severity, active, detected_at)
         VALUES ('risk-payments-deadline', ?, 'proj-payments-v2', 'deadline_risk', 'high', 1, ?)
         ON CONFLICT(id) DO UPDATE SET active = excluded.active",
    )
    .bind(SEED_ORG_ID)
    .bind(now.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    for seed in TASK_SEEDS {
        sqlx::query(
            "INSERT INTO tasks (id, org_id, project_id, title, status, priority, assignee,
                                stale, blocks, tags, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, '[]', '[]', ?, ?)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status,
                                           assignee = excluded.assignee,
                                           stale = excluded.stale",
        )
        .bind(seed.id)
        .bind(SEED_ORG_ID)
        .bind(seed.project_id)
        .bind(seed.title)
        .bind(seed.status)
        .bind(seed.priority)
        .bind(seed.assignee)
        .bind(seed.stale)
        .bind((now - Duration::days(seed.age_days)).to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        "INSERT INTO pull_requests (id, org_id, title, author, open, stuck, created_at)
         VALUES ('pr-ledger-schema', ?, 'Ledger schema migration', 'user-jonas', 1, 1, ?)
         ON CONFLICT(id) DO UPDATE SET open = excluded.open, stuck = excluded.stuck",
    )
    .bind(SEED_ORG_ID)
    .bind((now - Duration::days(8)).to_rfc3339())
    .execute(&mut *tx)
    .await?;

    let configurations = [
        ("cfg-demo-reassigner", "reassigner", json!({ "overload_threshold": 3 }), true),
        (
            "cfg-demo-nudger",
            "nudger",
            json!({ "max_reminders": 3, "reminder_interval_hours": 24 }),
            true,
        ),
        ("cfg-demo-scope", "scope_adjuster", json!({ "deferral_priority_ceiling": "medium" }), false),
    ];

    for (id, kind, thresholds, auto_approve) in configurations {
        sqlx::query(
            "INSERT INTO agent_configurations (id, org_id, kind, enabled, thresholds,
                                               quiet_start_hour, quiet_end_hour, auto_approve,
                                               created_at, updated_at)
             VALUES (?, ?, ?, 1, ?, 22, 6, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET thresholds = excluded.thresholds,
                                           auto_approve = excluded.auto_approve,
                                           updated_at = excluded.updated_at",
        )
        .bind(id)
        .bind(SEED_ORG_ID)
        .bind(kind)
        .bind(thresholds.to_string())
        .bind(auto_approve)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(SeedResult {
        users: USER_SEEDS.len() as u32,
        projects: 1,
        risks: 1,
        tasks: TASK_SEEDS.len() as u32,
        pull_requests: 1,
        configurations: 3,
    })
}
