use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::run_pending;
    use crate::connect_with_settings;

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "users",
        "projects",
        "risk_signals",
        "tasks",
        "pull_requests",
        "agent_configurations",
        "agent_actions",
        "idx_users_org_id",
        "idx_projects_org_status",
        "idx_risk_signals_org_active",
        "idx_risk_signals_project_id",
        "idx_tasks_org_status",
        "idx_tasks_project_id",
        "idx_tasks_assignee",
        "idx_pull_requests_org_open",
        "idx_agent_configurations_org_enabled",
        "idx_agent_actions_configuration_created",
        "idx_agent_actions_org_status",
    ];

    #[tokio::test]
    async fn migrations_create_all_managed_schema_objects() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for object in MANAGED_SCHEMA_OBJECTS {
            let count = sqlx::query(
                "SELECT COUNT(*) AS count FROM sqlite_master
                 WHERE type IN ('table', 'index') AND name = ?",
            )
            .bind(object)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|_| panic!("check schema object {object}"))
            .get::<i64, _>("count");

            assert_eq!(count, 1, "expected schema object `{object}` to exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("first run");
        run_pending(&pool).await.expect("second run");
    }
}
