use chrono::{DateTime, Utc};
use sqlx::Row;

use tiller_core::domain::directory::OrgId;
use tiller_core::domain::project::{
    Project, ProjectId, ProjectStatus, RiskSeverity, RiskSignal, RiskSignalId,
};

use super::{ProjectRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProjectRepository {
    pool: DbPool,
}

impl SqlProjectRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn parse_string_list(raw: &str, column: &str) -> Result<Vec<String>, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("invalid `{column}` list: {e}")))
}

fn row_to_project(row: &sqlx::sqlite::SqliteRow) -> Result<Project, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let target_date_str: Option<String> =
        row.try_get("target_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: Option<String> =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let goals_str: String =
        row.try_get("goals").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let milestones_str: String =
        row.try_get("milestones").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tech_stack_str: String =
        row.try_get("tech_stack").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = ProjectStatus::parse(&status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown project status `{status_str}`"))
    })?;
    let target_date = target_date_str.map(|raw| parse_timestamp(&raw)).transpose()?;

    Ok(Project {
        id: ProjectId(id),
        org_id: OrgId(org_id),
        name,
        status,
        target_date,
        description,
        goals: parse_string_list(&goals_str, "goals")?,
        milestones: parse_string_list(&milestones_str, "milestones")?,
        tech_stack: parse_string_list(&tech_stack_str, "tech_stack")?,
    })
}

fn row_to_risk(row: &sqlx::sqlite::SqliteRow) -> Result<RiskSignal, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let project_id: String =
        row.try_get("project_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind: String = row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let severity_str: String =
        row.try_get("severity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool =
        row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let detected_at_str: String =
        row.try_get("detected_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let severity = RiskSeverity::parse(&severity_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown risk severity `{severity_str}`"))
    })?;

    Ok(RiskSignal {
        id: RiskSignalId(id),
        org_id: OrgId(org_id),
        project_id: ProjectId(project_id),
        kind,
        severity,
        active,
        detected_at: parse_timestamp(&detected_at_str)?,
    })
}

#[async_trait::async_trait]
impl ProjectRepository for SqlProjectRepository {
    async fn find_by_id(&self, id: &ProjectId) -> Result<Option<Project>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, name, status, target_date, description, goals, milestones,
                    tech_stack
             FROM projects WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_project(r)?)),
            None => Ok(None),
        }
    }

    async fn list_active(&self, org_id: &OrgId) -> Result<Vec<Project>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, org_id, name, status, target_date, description, goals, milestones,
                    tech_stack
             FROM projects
             WHERE org_id = ? AND status = 'active'
             ORDER BY id ASC",
        )
        .bind(&org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_project).collect::<Result<Vec<_>, _>>()
    }

    async fn list_active_risks(&self, org_id: &OrgId) -> Result<Vec<RiskSignal>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, org_id, project_id, kind, severity, active, detected_at
             FROM risk_signals
             WHERE org_id = ? AND active = 1
             ORDER BY detected_at ASC",
        )
        .bind(&org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_risk).collect::<Result<Vec<_>, _>>()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tiller_core::domain::directory::OrgId;
    use tiller_core::domain::project::{ProjectId, RiskSeverity, DEADLINE_RISK_KIND};

    use super::SqlProjectRepository;
    use crate::repositories::ProjectRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn insert_project(pool: &sqlx::SqlitePool, id: &str, status: &str, target: bool) {
        sqlx::query(
            "INSERT INTO projects (id, org_id, name, status, target_date, description, goals,
                                   milestones, tech_stack)
             VALUES (?, 'org-1', ?, ?, ?, 'Payments revamp', '[\"ship v2\"]', '[]',
                     '[\"rust\",\"react\"]')",
        )
        .bind(id)
        .bind(format!("Project {id}"))
        .bind(status)
        .bind(target.then(|| Utc::now().to_rfc3339()))
        .execute(pool)
        .await
        .expect("insert project");
    }

    async fn insert_risk(pool: &sqlx::SqlitePool, id: &str, project: &str, active: bool) {
        sqlx::query(
            "INSERT INTO risk_signals (id, org_id, project_id, kind, severity, active, detected_at)
             VALUES (?, 'org-1', ?, ?, 'high', ?, ?)",
        )
        .bind(id)
        .bind(project)
        .bind(DEADLINE_RISK_KIND)
        .bind(active)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .expect("insert risk");
    }

    #[tokio::test]
    async fn active_projects_round_trip_with_context_fields() {
        let pool = setup().await;
        insert_project(&pool, "P-1", "active", true).await;
        insert_project(&pool, "P-2", "completed", false).await;

        let repo = SqlProjectRepository::new(pool);
        let projects = repo.list_active(&OrgId("org-1".to_string())).await.expect("list");

        assert_eq!(projects.len(), 1);
        let project = &projects[0];
        assert_eq!(project.id, ProjectId("P-1".to_string()));
        assert!(project.target_date.is_some());
        assert!(project.context_summary().contains("Tech stack: rust, react"));
    }

    #[tokio::test]
    async fn only_active_risks_are_listed() {
        let pool = setup().await;
        insert_project(&pool, "P-1", "active", true).await;
        insert_risk(&pool, "R-1", "P-1", true).await;
        insert_risk(&pool, "R-2", "P-1", false).await;

        let repo = SqlProjectRepository::new(pool);
        let risks = repo.list_active_risks(&OrgId("org-1".to_string())).await.expect("list");

        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0].severity, RiskSeverity::High);
        assert!(risks[0].threatens_deadline());
    }
}
