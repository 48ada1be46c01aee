use chrono::{DateTime, Utc};
use sqlx::Row;

use tiller_core::domain::directory::{OrgId, UserId};
use tiller_core::domain::project::ProjectId;
use tiller_core::domain::work::{
    PullRequest, PullRequestId, Task, TaskId, TaskPriority, TaskStatus,
};

use super::{PullRequestRepository, RepositoryError, TaskRepository};
use crate::DbPool;

pub struct SqlTaskRepository {
    pool: DbPool,
}

impl SqlTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub struct SqlPullRequestRepository {
    pool: DbPool,
}

impl SqlPullRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const TASK_COLUMNS: &str = "id, org_id, project_id, title, status, priority, assignee,
        stale, blocks, tags, created_at, updated_at";

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn parse_string_list(raw: &str, column: &str) -> Result<Vec<String>, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("invalid `{column}` list: {e}")))
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let project_id: Option<String> =
        row.try_get("project_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let priority_str: String =
        row.try_get("priority").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let assignee: Option<String> =
        row.try_get("assignee").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stale: bool = row.try_get("stale").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let blocks_str: String =
        row.try_get("blocks").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tags_str: String =
        row.try_get("tags").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = TaskStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task status `{status_str}`")))?;
    let priority = TaskPriority::parse(&priority_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown task priority `{priority_str}`"))
    })?;

    Ok(Task {
        id: TaskId(id),
        org_id: OrgId(org_id),
        project_id: project_id.map(ProjectId),
        title,
        status,
        priority,
        assignee: assignee.map(UserId),
        stale,
        blocks: parse_string_list(&blocks_str, "blocks")?.into_iter().map(TaskId).collect(),
        tags: parse_string_list(&tags_str, "tags")?,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

#[async_trait::async_trait]
impl TaskRepository for SqlTaskRepository {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_task(r)?)),
            None => Ok(None),
        }
    }

    async fn list_active(&self, org_id: &OrgId) -> Result<Vec<Task>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE org_id = ? AND status IN ('todo', 'in_progress')
             ORDER BY created_at ASC"
        ))
        .bind(&org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect::<Result<Vec<_>, _>>()
    }

    async fn list_stale_in_progress(&self, org_id: &OrgId) -> Result<Vec<Task>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE org_id = ? AND status = 'in_progress' AND stale = 1
             ORDER BY created_at ASC"
        ))
        .bind(&org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect::<Result<Vec<_>, _>>()
    }

    async fn list_open_for_project(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<Task>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE project_id = ? AND status != 'done'
             ORDER BY created_at ASC"
        ))
        .bind(&project_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect::<Result<Vec<_>, _>>()
    }

    async fn update_assignee(
        &self,
        id: &TaskId,
        assignee: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE tasks SET assignee = ?, updated_at = ? WHERE id = ?")
            .bind(&assignee.0)
            .bind(now.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn move_to_backlog(
        &self,
        id: &TaskId,
        tag: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE tasks
             SET status = 'backlog',
                 tags = json_insert(tags, '$[#]', ?),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(tag)
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_pull_request(row: &sqlx::sqlite::SqliteRow) -> Result<PullRequest, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String =
        row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let author: String =
        row.try_get("author").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let open: bool = row.try_get("open").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stuck: bool = row.try_get("stuck").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(PullRequest {
        id: PullRequestId(id),
        org_id: OrgId(org_id),
        title,
        author: UserId(author),
        open,
        stuck,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl PullRequestRepository for SqlPullRequestRepository {
    async fn list_stuck_open(&self, org_id: &OrgId) -> Result<Vec<PullRequest>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, org_id, title, author, open, stuck, created_at
             FROM pull_requests
             WHERE org_id = ? AND open = 1 AND stuck = 1
             ORDER BY created_at ASC",
        )
        .bind(&org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_pull_request).collect::<Result<Vec<_>, _>>()
    }
}
