use sqlx::Row;

use tiller_core::domain::directory::{OrgId, User, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let team_ids_str: String =
        row.try_get("team_ids").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let team_ids = serde_json::from_str(&team_ids_str)
        .map_err(|e| RepositoryError::Decode(format!("invalid team_ids list: {e}")))?;

    Ok(User { id: UserId(id), org_id: OrgId(org_id), display_name, team_ids })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, org_id, display_name, team_ids FROM users WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn list_for_org(&self, org_id: &OrgId) -> Result<Vec<User>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, org_id, display_name, team_ids FROM users
             WHERE org_id = ? ORDER BY id ASC",
        )
        .bind(&org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()
    }
}
