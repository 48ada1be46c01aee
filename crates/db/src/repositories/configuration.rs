use chrono::{DateTime, Utc};
use sqlx::Row;

use tiller_core::domain::agent::{AgentConfiguration, AgentConfigurationId, AgentKind};
use tiller_core::domain::directory::OrgId;
use tiller_core::safety::QuietHours;

use super::{ConfigurationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConfigurationRepository {
    pool: DbPool,
}

impl SqlConfigurationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_configuration(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<AgentConfiguration, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_str: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let enabled: bool =
        row.try_get("enabled").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let thresholds_str: String =
        row.try_get("thresholds").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let quiet_start_hour: Option<i64> =
        row.try_get("quiet_start_hour").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let quiet_end_hour: Option<i64> =
        row.try_get("quiet_end_hour").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let auto_approve: bool =
        row.try_get("auto_approve").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind = AgentKind::parse(&kind_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown agent kind `{kind_str}`")))?;

    let thresholds = serde_json::from_str(&thresholds_str)
        .map_err(|e| RepositoryError::Decode(format!("invalid thresholds payload: {e}")))?;

    let quiet_hours = match (quiet_start_hour, quiet_end_hour) {
        (Some(start), Some(end)) => {
            Some(QuietHours { start_hour: start as u8, end_hour: end as u8 })
        }
        _ => None,
    };

    Ok(AgentConfiguration {
        id: AgentConfigurationId(id),
        org_id: OrgId(org_id),
        kind,
        enabled,
        thresholds,
        quiet_hours,
        auto_approve,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

#[async_trait::async_trait]
impl ConfigurationRepository for SqlConfigurationRepository {
    async fn find_by_id(
        &self,
        id: &AgentConfigurationId,
    ) -> Result<Option<AgentConfiguration>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, kind, enabled, thresholds, quiet_start_hour, quiet_end_hour,
                    auto_approve, created_at, updated_at
             FROM agent_configurations WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_configuration(r)?)),
            None => Ok(None),
        }
    }

    async fn list_enabled(
        &self,
        org_id: &OrgId,
    ) -> Result<Vec<AgentConfiguration>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, org_id, kind, enabled, thresholds, quiet_start_hour, quiet_end_hour,
                    auto_approve, created_at, updated_at
             FROM agent_configurations
             WHERE org_id = ? AND enabled = 1
             ORDER BY kind ASC",
        )
        .bind(&org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_configuration).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, configuration: AgentConfiguration) -> Result<(), RepositoryError> {
        let thresholds_str = configuration.thresholds.to_string();
        let quiet_start = configuration.quiet_hours.map(|window| window.start_hour as i64);
        let quiet_end = configuration.quiet_hours.map(|window| window.end_hour as i64);

        sqlx::query(
            "INSERT INTO agent_configurations (id, org_id, kind, enabled, thresholds,
                                               quiet_start_hour, quiet_end_hour, auto_approve,
                                               created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 enabled = excluded.enabled,
                 thresholds = excluded.thresholds,
                 quiet_start_hour = excluded.quiet_start_hour,
                 quiet_end_hour = excluded.quiet_end_hour,
                 auto_approve = excluded.auto_approve,
                 updated_at = excluded.updated_at",
        )
        .bind(&configuration.id.0)
        .bind(&configuration.org_id.0)
        .bind(configuration.kind.as_str())
        .bind(configuration.enabled)
        .bind(&thresholds_str)
        .bind(quiet_start)
        .bind(quiet_end)
        .bind(configuration.auto_approve)
        .bind(configuration.created_at.to_rfc3339())
        .bind(configuration.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
