use chrono::{DateTime, Utc};
use sqlx::Row;

use tiller_core::domain::action::{ActionStatus, AgentAction, AgentActionId};
use tiller_core::domain::agent::AgentConfigurationId;
use tiller_core::domain::directory::{OrgId, UserId};
use tiller_core::domain::project::RiskSignalId;

use super::{ActionRepository, RepositoryError};
use crate::DbPool;

pub struct SqlActionRepository {
    pool: DbPool,
}

impl SqlActionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const ACTION_COLUMNS: &str = "id, configuration_id, org_id, action_kind, reasoning,
        suggestion_json, target_user, risk_id, status, result_json,
        created_at, approved_at, executed_at";

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn parse_optional_timestamp(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| parse_timestamp(&value)).transpose()
}

fn row_to_action(row: &sqlx::sqlite::SqliteRow) -> Result<AgentAction, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let configuration_id: String =
        row.try_get("configuration_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action_kind: String =
        row.try_get("action_kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reasoning: String =
        row.try_get("reasoning").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let suggestion_str: String =
        row.try_get("suggestion_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let target_user: Option<String> =
        row.try_get("target_user").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let risk_id: Option<String> =
        row.try_get("risk_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let result_str: Option<String> =
        row.try_get("result_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approved_at_str: Option<String> =
        row.try_get("approved_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let executed_at_str: Option<String> =
        row.try_get("executed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = ActionStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action status `{status_str}`")))?;

    let suggestion_json = serde_json::from_str(&suggestion_str)
        .map_err(|e| RepositoryError::Decode(format!("invalid suggestion payload: {e}")))?;
    let result_json = result_str
        .map(|value| serde_json::from_str(&value))
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("invalid result payload: {e}")))?;

    Ok(AgentAction {
        id: AgentActionId(id),
        configuration_id: AgentConfigurationId(configuration_id),
        org_id: OrgId(org_id),
        action_kind,
        reasoning,
        suggestion_json,
        target_user: target_user.map(UserId),
        risk_id: risk_id.map(RiskSignalId),
        status,
        result_json,
        created_at: parse_timestamp(&created_at_str)?,
        approved_at: parse_optional_timestamp(approved_at_str)?,
        executed_at: parse_optional_timestamp(executed_at_str)?,
    })
}

#[async_trait::async_trait]
impl ActionRepository for SqlActionRepository {
    async fn find_by_id(&self, id: &AgentActionId) -> Result<Option<AgentAction>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM agent_actions WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_action(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, action: AgentAction) -> Result<(), RepositoryError> {
        let suggestion_str = action.suggestion_json.to_string();
        let result_str = action.result_json.as_ref().map(|value| value.to_string());

        sqlx::query(
            "INSERT INTO agent_actions (id, configuration_id, org_id, action_kind, reasoning,
                                        suggestion_json, target_user, risk_id, status,
                                        result_json, created_at, approved_at, executed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 result_json = excluded.result_json,
                 approved_at = excluded.approved_at,
                 executed_at = excluded.executed_at",
        )
        .bind(&action.id.0)
        .bind(&action.configuration_id.0)
        .bind(&action.org_id.0)
        .bind(&action.action_kind)
        .bind(&action.reasoning)
        .bind(&suggestion_str)
        .bind(action.target_user.as_ref().map(|user| user.0.as_str()))
        .bind(action.risk_id.as_ref().map(|risk| risk.0.as_str()))
        .bind(action.status.as_str())
        .bind(&result_str)
        .bind(action.created_at.to_rfc3339())
        .bind(action.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(action.executed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_created_since(
        &self,
        configuration_id: &AgentConfigurationId,
        since: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM agent_actions
             WHERE configuration_id = ? AND created_at >= ?",
        )
        .bind(&configuration_id.0)
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(count as u32)
    }

    async fn count_executed_for_entity(
        &self,
        configuration_id: &AgentConfigurationId,
        entity_id: &str,
    ) -> Result<u32, RepositoryError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM agent_actions
             WHERE configuration_id = ?
               AND status = 'executed'
               AND json_extract(suggestion_json, '$.entity_id') = ?",
        )
        .bind(&configuration_id.0)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?
        .get("count");

        Ok(count as u32)
    }

    async fn last_executed_for_entity(
        &self,
        configuration_id: &AgentConfigurationId,
        entity_id: &str,
    ) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let executed_at: Option<String> = sqlx::query(
            "SELECT MAX(executed_at) AS executed_at FROM agent_actions
             WHERE configuration_id = ?
               AND status = 'executed'
               AND json_extract(suggestion_json, '$.entity_id') = ?",
        )
        .bind(&configuration_id.0)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?
        .get("executed_at");

        parse_optional_timestamp(executed_at)
    }

    async fn list_approved(&self, org_id: &OrgId) -> Result<Vec<AgentAction>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {ACTION_COLUMNS} FROM agent_actions
             WHERE org_id = ? AND status = 'approved'
             ORDER BY created_at ASC"
        ))
        .bind(&org_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_action).collect::<Result<Vec<_>, _>>()
    }
}
