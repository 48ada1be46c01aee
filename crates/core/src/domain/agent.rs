use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::directory::OrgId;
use crate::domain::work::TaskPriority;
use crate::safety::QuietHours;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentConfigurationId(pub String);

/// The closed set of automated-intervention categories this engine ships.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Reassigner,
    Nudger,
    ScopeAdjuster,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reassigner => "reassigner",
            Self::Nudger => "nudger",
            Self::ScopeAdjuster => "scope_adjuster",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reassigner" => Some(Self::Reassigner),
            "nudger" => Some(Self::Nudger),
            "scope_adjuster" => Some(Self::ScopeAdjuster),
            _ => None,
        }
    }
}

/// One row per organization per agent kind. Configurations are disabled,
/// never deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentConfiguration {
    pub id: AgentConfigurationId,
    pub org_id: OrgId,
    pub kind: AgentKind,
    pub enabled: bool,
    /// Kind-specific threshold map; read through the typed views below so the
    /// column stays extensible without a schema migration.
    pub thresholds: serde_json::Value,
    pub quiet_hours: Option<QuietHours>,
    pub auto_approve: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AgentConfiguration {
    pub fn reassigner_thresholds(&self) -> ReassignerThresholds {
        serde_json::from_value(self.thresholds.clone()).unwrap_or_default()
    }

    pub fn nudger_thresholds(&self) -> NudgerThresholds {
        serde_json::from_value(self.thresholds.clone()).unwrap_or_default()
    }

    pub fn scope_thresholds(&self) -> ScopeThresholds {
        serde_json::from_value(self.thresholds.clone()).unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassignerThresholds {
    /// Active-task count an assignee may carry before being considered
    /// overloaded (strictly-greater-than comparison).
    pub overload_threshold: u32,
}

impl Default for ReassignerThresholds {
    fn default() -> Self {
        Self { overload_threshold: 5 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgerThresholds {
    /// Ceiling on executed nudges per entity.
    pub max_reminders: u32,
    /// Strict cooldown between consecutive nudges for the same entity.
    pub reminder_interval_hours: i64,
}

impl Default for NudgerThresholds {
    fn default() -> Self {
        Self { max_reminders: 3, reminder_interval_hours: 24 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeThresholds {
    /// Tasks at or below this priority are eligible for deferral.
    pub deferral_priority_ceiling: TaskPriority,
}

impl Default for ScopeThresholds {
    fn default() -> Self {
        Self { deferral_priority_ceiling: TaskPriority::Medium }
    }
}
