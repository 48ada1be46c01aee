use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::directory::OrgId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiskSignalId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Paused,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub org_id: OrgId,
    pub name: String,
    pub status: ProjectStatus,
    pub target_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub goals: Vec<String>,
    pub milestones: Vec<String>,
    pub tech_stack: Vec<String>,
}

impl Project {
    /// Textual summary handed to the advisory service as project context.
    pub fn context_summary(&self) -> String {
        let mut lines = vec![format!("Project: {}", self.name)];
        if let Some(description) = &self.description {
            lines.push(format!("Description: {description}"));
        }
        if !self.goals.is_empty() {
            lines.push(format!("Goals: {}", self.goals.join("; ")));
        }
        if !self.milestones.is_empty() {
            lines.push(format!("Milestones: {}", self.milestones.join("; ")));
        }
        if !self.tech_stack.is_empty() {
            lines.push(format!("Tech stack: {}", self.tech_stack.join(", ")));
        }
        lines.join("\n")
    }
}

pub const DEADLINE_RISK_KIND: &str = "deadline_risk";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSignal {
    pub id: RiskSignalId,
    pub org_id: OrgId,
    pub project_id: ProjectId,
    pub kind: String,
    pub severity: RiskSeverity,
    pub active: bool,
    pub detected_at: DateTime<Utc>,
}

impl RiskSignal {
    /// An active deadline-risk signal severe enough to justify cutting scope.
    pub fn threatens_deadline(&self) -> bool {
        self.active && self.kind == DEADLINE_RISK_KIND && self.severity >= RiskSeverity::High
    }
}
