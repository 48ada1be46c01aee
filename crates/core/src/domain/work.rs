use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::directory::{OrgId, UserId};
use crate::domain::project::ProjectId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Backlog,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Backlog => "backlog",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "backlog" => Some(Self::Backlog),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Ordered by escalation rank: Low < Medium < High < Urgent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Urgent => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub org_id: OrgId,
    pub project_id: Option<ProjectId>,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub assignee: Option<UserId>,
    /// Externally computed inactivity flag; consumed, never derived here.
    pub stale: bool,
    /// Outgoing blocking edges: tasks that cannot start until this one is done.
    pub blocks: Vec<TaskId>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_active(&self) -> bool {
        matches!(self.status, TaskStatus::Todo | TaskStatus::InProgress)
    }

    /// A task can be moved between assignees only while it is untouched work
    /// and not urgent.
    pub fn is_reassignable(&self) -> bool {
        self.status == TaskStatus::Todo && self.priority != TaskPriority::Urgent
    }

    pub fn is_blocking(&self) -> bool {
        !self.blocks.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: PullRequestId,
    pub org_id: OrgId,
    pub title: String,
    pub author: UserId,
    pub open: bool,
    /// Externally computed inactivity flag; consumed, never derived here.
    pub stuck: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::directory::{OrgId, UserId};

    use super::{Task, TaskId, TaskPriority, TaskStatus};

    fn task(status: TaskStatus, priority: TaskPriority) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId("T-1".to_string()),
            org_id: OrgId("org-1".to_string()),
            project_id: None,
            title: "Ship login flow".to_string(),
            status,
            priority,
            assignee: Some(UserId("alice".to_string())),
            stale: false,
            blocks: Vec::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn task_status_round_trips_from_storage_encoding() {
        let cases =
            [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Backlog, TaskStatus::Done];

        for status in cases {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn priority_ordering_follows_escalation_rank() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Urgent);
        assert_eq!(TaskPriority::parse("urgent"), Some(TaskPriority::Urgent));
    }

    #[test]
    fn only_untouched_non_urgent_work_is_reassignable() {
        assert!(task(TaskStatus::Todo, TaskPriority::Medium).is_reassignable());
        assert!(!task(TaskStatus::Todo, TaskPriority::Urgent).is_reassignable());
        assert!(!task(TaskStatus::InProgress, TaskPriority::Medium).is_reassignable());
    }

    #[test]
    fn active_covers_todo_and_in_progress_only() {
        assert!(task(TaskStatus::Todo, TaskPriority::Low).is_active());
        assert!(task(TaskStatus::InProgress, TaskPriority::Low).is_active());
        assert!(!task(TaskStatus::Backlog, TaskPriority::Low).is_active());
        assert!(!task(TaskStatus::Done, TaskPriority::Low).is_active());
    }
}
