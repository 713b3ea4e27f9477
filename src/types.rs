//! Core types for the task core.

use crate::recurrence::RecurrencePattern;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identity of a persisted task (SQLite rowid).
pub type TaskId = i64;

/// Identity of a tag owned by the project-tag collaborator.
pub type TagId = i64;

/// Default Elo rating for a task that has never been compared.
pub const DEFAULT_ELO_RATING: f64 = 1500.0;

/// Priority tier. Comparisons only refine ordering within a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasePriority {
    Low,
    #[default]
    Medium,
    High,
}

impl BasePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            BasePriority::Low => "low",
            BasePriority::Medium => "medium",
            BasePriority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(BasePriority::Low),
            "medium" => Some(BasePriority::Medium),
            "high" => Some(BasePriority::High),
            _ => None,
        }
    }
}

/// Lifecycle state of a task.
///
/// `Tombstoned` is internal: it marks a task created by a command that has
/// since been undone, so a redo can revive it under the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Active,
    Deferred,
    Delegated,
    Someday,
    Completed,
    Trash,
    Tombstoned,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Active => "active",
            TaskState::Deferred => "deferred",
            TaskState::Delegated => "delegated",
            TaskState::Someday => "someday",
            TaskState::Completed => "completed",
            TaskState::Trash => "trash",
            TaskState::Tombstoned => "tombstoned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TaskState::Active),
            "deferred" => Some(TaskState::Deferred),
            "delegated" => Some(TaskState::Delegated),
            "someday" => Some(TaskState::Someday),
            "completed" => Some(TaskState::Completed),
            "trash" => Some(TaskState::Trash),
            "tombstoned" => Some(TaskState::Tombstoned),
            _ => None,
        }
    }

    /// States reachable by the user and shown in listings.
    pub fn is_visible(&self) -> bool {
        !matches!(self, TaskState::Tombstoned)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Absent until the task is persisted.
    pub id: Option<TaskId>,
    pub title: String,
    pub description: Option<String>,
    pub base_priority: BasePriority,
    pub elo_rating: f64,
    pub comparison_count: i64,
    pub due_date: Option<NaiveDate>,
    pub state: TaskState,
    pub context_id: Option<i64>,

    // State-specific fields
    pub start_date: Option<NaiveDate>,
    pub delegated_to: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub completed_at: Option<i64>,

    // Recurrence
    pub is_recurring: bool,
    pub recurrence_pattern: Option<RecurrencePattern>,
    pub recurrence_parent_id: Option<TaskId>,
    pub share_elo_rating: bool,
    pub shared_elo_rating: Option<f64>,
    pub shared_comparison_count: Option<i64>,
    pub recurrence_end_date: Option<NaiveDate>,
    pub max_occurrences: Option<i64>,
    pub occurrence_count: i64,

    pub tags: BTreeSet<TagId>,

    /// Derived from the dependency graph on every read; excludes completed blockers.
    #[serde(default)]
    pub blocking_task_ids: BTreeSet<TaskId>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Build an unsaved task from user input.
    pub fn from_new(new: &NewTask) -> Self {
        let (is_recurring, pattern, share, end_date, max) = match &new.recurrence {
            Some(r) => (
                true,
                Some(r.pattern.clone()),
                r.share_elo_rating,
                r.end_date,
                r.max_occurrences,
            ),
            None => (false, None, false, None, None),
        };

        Self {
            id: None,
            title: new.title.clone(),
            description: new.description.clone(),
            base_priority: new.base_priority,
            elo_rating: DEFAULT_ELO_RATING,
            comparison_count: 0,
            due_date: new.due_date,
            state: TaskState::Active,
            context_id: new.context_id,
            start_date: None,
            delegated_to: None,
            follow_up_date: None,
            completed_at: None,
            is_recurring,
            recurrence_pattern: pattern,
            recurrence_parent_id: None,
            share_elo_rating: share,
            shared_elo_rating: None,
            shared_comparison_count: None,
            recurrence_end_date: end_date,
            max_occurrences: max,
            occurrence_count: 0,
            tags: new.tags.clone(),
            blocking_task_ids: BTreeSet::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Id of a persisted task; validation error otherwise.
    pub fn require_id(&self) -> crate::Result<TaskId> {
        self.id
            .ok_or_else(|| crate::Error::validation("id", "task has not been saved"))
    }

    /// Active with no open blockers.
    pub fn is_actionable(&self) -> bool {
        self.state == TaskState::Active && self.blocking_task_ids.is_empty()
    }
}

/// Recurrence settings supplied when creating a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceSpec {
    pub pattern: RecurrencePattern,
    #[serde(default)]
    pub share_elo_rating: bool,
    pub end_date: Option<NaiveDate>,
    pub max_occurrences: Option<i64>,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub base_priority: BasePriority,
    pub due_date: Option<NaiveDate>,
    pub context_id: Option<i64>,
    #[serde(default)]
    pub tags: BTreeSet<TagId>,
    pub recurrence: Option<RecurrenceSpec>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: BasePriority) -> Self {
        self.base_priority = priority;
        self
    }

    pub fn with_due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_recurrence(mut self, recurrence: RecurrenceSpec) -> Self {
        self.recurrence = Some(recurrence);
        self
    }
}

/// Edits applied by the edit command. `None` leaves a field unchanged;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub context_id: Option<Option<i64>>,
    pub tags: Option<BTreeSet<TagId>>,
    pub recurrence: Option<Option<RecurrenceSpec>>,
}

impl TaskEdit {
    /// Apply the edit in place.
    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
        if let Some(context) = self.context_id {
            task.context_id = context;
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        match &self.recurrence {
            Some(Some(spec)) => {
                task.is_recurring = true;
                task.recurrence_pattern = Some(spec.pattern.clone());
                task.share_elo_rating = spec.share_elo_rating;
                task.recurrence_end_date = spec.end_date;
                task.max_occurrences = spec.max_occurrences;
            }
            Some(None) => {
                task.is_recurring = false;
                task.recurrence_pattern = None;
                task.share_elo_rating = false;
                task.recurrence_end_date = None;
                task.max_occurrences = None;
            }
            None => {}
        }
    }
}

/// A "blocked-by" edge: the blocked task cannot be worked until the blocking task completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub id: i64,
    pub blocked_task_id: TaskId,
    pub blocking_task_id: TaskId,
}
