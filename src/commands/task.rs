//! Commands over a single task or a single edge.

use super::{captured, label, revive, tombstone, CommandContext};
use crate::db::now_ms;
use crate::error::{Error, Result};
use crate::lifecycle::{self, Transition};
use crate::priority::{self, ComparisonOutcome, EloParams};
use crate::recurrence;
use crate::types::{BasePriority, Dependency, NewTask, Task, TaskEdit, TaskId};
use chrono::NaiveDate;
use tracing::{debug, info};

/// Create a task. Undo tombstones it; redo revives it under the same id.
#[derive(Debug, Clone)]
pub struct CreateTask {
    input: NewTask,
    created: Option<Task>,
}

impl CreateTask {
    pub fn new(input: NewTask) -> Self {
        Self {
            input,
            created: None,
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        match &self.created {
            Some(created) => revive(ctx.db, created),
            None => {
                let task = ctx.db.create_task(&Task::from_new(&self.input))?;
                info!(task_id = ?task.id, "task created");
                self.created = Some(task);
                Ok(())
            }
        }
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let id = captured(&self.created)?.require_id()?;
        tombstone(ctx.db, id)
    }

    pub(super) fn description(&self) -> String {
        format!("Create '{}'", self.input.title)
    }
}

/// Edit descriptive fields of a task.
#[derive(Debug, Clone)]
pub struct EditTask {
    task_id: TaskId,
    edit: TaskEdit,
    before: Option<Task>,
}

impl EditTask {
    pub fn new(task_id: TaskId, edit: TaskEdit) -> Self {
        Self {
            task_id,
            edit,
            before: None,
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let mut task = ctx.db.require_task(self.task_id)?;
        self.before.get_or_insert_with(|| task.clone());
        self.edit.apply(&mut task);
        ctx.db.update_task(&task)?;
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        ctx.db.restore_task(captured(&self.before)?)
    }

    pub(super) fn description(&self) -> String {
        format!("Edit {}", label(self.before.as_ref(), self.task_id))
    }
}

/// Move a task to Active, Deferred, Delegated, Someday or Trash.
#[derive(Debug, Clone)]
pub struct ChangeState {
    task_id: TaskId,
    transition: Transition,
    before: Option<Task>,
}

impl ChangeState {
    pub fn new(task_id: TaskId, transition: Transition) -> Self {
        Self {
            task_id,
            transition,
            before: None,
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        if matches!(self.transition, Transition::Complete { .. }) {
            return Err(Error::validation(
                "transition",
                "completion has its own command",
            ));
        }
        let mut task = ctx.db.require_task(self.task_id)?;
        self.before.get_or_insert_with(|| task.clone());
        lifecycle::apply_transition(&mut task, &self.transition)?;
        ctx.db.update_task(&task)?;
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        ctx.db.restore_task(captured(&self.before)?)
    }

    pub(super) fn description(&self) -> String {
        let verb = match self.transition {
            Transition::Activate => "Activate",
            Transition::Defer { .. } => "Defer",
            Transition::Delegate { .. } => "Delegate",
            Transition::Someday => "Move to someday",
            Transition::Complete { .. } => "Complete",
            Transition::Trash => "Trash",
        };
        format!("{} {}", verb, label(self.before.as_ref(), self.task_id))
    }
}

/// Complete a task: release its dependents and spawn the next occurrence of a series.
#[derive(Debug, Clone)]
pub struct CompleteTask {
    task_id: TaskId,
    today: NaiveDate,
    completed_at: Option<i64>,
    before: Option<Task>,
    released: Vec<Dependency>,
    spawned: Option<Task>,
}

impl CompleteTask {
    pub fn new(task_id: TaskId, today: NaiveDate) -> Self {
        Self {
            task_id,
            today,
            completed_at: None,
            before: None,
            released: Vec::new(),
            spawned: None,
        }
    }

    /// Id of the next occurrence spawned on first execution, if any.
    pub fn spawned_id(&self) -> Option<TaskId> {
        self.spawned.as_ref().and_then(|t| t.id)
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let mut task = ctx.db.require_task(self.task_id)?;
        self.before.get_or_insert_with(|| task.clone());

        let at = *self.completed_at.get_or_insert_with(now_ms);
        lifecycle::apply_transition(&mut task, &Transition::Complete { at })?;
        ctx.db.update_task(&task)?;

        self.released = ctx.db.release_dependents(self.task_id)?;

        match &self.spawned {
            Some(spawned) => revive(ctx.db, spawned)?,
            None => {
                if let Some(next) = recurrence::next_occurrence(&task, self.today)? {
                    let next = ctx.db.create_task(&next)?;
                    info!(
                        task_id = self.task_id,
                        next_id = ?next.id,
                        occurrence = next.occurrence_count,
                        "spawned next occurrence"
                    );
                    self.spawned = Some(next);
                }
            }
        }

        debug!(task_id = self.task_id, released = self.released.len(), "task completed");
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let before = captured(&self.before)?;
        if let Some(id) = self.spawned_id() {
            tombstone(ctx.db, id)?;
        }
        for dep in &self.released {
            ctx.db.restore_dependency(dep)?;
        }
        ctx.db.restore_task(before)
    }

    pub(super) fn description(&self) -> String {
        format!("Complete {}", label(self.before.as_ref(), self.task_id))
    }
}

/// Move a task to another priority tier, resetting its rating.
#[derive(Debug, Clone)]
pub struct ChangePriority {
    task_id: TaskId,
    priority: BasePriority,
    before: Option<Task>,
}

impl ChangePriority {
    pub fn new(task_id: TaskId, priority: BasePriority) -> Self {
        Self {
            task_id,
            priority,
            before: None,
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let mut task = ctx.db.require_task(self.task_id)?;
        self.before.get_or_insert_with(|| task.clone());
        priority::reset_for_tier(&mut task, self.priority);
        ctx.db.update_task(&task)?;
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        ctx.db.restore_task(captured(&self.before)?)
    }

    pub(super) fn description(&self) -> String {
        format!(
            "Set priority of {} to {}",
            label(self.before.as_ref(), self.task_id),
            self.priority.as_str()
        )
    }
}

/// Record one pairwise comparison.
#[derive(Debug, Clone)]
pub struct CompareTasks {
    first: TaskId,
    second: TaskId,
    outcome: ComparisonOutcome,
    before: Option<(Task, Task)>,
}

impl CompareTasks {
    pub fn new(first: TaskId, second: TaskId, outcome: ComparisonOutcome) -> Self {
        Self {
            first,
            second,
            outcome,
            before: None,
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        if self.first == self.second {
            return Err(Error::validation("second", "a task cannot be compared with itself"));
        }
        let mut first = ctx.db.require_task(self.first)?;
        let mut second = ctx.db.require_task(self.second)?;
        self.before
            .get_or_insert_with(|| (first.clone(), second.clone()));

        priority::compare(&mut first, &mut second, self.outcome, &EloParams::from(ctx.tunables));
        ctx.db.update_task(&first)?;
        ctx.db.update_task(&second)?;
        debug!(
            first = self.first,
            second = self.second,
            first_rating = first.elo_rating,
            second_rating = second.elo_rating,
            "comparison recorded"
        );
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let (first, second) = captured(&self.before)?;
        ctx.db.restore_task(first)?;
        ctx.db.restore_task(second)
    }

    pub(super) fn description(&self) -> String {
        match &self.before {
            Some((a, b)) => format!("Compare '{}' with '{}'", a.title, b.title),
            None => format!("Compare task #{} with task #{}", self.first, self.second),
        }
    }
}

/// Pass over a task: lower its rating by the configured decrement.
#[derive(Debug, Clone)]
pub struct DemoteTask {
    task_id: TaskId,
    before: Option<Task>,
}

impl DemoteTask {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            before: None,
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let mut task = ctx.db.require_task(self.task_id)?;
        self.before.get_or_insert_with(|| task.clone());
        priority::demote(&mut task, ctx.tunables.comparison_decrement);
        ctx.db.update_task(&task)?;
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        ctx.db.restore_task(captured(&self.before)?)
    }

    pub(super) fn description(&self) -> String {
        format!("Demote {}", label(self.before.as_ref(), self.task_id))
    }
}

/// Physically delete a task. Undo re-inserts it and its edges with their ids.
#[derive(Debug, Clone)]
pub struct DeleteTask {
    task_id: TaskId,
    snapshot: Option<(Task, Vec<Dependency>)>,
}

impl DeleteTask {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            snapshot: None,
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let task = ctx.db.require_task(self.task_id)?;
        let edges = ctx.db.dependencies_touching(self.task_id)?;
        self.snapshot = Some((task, edges));
        ctx.db.delete_task(self.task_id)?;
        info!(task_id = self.task_id, "task deleted");
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let (task, edges) = captured(&self.snapshot)?;
        ctx.db.insert_task_with_id(task)?;
        for dep in edges {
            ctx.db.restore_dependency(dep)?;
        }
        Ok(())
    }

    pub(super) fn description(&self) -> String {
        format!(
            "Delete {}",
            label(self.snapshot.as_ref().map(|(t, _)| t), self.task_id)
        )
    }
}

/// Add a "blocked-by" edge.
#[derive(Debug, Clone)]
pub struct AddDependency {
    blocked: TaskId,
    blocking: TaskId,
    created: Option<Dependency>,
}

impl AddDependency {
    pub fn new(blocked: TaskId, blocking: TaskId) -> Self {
        Self {
            blocked,
            blocking,
            created: None,
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        // Redo fails with `CycleDetected` if the graph has since made the edge cyclic.
        if let Some(dep) = &self.created {
            return ctx.db.restore_dependency(dep);
        }
        if ctx
            .db
            .get_dependency_by_pair(self.blocked, self.blocking)?
            .is_some()
        {
            return Err(Error::validation("dependency", "already exists"));
        }
        self.created = Some(ctx.db.create_dependency(self.blocked, self.blocking)?);
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let dep = captured(&self.created)?;
        ctx.db.delete_dependency(dep.id)?;
        Ok(())
    }

    pub(super) fn description(&self) -> String {
        format!("Block task #{} on task #{}", self.blocked, self.blocking)
    }
}

/// Remove a "blocked-by" edge.
#[derive(Debug, Clone)]
pub struct RemoveDependency {
    blocked: TaskId,
    blocking: TaskId,
    removed: Option<Dependency>,
}

impl RemoveDependency {
    pub fn new(blocked: TaskId, blocking: TaskId) -> Self {
        Self {
            blocked,
            blocking,
            removed: None,
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let dep = ctx
            .db
            .get_dependency_by_pair(self.blocked, self.blocking)?
            .ok_or(Error::DependencyNotFound {
                blocked: self.blocked,
                blocking: self.blocking,
            })?;
        ctx.db.delete_dependency(dep.id)?;
        self.removed = Some(dep);
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        ctx.db.restore_dependency(captured(&self.removed)?)
    }

    pub(super) fn description(&self) -> String {
        format!("Unblock task #{} from task #{}", self.blocked, self.blocking)
    }
}
