//! Compound commands: defer a task and attach blockers to it in one step.
//!
//! First execution creates the side-effect tasks and edges and records them.
//! Undo tombstones the created tasks (dropping their edges) and restores the
//! deferred task. Redo revives the recorded tasks and re-creates only the
//! missing edges, skipping any that would now close a cycle.

use super::{captured, ensure_edge, label, revive, tombstone, CommandContext};
use crate::error::{Error, Result};
use crate::lifecycle::{self, Transition};
use crate::types::{Dependency, NewTask, Task, TaskId};
use chrono::NaiveDate;
use tracing::info;

/// Defer the task and capture its pre-state on first run.
fn defer(
    ctx: &CommandContext<'_>,
    task_id: TaskId,
    start_date: NaiveDate,
    before: &mut Option<Task>,
) -> Result<()> {
    let mut task = ctx.db.require_task(task_id)?;
    before.get_or_insert_with(|| task.clone());
    lifecycle::apply_transition(&mut task, &Transition::Defer { start_date })?;
    ctx.db.update_task(&task)?;
    Ok(())
}

/// Create a side-effect task on first run, revive it on redo.
fn create_or_revive(ctx: &CommandContext<'_>, recorded: Option<&Task>, input: &NewTask) -> Result<Task> {
    match recorded {
        Some(task) => {
            revive(ctx.db, task)?;
            Ok(task.clone())
        }
        None => ctx.db.create_task(&Task::from_new(input)),
    }
}

/// Defer a task and create a new task that blocks it.
#[derive(Debug, Clone)]
pub struct DeferWithBlocker {
    task_id: TaskId,
    start_date: NaiveDate,
    blocker: NewTask,
    before: Option<Task>,
    created: Option<Task>,
}

impl DeferWithBlocker {
    pub fn new(task_id: TaskId, start_date: NaiveDate, blocker: NewTask) -> Self {
        Self {
            task_id,
            start_date,
            blocker,
            before: None,
            created: None,
        }
    }

    /// Id of the blocker created on first execution.
    pub fn blocker_id(&self) -> Option<TaskId> {
        self.created.as_ref().and_then(|t| t.id)
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        defer(ctx, self.task_id, self.start_date, &mut self.before)?;

        let blocker = create_or_revive(ctx, self.created.as_ref(), &self.blocker)?;
        let blocker_id = blocker.require_id()?;
        self.created = Some(blocker);

        ensure_edge(ctx.db, self.task_id, blocker_id)?;
        info!(task_id = self.task_id, blocker_id, "deferred behind new blocker");
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let before = captured(&self.before)?;
        if let Some(id) = self.blocker_id() {
            tombstone(ctx.db, id)?;
        }
        ctx.db.restore_task(before)
    }

    pub(super) fn description(&self) -> String {
        format!(
            "Defer {} behind '{}'",
            label(self.before.as_ref(), self.task_id),
            self.blocker.title
        )
    }
}

/// Defer a task and break it into subtasks, each blocking it.
#[derive(Debug, Clone)]
pub struct DeferWithSubtasks {
    task_id: TaskId,
    start_date: NaiveDate,
    subtasks: Vec<NewTask>,
    before: Option<Task>,
    created: Vec<Task>,
}

impl DeferWithSubtasks {
    pub fn new(task_id: TaskId, start_date: NaiveDate, subtasks: Vec<NewTask>) -> Self {
        Self {
            task_id,
            start_date,
            subtasks,
            before: None,
            created: Vec::new(),
        }
    }

    /// Ids of the subtasks created on first execution.
    pub fn subtask_ids(&self) -> Vec<TaskId> {
        self.created.iter().filter_map(|t| t.id).collect()
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        if self.subtasks.is_empty() {
            return Err(Error::validation("subtasks", "at least one subtask is required"));
        }
        defer(ctx, self.task_id, self.start_date, &mut self.before)?;

        for (i, input) in self.subtasks.iter().enumerate() {
            let subtask = create_or_revive(ctx, self.created.get(i), input)?;
            let subtask_id = subtask.require_id()?;
            if i >= self.created.len() {
                self.created.push(subtask);
            }
            ensure_edge(ctx.db, self.task_id, subtask_id)?;
        }

        info!(
            task_id = self.task_id,
            subtasks = self.created.len(),
            "deferred into subtasks"
        );
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let before = captured(&self.before)?;
        for id in self.subtask_ids() {
            tombstone(ctx.db, id)?;
        }
        ctx.db.restore_task(before)
    }

    pub(super) fn description(&self) -> String {
        format!(
            "Break {} into {} subtasks",
            label(self.before.as_ref(), self.task_id),
            self.subtasks.len()
        )
    }
}

/// Defer a task and make it wait on existing tasks.
#[derive(Debug, Clone)]
pub struct DeferWithDependencies {
    task_id: TaskId,
    start_date: NaiveDate,
    blocking_ids: Vec<TaskId>,
    before: Option<Task>,
    /// Edges added by the latest execution; pre-existing edges are never recorded.
    added: Vec<Dependency>,
}

impl DeferWithDependencies {
    pub fn new(task_id: TaskId, start_date: NaiveDate, blocking_ids: Vec<TaskId>) -> Self {
        Self {
            task_id,
            start_date,
            blocking_ids,
            before: None,
            added: Vec::new(),
        }
    }

    pub(super) fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let first_run = self.before.is_none();
        defer(ctx, self.task_id, self.start_date, &mut self.before)?;

        self.added.clear();
        for &blocking in &self.blocking_ids {
            if ctx.db.get_dependency_by_pair(self.task_id, blocking)?.is_some() {
                continue;
            }
            let dep = if first_run {
                // A cycle on first run fails the command; the transaction undoes the deferral.
                Some(ctx.db.create_dependency(self.task_id, blocking)?)
            } else {
                ensure_edge(ctx.db, self.task_id, blocking)?
            };
            self.added.extend(dep);
        }

        info!(
            task_id = self.task_id,
            added = self.added.len(),
            "deferred behind existing tasks"
        );
        Ok(())
    }

    pub(super) fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let before = captured(&self.before)?;
        for dep in &self.added {
            ctx.db.delete_dependency(dep.id)?;
        }
        ctx.db.restore_task(before)
    }

    pub(super) fn description(&self) -> String {
        format!(
            "Defer {} until {} other tasks finish",
            label(self.before.as_ref(), self.task_id),
            self.blocking_ids.len()
        )
    }
}
