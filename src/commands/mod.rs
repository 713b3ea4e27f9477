//! Reversible commands.
//!
//! Every mutation of tasks and edges is a [`Command`]. A command captures the
//! pre-mutation snapshot of what it touches on first execution and restores it
//! on undo. Re-executing after undo (redo) revives entities the first run
//! created, under the same ids, instead of creating duplicates.

mod compound;
mod history;
mod task;

pub use compound::{DeferWithBlocker, DeferWithDependencies, DeferWithSubtasks};
pub use history::History;
pub use task::{
    AddDependency, ChangePriority, ChangeState, CompareTasks, CompleteTask, CreateTask,
    DeleteTask, DemoteTask, EditTask, RemoveDependency,
};

use crate::config::Tunables;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::lifecycle::{self, Transition};
use crate::priority::ComparisonOutcome;
use crate::types::{BasePriority, Dependency, NewTask, Task, TaskEdit, TaskId};
use chrono::NaiveDate;
use tracing::warn;

/// What a command runs against.
#[derive(Clone, Copy)]
pub struct CommandContext<'a> {
    pub db: &'a Database,
    pub tunables: &'a Tunables,
}

/// The closed set of reversible commands.
#[derive(Debug, Clone)]
pub enum Command {
    CreateTask(CreateTask),
    EditTask(EditTask),
    ChangeState(ChangeState),
    Complete(CompleteTask),
    ChangePriority(ChangePriority),
    Compare(CompareTasks),
    Demote(DemoteTask),
    Delete(DeleteTask),
    AddDependency(AddDependency),
    RemoveDependency(RemoveDependency),
    DeferWithBlocker(DeferWithBlocker),
    DeferWithSubtasks(DeferWithSubtasks),
    DeferWithDependencies(DeferWithDependencies),
}

impl Command {
    pub fn create(task: NewTask) -> Self {
        Command::CreateTask(CreateTask::new(task))
    }

    pub fn edit(task_id: TaskId, edit: TaskEdit) -> Self {
        Command::EditTask(EditTask::new(task_id, edit))
    }

    pub fn transition(task_id: TaskId, transition: Transition) -> Self {
        Command::ChangeState(ChangeState::new(task_id, transition))
    }

    pub fn activate(task_id: TaskId) -> Self {
        Self::transition(task_id, Transition::Activate)
    }

    pub fn defer(task_id: TaskId, start_date: NaiveDate) -> Self {
        Self::transition(task_id, Transition::Defer { start_date })
    }

    pub fn delegate(task_id: TaskId, to: impl Into<String>, follow_up_date: Option<NaiveDate>) -> Self {
        Self::transition(
            task_id,
            Transition::Delegate {
                delegated_to: to.into(),
                follow_up_date,
            },
        )
    }

    pub fn someday(task_id: TaskId) -> Self {
        Self::transition(task_id, Transition::Someday)
    }

    pub fn trash(task_id: TaskId) -> Self {
        Self::transition(task_id, Transition::Trash)
    }

    /// Complete a task; `today` anchors the next occurrence of an undated recurring task.
    pub fn complete(task_id: TaskId, today: NaiveDate) -> Self {
        Command::Complete(CompleteTask::new(task_id, today))
    }

    pub fn change_priority(task_id: TaskId, priority: BasePriority) -> Self {
        Command::ChangePriority(ChangePriority::new(task_id, priority))
    }

    pub fn compare(first: TaskId, second: TaskId, outcome: ComparisonOutcome) -> Self {
        Command::Compare(CompareTasks::new(first, second, outcome))
    }

    pub fn demote(task_id: TaskId) -> Self {
        Command::Demote(DemoteTask::new(task_id))
    }

    pub fn delete(task_id: TaskId) -> Self {
        Command::Delete(DeleteTask::new(task_id))
    }

    pub fn add_dependency(blocked: TaskId, blocking: TaskId) -> Self {
        Command::AddDependency(AddDependency::new(blocked, blocking))
    }

    pub fn remove_dependency(blocked: TaskId, blocking: TaskId) -> Self {
        Command::RemoveDependency(RemoveDependency::new(blocked, blocking))
    }

    pub fn defer_with_blocker(task_id: TaskId, start_date: NaiveDate, blocker: NewTask) -> Self {
        Command::DeferWithBlocker(DeferWithBlocker::new(task_id, start_date, blocker))
    }

    pub fn defer_with_subtasks(task_id: TaskId, start_date: NaiveDate, subtasks: Vec<NewTask>) -> Self {
        Command::DeferWithSubtasks(DeferWithSubtasks::new(task_id, start_date, subtasks))
    }

    pub fn defer_with_dependencies(task_id: TaskId, start_date: NaiveDate, blocking: Vec<TaskId>) -> Self {
        Command::DeferWithDependencies(DeferWithDependencies::new(task_id, start_date, blocking))
    }

    /// Run the command as one transaction. On failure neither the store nor
    /// the command's captured state changes.
    pub fn execute(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let mut staged = self.clone();
        ctx.db.transaction(|| staged.execute_inner(ctx))?;
        *self = staged;
        Ok(())
    }

    /// Reverse the last execution as one transaction.
    pub fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        let mut staged = self.clone();
        ctx.db.transaction(|| staged.undo_inner(ctx))?;
        *self = staged;
        Ok(())
    }

    fn execute_inner(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        match self {
            Command::CreateTask(c) => c.execute(ctx),
            Command::EditTask(c) => c.execute(ctx),
            Command::ChangeState(c) => c.execute(ctx),
            Command::Complete(c) => c.execute(ctx),
            Command::ChangePriority(c) => c.execute(ctx),
            Command::Compare(c) => c.execute(ctx),
            Command::Demote(c) => c.execute(ctx),
            Command::Delete(c) => c.execute(ctx),
            Command::AddDependency(c) => c.execute(ctx),
            Command::RemoveDependency(c) => c.execute(ctx),
            Command::DeferWithBlocker(c) => c.execute(ctx),
            Command::DeferWithSubtasks(c) => c.execute(ctx),
            Command::DeferWithDependencies(c) => c.execute(ctx),
        }
    }

    fn undo_inner(&mut self, ctx: &CommandContext<'_>) -> Result<()> {
        match self {
            Command::CreateTask(c) => c.undo(ctx),
            Command::EditTask(c) => c.undo(ctx),
            Command::ChangeState(c) => c.undo(ctx),
            Command::Complete(c) => c.undo(ctx),
            Command::ChangePriority(c) => c.undo(ctx),
            Command::Compare(c) => c.undo(ctx),
            Command::Demote(c) => c.undo(ctx),
            Command::Delete(c) => c.undo(ctx),
            Command::AddDependency(c) => c.undo(ctx),
            Command::RemoveDependency(c) => c.undo(ctx),
            Command::DeferWithBlocker(c) => c.undo(ctx),
            Command::DeferWithSubtasks(c) => c.undo(ctx),
            Command::DeferWithDependencies(c) => c.undo(ctx),
        }
    }

    /// Human-readable label for undo/redo menus.
    pub fn description(&self) -> String {
        match self {
            Command::CreateTask(c) => c.description(),
            Command::EditTask(c) => c.description(),
            Command::ChangeState(c) => c.description(),
            Command::Complete(c) => c.description(),
            Command::ChangePriority(c) => c.description(),
            Command::Compare(c) => c.description(),
            Command::Demote(c) => c.description(),
            Command::Delete(c) => c.description(),
            Command::AddDependency(c) => c.description(),
            Command::RemoveDependency(c) => c.description(),
            Command::DeferWithBlocker(c) => c.description(),
            Command::DeferWithSubtasks(c) => c.description(),
            Command::DeferWithDependencies(c) => c.description(),
        }
    }
}

/// Snapshot taken at first execution; undo before that is an error.
fn captured<T>(snapshot: &Option<T>) -> Result<&T> {
    snapshot
        .as_ref()
        .ok_or_else(|| Error::validation("command", "has not been executed"))
}

/// Label a task by its captured title, or by id before first execution.
fn label(snapshot: Option<&Task>, task_id: TaskId) -> String {
    match snapshot {
        Some(task) => format!("'{}'", task.title),
        None => format!("task #{}", task_id),
    }
}

/// Bring back a task created by an earlier execution, exactly as it was created.
fn revive(db: &Database, created: &Task) -> Result<()> {
    let id = created.require_id()?;
    if db.get_task(id)?.is_some() {
        db.restore_task(created)
    } else {
        db.insert_task_with_id(created).map(|_| ())
    }
}

/// Soft-delete a task created by a command being undone: its edges go, its id stays.
fn tombstone(db: &Database, task_id: TaskId) -> Result<()> {
    let Some(mut task) = db.get_task(task_id)? else {
        return Ok(());
    };
    for dep in db.dependencies_touching(task_id)? {
        db.delete_dependency(dep.id)?;
    }
    lifecycle::tombstone(&mut task);
    db.update_task(&task)?;
    Ok(())
}

/// Add an edge during redo, skipping it if the graph has since made it cyclic.
fn ensure_edge(db: &Database, blocked: TaskId, blocking: TaskId) -> Result<Option<Dependency>> {
    match db.create_dependency(blocked, blocking) {
        Ok(dep) => Ok(Some(dep)),
        Err(err) if err.is_cycle() => {
            warn!(blocked, blocking, "skipping dependency that would now create a cycle");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
