//! Task lifecycle transitions.
//!
//! Every user-facing state change goes through [`apply_transition`], which
//! checks the move against the transition table and keeps the state-specific
//! fields consistent with the new state.

use crate::error::{Error, Result};
use crate::types::{Task, TaskState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A caller-initiated state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", rename_all = "snake_case")]
pub enum Transition {
    Activate,
    Defer {
        start_date: NaiveDate,
    },
    Delegate {
        delegated_to: String,
        follow_up_date: Option<NaiveDate>,
    },
    Someday,
    /// `at` is the completion timestamp in epoch milliseconds.
    Complete {
        at: i64,
    },
    Trash,
}

impl Transition {
    pub fn target(&self) -> TaskState {
        match self {
            Transition::Activate => TaskState::Active,
            Transition::Defer { .. } => TaskState::Deferred,
            Transition::Delegate { .. } => TaskState::Delegated,
            Transition::Someday => TaskState::Someday,
            Transition::Complete { .. } => TaskState::Completed,
            Transition::Trash => TaskState::Trash,
        }
    }
}

/// Whether `from -> to` is a legal move. Re-deferring and re-delegating are allowed.
pub fn is_legal(from: TaskState, to: TaskState) -> bool {
    use TaskState::*;
    match (from, to) {
        (Tombstoned, _) | (_, Tombstoned) => false,
        (Deferred, Deferred) | (Delegated, Delegated) => true,
        (a, b) if a == b => false,
        (Active | Deferred | Delegated | Someday, _) => true,
        (Completed, Active | Trash) => true,
        (Trash, Active) => true,
        _ => false,
    }
}

/// Apply `transition` to `task`, setting the new state's fields and clearing the old ones.
pub fn apply_transition(task: &mut Task, transition: &Transition) -> Result<()> {
    let to = transition.target();
    if !is_legal(task.state, to) {
        return Err(Error::InvalidTransition {
            from: task.state,
            to,
        });
    }

    if let Transition::Delegate { delegated_to, .. } = transition {
        if delegated_to.trim().is_empty() {
            return Err(Error::validation("delegated_to", "must not be empty"));
        }
    }

    clear_state_fields(task);

    match transition {
        Transition::Defer { start_date } => task.start_date = Some(*start_date),
        Transition::Delegate {
            delegated_to,
            follow_up_date,
        } => {
            task.delegated_to = Some(delegated_to.clone());
            task.follow_up_date = *follow_up_date;
        }
        Transition::Complete { at } => task.completed_at = Some(*at),
        Transition::Activate | Transition::Someday | Transition::Trash => {}
    }

    task.state = to;
    Ok(())
}

fn clear_state_fields(task: &mut Task) {
    task.start_date = None;
    task.delegated_to = None;
    task.follow_up_date = None;
    task.completed_at = None;
}

/// Soft-delete a task created by a command that is being undone.
pub(crate) fn tombstone(task: &mut Task) {
    clear_state_fields(task);
    task.state = TaskState::Tombstoned;
}
