//! Bounded undo/redo stacks.

use super::{Command, CommandContext};
use crate::error::Result;
use std::collections::VecDeque;
use tracing::{info, warn};

/// Undo and redo stacks. The undo stack drops its oldest entry past `max_size`.
#[derive(Debug)]
pub struct History {
    undo_stack: VecDeque<Command>,
    redo_stack: Vec<Command>,
    max_size: usize,
}

impl History {
    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Change the bound, evicting the oldest entries if needed.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict();
    }

    fn evict(&mut self) {
        while self.undo_stack.len() > self.max_size {
            if let Some(dropped) = self.undo_stack.pop_front() {
                info!(command = %dropped.description(), "evicted oldest undo entry");
            }
        }
    }

    /// Execute a new command. On success it becomes undoable and the redo stack is cleared.
    pub fn execute(&mut self, ctx: &CommandContext<'_>, mut command: Command) -> Result<()> {
        command.execute(ctx)?;
        info!(command = %command.description(), "executed");
        self.undo_stack.push_back(command);
        self.redo_stack.clear();
        self.evict();
        Ok(())
    }

    /// Undo the most recent command. Returns `false` when there is nothing to undo.
    /// A failed undo leaves the command on the undo stack.
    pub fn undo(&mut self, ctx: &CommandContext<'_>) -> Result<bool> {
        let Some(mut command) = self.undo_stack.pop_back() else {
            return Ok(false);
        };
        match command.undo(ctx) {
            Ok(()) => {
                info!(command = %command.description(), "undone");
                self.redo_stack.push(command);
                Ok(true)
            }
            Err(err) => {
                warn!(command = %command.description(), error = %err, "undo failed");
                self.undo_stack.push_back(command);
                Err(err)
            }
        }
    }

    /// Re-execute the most recently undone command. Returns `false` when there
    /// is nothing to redo. A failed redo leaves the command on the redo stack.
    pub fn redo(&mut self, ctx: &CommandContext<'_>) -> Result<bool> {
        let Some(mut command) = self.redo_stack.pop() else {
            return Ok(false);
        };
        match command.execute(ctx) {
            Ok(()) => {
                info!(command = %command.description(), "redone");
                self.undo_stack.push_back(command);
                self.evict();
                Ok(true)
            }
            Err(err) => {
                warn!(command = %command.description(), error = %err, "redo failed");
                self.redo_stack.push(command);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(Command::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.last().map(Command::description)
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }
}
