// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo stack with macro grouping.
//!
//! The stack stores fully-bound [`GraphCommand`] objects; executing them is
//! the graph's job, so pushing here never touches graph state. A macro is
//! open while commands are being appended and becomes a single undo/redo
//! unit once closed.

use thiserror::Error;

use crate::commands::{GraphCommand, MacroCommand};

/// Maximum undo history depth.
const MAX_HISTORY: usize = 100;

/// History errors.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Nothing to undo.
    #[error("nothing to undo")]
    NothingToUndo,

    /// Nothing to redo.
    #[error("nothing to redo")]
    NothingToRedo,
}

/// Linear undo/redo stack holding reversible graph commands.
pub struct UndoStack {
    undo: Vec<Box<dyn GraphCommand>>,
    redo: Vec<Box<dyn GraphCommand>>,
    open_macros: Vec<MacroCommand>,
    max_depth: usize,
}

impl UndoStack {
    /// Creates a stack with the default depth limit.
    pub fn new() -> Self {
        Self::with_max_depth(MAX_HISTORY)
    }

    /// Creates a stack with a custom depth limit.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            open_macros: Vec::new(),
            max_depth,
        }
    }

    /// Opens a macro. Commands added until the matching `end_macro` become
    /// one atomic undo/redo unit. Macros nest.
    pub fn begin_macro(&mut self, label: &str) {
        self.open_macros.push(MacroCommand::new(label));
    }

    /// Closes the innermost open macro. Empty macros are dropped.
    pub fn end_macro(&mut self) {
        let Some(closed) = self.open_macros.pop() else {
            tracing::warn!("end_macro called without an open macro");
            return;
        };
        if closed.is_empty() {
            return;
        }
        match self.open_macros.last_mut() {
            Some(parent) => parent.push(Box::new(closed)),
            None => self.commit(Box::new(closed)),
        }
    }

    /// Returns whether a macro is currently open.
    pub fn is_macro_open(&self) -> bool {
        !self.open_macros.is_empty()
    }

    /// Records an already-executed command, appending it to the open macro
    /// when one exists.
    pub fn add(&mut self, command: Box<dyn GraphCommand>) {
        match self.open_macros.last_mut() {
            Some(open) => open.push(command),
            None => self.commit(command),
        }
    }

    fn commit(&mut self, command: Box<dyn GraphCommand>) {
        self.redo.clear();
        self.undo.push(command);
        while self.undo.len() > self.max_depth {
            self.undo.remove(0);
        }
    }

    /// Takes the most recent undo entry.
    pub fn take_undo(&mut self) -> Result<Box<dyn GraphCommand>, HistoryError> {
        self.undo.pop().ok_or(HistoryError::NothingToUndo)
    }

    /// Takes the most recent redo entry.
    pub fn take_redo(&mut self) -> Result<Box<dyn GraphCommand>, HistoryError> {
        self.redo.pop().ok_or(HistoryError::NothingToRedo)
    }

    /// Stores an undone entry for redo.
    pub fn store_redo(&mut self, command: Box<dyn GraphCommand>) {
        self.redo.push(command);
    }

    /// Stores a redone entry back on the undo side without clearing redo.
    pub fn store_undo(&mut self, command: Box<dyn GraphCommand>) {
        self.undo.push(command);
    }

    /// Returns whether undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Returns whether redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Label of the next undo entry.
    pub fn undo_description(&self) -> Option<&str> {
        self.undo.last().map(|command| command.label())
    }

    /// Label of the next redo entry.
    pub fn redo_description(&self) -> Option<&str> {
        self.redo.last().map(|command| command.label())
    }

    /// Number of entries on the undo side.
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Number of entries on the redo side.
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Drops all history.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.open_macros.clear();
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
