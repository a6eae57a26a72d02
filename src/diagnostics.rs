//! Diagnostics sink passed explicitly into every read and eval call.
//!
//! There is no process-wide verbosity switch: the caller owns a [`Diagnostics`]
//! value, picks its [`LogLevel`] and may change it between calls. Events are
//! emitted through `tracing`, and every reported error is also kept so the caller
//! can inspect why an evaluation produced no result.

use std::fmt;

use crate::Error;

/// How much the interpreter reports. Levels are ordered: `Debug` includes `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    None,
    #[default]
    Error,
    Debug,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    level: LogLevel,
    reported: Vec<Error>,
}

impl Diagnostics {
    pub fn new(level: LogLevel) -> Self {
        Diagnostics {
            level,
            reported: Vec::new(),
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    /// Record a failure that aborted a read or an evaluation.
    pub fn report(&mut self, error: &Error) {
        if self.level >= LogLevel::Error {
            tracing::error!(%error, "evaluation failed");
        }
        self.reported.push(error.clone());
    }

    /// Emit a debug event. The arguments are only formatted at `Debug` level.
    pub fn trace(&mut self, args: fmt::Arguments<'_>) {
        if self.level >= LogLevel::Debug {
            tracing::debug!("{args}");
        }
    }

    pub fn is_debug(&self) -> bool {
        self.level >= LogLevel::Debug
    }

    /// Errors reported so far, oldest first
    pub fn reported(&self) -> &[Error] {
        &self.reported
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.reported.last()
    }

    /// Forget the reported errors, e.g. between REPL lines
    pub fn clear(&mut self) {
        self.reported.clear();
    }
}
