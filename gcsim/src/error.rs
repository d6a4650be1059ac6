use std::io;

use rustyline::error::ReadlineError;
use thiserror::Error;

use marksweep::GcError;

/// A heap shell error
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("line editor error: {0}")]
    Readline(#[from] ReadlineError),

    #[error("collector error: {0}")]
    Gc(#[from] GcError),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("no object bound to '{0}'")]
    UnknownName(String),

    #[error("{name} has no slot {slot}")]
    BadSlot { name: String, slot: usize },

    #[error("invalid option: {0}")]
    Config(String),
}

impl ShellError {
    /// Errors the shell reports and then carries on from
    pub fn is_recoverable(&self) -> bool {
        match self {
            ShellError::Syntax(_) | ShellError::UnknownName(_) | ShellError::BadSlot { .. } => true,
            ShellError::Gc(GcError::OutOfMemory) => true,
            _ => false,
        }
    }
}

/// Convenience shorthand function for building a syntax error
pub fn err_syntax(reason: &str) -> ShellError {
    ShellError::Syntax(String::from(reason))
}
