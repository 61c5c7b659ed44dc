use crate::command::ExitCode;
use crate::parser::SyntaxError;
use std::io;
use thiserror::Error;

/// Status reported by the interpreter for parse and host failures.
///
/// Script-chosen `exit` codes are clamped below this value when they leave the process.
pub const FATAL_STATUS: ExitCode = 255;

/// Status used for commands that could not be found.
pub const UNKNOWN_COMMAND_STATUS: ExitCode = 127;

/// Everything that can go wrong while running a Sigil script.
///
/// Most variants are recoverable: the executor reports them, sets `last` to a non-zero
/// status and moves on to the next statement. See [`SigilError::is_fatal`] for the ones
/// that unwind the current script context instead.
#[derive(Debug, Error)]
pub enum SigilError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("cannot assign to readonly variable `{0}`")]
    ReadonlyViolation(String),

    #[error("alias cycle: {}", .0.join(" -> "))]
    AliasCycle(Vec<String>),

    #[error("unknown glyph `{0}` (try 'help')")]
    UnknownCommand(String),

    #[error("glyph `{name}` is already provided by {owner}")]
    GlyphConflict { name: String, owner: String },

    #[error("`{0}` is not a number")]
    NotNumeric(String),

    #[error("division by zero")]
    DivideByZero,

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("variable `{0}` is not defined")]
    UndefinedVariable(String),

    #[error("nesting too deep (limit is {0})")]
    DepthExceeded(usize),

    #[error("profile error: {0}")]
    Profile(String),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SigilError {
    /// Fatal errors unwind the current script context instead of only setting `last`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SigilError::Syntax(_)
                | SigilError::AliasCycle(_)
                | SigilError::GlyphConflict { .. }
                | SigilError::DepthExceeded(_)
        )
    }

    /// The `last` status a recoverable error leaves behind.
    pub fn status(&self) -> ExitCode {
        match self {
            SigilError::UnknownCommand(_) => UNKNOWN_COMMAND_STATUS,
            SigilError::Syntax(_) | SigilError::DepthExceeded(_) => FATAL_STATUS,
            _ => 1,
        }
    }
}

pub type Result<T, E = SigilError> = std::result::Result<T, E>;
