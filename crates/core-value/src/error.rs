//! Error kinds shared across the editor core.
//!
//! These mirror the signal conditions the interpreter raises: a command or
//! library routine returns `Err`, the error unwinds through `?` to the
//! command loop's outer handler, which messages the user and resumes.
//! `Throw` is not an error in the user-facing sense; it is the carrier for
//! catch/throw control flow and is intercepted by the matching catch frame.

use crate::{SymbolId, Value};
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, EdError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EdError {
    #[error("Wrong type argument: {expected}, {got:?}")]
    WrongType { expected: &'static str, got: Value },

    #[error("Args out of range: {0}")]
    WrongRange(String),

    #[error("Undefined color: {0}")]
    UndefinedColor(String),

    #[error("File error: {message} ({path})")]
    FileError { path: PathBuf, message: String },

    #[error("Symbol's function definition is void: {0}")]
    VoidFunction(String),

    #[error("Symbol's value as variable is void: {0}")]
    VoidVariable(String),

    #[error("Quit")]
    Quit,

    #[error("{message}")]
    Error { message: String, data: Vec<Value> },

    /// Catch/throw carrier. Never reaches the user; a catch frame with a
    /// matching tag converts it back into a normal return.
    #[error("No catch for tag")]
    Throw { tag: SymbolId, value: Value },
}

impl EdError {
    pub fn wrong_type(expected: &'static str, got: Value) -> Self {
        EdError::WrongType { expected, got }
    }

    pub fn error(message: impl Into<String>) -> Self {
        EdError::Error {
            message: message.into(),
            data: Vec::new(),
        }
    }

    pub fn file_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        EdError::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for the conditions the command loop's outer handler reports in
    /// the echo area (everything except the control-flow carriers).
    pub fn is_reportable(&self) -> bool {
        !matches!(self, EdError::Throw { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_kind() {
        let e = EdError::VoidFunction("no-such-command".into());
        assert_eq!(
            e.to_string(),
            "Symbol's function definition is void: no-such-command"
        );
        assert!(EdError::Quit.to_string().contains("Quit"));
    }

    #[test]
    fn throw_is_not_reportable() {
        let t = EdError::Throw {
            tag: SymbolId(0),
            value: Value::Nil,
        };
        assert!(!t.is_reportable());
        assert!(EdError::error("boom").is_reportable());
    }
}
