use std::io;
use std::path::PathBuf;

use crate::debugger::CalcModel;

pub type Result<T> = std::result::Result<T, DebuggerError>;

#[derive(Debug, thiserror::Error)]
pub enum DebuggerError {
    #[error("no source location for {address:04x} on page {page:02x} (ram: {is_ram})")]
    Unresolved { page: u8, address: u16, is_ram: bool },
    #[error("no code at {}:{line}", file.display())]
    NoCode { file: PathBuf, line: usize },
    #[error("unable to read {}:{line}", file.display())]
    SourceUnavailable { file: PathBuf, line: usize },
    #[error("unable to pause here (searched {steps} instructions)")]
    PauseExhausted { steps: usize },
    #[error("no enclosing caller to step out to")]
    EmptyCallStack,
    #[error("unsupported calculator model {0:?}")]
    UnsupportedModel(CalcModel),
    #[error("tried looking up a local bcall {0:04x}")]
    LocalBcall(u16),
    #[error("application {0:?} not found on calc")]
    AppNotFound(String),
    #[error("invalid condition {text:?}: {reason}")]
    InvalidCondition { text: String, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DebuggerError {
    pub fn invalid_condition<S, R>(text: S, reason: R) -> Self
    where
        S: Into<String>,
        R: Into<String>,
    {
        DebuggerError::InvalidCondition {
            text: text.into(),
            reason: reason.into(),
        }
    }
}
