use thiserror::Error;

use crate::limits::ToolKind;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{} limit reached ({limit})", tool.display_name())]
    LimitReached { tool: ToolKind, limit: usize },

    #[error("cannot create a new {tool}: {reason}")]
    CreationBlocked { tool: ToolKind, reason: &'static str },

    #[error("no {tool} with id '{id}'")]
    NotFound { tool: ToolKind, id: String },

    #[error("default {tool} '{id}' cannot be deleted")]
    NotDeletable { tool: ToolKind, id: String },

    #[error("{tool} '{id}' is busy: {reason}")]
    Busy {
        tool: ToolKind,
        id: String,
        reason: &'static str,
    },

    #[error("laps can only be recorded while the stopwatch is running")]
    StopwatchNotRunning,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    pub fn not_found(tool: ToolKind, id: &str) -> Self {
        EngineError::NotFound {
            tool,
            id: id.to_string(),
        }
    }
}
