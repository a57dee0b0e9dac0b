use std::fmt;

use thiserror::Error;

use crate::render::HEADER_MARKER;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("not a swimlane document: missing `{marker}` header marker", marker = HEADER_MARKER)]
    MissingHeader,
    #[error("document contains no lanes")]
    NoLanes,
    #[error("document contains no steps")]
    NoSteps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetType {
    Diagram,
    Lane,
    Step,
    Connection,
    PhaseGroup,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetType::Diagram => "diagram",
            TargetType::Lane => "lane",
            TargetType::Step => "step",
            TargetType::Connection => "connection",
            TargetType::PhaseGroup => "phase group",
        };
        f.write_str(name)
    }
}

/// Why a command left the store untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: TargetType, id: String },
    #[error("a connection with the same endpoints and handles already exists")]
    DuplicateConnection,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
}

impl CommandError {
    pub fn not_found(kind: TargetType, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}
