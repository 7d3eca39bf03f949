use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Workflow states the source project is allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceStatus {
    Backlog,
    ToDo,
    InProgress,
    InReview,
    Done,
}

impl SourceStatus {
    pub const ALL: [SourceStatus; 5] = [
        SourceStatus::Backlog,
        SourceStatus::ToDo,
        SourceStatus::InProgress,
        SourceStatus::InReview,
        SourceStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceStatus::Backlog => "Backlog",
            SourceStatus::ToDo => "To Do",
            SourceStatus::InProgress => "In Progress",
            SourceStatus::InReview => "In Review",
            SourceStatus::Done => "Done",
        }
    }
}

impl FromStr for SourceStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        SourceStatus::ALL
            .into_iter()
            .find(|status| status.as_str().to_lowercase() == normalized)
            .ok_or_else(|| SyncError::MappingExhausted(s.to_string()))
    }
}

/// The three columns of the target board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoardStatus {
    Todo,
    InProgress,
    Done,
}

impl BoardStatus {
    /// Option name of the board's single-select status field.
    pub fn option_name(self) -> &'static str {
        match self {
            BoardStatus::Todo => "Todo",
            BoardStatus::InProgress => "In Progress",
            BoardStatus::Done => "Done",
        }
    }
}

impl fmt::Display for BoardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.option_name())
    }
}

pub struct StatusMapper;

impl StatusMapper {
    pub fn map_status(status: SourceStatus) -> BoardStatus {
        match status {
            SourceStatus::Backlog | SourceStatus::ToDo => BoardStatus::Todo,
            SourceStatus::InProgress | SourceStatus::InReview => BoardStatus::InProgress,
            SourceStatus::Done => BoardStatus::Done,
        }
    }

    /// Map a raw source status name. Unknown names are an error, never a default.
    pub fn map(raw: &str) -> Result<BoardStatus, SyncError> {
        raw.parse().map(Self::map_status)
    }
}
