use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUser {
    /// Account id in the source tracker.
    pub id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEpic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// A task as seen in the source tracker. Tasks point at their epic; epics
/// never own their tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceIssue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Workflow state name in the source vocabulary, mapped later by
    /// [`crate::model::status::StatusMapper`].
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<SourceUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<String>,
}
