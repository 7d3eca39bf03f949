use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetUser {
    pub id: String,
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetMilestone {
    /// GraphQL node id, used when attaching issues.
    pub id: String,
    /// REST number, used for milestone writes.
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetIssue {
    pub id: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub closed: bool,
    #[serde(default)]
    pub assignees: Vec<TargetUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// The combined write pushed for every synced issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueUpdate {
    pub id: String,
    pub title: String,
    pub body: String,
    pub milestone_id: Option<String>,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueType {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardProject {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOption {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardField {
    pub id: String,
    pub name: String,
    /// Empty for anything but single-select fields.
    pub options: Vec<FieldOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardItem {
    pub id: String,
    /// Node id of the issue behind the item; `None` for drafts and pull requests.
    pub content_id: Option<String>,
}
