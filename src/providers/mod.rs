pub mod github;
pub mod jira;
pub mod paginate;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::source::{SourceEpic, SourceIssue};
use crate::model::target::{
    BoardField, BoardItem, BoardProject, IssueType, IssueUpdate, TargetIssue, TargetMilestone,
    TargetUser,
};

/// Read-only view over one source project.
#[async_trait]
pub trait SourceView: Send + Sync {
    fn name(&self) -> &str;
    /// All epics of the project, oldest first.
    async fn list_epics(&self) -> Result<Vec<SourceEpic>>;
    /// All tasks of the project, oldest first, each carrying its epic reference.
    async fn list_issues(&self) -> Result<Vec<SourceIssue>>;
    /// Tasks filed under one epic, oldest first.
    async fn epic_tasks(&self, epic_id: &str) -> Result<Vec<SourceIssue>>;
}

/// Read/write facade over one target repository and its boards.
#[async_trait]
pub trait TargetView: Send + Sync {
    fn name(&self) -> &str;

    async fn list_board_projects(&self) -> Result<Vec<BoardProject>>;
    async fn list_issue_types(&self) -> Result<Vec<IssueType>>;

    async fn list_milestones(&self) -> Result<Vec<TargetMilestone>>;
    async fn get_milestone(&self, number: u64) -> Result<Option<TargetMilestone>>;
    async fn create_milestone(&self, title: &str, description: &str) -> Result<TargetMilestone>;
    async fn update_milestone(&self, number: u64, title: &str, description: &str) -> Result<()>;

    async fn list_issues(&self) -> Result<Vec<TargetIssue>>;
    async fn create_issue(&self, issue_type_id: &str, title: &str, body: &str)
        -> Result<TargetIssue>;
    async fn update_issue(&self, update: &IssueUpdate) -> Result<()>;
    /// Not used by reconciliation; orphans are closed instead.
    async fn delete_issue(&self, issue_id: &str) -> Result<()>;

    async fn add_assignees(&self, issue_id: &str, user_ids: &[String]) -> Result<()>;
    async fn remove_assignees(&self, issue_id: &str, user_ids: &[String]) -> Result<()>;
    async fn get_user(&self, login: &str) -> Result<Option<TargetUser>>;

    async fn list_project_fields(&self, project_id: &str) -> Result<Vec<BoardField>>;
    async fn list_project_items(&self, project_id: &str) -> Result<Vec<BoardItem>>;
    /// Returns the board item id. Adding an issue twice returns the existing item.
    async fn add_project_item(&self, project_id: &str, content_id: &str) -> Result<String>;
    async fn set_single_select(
        &self,
        project_id: &str,
        item_id: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<()>;
}
