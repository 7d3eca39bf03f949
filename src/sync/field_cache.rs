use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, SyncError};
use crate::model::status::BoardStatus;
use crate::model::target::BoardField;
use crate::providers::TargetView;

/// Lookaside cache for one board, owned by one reconciliation pass.
///
/// Each map is filled on first use and never invalidated; the cache is
/// dropped with the pass.
pub struct FieldCache {
    project_id: String,
    status_field: String,
    fields: Option<HashMap<String, BoardField>>,
    status_options: Option<HashMap<BoardStatus, String>>,
    items: Option<HashMap<String, String>>,
}

impl FieldCache {
    pub fn new(project_id: impl Into<String>, status_field: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            status_field: status_field.into(),
            fields: None,
            status_options: None,
            items: None,
        }
    }

    async fn fields(&mut self, target: &dyn TargetView) -> Result<&HashMap<String, BoardField>> {
        if self.fields.is_none() {
            let fields = target.list_project_fields(&self.project_id).await?;
            debug!(project = %self.project_id, count = fields.len(), "loaded board fields");
            self.fields = Some(fields.into_iter().map(|f| (f.name.clone(), f)).collect());
        }
        Ok(self.fields.get_or_insert_with(HashMap::new))
    }

    pub async fn field_id(&mut self, target: &dyn TargetView, name: &str) -> Result<String> {
        self.fields(target)
            .await?
            .get(name)
            .map(|f| f.id.clone())
            .ok_or_else(|| SyncError::not_found("board field", name))
    }

    pub async fn status_field_id(&mut self, target: &dyn TargetView) -> Result<String> {
        let name = self.status_field.clone();
        self.field_id(target, &name).await
    }

    pub async fn status_option_id(
        &mut self,
        target: &dyn TargetView,
        status: BoardStatus,
    ) -> Result<String> {
        if self.status_options.is_none() {
            let name = self.status_field.clone();
            let field = self
                .fields(target)
                .await?
                .get(&name)
                .ok_or_else(|| SyncError::not_found("board field", name.as_str()))?;
            let options = [BoardStatus::Todo, BoardStatus::InProgress, BoardStatus::Done]
                .into_iter()
                .filter_map(|status| {
                    field
                        .options
                        .iter()
                        .find(|o| o.name.eq_ignore_ascii_case(status.option_name()))
                        .map(|o| (status, o.id.clone()))
                })
                .collect();
            self.status_options = Some(options);
        }

        self.status_options
            .get_or_insert_with(HashMap::new)
            .get(&status)
            .cloned()
            .ok_or_else(|| SyncError::not_found("status option", status.option_name()))
    }

    async fn items(&mut self, target: &dyn TargetView) -> Result<&mut HashMap<String, String>> {
        if self.items.is_none() {
            let items = target.list_project_items(&self.project_id).await?;
            debug!(project = %self.project_id, count = items.len(), "loaded board items");
            self.items = Some(
                items
                    .into_iter()
                    .filter_map(|item| Some((item.content_id?, item.id)))
                    .collect(),
            );
        }
        Ok(self.items.get_or_insert_with(HashMap::new))
    }

    /// Board item already holding the issue, if any.
    pub async fn item_id(&mut self, target: &dyn TargetView, issue_id: &str) -> Result<Option<String>> {
        Ok(self.items(target).await?.get(issue_id).cloned())
    }

    /// Put the issue on the board unless it already is, returning its item id.
    pub async fn register(&mut self, target: &dyn TargetView, issue_id: &str) -> Result<String> {
        if let Some(item) = self.item_id(target, issue_id).await? {
            return Ok(item);
        }
        let item = target.add_project_item(&self.project_id, issue_id).await?;
        debug!(issue = issue_id, item = %item, "registered issue on board");
        self.items(target)
            .await?
            .insert(issue_id.to_string(), item.clone());
        Ok(item)
    }
}
