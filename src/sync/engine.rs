use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::field_cache::FieldCache;
use crate::bridge::UserBridge;
use crate::error::{Result, SyncError};
use crate::model::source::{SourceIssue, SourceUser};
use crate::model::status::{BoardStatus, StatusMapper};
use crate::model::target::{BoardProject, IssueType, IssueUpdate, TargetIssue, TargetUser};
use crate::model::{correlation_key, correlation_title};
use crate::providers::{SourceView, TargetView};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Title of the board project issues are tracked on.
    pub board: String,
    pub issue_type: String,
    pub status_field: String,
    pub close_done: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            board: String::new(),
            issue_type: "Task".into(),
            status_field: "Status".into(),
            close_done: false,
        }
    }
}

/// What one pass did. Only produced when the whole pass succeeded.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub milestones_created: usize,
    /// Milestones that existed before the pass and were re-pushed.
    pub milestones_updated: usize,
    pub issues_created: usize,
    pub issues_updated: usize,
    pub issues_closed: usize,
    pub assignee_additions: usize,
    pub assignee_removals: usize,
    pub unmapped_assignees: usize,
    pub elapsed_ms: u64,
}

pub fn placeholder_title(source_id: &str) -> String {
    correlation_title(source_id, "Currently syncing...")
}

/// Target issues of the repository, indexed by correlation key.
struct TargetIndex {
    issues: Vec<TargetIssue>,
    by_key: HashMap<String, usize>,
}

impl TargetIndex {
    fn new(mut issues: Vec<TargetIssue>) -> Self {
        issues.sort_by(|a, b| (a.created_at, a.number).cmp(&(b.created_at, b.number)));

        let mut by_key = HashMap::new();
        for (idx, issue) in issues.iter().enumerate() {
            let Some(key) = correlation_key(&issue.title) else {
                continue;
            };
            if let Some(&kept) = by_key.get(key) {
                let kept: &TargetIssue = &issues[kept];
                warn!(
                    key,
                    kept = kept.number,
                    ignored = issue.number,
                    "several target issues share a correlation key, keeping the oldest"
                );
                continue;
            }
            by_key.insert(key.to_string(), idx);
        }

        Self { issues, by_key }
    }

    fn get(&self, key: &str) -> Option<&TargetIssue> {
        self.by_key.get(key).map(|&idx| &self.issues[idx])
    }

    fn insert(&mut self, key: &str, issue: TargetIssue) {
        self.issues.push(issue);
        self.by_key.insert(key.to_string(), self.issues.len() - 1);
    }

    /// Correlated issues in creation order.
    fn correlated(&self) -> Vec<(&str, &TargetIssue)> {
        let mut entries: Vec<(&str, usize)> =
            self.by_key.iter().map(|(k, &idx)| (k.as_str(), idx)).collect();
        entries.sort_by_key(|&(_, idx)| idx);
        entries
            .into_iter()
            .map(|(k, idx)| (k, &self.issues[idx]))
            .collect()
    }

    fn mark_closed(&mut self, key: &str) {
        if let Some(&idx) = self.by_key.get(key) {
            self.issues[idx].closed = true;
        }
    }
}

/// Mutable state owned by a single pass and dropped with it.
struct Pass {
    project: BoardProject,
    issue_type: IssueType,
    fields: FieldCache,
    users: HashMap<String, Option<TargetUser>>,
    milestones: HashMap<String, String>,
    report: PassReport,
}

pub struct ReconciliationEngine {
    source: Arc<dyn SourceView>,
    target: Arc<dyn TargetView>,
    bridge: UserBridge,
    options: EngineOptions,
}

impl ReconciliationEngine {
    pub fn new(
        source: Arc<dyn SourceView>,
        target: Arc<dyn TargetView>,
        bridge: UserBridge,
        options: EngineOptions,
    ) -> Self {
        Self {
            source,
            target,
            bridge,
            options,
        }
    }

    /// Run one full reconciliation pass.
    ///
    /// The first failure aborts the pass. Mutations applied before the failure
    /// are kept; the next pass picks up from whatever state they left.
    pub async fn run_pass(&self) -> Result<PassReport> {
        let started = Instant::now();
        info!(
            source = self.source.name(),
            target = self.target.name(),
            board = %self.options.board,
            "starting reconciliation pass"
        );

        let mut pass = self.resolve_board().await?;
        self.reconcile_milestones(&mut pass).await?;

        let source_issues = self.source.list_issues().await?;
        let statuses = source_issues
            .iter()
            .map(|issue| StatusMapper::map(&issue.status))
            .collect::<Result<Vec<_>>>()?;
        let mut index = TargetIndex::new(self.target.list_issues().await?);
        info!(
            source = source_issues.len(),
            target = index.issues.len(),
            "fetched item snapshots"
        );

        self.close_orphans(&source_issues, &mut index, &mut pass)
            .await?;

        for (issue, status) in source_issues.iter().zip(statuses) {
            self.upsert(issue, status, &mut index, &mut pass).await?;
        }

        pass.report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            milestones_created = pass.report.milestones_created,
            issues_created = pass.report.issues_created,
            issues_updated = pass.report.issues_updated,
            issues_closed = pass.report.issues_closed,
            assignee_additions = pass.report.assignee_additions,
            assignee_removals = pass.report.assignee_removals,
            unmapped_assignees = pass.report.unmapped_assignees,
            elapsed_ms = pass.report.elapsed_ms,
            "reconciliation pass finished"
        );
        Ok(pass.report)
    }

    async fn resolve_board(&self) -> Result<Pass> {
        let project = self
            .target
            .list_board_projects()
            .await?
            .into_iter()
            .find(|p| p.title == self.options.board)
            .ok_or_else(|| SyncError::not_found("board project", self.options.board.as_str()))?;

        let issue_type = self
            .target
            .list_issue_types()
            .await?
            .into_iter()
            .find(|t| t.name == self.options.issue_type)
            .ok_or_else(|| SyncError::not_found("issue type", self.options.issue_type.as_str()))?;

        debug!(project = %project.id, issue_type = %issue_type.id, "resolved board context");
        Ok(Pass {
            fields: FieldCache::new(project.id.clone(), self.options.status_field.clone()),
            project,
            issue_type,
            users: HashMap::new(),
            milestones: HashMap::new(),
            report: PassReport::default(),
        })
    }

    async fn reconcile_milestones(&self, pass: &mut Pass) -> Result<()> {
        let epics = self.source.list_epics().await?;
        let mut existing = HashMap::new();
        for milestone in self.target.list_milestones().await? {
            if let Some(key) = correlation_key(&milestone.title) {
                existing.entry(key.to_string()).or_insert(milestone);
            }
        }

        for epic in &epics {
            let title = correlation_title(&epic.id, &epic.title);
            let (milestone, created) = match existing.get(&epic.id) {
                Some(m) => (m.clone(), false),
                None => {
                    let created = self
                        .target
                        .create_milestone(&title, &epic.description)
                        .await?;
                    info!(epic = %epic.id, milestone = created.number, "created milestone");
                    pass.report.milestones_created += 1;
                    existing.insert(epic.id.clone(), created.clone());
                    (created, true)
                }
            };

            // The push is unconditional; only pre-existing milestones count as updated.
            self.target
                .update_milestone(milestone.number, &title, &epic.description)
                .await?;
            if !created {
                pass.report.milestones_updated += 1;
            }
            pass.milestones.insert(epic.id.clone(), milestone.id);
        }

        debug!(epics = epics.len(), "milestones reconciled");
        Ok(())
    }

    async fn close_orphans(
        &self,
        source_issues: &[SourceIssue],
        index: &mut TargetIndex,
        pass: &mut Pass,
    ) -> Result<()> {
        let live: HashSet<&str> = source_issues.iter().map(|i| i.id.as_str()).collect();
        let orphans: Vec<(String, IssueUpdate)> = index
            .correlated()
            .into_iter()
            .filter(|(key, issue)| !live.contains(key) && !issue.closed)
            .map(|(key, issue)| {
                let update = IssueUpdate {
                    id: issue.id.clone(),
                    title: issue.title.clone(),
                    body: issue.body.clone(),
                    milestone_id: issue.milestone_id.clone(),
                    closed: true,
                };
                (key.to_string(), update)
            })
            .collect();

        for (key, update) in orphans {
            self.target.update_issue(&update).await?;
            info!(key = %key, issue = %update.id, "closed orphaned issue");
            index.mark_closed(&key);
            pass.report.issues_closed += 1;
        }
        Ok(())
    }

    async fn upsert(
        &self,
        issue: &SourceIssue,
        status: BoardStatus,
        index: &mut TargetIndex,
        pass: &mut Pass,
    ) -> Result<()> {
        let current = match index.get(&issue.id) {
            Some(existing) => existing.clone(),
            None => {
                let created = self
                    .target
                    .create_issue(&pass.issue_type.id, &placeholder_title(&issue.id), "")
                    .await?;
                info!(key = %issue.id, issue = created.number, "created issue");
                pass.report.issues_created += 1;
                index.insert(&issue.id, created.clone());
                created
            }
        };

        let milestone_id = match &issue.epic_id {
            Some(epic) => {
                let found = pass.milestones.get(epic).cloned();
                if found.is_none() {
                    warn!(key = %issue.id, epic = %epic, "parent epic has no milestone");
                }
                found
            }
            None => None,
        };

        let previous: BTreeSet<String> = current.assignees.iter().map(|u| u.id.clone()).collect();
        let desired = match &issue.assignee {
            None => BTreeSet::new(),
            Some(user) => match self.resolve_user(user, pass).await? {
                Some(target_user) => BTreeSet::from([target_user.id]),
                None => {
                    warn!(
                        key = %issue.id,
                        user = %user.display_name,
                        "source assignee has no bridge mapping, keeping current assignees"
                    );
                    pass.report.unmapped_assignees += 1;
                    previous.clone()
                }
            },
        };

        let removed: Vec<String> = previous.difference(&desired).cloned().collect();
        let added: Vec<String> = desired.difference(&previous).cloned().collect();
        if !removed.is_empty() {
            self.target.remove_assignees(&current.id, &removed).await?;
            pass.report.assignee_removals += 1;
        }
        if !added.is_empty() {
            self.target.add_assignees(&current.id, &added).await?;
            pass.report.assignee_additions += 1;
        }

        let update = IssueUpdate {
            id: current.id.clone(),
            title: correlation_title(&issue.id, &issue.title),
            body: issue.description.clone(),
            milestone_id,
            closed: self.options.close_done && status == BoardStatus::Done,
        };
        self.target.update_issue(&update).await?;
        pass.report.issues_updated += 1;

        let target = self.target.as_ref();
        let item = pass.fields.register(target, &current.id).await?;
        let field = pass.fields.status_field_id(target).await?;
        let option = pass.fields.status_option_id(target, status).await?;
        self.target
            .set_single_select(&pass.project.id, &item, &field, &option)
            .await?;

        debug!(key = %issue.id, issue = current.number, %status, "synced issue");
        Ok(())
    }

    async fn resolve_user(&self, user: &SourceUser, pass: &mut Pass) -> Result<Option<TargetUser>> {
        if let Some(hit) = pass.users.get(&user.id) {
            return Ok(hit.clone());
        }
        let resolved = self.bridge.map(self.target.as_ref(), user).await?;
        pass.users.insert(user.id.clone(), resolved.clone());
        Ok(resolved)
    }
}
