use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use super::paginate::{fetch_all, Page, PAGE_SIZE};
use super::TargetView;
use crate::error::{Result, SyncError};
use crate::model::target::{
    BoardField, BoardItem, BoardProject, FieldOption, IssueType, IssueUpdate, TargetIssue,
    TargetMilestone, TargetUser,
};

const USER_AGENT: &str = concat!("board-bridge/", env!("CARGO_PKG_VERSION"));

pub struct GitHubTarget {
    api_url: String,
    token: String,
    owner: String,
    repository: String,
    repository_id: OnceCell<String>,
    client: reqwest::Client,
}

impl GitHubTarget {
    pub fn new(token: String, owner: String, repository: String) -> Self {
        Self::with_api_url("https://api.github.com".into(), token, owner, repository)
    }

    pub fn with_api_url(api_url: String, token: String, owner: String, repository: String) -> Self {
        Self {
            api_url,
            token,
            owner,
            repository,
            repository_id: OnceCell::new(),
            client: reqwest::Client::new(),
        }
    }

    async fn graphql_raw<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<GqlResponse<T>> {
        let body = json!({ "query": query, "variables": variables });
        let resp = self
            .client
            .post(format!("{}/graphql", self.api_url))
            .bearer_auth(&self.token)
            .header("User-Agent", USER_AGENT)
            .header("GraphQL-Features", "issue_types")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let gql: GqlResponse<T> = self.graphql_raw(query, variables).await?;
        if !gql.errors.is_empty() {
            return Err(SyncError::Transport(gql.error_message()));
        }
        gql.data
            .ok_or_else(|| SyncError::Transport("no data in GraphQL response".into()))
    }

    fn repo_vars(&self, first: usize, after: Option<String>) -> Value {
        json!({
            "owner": self.owner,
            "name": self.repository,
            "first": first,
            "after": after,
        })
    }

    async fn repository_id(&self) -> Result<&str> {
        let id = self
            .repository_id
            .get_or_try_init(|| async {
                let data: RepositoryData<RepositoryNode> = self
                    .graphql(
                        REPOSITORY_QUERY,
                        json!({ "owner": self.owner, "name": self.repository }),
                    )
                    .await?;
                let repo = data.repository.ok_or_else(|| {
                    SyncError::not_found("repository", format!("{}/{}", self.owner, self.repository))
                })?;
                debug!(id = %repo.id, owner = %repo.owner.login, name = %repo.name, "resolved repository");
                Ok::<_, SyncError>(repo.id)
            })
            .await?;
        Ok(id.as_str())
    }

    /// Fetch one page of a connection hanging off the repository.
    async fn repo_page<N: DeserializeOwned>(
        &self,
        query: &str,
        connection: &'static str,
        after: Option<String>,
        first: usize,
    ) -> Result<Page<N>> {
        let data: RepositoryData<Value> = self.graphql(query, self.repo_vars(first, after)).await?;
        let repo = data.repository.ok_or_else(|| {
            SyncError::not_found("repository", format!("{}/{}", self.owner, self.repository))
        })?;
        let conn: Connection<N> = serde_json::from_value(repo[connection].clone())
            .map_err(|e| SyncError::Transport(format!("malformed {connection} page: {e}")))?;
        Ok(conn.into_page())
    }

    /// Fetch one page of a connection hanging off a ProjectV2 node.
    async fn project_page<N: DeserializeOwned>(
        &self,
        query: &str,
        connection: &'static str,
        project_id: &str,
        after: Option<String>,
        first: usize,
    ) -> Result<Page<N>> {
        let data: NodeData = self
            .graphql(
                query,
                json!({ "project": project_id, "first": first, "after": after }),
            )
            .await?;
        let node = data
            .node
            .ok_or_else(|| SyncError::not_found("board project", project_id))?;
        let conn: Connection<N> = serde_json::from_value(node[connection].clone())
            .map_err(|e| SyncError::Transport(format!("malformed {connection} page: {e}")))?;
        Ok(conn.into_page())
    }

    async fn mutate(&self, query: &str, input: Value) -> Result<Value> {
        self.graphql(query, json!({ "input": input })).await
    }

    fn milestones_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/milestones",
            self.api_url, self.owner, self.repository
        )
    }

    async fn rest_milestone(&self, req: reqwest::RequestBuilder) -> Result<TargetMilestone> {
        let milestone: RestMilestone = req
            .bearer_auth(&self.token)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(milestone.into())
    }
}

#[derive(Deserialize)]
struct GqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GqlError>,
}

impl<T> GqlResponse<T> {
    fn error_message(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn only_not_found(&self) -> bool {
        !self.errors.is_empty()
            && self
                .errors
                .iter()
                .all(|e| e.kind.as_deref() == Some("NOT_FOUND"))
    }
}

#[derive(Deserialize)]
struct GqlError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct Connection<N> {
    edges: Vec<Edge<N>>,
}

#[derive(Deserialize)]
struct Edge<N> {
    cursor: String,
    node: N,
}

impl<N> Connection<N> {
    fn into_page(self) -> Page<N> {
        let next = self.edges.last().map(|e| e.cursor.clone());
        Page::new(self.edges.into_iter().map(|e| e.node).collect(), next)
    }
}

#[derive(Deserialize)]
struct RepositoryData<R> {
    repository: Option<R>,
}

#[derive(Deserialize)]
struct NodeData {
    node: Option<Value>,
}

#[derive(Deserialize)]
struct RepositoryNode {
    id: String,
    name: String,
    owner: OwnerNode,
}

#[derive(Deserialize)]
struct OwnerNode {
    login: String,
}

#[derive(Deserialize)]
struct NamedNode {
    id: String,
    #[serde(alias = "title")]
    name: String,
}

#[derive(Deserialize)]
struct MilestoneNode {
    id: String,
    number: u64,
    title: String,
    description: Option<String>,
}

impl From<MilestoneNode> for TargetMilestone {
    fn from(m: MilestoneNode) -> Self {
        TargetMilestone {
            id: m.id,
            number: m.number,
            title: m.title,
            description: m.description.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct RestMilestone {
    node_id: String,
    number: u64,
    title: String,
    description: Option<String>,
}

impl From<RestMilestone> for TargetMilestone {
    fn from(m: RestMilestone) -> Self {
        TargetMilestone {
            id: m.node_id,
            number: m.number,
            title: m.title,
            description: m.description.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNode {
    id: String,
    number: u64,
    title: String,
    body: Option<String>,
    closed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    assignees: Option<UserConnection>,
    milestone: Option<IdNode>,
}

#[derive(Deserialize)]
struct UserConnection {
    nodes: Vec<TargetUser>,
}

#[derive(Deserialize)]
struct IdNode {
    id: String,
}

impl From<IssueNode> for TargetIssue {
    fn from(issue: IssueNode) -> Self {
        TargetIssue {
            id: issue.id,
            number: issue.number,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            closed: issue.closed,
            assignees: issue.assignees.map(|a| a.nodes).unwrap_or_default(),
            milestone_id: issue.milestone.map(|m| m.id),
            created_at: issue.created_at,
            updated_at: issue.updated_at,
            closed_at: issue.closed_at,
        }
    }
}

#[derive(Deserialize)]
struct FieldNode {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    options: Vec<FieldOptionNode>,
}

#[derive(Deserialize)]
struct FieldOptionNode {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ItemNode {
    id: String,
    content: Option<ContentNode>,
}

#[derive(Deserialize)]
struct ContentNode {
    id: Option<String>,
}

const REPOSITORY_QUERY: &str = r#"query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) { id name owner { login } }
}"#;

const PROJECTS_QUERY: &str = r#"query($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    projectsV2(first: $first, after: $after) { edges { cursor node { id title } } }
  }
}"#;

const ISSUE_TYPES_QUERY: &str = r#"query($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    issueTypes(first: $first, after: $after) { edges { cursor node { id name } } }
  }
}"#;

const MILESTONES_QUERY: &str = r#"query($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    milestones(first: $first, after: $after, orderBy: { field: NUMBER, direction: ASC }) {
      edges { cursor node { id number title description } }
    }
  }
}"#;

const MILESTONE_QUERY: &str = r#"query($owner: String!, $name: String!, $number: Int!) {
  repository(owner: $owner, name: $name) {
    milestone(number: $number) { id number title description }
  }
}"#;

const ISSUE_FIELDS: &str = "id number title body closed createdAt updatedAt closedAt \
    assignees(first: 100) { nodes { id login } } milestone { id }";

const USER_QUERY: &str = r#"query($login: String!) { user(login: $login) { id login } }"#;

const PROJECT_FIELDS_QUERY: &str = r#"query($project: ID!, $first: Int!, $after: String) {
  node(id: $project) {
    ... on ProjectV2 {
      fields(first: $first, after: $after) {
        edges {
          cursor
          node {
            ... on ProjectV2FieldCommon { id name }
            ... on ProjectV2SingleSelectField { options { id name } }
          }
        }
      }
    }
  }
}"#;

const PROJECT_ITEMS_QUERY: &str = r#"query($project: ID!, $first: Int!, $after: String) {
  node(id: $project) {
    ... on ProjectV2 {
      items(first: $first, after: $after) {
        edges { cursor node { id content { ... on Issue { id } } } }
      }
    }
  }
}"#;

const UPDATE_ISSUE: &str = r#"mutation($input: UpdateIssueInput!) {
  updateIssue(input: $input) { issue { id } }
}"#;

const DELETE_ISSUE: &str = r#"mutation($input: DeleteIssueInput!) {
  deleteIssue(input: $input) { clientMutationId }
}"#;

const ADD_ASSIGNEES: &str = r#"mutation($input: AddAssigneesToAssignableInput!) {
  addAssigneesToAssignable(input: $input) { clientMutationId }
}"#;

const REMOVE_ASSIGNEES: &str = r#"mutation($input: RemoveAssigneesFromAssignableInput!) {
  removeAssigneesFromAssignable(input: $input) { clientMutationId }
}"#;

const ADD_PROJECT_ITEM: &str = r#"mutation($input: AddProjectV2ItemByIdInput!) {
  addProjectV2ItemById(input: $input) { item { id } }
}"#;

const SET_FIELD_VALUE: &str = r#"mutation($input: UpdateProjectV2ItemFieldValueInput!) {
  updateProjectV2ItemFieldValue(input: $input) { projectV2Item { id } }
}"#;

fn issues_query() -> String {
    format!(
        r#"query($owner: String!, $name: String!, $first: Int!, $after: String) {{
  repository(owner: $owner, name: $name) {{
    issues(first: $first, after: $after, orderBy: {{ field: CREATED_AT, direction: ASC }}) {{
      edges {{ cursor node {{ {ISSUE_FIELDS} }} }}
    }}
  }}
}}"#
    )
}

fn create_issue_mutation() -> String {
    format!(
        r#"mutation($input: CreateIssueInput!) {{
  createIssue(input: $input) {{ issue {{ {ISSUE_FIELDS} }} }}
}}"#
    )
}

#[async_trait]
impl TargetView for GitHubTarget {
    fn name(&self) -> &str {
        "GitHub"
    }

    async fn list_board_projects(&self) -> Result<Vec<BoardProject>> {
        let nodes: Vec<NamedNode> = fetch_all(PAGE_SIZE, |after, first| {
            self.repo_page(PROJECTS_QUERY, "projectsV2", after, first)
        })
        .await?;
        Ok(nodes
            .into_iter()
            .map(|n| BoardProject {
                id: n.id,
                title: n.name,
            })
            .collect())
    }

    async fn list_issue_types(&self) -> Result<Vec<IssueType>> {
        let nodes: Vec<NamedNode> = fetch_all(PAGE_SIZE, |after, first| {
            self.repo_page(ISSUE_TYPES_QUERY, "issueTypes", after, first)
        })
        .await?;
        Ok(nodes
            .into_iter()
            .map(|n| IssueType {
                id: n.id,
                name: n.name,
            })
            .collect())
    }

    async fn list_milestones(&self) -> Result<Vec<TargetMilestone>> {
        let nodes: Vec<MilestoneNode> = fetch_all(PAGE_SIZE, |after, first| {
            self.repo_page(MILESTONES_QUERY, "milestones", after, first)
        })
        .await?;
        Ok(nodes.into_iter().map(Into::into).collect())
    }

    async fn get_milestone(&self, number: u64) -> Result<Option<TargetMilestone>> {
        #[derive(Deserialize)]
        struct Repo {
            milestone: Option<MilestoneNode>,
        }
        let data: RepositoryData<Repo> = self
            .graphql(
                MILESTONE_QUERY,
                json!({ "owner": self.owner, "name": self.repository, "number": number }),
            )
            .await?;
        Ok(data
            .repository
            .and_then(|r| r.milestone)
            .map(Into::into))
    }

    async fn create_milestone(&self, title: &str, description: &str) -> Result<TargetMilestone> {
        let req = self
            .client
            .post(self.milestones_url())
            .json(&json!({ "title": title, "description": description }));
        self.rest_milestone(req).await
    }

    async fn update_milestone(&self, number: u64, title: &str, description: &str) -> Result<()> {
        let req = self
            .client
            .patch(format!("{}/{number}", self.milestones_url()))
            .json(&json!({ "title": title, "description": description }));
        self.rest_milestone(req).await?;
        Ok(())
    }

    async fn list_issues(&self) -> Result<Vec<TargetIssue>> {
        let query = issues_query();
        let nodes: Vec<IssueNode> = fetch_all(PAGE_SIZE, |after, first| {
            self.repo_page(&query, "issues", after, first)
        })
        .await?;
        Ok(nodes.into_iter().map(Into::into).collect())
    }

    async fn create_issue(
        &self,
        issue_type_id: &str,
        title: &str,
        body: &str,
    ) -> Result<TargetIssue> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Created {
            create_issue: CreatedIssue,
        }
        #[derive(Deserialize)]
        struct CreatedIssue {
            issue: IssueNode,
        }

        let repository_id = self.repository_id().await?;
        let created: Created = self
            .graphql(
                &create_issue_mutation(),
                json!({ "input": {
                    "repositoryId": repository_id,
                    "title": title,
                    "body": body,
                    "issueTypeId": issue_type_id,
                }}),
            )
            .await?;
        Ok(created.create_issue.issue.into())
    }

    async fn update_issue(&self, update: &IssueUpdate) -> Result<()> {
        let state = if update.closed { "CLOSED" } else { "OPEN" };
        trace!(id = %update.id, state, "updateIssue");
        self.mutate(
            UPDATE_ISSUE,
            json!({
                "id": update.id,
                "title": update.title,
                "body": update.body,
                "milestoneId": update.milestone_id,
                "state": state,
            }),
        )
        .await?;
        Ok(())
    }

    async fn delete_issue(&self, issue_id: &str) -> Result<()> {
        self.mutate(DELETE_ISSUE, json!({ "issueId": issue_id }))
            .await?;
        Ok(())
    }

    async fn add_assignees(&self, issue_id: &str, user_ids: &[String]) -> Result<()> {
        self.mutate(
            ADD_ASSIGNEES,
            json!({ "assignableId": issue_id, "assigneeIds": user_ids }),
        )
        .await?;
        Ok(())
    }

    async fn remove_assignees(&self, issue_id: &str, user_ids: &[String]) -> Result<()> {
        self.mutate(
            REMOVE_ASSIGNEES,
            json!({ "assignableId": issue_id, "assigneeIds": user_ids }),
        )
        .await?;
        Ok(())
    }

    async fn get_user(&self, login: &str) -> Result<Option<TargetUser>> {
        #[derive(Deserialize)]
        struct UserData {
            user: Option<TargetUser>,
        }

        let gql: GqlResponse<UserData> = self
            .graphql_raw(USER_QUERY, json!({ "login": login }))
            .await?;
        if !gql.errors.is_empty() && !gql.only_not_found() {
            return Err(SyncError::Transport(gql.error_message()));
        }
        Ok(gql.data.and_then(|d| d.user))
    }

    async fn list_project_fields(&self, project_id: &str) -> Result<Vec<BoardField>> {
        let nodes: Vec<FieldNode> = fetch_all(PAGE_SIZE, |after, first| {
            self.project_page(PROJECT_FIELDS_QUERY, "fields", project_id, after, first)
        })
        .await?;
        Ok(nodes
            .into_iter()
            .filter_map(|f| {
                Some(BoardField {
                    id: f.id?,
                    name: f.name?,
                    options: f
                        .options
                        .into_iter()
                        .map(|o| FieldOption {
                            id: o.id,
                            name: o.name,
                        })
                        .collect(),
                })
            })
            .collect())
    }

    async fn list_project_items(&self, project_id: &str) -> Result<Vec<BoardItem>> {
        let nodes: Vec<ItemNode> = fetch_all(PAGE_SIZE, |after, first| {
            self.project_page(PROJECT_ITEMS_QUERY, "items", project_id, after, first)
        })
        .await?;
        Ok(nodes
            .into_iter()
            .map(|n| BoardItem {
                id: n.id,
                content_id: n.content.and_then(|c| c.id),
            })
            .collect())
    }

    async fn add_project_item(&self, project_id: &str, content_id: &str) -> Result<String> {
        let data = self
            .mutate(
                ADD_PROJECT_ITEM,
                json!({ "projectId": project_id, "contentId": content_id }),
            )
            .await?;
        data["addProjectV2ItemById"]["item"]["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| SyncError::Transport("addProjectV2ItemById returned no item".into()))
    }

    async fn set_single_select(
        &self,
        project_id: &str,
        item_id: &str,
        field_id: &str,
        option_id: &str,
    ) -> Result<()> {
        self.mutate(
            SET_FIELD_VALUE,
            json!({
                "projectId": project_id,
                "itemId": item_id,
                "fieldId": field_id,
                "value": { "singleSelectOptionId": option_id },
            }),
        )
        .await?;
        Ok(())
    }
}
