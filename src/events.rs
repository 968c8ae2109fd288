use std::sync::Arc;

use serde_json::{json, Value};

use crate::convert::IssueMapper;
use crate::fields::FieldSchemaCache;
use crate::jira::{JiraApi, JiraError};
use crate::logging;
use crate::timefmt;

/// Identity reported for webhook payloads that carry no user object, e.g.
/// automation-triggered version releases.
pub const SYSTEM_USER: &str = "__system_user__";

/// Normalized webhook event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    IssueCreated,
    IssueUpdated,
    IssueDeleted,
    CommentCreated,
    VersionReleased,
    Unknown,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::IssueCreated => "issue-created",
            EventKind::IssueUpdated => "issue-updated",
            EventKind::IssueDeleted => "issue-deleted",
            EventKind::CommentCreated => "comment-created",
            EventKind::VersionReleased => "version-released",
            EventKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error(transparent)]
    Api(#[from] JiraError),
    #[error("invalid release date '{text}': {source}")]
    BadReleaseDate {
        text: String,
        source: chrono::ParseError,
    },
}

/// Classifies inbound webhook payloads and builds the normalized event
/// payloads. Stateless per call; classification is a pure function of the
/// payload.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    mapper: IssueMapper,
    api: Arc<JiraApi>,
    fields: Arc<FieldSchemaCache>,
}

impl EventClassifier {
    pub fn new(mapper: IssueMapper, api: Arc<JiraApi>, fields: Arc<FieldSchemaCache>) -> Self {
        Self { mapper, api, fields }
    }

    /// Name of the user that triggered the webhook.
    pub fn detect_user(&self, body: &Value) -> String {
        match body.get("user") {
            Some(user) => user["name"].as_str().unwrap_or_default().to_string(),
            None => SYSTEM_USER.to_string(),
        }
    }

    pub fn classify(&self, body: &Value) -> EventKind {
        let webhook_event = body["webhookEvent"].as_str().unwrap_or_default();
        match webhook_event {
            "jira:issue_created" => EventKind::IssueCreated,
            "jira:issue_updated" => {
                if body.get("comment").is_some() {
                    EventKind::CommentCreated
                } else {
                    EventKind::IssueUpdated
                }
            }
            "jira:issue_deleted" => EventKind::IssueDeleted,
            "jira:version_released" => EventKind::VersionReleased,
            other => {
                logging::info(format!("unknown webhook event [{}]", other));
                EventKind::Unknown
            }
        }
    }

    pub fn created_issue_event(&self, body: &Value) -> Value {
        self.mapper.issue_to_app(&body["issue"])
    }

    pub fn deleted_issue_event(&self, body: &Value) -> Value {
        self.mapper.issue_to_app(&body["issue"])
    }

    /// Converted issue plus the ordered list of changed field names from the
    /// changelog. Custom field ids resolve to display names, degrading to
    /// the raw identifier when the cache cannot resolve them.
    pub fn updated_issue_event(&self, body: &Value) -> Value {
        let mut issue = self.mapper.issue_to_app(&body["issue"]);

        let mut modified: Vec<Value> = Vec::new();
        if let Some(items) = body["changelog"]["items"].as_array() {
            for item in items {
                let Some(field) = item["field"].as_str() else {
                    continue;
                };
                let name = if field.starts_with("customfield_") {
                    self.fields
                        .resolve_name(field)
                        .unwrap_or_else(|| field.to_string())
                } else {
                    field.to_string()
                };
                modified.push(Value::from(name));
            }
        }
        if let Some(issue_fields) = issue.as_object_mut() {
            issue_fields.insert("modifiedFields".into(), Value::Array(modified));
        }
        issue
    }

    /// Converted comment plus the key of the issue it belongs to.
    pub fn created_comment_event(&self, body: &Value) -> Value {
        let mut comment = self.mapper.comment_to_app(&body["comment"]);
        if let Some(comment_fields) = comment.as_object_mut() {
            comment_fields.insert("issueKey".into(), body["issue"]["key"].clone());
        }
        comment
    }

    /// Builds the version-released payload. This is the one conversion with
    /// a synchronous round-trip: the version carries only a project id, and
    /// the application wants the project key.
    pub fn released_version_event(&self, body: &Value) -> Result<Value, EventError> {
        let version = &body["version"];

        let release_date = match version["userReleaseDate"].as_str() {
            Some(text) => timefmt::parse_release_date(text)
                .map_err(|source| EventError::BadReleaseDate {
                    text: text.to_string(),
                    source,
                })?
                .map(Value::from)
                .unwrap_or(Value::Null),
            None => Value::Null,
        };

        let project_id = match &version["projectId"] {
            Value::String(id) => id.clone(),
            Value::Number(id) => id.to_string(),
            _ => String::new(),
        };
        let project = self.api.find_project(&project_id)?;

        Ok(json!({
            "id": version["id"].clone(),
            "name": version["name"].clone(),
            "description": version["description"].clone(),
            "releaseDate": release_date,
            "project": project["key"].clone(),
        }))
    }
}
