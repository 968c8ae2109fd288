//! The application-facing boundary: exposed functions wrapping the REST
//! client and mapper, and the webhook entry point that turns JIRA
//! notifications into normalized application events.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::convert::IssueMapper;
use crate::events::{EventClassifier, EventKind};
use crate::fields::FieldSchemaCache;
use crate::jira::{JiraApi, JiraError};
use crate::logging;
use crate::metrics::Metrics;

/// Receives the normalized events produced from webhooks. The process
/// binary installs a logging sink; applications embed their own.
pub trait EventSink: Send + Sync {
    fn send(&self, event: &str, payload: Value);
}

/// Sink that only logs, for running the bridge standalone.
pub struct LoggingSink;

impl EventSink for LoggingSink {
    fn send(&self, event: &str, payload: Value) {
        logging::info(format!("event {} payload {}", event, payload));
    }
}

pub struct JiraEndpoint {
    api: Arc<JiraApi>,
    fields: Arc<FieldSchemaCache>,
    mapper: IssueMapper,
    classifier: EventClassifier,
    username: String,
    sink: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
}

impl JiraEndpoint {
    pub fn new(
        api: Arc<JiraApi>,
        fields: Arc<FieldSchemaCache>,
        username: String,
        sink: Arc<dyn EventSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mapper = IssueMapper::new(Arc::clone(&fields));
        let classifier =
            EventClassifier::new(mapper.clone(), Arc::clone(&api), Arc::clone(&fields));
        Self {
            api,
            fields,
            mapper,
            classifier,
            username,
            sink,
            metrics,
        }
    }

    /// Warms the field cache. Failure is logged and tolerated: the cache
    /// repairs itself lazily once the service is reachable.
    pub fn warm_field_cache(&self) {
        if let Err(err) = self.fields.refresh() {
            logging::warn(format!(
                "field cache warm-up failed, will retry on demand: {}",
                err
            ));
        }
    }

    pub fn find_issues(&self, params: &Value) -> Result<Value, JiraError> {
        let query = params["query"].as_str().unwrap_or_default();
        let result =
            self.api
                .find_issues(query, int_param(params, "offset"), int_param(params, "size"))?;
        Ok(self
            .mapper
            .search_result_to_app(Some(&result))
            .unwrap_or(Value::Null))
    }

    pub fn find_issue(&self, params: &Value) -> Result<Value, JiraError> {
        let key = required_str(params, "key")?;
        let issue = self.api.find_issue(key)?;
        Ok(self.mapper.issue_to_app(&issue))
    }

    pub fn create_issue(&self, params: &Value) -> Result<Value, JiraError> {
        let outbound = self.mapper.issue_to_jira(params);
        let created = self.api.create_issue(&outbound)?;
        let key = created["key"].as_str().unwrap_or_default();
        let issue = self.api.find_issue(key)?;
        Ok(self.mapper.issue_to_app(&issue))
    }

    pub fn update_issue(&self, params: &Value) -> Result<Value, JiraError> {
        let key = required_str(params, "key")?.to_string();
        let outbound = self.mapper.issue_to_jira(params);
        self.api.update_issue(&key, &outbound)?;
        let issue = self.api.find_issue(&key)?;
        Ok(self.mapper.issue_to_app(&issue))
    }

    pub fn delete_issue(&self, params: &Value) -> Result<Value, JiraError> {
        let key = required_str(params, "key")?;
        self.api.delete_issue(key)?;
        Ok(json!({"key": key}))
    }

    pub fn add_comment(&self, params: &Value) -> Result<Value, JiraError> {
        let issue_key = required_str(params, "issueKey")?;
        let outbound = self.mapper.comment_to_jira(params);
        let comment = self.api.add_comment(issue_key, &outbound)?;
        Ok(self.mapper.comment_to_app(&comment))
    }

    /// Validates the requested transition against the ones currently open
    /// for the issue before performing it, then returns the re-fetched
    /// converted issue.
    pub fn do_transition(&self, params: &Value) -> Result<Value, JiraError> {
        let issue_key = required_str(params, "issueKey")?.to_string();
        let requested = params["transitionId"]
            .as_str()
            .or_else(|| params["transitionName"].as_str())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                JiraError::InvalidArgument(
                    "you have to specify either transitionId or transitionName".into(),
                )
            })?
            .to_string();

        let listing = self.api.find_transitions(&issue_key)?;
        let transitions = listing["transitions"].as_array().cloned().unwrap_or_default();
        if transitions.is_empty() {
            return Err(JiraError::InvalidArgument(format!(
                "there are no possible transitions for issue [{}]",
                issue_key
            )));
        }

        let transition_id = transitions
            .iter()
            .find(|transition| {
                transition["id"].as_str() == Some(requested.as_str())
                    || transition["name"]
                        .as_str()
                        .is_some_and(|name| name.eq_ignore_ascii_case(&requested))
            })
            .and_then(|transition| transition["id"].as_str().map(str::to_string))
            .ok_or_else(|| {
                JiraError::InvalidArgument(format!(
                    "transition [{}] is not valid for issue [{}]",
                    requested, issue_key
                ))
            })?;

        self.api.transition_issue(&issue_key, &transition_id)?;
        let issue = self.api.find_issue(&issue_key)?;
        Ok(self.mapper.issue_to_app(&issue))
    }

    pub fn server_info(&self, params: &Value) -> Result<Value, JiraError> {
        self.api
            .server_info(params["doHealthCheck"].as_bool().unwrap_or(false))
    }

    /// Webhook entry point. Events caused by the integration's own account
    /// are suppressed, and failed conversions drop the event. The reply is
    /// success in every case: an error status would only make JIRA retry.
    pub fn handle_webhook(&self, body: &Value) -> Value {
        self.metrics.inc_webhook_received();

        let user = self.classifier.detect_user(body);
        if user == self.username {
            logging::info("suppressed event triggered by the integration user");
            return webhook_ok();
        }

        let kind = self.classifier.classify(body);
        match kind {
            EventKind::IssueCreated => {
                self.emit(kind, self.classifier.created_issue_event(body));
            }
            EventKind::IssueUpdated => {
                self.emit(kind, self.classifier.updated_issue_event(body));
            }
            EventKind::IssueDeleted => {
                self.emit(kind, self.classifier.deleted_issue_event(body));
            }
            EventKind::CommentCreated => {
                self.emit(kind, self.classifier.created_comment_event(body));
            }
            EventKind::VersionReleased => match self.classifier.released_version_event(body) {
                Ok(event) => self.emit(kind, event),
                Err(err) => {
                    logging::warn(format!("dropped version released event: {}", err));
                }
            },
            EventKind::Unknown => {}
        }

        webhook_ok()
    }

    fn emit(&self, kind: EventKind, payload: Value) {
        self.metrics.inc_event_emitted();
        self.sink.send(kind.name(), payload);
    }
}

fn webhook_ok() -> Value {
    json!({"status": "ok"})
}

/// Integer parameter that tolerates the string form callers sometimes send.
fn int_param(params: &Value, key: &str) -> Option<i64> {
    let value = &params[key];
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|text| text.parse().ok()))
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, JiraError> {
    params[key]
        .as_str()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| JiraError::InvalidArgument(format!("you need to specify {}", key)))
}
