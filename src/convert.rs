//! Bidirectional conversion between JIRA's wire format and the normalized
//! application format: issues, comments, worklogs, attachments, and the
//! per-type value rules shared by built-in and custom fields.

use std::sync::Arc;

use serde_json::{json, Map, Number, Value};

use crate::fields::{FieldSchemaCache, FieldType};
use crate::markup;
use crate::timefmt;

/// Keys of the application edit/create format that map to built-in JIRA
/// fields. Anything else is treated as a custom-field candidate.
const BUILT_IN_KEYS: &[&str] = &[
    "key",
    "project",
    "issueType",
    "summary",
    "description",
    "descriptionFormat",
    "dueDate",
    "assignee",
    "reporter",
    "labels",
    "priority",
    "versions",
    "components",
];

#[derive(Debug, Clone)]
pub struct IssueMapper {
    fields: Arc<FieldSchemaCache>,
}

impl IssueMapper {
    pub fn new(fields: Arc<FieldSchemaCache>) -> Self {
        Self { fields }
    }

    /// Wraps a JQL search result as `{total, items}` with each issue
    /// normalized. Null input yields null output.
    pub fn search_result_to_app(&self, search_result: Option<&Value>) -> Option<Value> {
        let search_result = search_result.filter(|value| !value.is_null())?;
        let items: Vec<Value> = search_result["issues"]
            .as_array()
            .map(|issues| issues.iter().map(|issue| self.issue_to_app(issue)).collect())
            .unwrap_or_default();
        Some(json!({
            "total": search_result["total"].clone(),
            "items": items,
        }))
    }

    /// Converts an issue from JIRA's wire format into the flattened
    /// application format.
    pub fn issue_to_app(&self, jira_issue: &Value) -> Value {
        let fields = &jira_issue["fields"];
        let mut issue = Map::new();

        issue.insert("id".into(), jira_issue["id"].clone());
        issue.insert("key".into(), jira_issue["key"].clone());
        issue.insert(
            "issueType".into(),
            self.to_app_value(&fields["issuetype"], Some(FieldType::IssueType)),
        );
        issue.insert(
            "subTask".into(),
            json!(fields["issuetype"]["subtask"].as_bool().unwrap_or(false)),
        );
        issue.insert(
            "project".into(),
            self.to_app_value(&fields["project"], Some(FieldType::Project)),
        );

        issue.insert("timeSpent".into(), millis_of(fields, "timespent"));
        issue.insert(
            "aggregateTimeSpent".into(),
            millis_of(fields, "aggregatetimespent"),
        );
        issue.insert("timeEstimate".into(), millis_of(fields, "timeestimate"));
        issue.insert(
            "aggregateTimeEstimate".into(),
            millis_of(fields, "aggregatetimeestimate"),
        );
        issue.insert(
            "timeOriginalEstimate".into(),
            millis_of(fields, "timeoriginalestimate"),
        );
        issue.insert(
            "aggregateOriginalTimeEstimate".into(),
            millis_of(fields, "aggregateoriginaltimeestimate"),
        );
        issue.insert(
            "remainingEstimate".into(),
            millis_of(&fields["timetracking"], "remainingEstimateSeconds"),
        );

        issue.insert("progress".into(), progress_to_app(&fields["progress"]));
        issue.insert(
            "aggregateProgress".into(),
            progress_to_app(&fields["aggregateprogress"]),
        );

        issue.insert(
            "versions".into(),
            self.to_app_many(&fields["versions"], Some(FieldType::Version)),
        );
        issue.insert(
            "fixVersions".into(),
            self.to_app_many(&fields["fixVersions"], Some(FieldType::Version)),
        );
        issue.insert(
            "status".into(),
            self.to_app_value(&fields["status"], Some(FieldType::Status)),
        );
        issue.insert("created".into(), timestamp_of(fields, "created"));
        issue.insert("updated".into(), timestamp_of(fields, "updated"));
        issue.insert("dueDate".into(), fields["duedate"].clone());
        issue.insert(
            "resolution".into(),
            self.to_app_value(&fields["resolution"], Some(FieldType::Resolution)),
        );
        issue.insert(
            "resolutionDate".into(),
            timestamp_of(fields, "resolutiondate"),
        );
        issue.insert(
            "priority".into(),
            self.to_app_value(&fields["priority"], Some(FieldType::Priority)),
        );
        issue.insert("labels".into(), fields["labels"].clone());
        issue.insert("issueLinks".into(), issue_links(&fields["issuelinks"]));
        issue.insert(
            "components".into(),
            self.to_app_many(&fields["components"], Some(FieldType::Component)),
        );
        issue.insert("environment".into(), fields["environment"].clone());
        issue.insert(
            "votes".into(),
            if fields["votes"].is_null() {
                json!(0)
            } else {
                fields["votes"]["votes"].clone()
            },
        );

        issue.insert(
            "assignee".into(),
            self.to_app_value(&fields["assignee"], Some(FieldType::User)),
        );
        issue.insert(
            "reporter".into(),
            self.to_app_value(&fields["reporter"], Some(FieldType::User)),
        );
        issue.insert(
            "creator".into(),
            self.to_app_value(&fields["creator"], Some(FieldType::User)),
        );
        issue.insert("summary".into(), fields["summary"].clone());

        let (html, text, wiki) = markup_triple(&fields["description"]);
        issue.insert("descriptionHtml".into(), html);
        issue.insert("descriptionText".into(), text);
        issue.insert("descriptionWiki".into(), wiki);

        issue.insert("parent".into(), issue_ref(&fields["parent"]));
        issue.insert("subTasks".into(), issue_refs(&fields["subtasks"]));
        issue.insert("customFields".into(), self.custom_fields_to_app(fields));

        if let Some(comments) = fields["comment"]["comments"].as_array() {
            let converted: Vec<Value> = comments
                .iter()
                .map(|comment| self.comment_to_app(comment))
                .collect();
            issue.insert("comments".into(), Value::Array(converted));
        }
        if let Some(worklogs) = fields["worklog"]["worklogs"].as_array() {
            let converted: Vec<Value> = worklogs
                .iter()
                .map(|worklog| self.worklog_to_app(worklog))
                .collect();
            issue.insert("workLogs".into(), Value::Array(converted));
        }
        if let Some(attachments) = fields["attachment"].as_array() {
            let converted: Vec<Value> = attachments
                .iter()
                .map(|attachment| self.attachment_to_app(attachment))
                .collect();
            issue.insert("attachments".into(), Value::Array(converted));
        }

        Value::Object(issue)
    }

    /// Converts an issue from the application edit/create format into the
    /// wire format. Only keys present in the input appear in the output:
    /// callers leave a field untouched by omitting it.
    pub fn issue_to_jira(&self, app_issue: &Value) -> Value {
        let mut issue = Map::new();
        let mut fields = Map::new();
        let Some(input) = app_issue.as_object() else {
            return json!({"fields": {}});
        };

        if let Some(key) = input.get("key") {
            issue.insert("key".into(), key.clone());
        }
        if let Some(project) = input.get("project") {
            fields.insert("project".into(), json!({"key": project}));
        }
        if let Some(issue_type) = input.get("issueType") {
            fields.insert("issuetype".into(), json!({"name": issue_type}));
        }
        if let Some(summary) = input.get("summary") {
            fields.insert("summary".into(), summary.clone());
        }
        if let Some(description) = input.get("description") {
            let format = input
                .get("descriptionFormat")
                .and_then(Value::as_str)
                .unwrap_or("");
            fields.insert("description".into(), to_wiki(description, format));
        }
        if let Some(due_date) = input.get("dueDate") {
            fields.insert("duedate".into(), due_date.clone());
        }
        if let Some(assignee) = input.get("assignee") {
            fields.insert("assignee".into(), json!({"name": assignee}));
        }
        if let Some(reporter) = input.get("reporter") {
            fields.insert("reporter".into(), json!({"name": reporter}));
        }
        if let Some(labels) = input.get("labels") {
            fields.insert("labels".into(), labels.clone());
        }
        if let Some(priority) = input.get("priority") {
            fields.insert("priority".into(), json!({"name": priority}));
        }
        if let Some(versions) = input.get("versions") {
            fields.insert("versions".into(), wrap_names(versions));
        }
        if let Some(components) = input.get("components") {
            fields.insert("components".into(), wrap_names(components));
        }

        for (key, value) in input {
            if BUILT_IN_KEYS.contains(&key.as_str()) {
                continue;
            }
            // keys that resolve to a known field convert by its type; the
            // rest are tolerated and dropped
            let Some(id) = self.fields.resolve_id_by_name(key) else {
                continue;
            };
            let field_type = self.fields.resolve_type(&id);
            let converted = if self.fields.is_array(&id) {
                self.to_jira_many(value, field_type)
            } else {
                self.to_jira_value(value, field_type)
            };
            fields.insert(id, converted);
        }

        issue.insert("fields".into(), Value::Object(fields));
        Value::Object(issue)
    }

    pub fn comment_to_app(&self, jira_comment: &Value) -> Value {
        let (html, text, wiki) = markup_triple(&jira_comment["body"]);
        json!({
            "id": jira_comment["id"].clone(),
            "author": self.to_app_value(&jira_comment["author"], Some(FieldType::User)),
            "created": timestamp_of(jira_comment, "created"),
            "bodyHtml": html,
            "bodyText": text,
            "bodyWiki": wiki,
        })
    }

    /// Converts an application comment for posting: the body is brought to
    /// the wiki representation selected by `bodyFormat`.
    pub fn comment_to_jira(&self, app_comment: &Value) -> Value {
        let format = app_comment["bodyFormat"].as_str().unwrap_or("");
        json!({
            "issueKey": app_comment["issueKey"].clone(),
            "body": to_wiki(&app_comment["body"], format),
        })
    }

    pub fn worklog_to_app(&self, jira_worklog: &Value) -> Value {
        let (html, text, wiki) = markup_triple(&jira_worklog["comment"]);
        json!({
            "id": jira_worklog["id"].clone(),
            "author": self.to_app_value(&jira_worklog["author"], Some(FieldType::User)),
            "created": timestamp_of(jira_worklog, "created"),
            "started": timestamp_of(jira_worklog, "started"),
            "timeSpent": millis_of(jira_worklog, "timeSpentSeconds"),
            "commentHtml": html,
            "commentText": text,
            "commentWiki": wiki,
        })
    }

    /// Attachment metadata only; the binary content stays in JIRA and is
    /// reachable through `contentUrl`.
    pub fn attachment_to_app(&self, jira_attachment: &Value) -> Value {
        json!({
            "id": jira_attachment["id"].clone(),
            "author": self.to_app_value(&jira_attachment["author"], Some(FieldType::User)),
            "created": timestamp_of(jira_attachment, "created"),
            "filename": jira_attachment["filename"].clone(),
            "mimeType": jira_attachment["mimeType"].clone(),
            "size": jira_attachment["size"].clone(),
            "contentUrl": jira_attachment["content"].clone(),
        })
    }

    fn custom_fields_to_app(&self, fields: &Value) -> Value {
        let mut custom = Map::new();
        let Some(entries) = fields.as_object() else {
            return Value::Object(custom);
        };
        for (key, value) in entries {
            if !key.starts_with("customfield_") {
                continue;
            }
            let name = self.fields.resolve_name(key).unwrap_or_else(|| key.clone());
            let field_type = self.fields.resolve_type(key);
            let converted = if self.fields.is_array(key) {
                self.to_app_many(value, field_type)
            } else {
                self.to_app_value(value, field_type)
            };
            custom.insert(name, converted);
        }
        Value::Object(custom)
    }

    /// Scalar conversion, wire to app. Unknown types pass through unchanged.
    fn to_app_value(&self, value: &Value, field_type: Option<FieldType>) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match field_type {
            None | Some(FieldType::Other) => value.clone(),
            Some(FieldType::String) | Some(FieldType::Number) | Some(FieldType::Date) => {
                value.clone()
            }
            Some(FieldType::Datetime) => match value.as_str() {
                Some(text) => timefmt::parse_timestamp(text)
                    .map(|millis| json!(millis))
                    .unwrap_or(Value::Null),
                None => value.clone(),
            },
            Some(FieldType::User) => {
                enum_value(value, &["key", "emailAddress", "displayName", "active"])
            }
            Some(FieldType::Version) => enum_value(value, &["archived", "released", "releaseDate"]),
            Some(FieldType::Component)
            | Some(FieldType::Priority)
            | Some(FieldType::Resolution)
            | Some(FieldType::IssueType)
            | Some(FieldType::Status) => enum_value(value, &[]),
            Some(FieldType::Project) => enum_value(value, &["key"]),
            Some(FieldType::IssueLinks) => issue_ref(value),
        }
    }

    /// Element-wise wire-to-app conversion. A bare scalar where an array is
    /// declared becomes a one-element list first (JIRA is known to drop the
    /// wrapping list on some fields).
    fn to_app_many(&self, value: &Value, field_type: Option<FieldType>) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        let items: Vec<Value> = coerce_sequence(value)
            .iter()
            .map(|item| self.to_app_value(item, field_type))
            .collect();
        Value::Array(items)
    }

    /// Scalar conversion, app to wire.
    fn to_jira_value(&self, value: &Value, field_type: Option<FieldType>) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match field_type {
            None | Some(FieldType::Other) => value.clone(),
            Some(FieldType::String) | Some(FieldType::Number) | Some(FieldType::Date) => {
                value.clone()
            }
            Some(FieldType::Datetime) => match value.as_i64() {
                Some(millis) => timefmt::format_timestamp(millis)
                    .map(Value::from)
                    .unwrap_or_else(|| value.clone()),
                None => value.clone(),
            },
            Some(FieldType::User)
            | Some(FieldType::Version)
            | Some(FieldType::Component)
            | Some(FieldType::Priority)
            | Some(FieldType::Resolution)
            | Some(FieldType::IssueType)
            | Some(FieldType::Status) => json!({"name": value}),
            Some(FieldType::Project) => json!({"key": value}),
            // read-only on the wire, passed through untouched
            Some(FieldType::IssueLinks) => value.clone(),
        }
    }

    fn to_jira_many(&self, value: &Value, field_type: Option<FieldType>) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        let items: Vec<Value> = coerce_sequence(value)
            .iter()
            .map(|item| self.to_jira_value(item, field_type))
            .collect();
        Value::Array(items)
    }
}

/// Normalizes a maybe-list into a sequence of length >= 1.
fn coerce_sequence(value: &Value) -> Vec<Value> {
    match value.as_array() {
        Some(items) => items.clone(),
        None => vec![value.clone()],
    }
}

/// Single-choice reference fields all reduce to `{id?, name}` plus
/// type-specific extras copied when present.
fn enum_value(value: &Value, extra_keys: &[&str]) -> Value {
    let Some(raw) = value.as_object() else {
        return value.clone();
    };
    let mut out = Map::new();
    if let Some(id) = raw.get("id") {
        out.insert("id".into(), id.clone());
    }
    out.insert("name".into(), raw.get("name").cloned().unwrap_or(Value::Null));
    for key in extra_keys {
        if let Some(extra) = raw.get(*key) {
            out.insert((*key).into(), extra.clone());
        }
    }
    Value::Object(out)
}

fn issue_ref(value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    json!({
        "id": value["id"].clone(),
        "key": value["key"].clone(),
        "summary": value["fields"]["summary"].clone(),
    })
}

fn issue_refs(value: &Value) -> Value {
    match value.as_array() {
        Some(items) => Value::Array(items.iter().map(issue_ref).collect()),
        None => Value::Null,
    }
}

/// The relationship is the link type seen from this issue: an issue that
/// blocks another gets "blocks", the blocked one gets "is blocked by".
fn issue_link(value: &Value) -> Value {
    let link_type = &value["type"];
    let (target, relationship) = if value["outwardIssue"].is_null() {
        (&value["inwardIssue"], &link_type["inward"])
    } else {
        (&value["outwardIssue"], &link_type["outward"])
    };
    let mut link = issue_ref(target);
    if let Some(link_fields) = link.as_object_mut() {
        link_fields.insert("relationship".into(), relationship.clone());
    }
    link
}

fn issue_links(value: &Value) -> Value {
    match value.as_array() {
        Some(items) => Value::Array(items.iter().map(issue_link).collect()),
        None => Value::Null,
    }
}

/// `{progress, total}` in milliseconds plus `percent` as the exact decimal
/// quotient percent/100. A missing block reads as no progress at all.
fn progress_to_app(progress: &Value) -> Value {
    if !progress.is_object() {
        return json!({"progress": 0, "total": 0, "percent": 0});
    }
    let percent = progress["percent"].as_i64().unwrap_or(0);
    json!({
        "progress": timefmt::seconds_to_millis(progress["progress"].as_i64()),
        "total": timefmt::seconds_to_millis(progress["total"].as_i64()),
        "percent": percent_fraction(percent),
    })
}

/// Divides a whole percentage by 100 in decimal, with no float involved:
/// 53 stays 0.53, 30 becomes 0.3, 100 becomes 1.
fn percent_fraction(percent: i64) -> Value {
    let magnitude = percent.unsigned_abs();
    let sign = if percent < 0 { "-" } else { "" };
    let whole = magnitude / 100;
    let fraction = magnitude % 100;
    let text = if fraction == 0 {
        format!("{}{}", sign, whole)
    } else {
        let digits = format!("{:02}", fraction);
        format!("{}{}.{}", sign, whole, digits.trim_end_matches('0'))
    };
    text.parse::<Number>().map(Value::Number).unwrap_or(Value::Null)
}

/// Renders a description or comment body three ways: HTML, plain text, and
/// the raw wiki markup.
fn markup_triple(source: &Value) -> (Value, Value, Value) {
    match source.as_str() {
        Some(wiki) => (
            Value::from(markup::wiki_to_html(wiki).into_text()),
            Value::from(markup::wiki_to_text(wiki).into_text()),
            Value::from(wiki),
        ),
        None => (Value::Null, Value::Null, source.clone()),
    }
}

/// Brings an outbound description or comment body to the wiki markup JIRA
/// expects, selected by the caller-declared source format.
fn to_wiki(value: &Value, format: &str) -> Value {
    let Some(text) = value.as_str() else {
        return value.clone();
    };
    let converted = if format.eq_ignore_ascii_case("html") {
        markup::html_to_wiki(text).into_text()
    } else if format.eq_ignore_ascii_case("wiki") {
        text.to_string()
    } else {
        markup::text_to_wiki(text).into_text()
    };
    Value::from(converted)
}

fn millis_of(value: &Value, key: &str) -> Value {
    json!(timefmt::seconds_to_millis(value[key].as_i64()))
}

fn timestamp_of(value: &Value, key: &str) -> Value {
    value[key]
        .as_str()
        .and_then(timefmt::parse_timestamp)
        .map(|millis| json!(millis))
        .unwrap_or(Value::Null)
}

fn wrap_names(value: &Value) -> Value {
    let items: Vec<Value> = coerce_sequence(value)
        .iter()
        .map(|name| json!({"name": name}))
        .collect();
    Value::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jira::JiraApi;
    use crate::metrics::Metrics;
    use httpmock::Method::GET;
    use httpmock::MockServer;

    fn mapper_with_fields(server: &MockServer) -> IssueMapper {
        server.mock(|when, then| {
            when.method(GET).path("/rest/api/2/field");
            then.status(200).json_body(json!([
                {"id": "summary", "name": "Summary", "schema": {"type": "string"}},
                {"id": "customfield_10400", "name": "Main Reviewer", "schema": {"type": "user"}},
                {"id": "customfield_10004", "name": "Story Points", "schema": {"type": "number"}},
                {"id": "customfield_10500", "name": "Tags", "schema": {"type": "array", "items": "string"}},
                {"id": "customfield_10600", "name": "Review Deadline", "schema": {"type": "datetime"}}
            ]));
        });
        let metrics = Arc::new(Metrics::new());
        let api = Arc::new(
            JiraApi::new(server.base_url(), "bridge".into(), "token".into(), Arc::clone(&metrics))
                .expect("client"),
        );
        let cache = Arc::new(FieldSchemaCache::new(api, metrics));
        cache.refresh().expect("field listing");
        IssueMapper::new(cache)
    }

    fn sample_jira_issue() -> Value {
        json!({
            "id": "10234",
            "key": "TEST-1",
            "fields": {
                "issuetype": {"id": "3", "name": "Task", "subtask": false},
                "project": {"id": "10000", "key": "TEST", "name": "Test Project"},
                "timespent": 7200,
                "aggregatetimespent": 25200,
                "timeestimate": 14400,
                "aggregatetimeestimate": 21600,
                "timeoriginalestimate": 14400,
                "aggregateoriginaltimeestimate": 21600,
                "timetracking": {"remainingEstimateSeconds": 14400},
                "progress": {"progress": 7200, "total": 21600, "percent": 33},
                "aggregateprogress": {"progress": 25200, "total": 46800, "percent": 53},
                "versions": [{"id": "100", "name": "v1.0", "archived": false, "released": true, "releaseDate": "2015-06-05"}],
                "fixVersions": [{"id": "101", "name": "v1.1"}],
                "status": {"id": "3", "name": "In Progress"},
                "created": "2015-06-01T09:00:00.000+0000",
                "updated": "2015-06-05T10:00:00.000+0000",
                "duedate": "2015-07-01",
                "resolution": null,
                "resolutiondate": null,
                "priority": {"id": "2", "name": "High"},
                "labels": ["label1", "label2"],
                "issuelinks": [
                    {
                        "type": {"inward": "is blocked by", "outward": "blocks"},
                        "inwardIssue": {"id": "8", "key": "TEST-8", "fields": {"summary": "Test bug - DO NOT TOUCH"}}
                    },
                    {
                        "type": {"inward": "relates to", "outward": "relates to"},
                        "outwardIssue": {"id": "3", "key": "TEST-3", "fields": {"summary": "Test 3"}}
                    }
                ],
                "components": [{"id": "1", "name": "Client Side"}, {"id": "2", "name": "Server Side"}],
                "environment": null,
                "votes": {"votes": 1},
                "assignee": {"key": "test", "name": "test", "emailAddress": "test@example.com", "displayName": "Test User", "active": true},
                "reporter": {"key": "rep", "name": "rep", "displayName": "Reporting User", "active": true},
                "creator": {"key": "creator", "name": "creator", "displayName": "Creating User", "active": true},
                "summary": "Test issue one",
                "description": "*bold* description",
                "parent": {"id": "4", "key": "TEST-4", "fields": {"summary": "Test Epic - DO NOT TOUCH"}},
                "subtasks": [
                    {"id": "5", "key": "TEST-5", "fields": {"summary": "Sub task 1"}},
                    {"id": "6", "key": "TEST-6", "fields": {"summary": "Sub task 2"}}
                ],
                "customfield_10400": {"name": "test", "displayName": "Test User", "active": true},
                "customfield_10004": 3,
                "comment": {"comments": [
                    {"id": "201", "author": {"name": "dgaviola"}, "created": "2015-06-02T12:00:00.000+0000", "body": "*test comment*"}
                ]},
                "worklog": {"worklogs": [
                    {"id": "301", "author": {"name": "dgaviola"}, "created": "2015-06-03T12:00:00.000+0000", "started": "2015-06-03T09:00:00.000+0000", "timeSpentSeconds": 7200, "comment": "doing something"}
                ]},
                "attachment": [
                    {"id": "401", "author": {"name": "dgaviola"}, "created": "2015-06-04T12:00:00.000+0000", "filename": "appicon.png", "mimeType": "image/png", "size": 6313, "content": "https://example.atlassian.net/secure/attachment/401/appicon.png"}
                ]
            }
        })
    }

    #[test]
    fn converts_core_issue_fields() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let issue = mapper.issue_to_app(&sample_jira_issue());

        assert_eq!(issue["key"], json!("TEST-1"));
        assert_eq!(issue["issueType"]["name"], json!("Task"));
        assert_eq!(issue["issueType"]["id"], json!("3"));
        assert_eq!(issue["subTask"], json!(false));
        assert_eq!(issue["project"]["key"], json!("TEST"));
        assert_eq!(issue["status"]["name"], json!("In Progress"));
        assert_eq!(issue["summary"], json!("Test issue one"));
        assert_eq!(issue["labels"], json!(["label1", "label2"]));
        assert_eq!(issue["votes"], json!(1));
        assert_eq!(issue["dueDate"], json!("2015-07-01"));
        assert!(issue["created"].is_i64());
        assert_eq!(issue["resolution"], Value::Null);

        assert_eq!(issue["timeSpent"], json!(7_200_000));
        assert_eq!(issue["aggregateTimeSpent"], json!(25_200_000));
        assert_eq!(issue["timeEstimate"], json!(14_400_000));
        assert_eq!(issue["aggregateTimeEstimate"], json!(21_600_000));
        assert_eq!(issue["remainingEstimate"], json!(14_400_000));

        assert_eq!(issue["progress"]["progress"], json!(7_200_000));
        assert_eq!(issue["progress"]["total"], json!(21_600_000));
        assert_eq!(issue["progress"]["percent"].to_string(), "0.33");
        assert_eq!(issue["aggregateProgress"]["percent"].to_string(), "0.53");

        assert_eq!(issue["components"][0]["name"], json!("Client Side"));
        assert_eq!(issue["components"][1]["name"], json!("Server Side"));
        assert_eq!(issue["versions"][0]["name"], json!("v1.0"));
        assert_eq!(issue["versions"][0]["released"], json!(true));

        assert_eq!(issue["issueLinks"][0]["key"], json!("TEST-8"));
        assert_eq!(issue["issueLinks"][0]["summary"], json!("Test bug - DO NOT TOUCH"));
        assert_eq!(issue["issueLinks"][0]["relationship"], json!("is blocked by"));
        assert_eq!(issue["issueLinks"][1]["key"], json!("TEST-3"));
        assert_eq!(issue["issueLinks"][1]["relationship"], json!("relates to"));

        assert_eq!(issue["parent"]["key"], json!("TEST-4"));
        assert_eq!(issue["subTasks"][0]["key"], json!("TEST-5"));
        assert_eq!(issue["subTasks"][1]["summary"], json!("Sub task 2"));

        assert_eq!(issue["assignee"]["name"], json!("test"));
        assert_eq!(issue["assignee"]["key"], json!("test"));
        assert_eq!(issue["assignee"]["emailAddress"], json!("test@example.com"));
        assert_eq!(issue["assignee"]["displayName"], json!("Test User"));
        assert_eq!(issue["assignee"]["active"], json!(true));

        assert_eq!(
            issue["descriptionHtml"],
            json!("<p><strong>bold</strong> description</p>")
        );
        assert_eq!(issue["descriptionText"], json!("bold description"));
        assert_eq!(issue["descriptionWiki"], json!("*bold* description"));
    }

    #[test]
    fn reporter_and_creator_come_from_their_own_fields() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let issue = mapper.issue_to_app(&sample_jira_issue());

        assert_eq!(issue["reporter"]["name"], json!("rep"));
        assert_eq!(issue["creator"]["name"], json!("creator"));
        assert_eq!(issue["assignee"]["name"], json!("test"));
    }

    #[test]
    fn converts_nested_comments_worklogs_and_attachments() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let issue = mapper.issue_to_app(&sample_jira_issue());

        let comment = &issue["comments"][0];
        assert_eq!(comment["author"]["name"], json!("dgaviola"));
        assert_eq!(comment["bodyWiki"], json!("*test comment*"));
        assert_eq!(comment["bodyHtml"], json!("<p><strong>test comment</strong></p>"));
        assert_eq!(comment["bodyText"], json!("test comment"));
        assert!(comment["created"].is_i64());

        let worklog = &issue["workLogs"][0];
        assert_eq!(worklog["timeSpent"], json!(7_200_000));
        assert_eq!(worklog["commentWiki"], json!("doing something"));
        assert_eq!(worklog["commentText"], json!("doing something"));
        assert_eq!(worklog["commentHtml"], json!("<p>doing something</p>"));
        assert!(worklog["started"].is_i64());

        let attachment = &issue["attachments"][0];
        assert_eq!(attachment["filename"], json!("appicon.png"));
        assert_eq!(attachment["mimeType"], json!("image/png"));
        assert_eq!(attachment["size"], json!(6313));
        assert_eq!(
            attachment["contentUrl"],
            json!("https://example.atlassian.net/secure/attachment/401/appicon.png")
        );
    }

    #[test]
    fn converts_custom_fields_by_resolved_name_and_type() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let issue = mapper.issue_to_app(&sample_jira_issue());

        assert_eq!(issue["customFields"]["Main Reviewer"]["name"], json!("test"));
        assert_eq!(
            issue["customFields"]["Main Reviewer"]["displayName"],
            json!("Test User")
        );
        assert_eq!(issue["customFields"]["Story Points"], json!(3));
    }

    #[test]
    fn missing_progress_and_timetracking_default_to_zero() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let issue = mapper.issue_to_app(&json!({
            "id": "1",
            "key": "TEST-10",
            "fields": {"summary": "bare"}
        }));

        assert_eq!(issue["timeSpent"], json!(0));
        assert_eq!(issue["remainingEstimate"], json!(0));
        assert_eq!(issue["votes"], json!(0));
        assert_eq!(issue["subTask"], json!(false));
        assert_eq!(
            issue["progress"],
            json!({"progress": 0, "total": 0, "percent": 0})
        );
        assert_eq!(
            issue["aggregateProgress"],
            json!({"progress": 0, "total": 0, "percent": 0})
        );
    }

    #[test]
    fn absent_collections_are_omitted_not_emptied() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let issue = mapper.issue_to_app(&json!({
            "id": "1",
            "key": "TEST-10",
            "fields": {"summary": "bare"}
        }));

        let object = issue.as_object().expect("issue object");
        assert!(!object.contains_key("comments"));
        assert!(!object.contains_key("workLogs"));
        assert!(!object.contains_key("attachments"));
    }

    #[test]
    fn bare_scalar_for_array_typed_field_becomes_a_list() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let issue = mapper.issue_to_app(&json!({
            "id": "1",
            "key": "TEST-11",
            "fields": {"customfield_10500": "solo"}
        }));

        assert_eq!(issue["customFields"]["Tags"], json!(["solo"]));
    }

    #[test]
    fn unresolved_custom_field_passes_through_under_its_raw_id() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let issue = mapper.issue_to_app(&json!({
            "id": "1",
            "key": "TEST-12",
            "fields": {"customfield_99999": {"opaque": true}}
        }));

        assert_eq!(
            issue["customFields"]["customfield_99999"],
            json!({"opaque": true})
        );
    }

    #[test]
    fn outbound_includes_only_present_keys() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let outbound = mapper.issue_to_jira(&json!({
            "summary": "only summary"
        }));

        assert_eq!(outbound["fields"], json!({"summary": "only summary"}));
        assert!(outbound.as_object().map(|o| !o.contains_key("key")).unwrap_or(false));
    }

    #[test]
    fn outbound_shapes_built_in_fields() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let outbound = mapper.issue_to_jira(&json!({
            "key": "TEST-20",
            "project": "TEST",
            "issueType": "Bug",
            "summary": "testing jira integration",
            "assignee": "test",
            "reporter": "test",
            "priority": "High",
            "dueDate": "2015-07-01",
            "labels": ["label1", "label2"],
            "versions": ["v1.0"],
            "components": ["Client Side"],
            "descriptionFormat": "html",
            "description": "<p>things to do:</p><ul><li>thing 1</li><li>thing 2</li></ul>"
        }));

        assert_eq!(outbound["key"], json!("TEST-20"));
        let fields = &outbound["fields"];
        assert_eq!(fields["project"], json!({"key": "TEST"}));
        assert_eq!(fields["issuetype"], json!({"name": "Bug"}));
        assert_eq!(fields["assignee"], json!({"name": "test"}));
        assert_eq!(fields["reporter"], json!({"name": "test"}));
        assert_eq!(fields["priority"], json!({"name": "High"}));
        assert_eq!(fields["duedate"], json!("2015-07-01"));
        assert_eq!(fields["labels"], json!(["label1", "label2"]));
        assert_eq!(fields["versions"], json!([{"name": "v1.0"}]));
        assert_eq!(fields["components"], json!([{"name": "Client Side"}]));
        assert_eq!(
            fields["description"],
            json!("things to do:\nthing 1\nthing 2")
        );
    }

    #[test]
    fn built_in_fields_round_trip_through_both_directions() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let outbound = mapper.issue_to_jira(&json!({
            "key": "TEST-21",
            "summary": "round trip",
            "labels": ["label1", "label2"],
            "versions": ["v1.0", "v1.1"],
            "components": ["Client Side"]
        }));

        let echoed = json!({
            "id": "77",
            "key": "TEST-21",
            "fields": outbound["fields"].clone()
        });
        let back = mapper.issue_to_app(&echoed);

        assert_eq!(back["summary"], json!("round trip"));
        assert_eq!(back["labels"], json!(["label1", "label2"]));
        assert_eq!(back["versions"][0]["name"], json!("v1.0"));
        assert_eq!(back["versions"][1]["name"], json!("v1.1"));
        assert_eq!(back["components"][0]["name"], json!("Client Side"));
    }

    #[test]
    fn outbound_resolves_custom_fields_by_display_name() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let outbound = mapper.issue_to_jira(&json!({
            "key": "TEST-22",
            "summary": "updated summary",
            "Main Reviewer": "test",
            "Story Points": 3
        }));

        let fields = &outbound["fields"];
        assert_eq!(fields["customfield_10400"], json!({"name": "test"}));
        assert_eq!(fields["customfield_10004"], json!(3));
    }

    #[test]
    fn outbound_drops_unresolvable_keys_silently() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let outbound = mapper.issue_to_jira(&json!({
            "summary": "tolerant",
            "No Such Field": "ignored"
        }));

        assert_eq!(outbound["fields"], json!({"summary": "tolerant"}));
    }

    #[test]
    fn outbound_converts_datetime_and_array_custom_fields() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let outbound = mapper.issue_to_jira(&json!({
            "Review Deadline": 1433498400000_i64,
            "Tags": "solo"
        }));

        let fields = &outbound["fields"];
        assert_eq!(
            fields["customfield_10600"],
            json!("2015-06-05T10:00:00.000+0000")
        );
        // a bare scalar for an array-typed field still converts as a list
        assert_eq!(fields["customfield_10500"], json!(["solo"]));
    }

    #[test]
    fn inbound_datetime_custom_field_becomes_epoch_millis() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);
        let issue = mapper.issue_to_app(&json!({
            "id": "1",
            "key": "TEST-13",
            "fields": {"customfield_10600": "2015-06-05T10:00:00.000+0000"}
        }));

        assert_eq!(
            issue["customFields"]["Review Deadline"],
            json!(1433498400000_i64)
        );
    }

    #[test]
    fn comment_outbound_converts_body_format() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);

        let html = mapper.comment_to_jira(&json!({
            "issueKey": "TEST-1",
            "bodyFormat": "html",
            "body": "<p>test</p><strong>bold string</strong>"
        }));
        assert_eq!(html["issueKey"], json!("TEST-1"));
        assert_eq!(html["body"], json!("test\nbold string"));

        let wiki = mapper.comment_to_jira(&json!({
            "issueKey": "TEST-1",
            "bodyFormat": "wiki",
            "body": "*kept as is*"
        }));
        assert_eq!(wiki["body"], json!("*kept as is*"));

        let plain = mapper.comment_to_jira(&json!({
            "issueKey": "TEST-1",
            "body": "plain text"
        }));
        assert_eq!(plain["body"], json!("plain text"));
    }

    #[test]
    fn search_results_wrap_converted_issues() {
        let server = MockServer::start();
        let mapper = mapper_with_fields(&server);

        assert_eq!(mapper.search_result_to_app(None), None);
        assert_eq!(mapper.search_result_to_app(Some(&Value::Null)), None);

        let result = mapper
            .search_result_to_app(Some(&json!({
                "total": 2,
                "issues": [sample_jira_issue(), sample_jira_issue()]
            })))
            .expect("converted result");
        assert_eq!(result["total"], json!(2));
        assert_eq!(result["items"].as_array().map(Vec::len), Some(2));
        assert_eq!(result["items"][0]["key"], json!("TEST-1"));
    }

    #[test]
    fn exact_decimal_percent_has_no_float_artifacts() {
        assert_eq!(percent_fraction(53).to_string(), "0.53");
        assert_eq!(percent_fraction(33).to_string(), "0.33");
        assert_eq!(percent_fraction(30).to_string(), "0.3");
        assert_eq!(percent_fraction(100).to_string(), "1");
        assert_eq!(percent_fraction(0).to_string(), "0");
        assert_eq!(percent_fraction(7).to_string(), "0.07");
    }
}
