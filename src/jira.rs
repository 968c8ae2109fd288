use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::Method;
use serde_json::Value;

use crate::logging;
use crate::metrics::Metrics;

const API_PREFIX: &str = "/rest/api/2";
const MAX_PAGE_SIZE: i64 = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum JiraError {
    #[error("jira request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("jira returned HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to decode jira response: {source}; body: {body}")]
    Decode {
        source: serde_json::Error,
        body: String,
    },
    #[error("invalid jira base url '{0}'")]
    InvalidBaseUrl(String),
    #[error("{0}")]
    InvalidArgument(String),
}

/// Caps the number of requests in flight at once. Checked-out slots are
/// returned on drop.
#[derive(Debug)]
struct RequestSlots {
    capacity: usize,
    taken: Mutex<usize>,
    freed: Condvar,
}

impl RequestSlots {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            taken: Mutex::new(0),
            freed: Condvar::new(),
        }
    }

    fn checkout(&self) -> SlotGuard<'_> {
        let mut taken = self.taken.lock().expect("request slot mutex poisoned");
        while *taken >= self.capacity {
            taken = self
                .freed
                .wait(taken)
                .expect("request slot condvar wait failed");
        }
        *taken += 1;
        SlotGuard { slots: self }
    }
}

struct SlotGuard<'a> {
    slots: &'a RequestSlots,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut taken = self
            .slots
            .taken
            .lock()
            .expect("request slot mutex poisoned");
        *taken = taken.saturating_sub(1);
        self.slots.freed.notify_one();
    }
}

/// Blocking client for the JIRA REST API v2.
#[derive(Debug, Clone)]
pub struct JiraApi {
    pub base_url: String,
    username: String,
    api_token: String,
    http: Client,
    max_retries: usize,
    slots: Arc<RequestSlots>,
    metrics: Arc<Metrics>,
}

impl JiraApi {
    pub fn new(
        base_url: String,
        username: String,
        api_token: String,
        metrics: Arc<Metrics>,
    ) -> Result<Self, JiraError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: normalize_base_url(&base_url)?,
            username,
            api_token,
            http,
            max_retries: 3,
            slots: Arc::new(RequestSlots::new(4)),
            metrics,
        })
    }

    /// Searches issues by JQL. Page sizes above the service maximum are
    /// rejected before any request is made.
    pub fn find_issues(
        &self,
        query: &str,
        offset: Option<i64>,
        size: Option<i64>,
    ) -> Result<Value, JiraError> {
        let mut params = vec![("jql".to_string(), query.to_string())];
        if let Some(offset) = offset {
            params.push(("startAt".to_string(), offset.to_string()));
        }
        if let Some(size) = size {
            if size > MAX_PAGE_SIZE {
                return Err(JiraError::InvalidArgument(format!(
                    "size cannot be greater than {}",
                    MAX_PAGE_SIZE
                )));
            }
            params.push(("maxResults".to_string(), size.to_string()));
        }
        self.send_json(Method::GET, "/search", &params, None)
    }

    pub fn find_issue(&self, key: &str) -> Result<Value, JiraError> {
        self.send_json(Method::GET, &format!("/issue/{}", key), &[], None)
    }

    pub fn create_issue(&self, issue: &Value) -> Result<Value, JiraError> {
        self.send_json(Method::POST, "/issue", &[], Some(issue))
    }

    pub fn update_issue(&self, key: &str, issue: &Value) -> Result<Value, JiraError> {
        self.send_json(Method::PUT, &format!("/issue/{}", key), &[], Some(issue))
    }

    pub fn delete_issue(&self, key: &str) -> Result<Value, JiraError> {
        self.send_json(Method::DELETE, &format!("/issue/{}", key), &[], None)
    }

    pub fn add_comment(&self, issue_key: &str, comment: &Value) -> Result<Value, JiraError> {
        self.send_json(
            Method::POST,
            &format!("/issue/{}/comment", issue_key),
            &[],
            Some(comment),
        )
    }

    pub fn find_transitions(&self, issue_key: &str) -> Result<Value, JiraError> {
        self.send_json(
            Method::GET,
            &format!("/issue/{}/transitions", issue_key),
            &[],
            None,
        )
    }

    pub fn transition_issue(&self, issue_key: &str, transition_id: &str) -> Result<Value, JiraError> {
        let body = serde_json::json!({"transition": {"id": transition_id}});
        self.send_json(
            Method::POST,
            &format!("/issue/{}/transitions", issue_key),
            &[],
            Some(&body),
        )
    }

    /// Lists all field descriptors, built-in and custom.
    pub fn find_fields(&self) -> Result<Value, JiraError> {
        self.send_json(Method::GET, "/field", &[], None)
    }

    pub fn find_project(&self, project_id: &str) -> Result<Value, JiraError> {
        self.send_json(Method::GET, &format!("/project/{}", project_id), &[], None)
    }

    pub fn server_info(&self, do_health_check: bool) -> Result<Value, JiraError> {
        let params = vec![(
            "doHealthCheck".to_string(),
            if do_health_check { "true" } else { "false" }.to_string(),
        )];
        self.send_json(Method::GET, "/serverInfo", &params, None)
    }

    /// Identity probe used at startup to confirm the credentials work.
    pub fn myself(&self) -> Result<Value, JiraError> {
        self.send_json(Method::GET, "/myself", &[], None)
    }

    fn send_json(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, JiraError> {
        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        let response = self.request_with_retry(|| {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .basic_auth(&self.username, Some(&self.api_token));
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }
            request.send()
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(JiraError::Http { status, body });
        }

        let text = response.text()?;
        if text.trim().is_empty() {
            // DELETE and transition calls answer 204 with no body
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|source| {
            let short_body = if text.len() > 1000 {
                format!("{}...", &text[..1000])
            } else {
                text.clone()
            };
            logging::warn(format!(
                "failed decoding jira response from {}: {}",
                path, short_body
            ));
            JiraError::Decode {
                source,
                body: short_body,
            }
        })
    }

    fn request_with_retry<F>(&self, mut send: F) -> Result<Response, JiraError>
    where
        F: FnMut() -> Result<Response, reqwest::Error>,
    {
        let _slot = self.slots.checkout();
        for attempt in 0..=self.max_retries {
            self.metrics.inc_api_request();
            let response = send()?;

            if !is_retryable(response.status()) || attempt == self.max_retries {
                if !response.status().is_success() {
                    logging::warn(format!(
                        "jira request finished with status {} after {} attempt(s)",
                        response.status(),
                        attempt + 1
                    ));
                }
                return Ok(response);
            }

            let wait = retry_after_or_backoff(&response, attempt);
            logging::debug(format!(
                "jira retryable status {} on attempt {}, waiting {:?}",
                response.status(),
                attempt + 1,
                wait
            ));
            self.metrics.inc_retry();
            thread::sleep(wait);
        }

        unreachable!("retry loop always returns");
    }
}

fn normalize_base_url(raw: &str) -> Result<String, JiraError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(JiraError::InvalidBaseUrl(raw.to_string()));
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed =
        reqwest::Url::parse(&candidate).map_err(|_| JiraError::InvalidBaseUrl(raw.to_string()))?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_after_or_backoff(response: &Response, attempt: usize) -> Duration {
    if let Some(header) = response.headers().get("Retry-After") {
        if let Ok(value) = header.to_str() {
            if let Ok(seconds) = value.parse::<u64>() {
                return Duration::from_secs(seconds.min(30));
            }
        }
    }

    Duration::from_secs(1_u64 << attempt.min(4))
}
