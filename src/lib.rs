//! `jira-bridge` exposes JIRA's REST API and webhook events through a
//! normalized, application-friendly JSON interface.
#![recursion_limit = "256"]

/// Runtime configuration loading and validation.
pub mod config;
/// Issue, comment, worklog, and attachment conversion between formats.
pub mod convert;
/// Application-facing functions and the webhook entry point.
pub mod endpoint;
/// Webhook classification and event payload construction.
pub mod events;
/// Field metadata cache for custom-field resolution.
pub mod fields;
/// JIRA REST API client.
pub mod jira;
/// Logging helpers used throughout the crate.
pub mod logging;
/// Wiki, HTML, and plain-text markup conversion.
pub mod markup;
/// Runtime metrics counters.
pub mod metrics;
/// Timestamp and date codecs for the JIRA wire formats.
pub mod timefmt;
