use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Timestamp format used by the JIRA REST API, e.g. `2015-06-05T10:00:00.000+0000`.
const JIRA_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Short date format used in `userReleaseDate` of version webhooks, e.g. `05/Jun/15`.
const RELEASE_DATE_FORMAT: &str = "%d/%b/%y";

const CALENDAR_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a JIRA timestamp into epoch milliseconds. Blank or unparseable
/// input yields `None`.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    if text.trim().is_empty() {
        return None;
    }
    DateTime::parse_from_str(text, JIRA_TIMESTAMP_FORMAT)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Formats epoch milliseconds as a JIRA timestamp in UTC. `None` for values
/// outside the representable range.
pub fn format_timestamp(millis: i64) -> Option<String> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format(JIRA_TIMESTAMP_FORMAT).to_string())
}

/// Converts a duration in seconds to milliseconds. A missing duration counts
/// as zero.
pub fn seconds_to_millis(seconds: Option<i64>) -> i64 {
    seconds.unwrap_or(0).saturating_mul(1000)
}

/// Reformats a version release date (`05/Jun/15`) as a calendar date
/// (`2015-06-05`). Blank input yields `Ok(None)`; an unparseable date is an
/// error the caller decides how to handle.
pub fn parse_release_date(text: &str) -> Result<Option<String>, chrono::ParseError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(text, RELEASE_DATE_FORMAT)?;
    Ok(Some(date.format(CALENDAR_DATE_FORMAT).to_string()))
}
