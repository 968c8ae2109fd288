use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::jira::{JiraApi, JiraError};
use crate::logging;
use crate::metrics::Metrics;

/// Semantic value types reported by the field listing. Types outside this
/// set convert as identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Date,
    Datetime,
    User,
    Version,
    Component,
    Priority,
    Resolution,
    IssueType,
    Status,
    Project,
    IssueLinks,
    Other,
}

impl FieldType {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "string" => FieldType::String,
            "number" => FieldType::Number,
            "date" => FieldType::Date,
            "datetime" => FieldType::Datetime,
            "user" => FieldType::User,
            "version" => FieldType::Version,
            "component" => FieldType::Component,
            "priority" => FieldType::Priority,
            "resolution" => FieldType::Resolution,
            "issuetype" => FieldType::IssueType,
            "status" => FieldType::Status,
            "project" => FieldType::Project,
            "issuelinks" => FieldType::IssueLinks,
            _ => FieldType::Other,
        }
    }
}

/// One entry of the field listing. Descriptors are replaced whole on
/// refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub id: String,
    pub name: String,
    pub field_type: Option<FieldType>,
    pub is_array: bool,
}

/// Snapshot of JIRA's field metadata, indexed by id and by display name.
/// Custom fields appear on the wire only as `customfield_<n>` ids; the cache
/// is what lets a display name round-trip to that id and back, and what
/// selects the conversion rule for a field's value type.
#[derive(Debug)]
pub struct FieldSchemaCache {
    api: Arc<JiraApi>,
    by_id: Mutex<HashMap<String, Arc<FieldDescriptor>>>,
    by_name: Mutex<HashMap<String, Arc<FieldDescriptor>>>,
    metrics: Arc<Metrics>,
}

impl FieldSchemaCache {
    pub fn new(api: Arc<JiraApi>, metrics: Arc<Metrics>) -> Self {
        Self {
            api,
            by_id: Mutex::new(HashMap::new()),
            by_name: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Fetches the full field listing and upserts a descriptor per entry.
    /// On failure the previous snapshot stays intact.
    pub fn refresh(&self) -> Result<(), JiraError> {
        let listing = self.api.find_fields()?;
        self.metrics.inc_cache_refresh();

        let entries = listing.as_array().cloned().unwrap_or_default();
        let mut count = 0;
        for entry in &entries {
            let Some(id) = entry["id"].as_str() else {
                continue;
            };
            let name = entry["name"].as_str().unwrap_or_default().to_string();

            let (field_type, is_array) = match entry.get("schema") {
                Some(schema) => {
                    if schema["type"].as_str() == Some("array") {
                        let item_type = schema["items"].as_str().map(FieldType::from_wire);
                        (item_type, true)
                    } else {
                        (schema["type"].as_str().map(FieldType::from_wire), false)
                    }
                }
                None => (None, false),
            };

            let descriptor = Arc::new(FieldDescriptor {
                id: id.to_string(),
                name: name.clone(),
                field_type,
                is_array,
            });

            self.by_id
                .lock()
                .expect("field cache mutex poisoned")
                .insert(id.to_string(), Arc::clone(&descriptor));
            if !name.is_empty() {
                self.by_name
                    .lock()
                    .expect("field cache mutex poisoned")
                    .insert(name, descriptor);
            }
            count += 1;
        }
        logging::debug(format!("field cache refreshed with {} entries", count));
        Ok(())
    }

    /// Resolves a display name to a field id. Pure lookup: this path runs
    /// once per key of every outbound conversion, so it never refreshes.
    pub fn resolve_id_by_name(&self, name: &str) -> Option<String> {
        self.by_name
            .lock()
            .expect("field cache mutex poisoned")
            .get(name)
            .map(|descriptor| descriptor.id.clone())
    }

    pub fn resolve_type(&self, id: &str) -> Option<FieldType> {
        self.field_by_id(id).and_then(|descriptor| descriptor.field_type)
    }

    pub fn resolve_name(&self, id: &str) -> Option<String> {
        self.field_by_id(id).map(|descriptor| descriptor.name.clone())
    }

    /// Whether the field is array-typed. Unresolved fields count as scalar.
    pub fn is_array(&self, id: &str) -> bool {
        self.field_by_id(id)
            .map(|descriptor| descriptor.is_array)
            .unwrap_or(false)
    }

    /// Id lookup with lazy repair: an unknown id triggers one refresh and a
    /// re-check. A failed refresh degrades to an unresolved result.
    fn field_by_id(&self, id: &str) -> Option<Arc<FieldDescriptor>> {
        if let Some(descriptor) = self
            .by_id
            .lock()
            .expect("field cache mutex poisoned")
            .get(id)
            .cloned()
        {
            self.metrics.inc_cache_hit();
            return Some(descriptor);
        }

        self.metrics.inc_cache_miss();
        if let Err(err) = self.refresh() {
            logging::warn(format!(
                "field cache refresh for unresolved id {} failed: {}",
                id, err
            ));
            return None;
        }
        self.by_id
            .lock()
            .expect("field cache mutex poisoned")
            .get(id)
            .cloned()
    }
}
