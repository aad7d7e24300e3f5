//! Ledger contents: one record per managed resource name

use chrono::{DateTime, Utc};
use declarative::{detect_drift, kinds, Kind, ResourceLookup};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Schema version written by this build
pub const CURRENT_VERSION: u32 = 2;

/// History entries kept per resource, newest first
pub const DEFAULT_MAX_HISTORY_EVENTS: usize = 3;

// ============================================================================
// Record Structures
// ============================================================================

/// Whether a snapshot is a desired-state baseline or a passive capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Set by adopt/apply; drift is measured against it
    Applied,
    /// Set by snapshot-only flows
    Observed,
}

impl Origin {
    /// Origin assumed for legacy records that predate the field
    pub fn default_for(kind: Kind) -> Self {
        if kind.is_managed() {
            Self::Applied
        } else {
            Self::Observed
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => write!(f, "applied"),
            Self::Observed => write!(f, "observed"),
        }
    }
}

/// One entry of a resource's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// What happened: apply, adopt, snapshot
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub user: String,

    /// Changed field paths, when known
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,

    /// The recorded change covered only part of the live resource
    #[serde(default)]
    pub partial: bool,
}

impl Event {
    /// Event stamped now for the current user
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            timestamp: Utc::now(),
            user: current_user(),
            fields: Vec::new(),
            partial: false,
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }
}

/// Last known configuration of a named resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    #[serde(rename = "type")]
    pub kind: Kind,
    /// Identifier assigned by the remote API
    pub id: String,
    pub name: String,
    pub spec: Value,
    pub last_applied: DateTime<Utc>,
    pub last_applied_by: String,
    pub origin: Origin,
    #[serde(default)]
    pub history: Vec<Event>,
}

/// Input for [`State::record`]
#[derive(Debug, Clone)]
pub struct RecordUpdate {
    pub kind: Kind,
    pub id: String,
    pub name: String,
    pub spec: Value,
    pub origin: Origin,
    pub event: Event,
}

/// The whole ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub version: u32,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
}

// ============================================================================
// State Implementation
// ============================================================================

impl State {
    /// Empty ledger at the current schema version
    pub fn new() -> Self {
        Self {
            version: CURRENT_VERSION,
            resources: BTreeMap::new(),
        }
    }

    /// Look up a record by resource name
    pub fn get_resource(&self, name: &str) -> Result<&ResourceRecord> {
        self.resources
            .get(name)
            .ok_or_else(|| Error::ResourceNotFound(name.to_string()))
    }

    /// Insert or overwrite a record as-is
    pub fn set_resource(&mut self, record: ResourceRecord) {
        self.resources.insert(record.name.clone(), record);
    }

    /// Records sorted by name, optionally restricted to one kind
    pub fn list_resources(&self, kind: Option<Kind>) -> Vec<&ResourceRecord> {
        self.resources
            .values()
            .filter(|r| kind.is_none_or(|k| r.kind == k))
            .collect()
    }

    /// Explicitly delete a record
    pub fn remove_resource(&mut self, name: &str) -> Result<ResourceRecord> {
        self.resources
            .remove(name)
            .ok_or_else(|| Error::ResourceNotFound(name.to_string()))
    }

    /// Create or overwrite a record, prepending its event to the history
    ///
    /// History is trimmed to `max_history` entries, dropping the oldest.
    pub fn record(&mut self, update: RecordUpdate, max_history: usize) -> &ResourceRecord {
        let mut history = self
            .resources
            .remove(&update.name)
            .map(|r| r.history)
            .unwrap_or_default();
        history.insert(0, update.event.clone());
        history.truncate(max_history.max(1));

        let record = ResourceRecord {
            kind: update.kind,
            id: update.id,
            name: update.name.clone(),
            spec: update.spec,
            last_applied: update.event.timestamp,
            last_applied_by: update.event.user,
            origin: update.origin,
            history,
        };
        self.resources.entry(update.name).or_insert(record)
    }

    /// Sorted paths that differ between the recorded snapshot and `spec`
    ///
    /// Empty when nothing is recorded under `name` yet.
    pub fn changed_fields(&self, name: &str, spec: &Value) -> Vec<String> {
        let Some(previous) = self.resources.get(name) else {
            return Vec::new();
        };
        let mut fields: Vec<String> =
            detect_drift(&previous.spec, spec, &kinds::ignore_fields(previous.kind))
                .into_iter()
                .map(|d| d.path)
                .collect();
        fields.sort();
        fields
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLookup for State {
    fn spec_by_id(&self, kind: Kind, id: &str) -> Option<Value> {
        self.resources
            .values()
            .find(|r| r.kind == kind && r.id == id)
            .map(|r| r.spec.clone())
    }
}

/// Name recorded as the actor of an event
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

// ============================================================================
// Schema Migration
// ============================================================================

/// Bring a raw ledger document up to [`CURRENT_VERSION`] in place
///
/// Version 1 records had no `origin`; managed kinds become `applied`,
/// everything else `observed`. Returns whether anything changed.
pub(crate) fn migrate(raw: &mut Value) -> Result<bool> {
    let found = raw.get("version").and_then(Value::as_u64).unwrap_or(1);
    let version = u32::try_from(found)
        .ok()
        .filter(|v| *v <= CURRENT_VERSION)
        .ok_or(Error::UnsupportedVersion {
            found,
            supported: CURRENT_VERSION,
        })?;
    if version == CURRENT_VERSION {
        return Ok(false);
    }

    if let Some(resources) = raw.get_mut("resources").and_then(Value::as_object_mut) {
        for (name, record) in resources.iter_mut() {
            let Some(record) = record.as_object_mut() else {
                continue;
            };
            if record.contains_key("origin") {
                continue;
            }
            let origin = record
                .get("type")
                .and_then(Value::as_str)
                .and_then(|t| t.parse::<Kind>().ok())
                .map_or(Origin::Observed, Origin::default_for);
            log::debug!("Migrating '{name}': inferred origin {origin}");
            record.insert("origin".to_string(), Value::String(origin.to_string()));
        }
    }

    if let Some(obj) = raw.as_object_mut() {
        obj.insert("version".to_string(), Value::from(CURRENT_VERSION));
    }
    log::info!("Migrated ledger from schema v{version} to v{CURRENT_VERSION}");
    Ok(true)
}

// ============================================================================
// Tests
// ============================================================================
