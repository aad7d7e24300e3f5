//! The API seam between the reconciler and a backup server.
//!
//! [`ResourceApi`] is the only way the CLI reaches the server. The REST
//! implementation lives in [`rest`]; [`MockApi`] keeps everything in memory
//! for tests:
//!
//! ```
//! use declarative::Kind;
//! use remote::{MockApi, ProductProfile, ResourceApi};
//! use serde_json::json;
//!
//! let api = MockApi::new();
//! api.insert(Kind::BackupJob, "nightly", "42", json!({"isDisabled": true}));
//!
//! let profile = ProductProfile::new("vbr", "mock://").unwrap();
//! let live = api.fetch_current(Kind::BackupJob, "nightly", &profile).unwrap().unwrap();
//! assert_eq!(live.id, "42");
//! ```

pub mod rest;

use declarative::Kind;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::profile::ProductProfile;

/// Live configuration of one resource as the server reports it
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResource {
    /// Server-assigned identifier
    pub id: String,
    /// Full live document
    pub spec: Value,
}

/// Fetch and push operations against a backup server.
pub trait ResourceApi: Send + Sync {
    /// Look up a resource by name.
    ///
    /// A resource that does not exist is `Ok(None)`, not an error, so batch
    /// flows can keep going.
    fn fetch_current(
        &self,
        kind: Kind,
        name: &str,
        profile: &ProductProfile,
    ) -> Result<Option<FetchedResource>>;

    /// Replace an existing resource with `spec`.
    fn push_update(&self, kind: Kind, id: &str, spec: &Value, profile: &ProductProfile)
    -> Result<()>;

    /// Create a new resource and return its identifier.
    fn push_create(
        &self,
        kind: Kind,
        name: &str,
        spec: &Value,
        profile: &ProductProfile,
    ) -> Result<String>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

#[derive(Debug, Default)]
struct MockInner {
    resources: HashMap<(Kind, String), FetchedResource>,
    failing: BTreeSet<String>,
    updates: Vec<(Kind, String, Value)>,
    creates: Vec<(Kind, String, Value)>,
    next_id: u64,
}

/// Mock API for testing without network access.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MockApi {
    inner: Arc<Mutex<MockInner>>,
}

impl MockApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, MockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a live resource.
    pub fn insert(&self, kind: Kind, name: impl Into<String>, id: impl Into<String>, spec: Value) {
        let id = id.into();
        self.inner()
            .resources
            .insert((kind, name.into()), FetchedResource { id, spec });
    }

    /// Make every call touching `name` fail with a server error.
    pub fn fail_on(&self, name: impl Into<String>) {
        self.inner().failing.insert(name.into());
    }

    /// Current live document for a resource, if any.
    pub fn get(&self, kind: Kind, name: &str) -> Option<FetchedResource> {
        self.inner().resources.get(&(kind, name.to_string())).cloned()
    }

    /// Updates pushed so far as `(kind, id, spec)`.
    pub fn updates(&self) -> Vec<(Kind, String, Value)> {
        self.inner().updates.clone()
    }

    /// Creates pushed so far as `(kind, name, spec)`.
    pub fn creates(&self) -> Vec<(Kind, String, Value)> {
        self.inner().creates.clone()
    }
}

fn injected_failure(name: &str) -> Error {
    Error::http(format!("injected failure for '{name}'"), Some(500))
}

impl ResourceApi for MockApi {
    fn fetch_current(
        &self,
        kind: Kind,
        name: &str,
        _profile: &ProductProfile,
    ) -> Result<Option<FetchedResource>> {
        let inner = self.inner();
        if inner.failing.contains(name) {
            return Err(injected_failure(name));
        }
        Ok(inner.resources.get(&(kind, name.to_string())).cloned())
    }

    fn push_update(
        &self,
        kind: Kind,
        id: &str,
        spec: &Value,
        _profile: &ProductProfile,
    ) -> Result<()> {
        let mut inner = self.inner();
        let name = inner
            .resources
            .iter()
            .find(|((k, _), res)| *k == kind && res.id == id)
            .map(|((_, name), _)| name.clone())
            .ok_or_else(|| Error::NotFound {
                kind: kind.to_string(),
                name: id.to_string(),
            })?;
        if inner.failing.contains(&name) {
            return Err(injected_failure(&name));
        }

        inner.updates.push((kind, id.to_string(), spec.clone()));
        inner.resources.insert(
            (kind, name),
            FetchedResource {
                id: id.to_string(),
                spec: spec.clone(),
            },
        );
        Ok(())
    }

    fn push_create(
        &self,
        kind: Kind,
        name: &str,
        spec: &Value,
        _profile: &ProductProfile,
    ) -> Result<String> {
        let mut inner = self.inner();
        if inner.failing.contains(name) {
            return Err(injected_failure(name));
        }

        inner.next_id += 1;
        let id = format!("mock-{}", inner.next_id);
        inner.creates.push((kind, name.to_string(), spec.clone()));
        inner.resources.insert(
            (kind, name.to_string()),
            FetchedResource {
                id: id.clone(),
                spec: spec.clone(),
            },
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> ProductProfile {
        ProductProfile::new("vbr", "mock://server").unwrap()
    }

    #[test]
    fn test_fetch_missing_is_none() {
        let api = MockApi::new();
        let found = api.fetch_current(Kind::BackupJob, "nope", &profile()).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_fetch_is_scoped_by_kind() {
        let api = MockApi::new();
        api.insert(Kind::Repository, "shared", "r1", json!({}));
        assert!(api.fetch_current(Kind::BackupJob, "shared", &profile()).unwrap().is_none());
        assert!(api.fetch_current(Kind::Repository, "shared", &profile()).unwrap().is_some());
    }

    #[test]
    fn test_update_replaces_live_document() {
        let api = MockApi::new();
        api.insert(Kind::BackupJob, "nightly", "42", json!({"isDisabled": true}));

        api.push_update(Kind::BackupJob, "42", &json!({"isDisabled": false}), &profile())
            .unwrap();

        let live = api.get(Kind::BackupJob, "nightly").unwrap();
        assert_eq!(live.spec, json!({"isDisabled": false}));
        assert_eq!(api.updates().len(), 1);
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let api = MockApi::new();
        let err = api
            .push_update(Kind::BackupJob, "missing", &json!({}), &profile())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_create_assigns_ids() {
        let api = MockApi::new();
        let a = api.push_create(Kind::BackupJob, "a", &json!({}), &profile()).unwrap();
        let b = api.push_create(Kind::BackupJob, "b", &json!({}), &profile()).unwrap();
        assert_ne!(a, b);
        assert_eq!(api.get(Kind::BackupJob, "b").unwrap().id, b);
        assert_eq!(api.creates().len(), 2);
    }

    #[test]
    fn test_injected_failure() {
        let api = MockApi::new();
        api.insert(Kind::BackupJob, "flaky", "7", json!({}));
        api.fail_on("flaky");

        assert!(api.fetch_current(Kind::BackupJob, "flaky", &profile()).is_err());
        assert!(api.push_update(Kind::BackupJob, "7", &json!({}), &profile()).is_err());
        assert!(api.push_create(Kind::BackupJob, "flaky", &json!({}), &profile()).is_err());
    }

    #[test]
    fn test_clones_share_storage() {
        let api = MockApi::new();
        let clone = api.clone();
        clone.insert(Kind::KmsServer, "kms", "k1", json!({"name": "kms"}));
        assert!(api.get(Kind::KmsServer, "kms").is_some());
    }
}
