//! Blocking REST backend.
//!
//! Resources are addressed through per-kind collection endpoints. Lookups
//! by name list the collection with a name filter and pick the exact match;
//! updates `PUT` the full document to `<collection>/<id>`.

use declarative::Kind;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::api::{FetchedResource, ResourceApi};
use crate::error::{Error, Result};
use crate::profile::ProductProfile;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// REST API client.
///
/// # Example
///
/// ```no_run
/// use declarative::Kind;
/// use remote::{ProductProfile, ResourceApi, RestApi};
///
/// let api = RestApi::new(Some("token".into()), false);
/// let profile = ProductProfile::new("vbr", "https://backup.example.com:9419").unwrap();
/// let job = api.fetch_current(Kind::BackupJob, "nightly", &profile).unwrap();
/// println!("found: {}", job.is_some());
/// ```
pub struct RestApi {
    agent: ureq::Agent,
    token: Option<String>,
}

impl RestApi {
    /// Create a client; `insecure` disables TLS certificate verification
    /// for servers with self-signed certificates.
    #[must_use]
    pub fn new(token: Option<String>, insecure: bool) -> Self {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(insecure)
            .build();
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .tls_config(tls)
            .build();
        if insecure {
            log::warn!("TLS certificate verification is disabled");
        }
        Self {
            agent: ureq::Agent::new_with_config(config),
            token,
        }
    }

    fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: Option<(&str, &str)>,
        profile: &ProductProfile,
    ) -> Result<T> {
        let mut request = self.agent.get(url).header("Accept", "application/json");
        if let Some(version) = &profile.api_version {
            request = request.header("x-api-version", version);
        }
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", &auth);
        }
        if let Some((key, value)) = query {
            request = request.query(key, value);
        }
        Ok(request.call()?.body_mut().read_json()?)
    }
}

/// Collection endpoint for a kind
pub fn collection_path(kind: Kind) -> Result<&'static str> {
    match kind {
        Kind::BackupJob => Ok("/api/v1/jobs"),
        Kind::Repository => Ok("/api/v1/backupInfrastructure/repositories"),
        Kind::ScaleOutRepository => Ok("/api/v1/backupInfrastructure/scaleOutRepositories"),
        Kind::EncryptionPassword => Ok("/api/v1/encryptionPasswords"),
        Kind::KmsServer => Ok("/api/v1/kmsServers"),
        Kind::Profile | Kind::Overlay => Err(Error::InvalidResponse(format!(
            "{kind} documents have no server endpoint"
        ))),
    }
}

/// Field holding the human-facing identity of a resource
pub fn name_field(kind: Kind) -> &'static str {
    match kind {
        Kind::EncryptionPassword => "hint",
        _ => "name",
    }
}

/// Pick the exact name match out of a filtered collection listing
fn find_by_name(kind: Kind, name: &str, items: Vec<Value>) -> Result<Option<FetchedResource>> {
    let field = name_field(kind);
    let Some(item) = items
        .into_iter()
        .find(|item| item.get(field).and_then(Value::as_str) == Some(name))
    else {
        return Ok(None);
    };

    let id = match item.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(Error::InvalidResponse(format!(
                "{kind} '{name}' has no id"
            )));
        }
    };
    Ok(Some(FetchedResource { id, spec: item }))
}

/// Ensure a create payload carries the resource's name
fn with_name(kind: Kind, name: &str, spec: &Value) -> Value {
    let mut body = spec.clone();
    if let Value::Object(map) = &mut body {
        map.entry(name_field(kind))
            .or_insert_with(|| Value::String(name.to_string()));
    }
    body
}

impl ResourceApi for RestApi {
    fn fetch_current(
        &self,
        kind: Kind,
        name: &str,
        profile: &ProductProfile,
    ) -> Result<Option<FetchedResource>> {
        let url = profile.url(collection_path(kind)?);
        let filter = match kind {
            Kind::EncryptionPassword => None,
            _ => Some(("nameFilter", name)),
        };
        log::debug!("GET {url} ({kind} '{name}')");

        let page: Page = self.get_json(&url, filter, profile)?;
        find_by_name(kind, name, page.data)
    }

    fn push_update(
        &self,
        kind: Kind,
        id: &str,
        spec: &Value,
        profile: &ProductProfile,
    ) -> Result<()> {
        let url = format!("{}/{}", profile.url(collection_path(kind)?), id);
        log::debug!("PUT {url}");

        let mut request = self.agent.put(&url).header("Accept", "application/json");
        if let Some(version) = &profile.api_version {
            request = request.header("x-api-version", version);
        }
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", &auth);
        }
        match request.send_json(spec) {
            Ok(_) => Ok(()),
            Err(ureq::Error::StatusCode(404)) => Err(Error::NotFound {
                kind: kind.to_string(),
                name: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn push_create(
        &self,
        kind: Kind,
        name: &str,
        spec: &Value,
        profile: &ProductProfile,
    ) -> Result<String> {
        let url = profile.url(collection_path(kind)?);
        log::debug!("POST {url} ({kind} '{name}')");

        let mut request = self.agent.post(&url).header("Accept", "application/json");
        if let Some(version) = &profile.api_version {
            request = request.header("x-api-version", version);
        }
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", &auth);
        }
        let created: Value = request
            .send_json(&with_name(kind, name, spec))?
            .body_mut()
            .read_json()?;

        find_by_name(kind, name, vec![created])?
            .map(|res| res.id)
            .ok_or_else(|| Error::InvalidResponse(format!("create of {kind} '{name}' returned no id")))
    }
}

// =============================================================================
// API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    data: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_paths() {
        assert_eq!(collection_path(Kind::BackupJob).unwrap(), "/api/v1/jobs");
        assert_eq!(
            collection_path(Kind::Repository).unwrap(),
            "/api/v1/backupInfrastructure/repositories"
        );
        for kind in Kind::RESOURCES {
            assert!(collection_path(kind).is_ok());
        }
        assert!(collection_path(Kind::Profile).is_err());
    }

    #[test]
    fn test_find_by_name_exact_match() {
        let items = vec![
            json!({"id": "1", "name": "nightly-sql"}),
            json!({"id": "2", "name": "nightly"}),
        ];
        let found = find_by_name(Kind::BackupJob, "nightly", items).unwrap().unwrap();
        assert_eq!(found.id, "2");
        assert_eq!(found.spec["name"], "nightly");
    }

    #[test]
    fn test_find_by_name_numeric_id() {
        let items = vec![json!({"id": 17, "name": "kms"})];
        let found = find_by_name(Kind::KmsServer, "kms", items).unwrap().unwrap();
        assert_eq!(found.id, "17");
    }

    #[test]
    fn test_find_by_name_uses_hint_for_passwords() {
        let items = vec![json!({"id": "e1", "hint": "primary"})];
        assert!(find_by_name(Kind::EncryptionPassword, "primary", items).unwrap().is_some());
    }

    #[test]
    fn test_find_by_name_missing() {
        let items = vec![json!({"id": "1", "name": "other"})];
        assert!(find_by_name(Kind::BackupJob, "nightly", items).unwrap().is_none());
    }

    #[test]
    fn test_find_by_name_without_id_is_invalid() {
        let items = vec![json!({"name": "nightly"})];
        let err = find_by_name(Kind::BackupJob, "nightly", items).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[test]
    fn test_with_name_fills_missing_identity() {
        let body = with_name(Kind::BackupJob, "nightly", &json!({"isDisabled": false}));
        assert_eq!(body["name"], "nightly");

        let kept = with_name(Kind::BackupJob, "nightly", &json!({"name": "explicit"}));
        assert_eq!(kept["name"], "explicit");
    }

    #[test]
    fn test_page_defaults_to_empty() {
        let page: Page = serde_json::from_value(json!({"pagination": {"total": 0}})).unwrap();
        assert!(page.data.is_empty());
    }
}
