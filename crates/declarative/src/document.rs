//! Resource documents and the spec loader
//!
//! Every file the tool reads has the same four-part shape:
//!
//! ```yaml
//! apiVersion: keel/v1
//! kind: BackupJob
//! metadata:
//!   name: nightly-sql
//!   labels: { tier: gold }
//! spec:
//!   description: Nightly SQL backup
//! ```
//!
//! The `spec` tree is kept schema-less as a [`serde_json::Value`] so the
//! merge and drift engines work the same way for every kind.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Declared type of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Kind {
    /// A backup job
    BackupJob,
    /// A storage repository
    Repository,
    /// A scale-out repository grouping several extents
    ScaleOutRepository,
    /// An encryption password entry
    EncryptionPassword,
    /// A key management server registration
    KmsServer,
    /// Mixin: defaults applied underneath a spec
    Profile,
    /// Mixin: environment patch applied on top of a spec
    Overlay,
}

impl Kind {
    /// All kinds that may be applied or diffed on their own
    pub const RESOURCES: [Kind; 5] = [
        Kind::BackupJob,
        Kind::Repository,
        Kind::ScaleOutRepository,
        Kind::EncryptionPassword,
        Kind::KmsServer,
    ];

    /// Canonical name as written in documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BackupJob => "BackupJob",
            Self::Repository => "Repository",
            Self::ScaleOutRepository => "ScaleOutRepository",
            Self::EncryptionPassword => "EncryptionPassword",
            Self::KmsServer => "KmsServer",
            Self::Profile => "Profile",
            Self::Overlay => "Overlay",
        }
    }

    /// Profile and Overlay are merge inputs only
    pub fn is_mixin(&self) -> bool {
        matches!(self, Self::Profile | Self::Overlay)
    }

    /// Whether this kind can be the primary document of an apply or diff
    pub fn is_resource(&self) -> bool {
        !self.is_mixin()
    }

    /// Whether the tool actively manages this kind
    ///
    /// Managed kinds get an `applied` origin when legacy ledger records are
    /// migrated; the rest are treated as passive captures.
    pub fn is_managed(&self) -> bool {
        matches!(
            self,
            Self::BackupJob | Self::Repository | Self::ScaleOutRepository
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            Self::BackupJob,
            Self::Repository,
            Self::ScaleOutRepository,
            Self::EncryptionPassword,
            Self::KmsServer,
            Self::Profile,
            Self::Overlay,
        ]
        .into_iter()
        .find(|k| k.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

impl TryFrom<String> for Kind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        kind.as_str().to_string()
    }
}

/// Identity and annotations of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A parsed `{apiVersion, kind, metadata, spec}` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: Kind,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default = "empty_object")]
    pub spec: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Shape used while parsing, before the kind string is checked
#[derive(Deserialize)]
struct RawDocument {
    #[serde(rename = "apiVersion", default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    spec: Value,
}

impl ResourceDocument {
    /// Build a resource document from parts
    pub fn new(kind: Kind, name: impl Into<String>, spec: Value) -> Self {
        Self {
            api_version: crate::API_VERSION.to_string(),
            kind,
            metadata: Metadata {
                name: name.into(),
                ..Metadata::default()
            },
            spec,
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: RawDocument = serde_yaml::from_str(content)?;

        if raw.kind.trim().is_empty() {
            return Err(Error::MissingField("kind"));
        }
        let kind: Kind = raw.kind.parse()?;

        let spec = match raw.spec {
            Value::Null => empty_object(),
            other => other,
        };

        let doc = Self {
            api_version: raw.api_version,
            kind,
            metadata: raw.metadata,
            spec,
        };
        doc.validate()?;
        Ok(doc)
    }

    /// Read and parse a YAML document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc = Self::from_yaml_str(&content)?;
        log::debug!("Loaded {} '{}' from {}", doc.kind, doc.name(), path.display());
        Ok(doc)
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check the identity fields every document needs
    pub fn validate(&self) -> Result<()> {
        if self.api_version.trim().is_empty() {
            return Err(Error::MissingField("apiVersion"));
        }
        if self.kind.is_resource() && self.metadata.name.trim().is_empty() {
            return Err(Error::MissingField("metadata.name"));
        }
        Ok(())
    }

    /// Reject mixin kinds used as the primary document of an apply or diff
    pub fn ensure_resource(&self) -> Result<()> {
        if self.kind.is_mixin() {
            return Err(Error::KindMismatch {
                role: "spec",
                expected: "a resource kind".to_string(),
                found: self.kind,
            });
        }
        Ok(())
    }

    /// Resource name from metadata
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const JOB: &str = r#"
apiVersion: keel/v1
kind: BackupJob
metadata:
  name: nightly-sql
  labels:
    tier: gold
spec:
  description: Nightly SQL
  storage:
    retentionPolicy:
      type: Days
      quantity: 30
"#;

    #[test]
    fn test_parse_resource_document() {
        let doc = ResourceDocument::from_yaml_str(JOB).unwrap();
        assert_eq!(doc.kind, Kind::BackupJob);
        assert_eq!(doc.name(), "nightly-sql");
        assert_eq!(doc.metadata.labels.get("tier").unwrap(), "gold");
        assert_eq!(doc.spec["storage"]["retentionPolicy"]["quantity"], json!(30));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let yaml = "apiVersion: keel/v1\nkind: Toaster\nmetadata: {name: x}\n";
        let err = ResourceDocument::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, Error::UnknownKind(k) if k == "Toaster"));
    }

    #[test]
    fn test_missing_name_rejected_for_resources() {
        let yaml = "apiVersion: keel/v1\nkind: Repository\nspec: {}\n";
        let err = ResourceDocument::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, Error::MissingField("metadata.name")));
    }

    #[test]
    fn test_missing_api_version_rejected() {
        let yaml = "kind: Repository\nmetadata: {name: r1}\n";
        let err = ResourceDocument::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, Error::MissingField("apiVersion")));
    }

    #[test]
    fn test_profile_without_name_is_fine() {
        let yaml = "apiVersion: keel/v1\nkind: Profile\nspec:\n  a: 1\n";
        let doc = ResourceDocument::from_yaml_str(yaml).unwrap();
        assert!(doc.kind.is_mixin());
        assert!(doc.ensure_resource().is_err());
    }

    #[test]
    fn test_missing_spec_becomes_empty_object() {
        let yaml = "apiVersion: keel/v1\nkind: KmsServer\nmetadata: {name: kms}\n";
        let doc = ResourceDocument::from_yaml_str(yaml).unwrap();
        assert_eq!(doc.spec, json!({}));
    }

    #[test]
    fn test_kind_parse_is_case_insensitive() {
        assert_eq!("backupjob".parse::<Kind>().unwrap(), Kind::BackupJob);
        assert_eq!("OVERLAY".parse::<Kind>().unwrap(), Kind::Overlay);
        assert!("job".parse::<Kind>().is_err());
    }

    #[test]
    fn test_yaml_round_trip_keeps_identity() {
        let doc = ResourceDocument::from_yaml_str(JOB).unwrap();
        let yaml = doc.to_yaml().unwrap();
        assert!(yaml.contains("kind: BackupJob"));
        assert!(yaml.contains("apiVersion: keel/v1"));
        assert!(!yaml.contains("annotations"));
    }

    #[test]
    fn test_load_from_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("job.yaml");
        std::fs::write(&path, JOB).unwrap();
        let doc = ResourceDocument::load(&path).unwrap();
        assert_eq!(doc.name(), "nightly-sql");

        let missing = ResourceDocument::load(&tmp.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, Error::Io { .. }));
    }
}
