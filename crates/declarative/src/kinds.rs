//! Hand-declared field tables per resource kind
//!
//! Each kind lists the server-generated fields drift should skip, the base
//! severity of well-known fields, and the fields whose severity depends on
//! which way they changed.

use serde_json::Value;

use crate::document::Kind;
use crate::drift::IgnoreFields;
use crate::severity::Severity;

/// Which direction of change is the dangerous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Live value flipping to `true` is critical, to `false` a warning
    BadWhenTrue,
    /// Live value flipping to `false` is critical, to `true` a warning
    BadWhenFalse,
    /// Live number below desired is critical, above it a warning
    BadWhenLower,
}

/// A field whose severity depends on the direction of change
#[derive(Debug, Clone, Copy)]
pub struct DirectionalRule {
    pub path: &'static str,
    pub direction: Direction,
}

/// A field that references another recorded resource by id
#[derive(Debug, Clone, Copy)]
pub struct ReferenceRule {
    pub path: &'static str,
    /// Kind of the referenced resource
    pub target: Kind,
    /// Property whose loss is a downgrade
    pub property: &'static str,
    /// Evaluates the property on the referenced resource's spec
    pub holds: fn(&Value) -> bool,
}

const COMMON_IGNORED: &[&str] = &[
    "id",
    "uniqueId",
    "status",
    "lastRun",
    "nextRun",
    "lastResult",
    "modificationTime",
    "creationTime",
    "_links",
];

/// Fields drift never reports for this kind
pub fn ignore_fields(kind: Kind) -> IgnoreFields {
    let extra: &[&str] = match kind {
        Kind::BackupJob => &["lastSessionId", "isRunning", "sessionState"],
        Kind::Repository => &["capacityGB", "freeGB", "usedSpaceGB", "hostId"],
        Kind::ScaleOutRepository => &["capacityGB", "freeGB", "usedSpaceGB"],
        Kind::EncryptionPassword => &["password", "passwordHash"],
        Kind::KmsServer => &["certificateThumbprint"],
        Kind::Profile | Kind::Overlay => &[],
    };
    COMMON_IGNORED.iter().chain(extra).copied().collect()
}

/// Built-in severity by full path or trailing field name
pub fn severity_table(kind: Kind) -> &'static [(&'static str, Severity)] {
    use Severity::{Critical, Info, Warning};
    match kind {
        Kind::BackupJob => &[
            ("isDisabled", Critical),
            ("retentionPolicy", Critical),
            ("storage.retentionPolicy.quantity", Critical),
            ("storage.retentionPolicy.type", Critical),
            ("backupRepositoryId", Critical),
            ("encryption", Critical),
            ("isEnabled", Warning),
            ("gfsPolicy", Warning),
            ("schedule", Warning),
            ("runAutomatically", Warning),
            ("virtualMachines", Warning),
            ("guestProcessing", Warning),
            ("description", Info),
            ("name", Info),
        ],
        Kind::Repository => &[
            ("makeRecentBackupsImmutable", Critical),
            ("makeRecentBackupsImmutableDays", Critical),
            ("immutability", Critical),
            ("path", Critical),
            ("type", Critical),
            ("maxTaskCount", Warning),
            ("readWriteRate", Warning),
            ("description", Info),
        ],
        Kind::ScaleOutRepository => &[
            ("performanceTier", Critical),
            ("capacityTier", Critical),
            ("archiveTier", Warning),
            ("placementPolicy", Warning),
            ("description", Info),
        ],
        Kind::EncryptionPassword => &[("hint", Info), ("description", Info)],
        Kind::KmsServer => &[
            ("serverName", Critical),
            ("port", Warning),
            ("description", Info),
        ],
        Kind::Profile | Kind::Overlay => &[],
    }
}

/// Fields whose severity depends on the direction of change
pub fn directional_rules(kind: Kind) -> &'static [DirectionalRule] {
    match kind {
        Kind::BackupJob => &[
            DirectionalRule {
                path: "isDisabled",
                direction: Direction::BadWhenTrue,
            },
            DirectionalRule {
                path: "storage.retentionPolicy.quantity",
                direction: Direction::BadWhenLower,
            },
            DirectionalRule {
                path: "storage.advancedSettings.storageData.encryption.isEnabled",
                direction: Direction::BadWhenFalse,
            },
        ],
        Kind::Repository => &[
            DirectionalRule {
                path: "repository.makeRecentBackupsImmutableDays",
                direction: Direction::BadWhenLower,
            },
            DirectionalRule {
                path: "repository.makeRecentBackupsImmutable",
                direction: Direction::BadWhenFalse,
            },
            DirectionalRule {
                path: "bucket.immutability.isEnabled",
                direction: Direction::BadWhenFalse,
            },
        ],
        _ => &[],
    }
}

/// Fields that point at other recorded resources
pub fn reference_rules(kind: Kind) -> &'static [ReferenceRule] {
    match kind {
        Kind::BackupJob => BACKUP_JOB_REFERENCES,
        _ => &[],
    }
}

const BACKUP_JOB_REFERENCES: &[ReferenceRule] = &[ReferenceRule {
    path: "storage.backupRepositoryId",
    target: Kind::Repository,
    property: "hardened",
    holds: is_hardened_repository,
}];

/// A repository is hardened when it is a hardened Linux repository or has
/// immutability switched on
pub fn is_hardened_repository(spec: &Value) -> bool {
    let is_true = |v: Option<&Value>| v.and_then(Value::as_bool).unwrap_or(false);

    spec.get("type").and_then(Value::as_str) == Some("LinuxHardened")
        || is_true(spec.pointer("/repository/makeRecentBackupsImmutable"))
        || is_true(spec.pointer("/bucket/immutability/isEnabled"))
        || is_true(spec.pointer("/immutability/isEnabled"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_common_fields_ignored_everywhere() {
        for kind in Kind::RESOURCES {
            let ignore = ignore_fields(kind);
            assert!(ignore.contains("id"), "{kind} should ignore id");
            assert!(ignore.contains("status"));
        }
        assert!(ignore_fields(Kind::EncryptionPassword).contains("password"));
        assert!(!ignore_fields(Kind::BackupJob).contains("password"));
    }

    #[test]
    fn test_hardened_detection() {
        assert!(is_hardened_repository(&json!({"type": "LinuxHardened"})));
        assert!(is_hardened_repository(
            &json!({"type": "S3Compatible", "bucket": {"immutability": {"isEnabled": true}}})
        ));
        assert!(is_hardened_repository(
            &json!({"repository": {"makeRecentBackupsImmutable": true}})
        ));
        assert!(!is_hardened_repository(&json!({"type": "WinLocal"})));
        assert!(!is_hardened_repository(
            &json!({"bucket": {"immutability": {"isEnabled": false}}})
        ));
    }

    #[test]
    fn test_mixins_have_no_tables() {
        assert!(severity_table(Kind::Profile).is_empty());
        assert!(directional_rules(Kind::Overlay).is_empty());
        assert!(reference_rules(Kind::Profile).is_empty());
    }
}
