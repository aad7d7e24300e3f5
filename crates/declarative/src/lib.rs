//! # Declarative
//!
//! The reconciliation engine behind `keel`: desired configuration is
//! declared as layered documents, compared against live state, and the
//! differences are ranked by how much they matter.
//!
//! ## Core Concepts
//!
//! - **ResourceDocument**: an `{apiVersion, kind, metadata, spec}` document
//! - **Merge**: profile defaults < resource spec < environment overlay
//! - **Drift**: path-qualified differences between desired and live specs
//! - **Severity**: INFO / WARNING / CRITICAL per difference, with
//!   kind-specific directional and cross-resource rules
//! - **Outcome**: the exit code a batch of drifts or applies maps to
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     classify, detect_drift, enhance, kinds, merge, DriftOutcome, ExitCode, Kind,
//!     MergeOptions, ResourceDocument, SeverityRules,
//! };
//! use serde_json::json;
//!
//! let spec = ResourceDocument::new(Kind::BackupJob, "nightly", json!({"isDisabled": false}));
//! let resolved = merge(None, &spec, None, MergeOptions::default())?;
//!
//! let live = json!({"isDisabled": true, "id": "42"});
//! let diffs = detect_drift(&resolved.spec, &live, &kinds::ignore_fields(Kind::BackupJob));
//! let diffs = enhance(classify(diffs, Kind::BackupJob, &SeverityRules::builtin()), Kind::BackupJob, None);
//!
//! assert_eq!(DriftOutcome::from_differences(&diffs).exit_code(), ExitCode::CriticalDrift);
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! Everything here is pure computation over values already in memory; the
//! only I/O is reading documents and severity override files.

pub mod document;
pub mod drift;
pub mod error;
pub mod kinds;
pub mod merge;
pub mod outcome;
pub mod severity;

/// `apiVersion` written into documents this crate creates
pub const API_VERSION: &str = "keel/v1";

// Re-export main types at crate root
pub use document::{Kind, Metadata, ResourceDocument};
pub use drift::{detect_drift, sort_by_path, values_equal, Difference, DriftAction, IgnoreFields};
pub use error::{Error, Result};
pub use merge::{merge, merge_values, ArrayStrategy, MergeOptions};
pub use outcome::{ApplyOutcome, ApplyStatus, DriftOutcome, ExitCode};
pub use severity::{classify, enhance, ResourceLookup, Severity, SeverityRules};
