//! Mapping results to process exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success / no drift |
//! | 1 | general error |
//! | 3 | drift at INFO or WARNING |
//! | 4 | drift at CRITICAL |
//! | 5 | partial success across a batch apply |
//! | 6 | target resource not found (update-only mode) |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::drift::Difference;
use crate::severity::{self, Severity};

/// Exit codes understood by shells and CI pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Drift = 3,
    CriticalDrift = 4,
    PartialSuccess = 5,
    NotFound = 6,
}

impl ExitCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.code())
    }
}

/// Result of comparing one or more resources against live state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriftOutcome {
    NoDrift,
    Drift,
    CriticalDrift,
}

impl DriftOutcome {
    /// Highest severity present decides the outcome
    pub fn from_differences(diffs: &[Difference]) -> Self {
        match severity::highest(diffs) {
            None => Self::NoDrift,
            Some(Severity::Critical) => Self::CriticalDrift,
            Some(Severity::Info | Severity::Warning) => Self::Drift,
        }
    }

    /// Combine per-resource outcomes, worst wins
    pub fn combine(self, other: Self) -> Self {
        self.max(other)
    }

    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::NoDrift => ExitCode::Success,
            Self::Drift => ExitCode::Drift,
            Self::CriticalDrift => ExitCode::CriticalDrift,
        }
    }

    /// One-line remediation guidance for operators
    pub fn guidance(self) -> &'static str {
        match self {
            Self::NoDrift => "Live configuration matches the desired state.",
            Self::Drift => {
                "Review the changes; re-apply the desired spec or adopt the live configuration if the change was intended."
            }
            Self::CriticalDrift => {
                "Critical drift: data protection may be reduced. Investigate who changed it, then re-apply the desired spec or adopt the live configuration after review."
            }
        }
    }
}

impl fmt::Display for DriftOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDrift => write!(f, "no drift"),
            Self::Drift => write!(f, "drift"),
            Self::CriticalDrift => write!(f, "critical drift"),
        }
    }
}

/// Per-resource result of an apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ApplyStatus {
    Success,
    Failed { error: String },
    NotFound,
}

impl ApplyStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Result of a batch apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyOutcome {
    AllSucceeded,
    PartialSuccess,
    AllFailed,
    SingleNotFound,
}

impl ApplyOutcome {
    /// Classify a batch; an empty batch counts as all-failed
    pub fn from_results(results: &[ApplyStatus]) -> Self {
        if let [ApplyStatus::NotFound] = results {
            return Self::SingleNotFound;
        }
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        match succeeded {
            0 => Self::AllFailed,
            n if n == results.len() => Self::AllSucceeded,
            _ => Self::PartialSuccess,
        }
    }

    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::AllSucceeded => ExitCode::Success,
            Self::PartialSuccess => ExitCode::PartialSuccess,
            Self::AllFailed => ExitCode::Error,
            Self::SingleNotFound => ExitCode::NotFound,
        }
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllSucceeded => write!(f, "all succeeded"),
            Self::PartialSuccess => write!(f, "partial success"),
            Self::AllFailed => write!(f, "all failed"),
            Self::SingleNotFound => write!(f, "not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::DriftAction;
    use serde_json::json;

    fn diff(severity: Severity) -> Difference {
        let mut d = Difference::new("a", DriftAction::Modified, Some(json!(1)), Some(json!(2)));
        d.severity = severity;
        d
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Error.code(), 1);
        assert_eq!(ExitCode::Drift.code(), 3);
        assert_eq!(ExitCode::CriticalDrift.code(), 4);
        assert_eq!(ExitCode::PartialSuccess.code(), 5);
        assert_eq!(ExitCode::NotFound.code(), 6);
    }

    #[test]
    fn test_drift_outcome_highest_wins() {
        assert_eq!(DriftOutcome::from_differences(&[]), DriftOutcome::NoDrift);
        assert_eq!(
            DriftOutcome::from_differences(&[diff(Severity::Info)]).exit_code(),
            ExitCode::Drift
        );
        assert_eq!(
            DriftOutcome::from_differences(&[diff(Severity::Warning), diff(Severity::Info)])
                .exit_code(),
            ExitCode::Drift
        );
        assert_eq!(
            DriftOutcome::from_differences(&[diff(Severity::Info), diff(Severity::Critical)])
                .exit_code(),
            ExitCode::CriticalDrift
        );
    }

    #[test]
    fn test_adding_critical_never_lowers_exit_code() {
        let sets = [
            vec![diff(Severity::Info)],
            vec![diff(Severity::Warning)],
            vec![diff(Severity::Critical)],
            vec![diff(Severity::Info), diff(Severity::Warning)],
        ];
        for set in sets {
            let before = DriftOutcome::from_differences(&set).exit_code();
            let mut more = set.clone();
            more.push(diff(Severity::Critical));
            let after = DriftOutcome::from_differences(&more).exit_code();
            assert!(after >= before);
            assert_eq!(after, ExitCode::CriticalDrift);
        }
    }

    #[test]
    fn test_combine_drift_outcomes() {
        assert_eq!(
            DriftOutcome::NoDrift.combine(DriftOutcome::Drift),
            DriftOutcome::Drift
        );
        assert_eq!(
            DriftOutcome::CriticalDrift.combine(DriftOutcome::NoDrift),
            DriftOutcome::CriticalDrift
        );
    }

    #[test]
    fn test_apply_outcomes() {
        use ApplyStatus::*;
        let failed = || Failed { error: "boom".into() };

        assert_eq!(ApplyOutcome::from_results(&[Success, Success]), ApplyOutcome::AllSucceeded);
        assert_eq!(ApplyOutcome::from_results(&[Success, failed()]), ApplyOutcome::PartialSuccess);
        assert_eq!(ApplyOutcome::from_results(&[failed(), failed()]), ApplyOutcome::AllFailed);
        assert_eq!(ApplyOutcome::from_results(&[NotFound]), ApplyOutcome::SingleNotFound);
        assert_eq!(ApplyOutcome::from_results(&[Success, NotFound]), ApplyOutcome::PartialSuccess);
        assert_eq!(ApplyOutcome::from_results(&[NotFound, NotFound]), ApplyOutcome::AllFailed);
    }

    #[test]
    fn test_empty_batch_is_all_failed() {
        let outcome = ApplyOutcome::from_results(&[]);
        assert_eq!(outcome, ApplyOutcome::AllFailed);
        assert_eq!(outcome.exit_code(), ExitCode::Error);
    }

    #[test]
    fn test_apply_exit_codes() {
        assert_eq!(ApplyOutcome::AllSucceeded.exit_code().code(), 0);
        assert_eq!(ApplyOutcome::PartialSuccess.exit_code().code(), 5);
        assert_eq!(ApplyOutcome::AllFailed.exit_code().code(), 1);
        assert_eq!(ApplyOutcome::SingleNotFound.exit_code().code(), 6);
    }
}
