//! Severity classification of drift
//!
//! Classification runs in two passes:
//!
//! 1. [`classify`] looks each difference up in a [`SeverityRules`] table,
//!    first by full path, then by trailing field name, defaulting to INFO.
//! 2. [`enhance`] applies kind-specific knowledge on top: directional rules
//!    (disabling is worse than enabling) and cross-resource checks that
//!    consult recorded resources through a [`ResourceLookup`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::document::Kind;
use crate::drift::{Difference, DriftAction};
use crate::error::{Error, Result};
use crate::kinds::{self, Direction};

/// Operational severity of a difference, ordered INFO < WARNING < CRITICAL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Per-kind severity tables keyed by full path or trailing field name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeverityRules {
    tables: BTreeMap<Kind, BTreeMap<String, Severity>>,
}

impl SeverityRules {
    /// Rules with no entries; everything classifies as INFO
    pub fn empty() -> Self {
        Self::default()
    }

    /// The hand-declared tables for every resource kind
    pub fn builtin() -> Self {
        let mut rules = Self::empty();
        for kind in Kind::RESOURCES {
            for (path, severity) in kinds::severity_table(kind) {
                rules.set(kind, *path, *severity);
            }
        }
        rules
    }

    /// Add or replace a single rule
    pub fn set(&mut self, kind: Kind, path: impl Into<String>, severity: Severity) {
        self.tables.entry(kind).or_default().insert(path.into(), severity);
    }

    /// Severity for a path: full match, then trailing segment, then INFO
    pub fn lookup(&self, kind: Kind, path: &str) -> Severity {
        let Some(table) = self.tables.get(&kind) else {
            return Severity::Info;
        };
        if let Some(severity) = table.get(path) {
            return *severity;
        }
        let field = path.rsplit('.').next().unwrap_or(path);
        table.get(field).copied().unwrap_or_default()
    }

    /// Merge overrides shaped `{ "<Kind>": { "<path>": "<severity>" } }`
    ///
    /// Unknown kinds and severity strings are logged and skipped. Returns
    /// the number of rules applied.
    pub fn apply_overrides(&mut self, overrides: &Value) -> usize {
        let Some(by_kind) = overrides.as_object() else {
            log::warn!("Severity overrides must be a JSON object, ignoring");
            return 0;
        };

        let mut applied = 0;
        for (kind_name, fields) in by_kind {
            let kind = match kind_name.parse::<Kind>() {
                Ok(k) if k.is_resource() => k,
                _ => {
                    log::warn!("Ignoring severity overrides for unknown kind '{kind_name}'");
                    continue;
                }
            };
            let Some(fields) = fields.as_object() else {
                log::warn!("Severity overrides for {kind} must be an object, ignoring");
                continue;
            };
            for (path, raw) in fields {
                match raw.as_str().map(str::parse::<Severity>) {
                    Some(Ok(severity)) => {
                        self.set(kind, path.clone(), severity);
                        applied += 1;
                    }
                    _ => log::warn!("Ignoring {kind}.{path}: unknown severity {raw}"),
                }
            }
        }
        applied
    }

    /// Read an override file and merge it into these rules
    pub fn load_overrides(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&content)?;
        let applied = self.apply_overrides(&value);
        log::debug!("Applied {applied} severity overrides from {}", path.display());
        Ok(applied)
    }
}

/// Read access to recorded resources for cross-resource checks
pub trait ResourceLookup {
    /// Spec snapshot of the recorded resource of `kind` with this API id
    fn spec_by_id(&self, kind: Kind, id: &str) -> Option<Value>;
}

/// Base classification pass
pub fn classify(mut diffs: Vec<Difference>, kind: Kind, rules: &SeverityRules) -> Vec<Difference> {
    for diff in &mut diffs {
        diff.severity = rules.lookup(kind, &diff.path);
    }
    diffs
}

/// Kind-specific enhancement pass
///
/// Directional rules replace the base severity of matching differences.
/// Reference rules may force CRITICAL and append a synthetic difference
/// explaining the downgrade; they are skipped when either referenced
/// resource cannot be resolved.
pub fn enhance(mut diffs: Vec<Difference>, kind: Kind, lookup: Option<&dyn ResourceLookup>) -> Vec<Difference> {
    for diff in &mut diffs {
        if diff.action != DriftAction::Modified {
            continue;
        }
        if let Some(rule) = kinds::directional_rules(kind).iter().find(|r| r.path == diff.path) {
            if let Some(severity) = directional_severity(rule.direction, diff) {
                diff.severity = severity;
            }
        }
    }

    let Some(lookup) = lookup else {
        return diffs;
    };

    let mut synthetic = Vec::new();
    for diff in &mut diffs {
        if diff.action != DriftAction::Modified {
            continue;
        }
        let Some(rule) = kinds::reference_rules(kind).iter().find(|r| r.path == diff.path) else {
            continue;
        };
        let (Some(from), Some(to)) = (
            diff.desired_value.as_ref().and_then(reference_id),
            diff.live_value.as_ref().and_then(reference_id),
        ) else {
            continue;
        };
        let (Some(from_spec), Some(to_spec)) = (
            lookup.spec_by_id(rule.target, &from),
            lookup.spec_by_id(rule.target, &to),
        ) else {
            log::debug!(
                "Skipping {} check for {}: {} {from} or {to} not recorded",
                rule.property,
                diff.path,
                rule.target
            );
            continue;
        };

        if (rule.holds)(&from_spec) && !(rule.holds)(&to_spec) {
            diff.severity = Severity::Critical;
            let mut explain = Difference::new(
                format!("{}.{}", diff.path, rule.property),
                DriftAction::Modified,
                Some(Value::Bool(true)),
                Some(Value::Bool(false)),
            );
            explain.severity = Severity::Critical;
            synthetic.push(explain);
        }
    }

    diffs.extend(synthetic);
    diffs
}

fn directional_severity(direction: Direction, diff: &Difference) -> Option<Severity> {
    let desired = diff.desired_value.as_ref()?;
    let live = diff.live_value.as_ref()?;
    match direction {
        Direction::BadWhenTrue | Direction::BadWhenFalse => {
            let (_, live) = (desired.as_bool()?, live.as_bool()?);
            let bad = direction == Direction::BadWhenTrue;
            Some(if live == bad {
                Severity::Critical
            } else {
                Severity::Warning
            })
        }
        Direction::BadWhenLower => {
            let (desired, live) = (desired.as_f64()?, live.as_f64()?);
            if live < desired {
                Some(Severity::Critical)
            } else if live > desired {
                Some(Severity::Warning)
            } else {
                None
            }
        }
    }
}

fn reference_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Highest severity present, if any
pub fn highest(diffs: &[Difference]) -> Option<Severity> {
    diffs.iter().map(|d| d.severity).max()
}
