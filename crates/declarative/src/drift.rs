//! Structural drift detection between a desired and a live spec tree

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::severity::Severity;

/// What happened to a field, seen from the live side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftAction {
    /// Present live, absent from the desired spec
    Added,
    /// Present on both sides with different values
    Modified,
    /// Present in the desired spec, absent live
    Removed,
}

impl DriftAction {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Added => "+",
            Self::Modified => "~",
            Self::Removed => "-",
        }
    }
}

impl fmt::Display for DriftAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// A single path-qualified difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    /// Dot-separated path through nested objects
    pub path: String,
    pub action: DriftAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_value: Option<Value>,
    pub severity: Severity,
}

impl Difference {
    pub fn new(
        path: impl Into<String>,
        action: DriftAction,
        desired_value: Option<Value>,
        live_value: Option<Value>,
    ) -> Self {
        Self {
            path: path.into(),
            action,
            desired_value,
            live_value,
            severity: Severity::Info,
        }
    }

    /// Final segment of the dotted path
    pub fn field(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }
}

/// Short field names skipped at every nesting level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreFields(BTreeSet<String>);

impl IgnoreFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn insert(&mut self, field: impl Into<String>) {
        self.0.insert(field.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for IgnoreFields {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Compare a desired spec against a live one
///
/// Differences are reported in walk order: desired keys first, then keys
/// that only exist live. Callers sort by path for display.
pub fn detect_drift(desired: &Value, live: &Value, ignore: &IgnoreFields) -> Vec<Difference> {
    let mut out = Vec::new();
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => walk(d, l, "", ignore, &mut out),
        _ if values_equal(desired, live, ignore) => {}
        _ => out.push(Difference::new(
            "",
            DriftAction::Modified,
            Some(desired.clone()),
            Some(live.clone()),
        )),
    }
    out
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn walk(
    desired: &Map<String, Value>,
    live: &Map<String, Value>,
    prefix: &str,
    ignore: &IgnoreFields,
    out: &mut Vec<Difference>,
) {
    for (key, d) in desired {
        if ignore.contains(key) {
            continue;
        }
        let path = join(prefix, key);
        match live.get(key) {
            None if is_empty(d) => {}
            None => out.push(Difference::new(path, DriftAction::Removed, Some(d.clone()), None)),
            Some(l) => match (d, l) {
                (Value::Object(dm), Value::Object(lm)) => walk(dm, lm, &path, ignore, out),
                _ if values_equal(d, l, ignore) => {}
                _ => out.push(Difference::new(
                    path,
                    DriftAction::Modified,
                    Some(d.clone()),
                    Some(l.clone()),
                )),
            },
        }
    }

    for (key, l) in live {
        if desired.contains_key(key) || ignore.contains(key) || is_empty(l) {
            continue;
        }
        out.push(Difference::new(
            join(prefix, key),
            DriftAction::Added,
            None,
            Some(l.clone()),
        ));
    }
}

/// Null, `[]` and `{}` all mean "nothing here"
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Integers compare exactly; floats fall back to `f64`
fn numbers_equal(x: &Number, y: &Number) -> bool {
    fn integral(n: &Number) -> Option<i128> {
        n.as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
    }

    match (integral(x), integral(y)) {
        (Some(x), Some(y)) => x == y,
        _ => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
    }
}

/// Semantic equality used by the drift walk
///
/// Numbers compare by value, arrays element by element in order, objects
/// key by key with absent keys equal to empty values.
pub fn values_equal(a: &Value, b: &Value, ignore: &IgnoreFields) -> bool {
    if is_empty(a) && is_empty(b) {
        return true;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y, ignore))
        }
        (Value::Object(x), Value::Object(y)) => {
            let keys: BTreeSet<&String> = x.keys().chain(y.keys()).collect();
            keys.into_iter().filter(|k| !ignore.contains(k)).all(|k| {
                match (x.get(k), y.get(k)) {
                    (Some(x), Some(y)) => values_equal(x, y, ignore),
                    (Some(v), None) | (None, Some(v)) => is_empty(v),
                    (None, None) => true,
                }
            })
        }
        _ => a == b,
    }
}

/// Sort differences by path for stable display
pub fn sort_by_path(diffs: &mut [Difference]) {
    diffs.sort_by(|a, b| a.path.cmp(&b.path));
}
