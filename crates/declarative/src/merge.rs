//! Layered strategic merge
//!
//! A resolved document is built from up to three layers:
//!
//! 1. **Profile** - shared defaults
//! 2. **Spec** - the resource being described
//! 3. **Overlay** - environment-specific patch
//!
//! Precedence is profile < spec < overlay. The `spec` trees are merged with
//! two sequential two-way merges; identity fields always come from the spec.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::document::{Kind, ResourceDocument};
use crate::error::{Error, Result};

/// How arrays present on both sides are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArrayStrategy {
    /// The overlay array wins wholesale
    #[default]
    Replace,
    /// Base elements followed by overlay elements, no dedup
    Append,
}

/// Options for a single merge call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub array_strategy: ArrayStrategy,
    /// Treat an explicit `null` in the overlay as "remove this key"
    pub null_means_delete: bool,
}

impl MergeOptions {
    pub fn with_array_strategy(mut self, strategy: ArrayStrategy) -> Self {
        self.array_strategy = strategy;
        self
    }

    pub fn with_null_means_delete(mut self, enabled: bool) -> Self {
        self.null_means_delete = enabled;
        self
    }
}

/// Merge an optional profile and overlay into a resource spec
///
/// Inputs are borrowed and never modified, so the same profile and overlay
/// can be merged into any number of specs.
pub fn merge(
    profile: Option<&ResourceDocument>,
    spec: &ResourceDocument,
    overlay: Option<&ResourceDocument>,
    options: MergeOptions,
) -> Result<ResourceDocument> {
    check_role("spec", spec, |k| k.is_resource(), "a resource kind")?;
    if let Some(p) = profile {
        check_role("profile", p, |k| k == Kind::Profile, "Profile")?;
    }
    if let Some(o) = overlay {
        check_role("overlay", o, |k| k == Kind::Overlay, "Overlay")?;
    }

    let mut resolved = spec.clone();

    resolved.metadata.labels = layer_maps(
        profile.map(|p| &p.metadata.labels),
        &spec.metadata.labels,
        overlay.map(|o| &o.metadata.labels),
    );
    resolved.metadata.annotations = layer_maps(
        profile.map(|p| &p.metadata.annotations),
        &spec.metadata.annotations,
        overlay.map(|o| &o.metadata.annotations),
    );

    let mut tree = match profile {
        Some(p) => merge_values(&p.spec, &spec.spec, options),
        None => spec.spec.clone(),
    };
    if let Some(o) = overlay {
        tree = merge_values(&tree, &o.spec, options);
    }
    resolved.spec = tree;

    log::debug!(
        "Merged {} '{}' (profile: {}, overlay: {})",
        resolved.kind,
        resolved.name(),
        profile.is_some(),
        overlay.is_some()
    );
    Ok(resolved)
}

fn check_role(
    role: &'static str,
    doc: &ResourceDocument,
    accepts: impl Fn(Kind) -> bool,
    expected: &str,
) -> Result<()> {
    if accepts(doc.kind) {
        Ok(())
    } else {
        Err(Error::KindMismatch {
            role,
            expected: expected.to_string(),
            found: doc.kind,
        })
    }
}

fn layer_maps(
    profile: Option<&BTreeMap<String, String>>,
    spec: &BTreeMap<String, String>,
    overlay: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, String> {
    let mut out = profile.cloned().unwrap_or_default();
    out.extend(spec.iter().map(|(k, v)| (k.clone(), v.clone())));
    if let Some(o) = overlay {
        out.extend(o.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    out
}

/// Two-way merge of `overlay` onto `base`
///
/// Returns `Value::Null` when the result is deleted outright.
pub fn merge_values(base: &Value, overlay: &Value, options: MergeOptions) -> Value {
    merge_slot(Some(base), Some(overlay), options).unwrap_or(Value::Null)
}

/// Merge two optional slots; `None` means the key is absent
fn merge_slot(base: Option<&Value>, overlay: Option<&Value>, options: MergeOptions) -> Option<Value> {
    match (base, overlay) {
        (base, None) => base.cloned(),
        (base, Some(Value::Null)) => {
            if options.null_means_delete {
                None
            } else {
                base.cloned()
            }
        }
        (None, Some(o)) => Some(o.clone()),
        (Some(Value::Object(b)), Some(Value::Object(o))) => {
            Some(Value::Object(merge_objects(b, o, options)))
        }
        (Some(Value::Array(b)), Some(Value::Array(o))) => match options.array_strategy {
            ArrayStrategy::Replace => Some(Value::Array(o.clone())),
            ArrayStrategy::Append => Some(Value::Array(b.iter().chain(o).cloned().collect())),
        },
        // Primitives and type mismatches: overlay wins, no coercion
        (Some(_), Some(o)) => Some(o.clone()),
    }
}

fn merge_objects(base: &Map<String, Value>, overlay: &Map<String, Value>, options: MergeOptions) -> Map<String, Value> {
    let mut out = Map::new();

    for (key, b) in base {
        if let Some(v) = merge_slot(Some(b), overlay.get(key), options) {
            out.insert(key.clone(), v);
        }
    }
    for (key, o) in overlay {
        if base.contains_key(key) {
            continue;
        }
        if let Some(v) = merge_slot(None, Some(o), options) {
            out.insert(key.clone(), v);
        }
    }

    out
}
