//! `keel merge` and the layering step shared by diff and apply

use anyhow::{Context, Result};
use declarative::{ArrayStrategy, ExitCode, MergeOptions, ResourceDocument};
use std::path::Path;

use crate::cli::{LayerArgs, MergeArgs};

impl LayerArgs {
    pub fn merge_options(&self) -> MergeOptions {
        let strategy = if self.append_arrays {
            ArrayStrategy::Append
        } else {
            ArrayStrategy::Replace
        };
        MergeOptions::default()
            .with_array_strategy(strategy)
            .with_null_means_delete(self.null_deletes)
    }
}

fn load(path: &Path) -> Result<ResourceDocument> {
    ResourceDocument::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

/// Load a spec with its optional profile and overlay and merge them
pub fn resolve(spec: &Path, layers: &LayerArgs) -> Result<ResourceDocument> {
    let doc = load(spec)?;
    let profile = layers.profile.as_deref().map(load).transpose()?;
    let overlay = layers.overlay.as_deref().map(load).transpose()?;

    declarative::merge(
        profile.as_ref(),
        &doc,
        overlay.as_ref(),
        layers.merge_options(),
    )
    .with_context(|| format!("Failed to merge {}", spec.display()))
}

pub fn run(args: &MergeArgs) -> Result<ExitCode> {
    let merged = resolve(&args.spec, &args.layers)?;
    print!("{}", merged.to_yaml()?);
    Ok(ExitCode::Success)
}
