//! `keel apply`: push specs to the server and record them in the ledger
//!
//! Each spec is fetched before it is pushed so fields the spec does not
//! mention keep their live values. The ledger lock is held once around the
//! whole batch and the ledger is saved after every successful resource.

use anyhow::{Context as _, Result};
use colored::Colorize;
use declarative::{
    ApplyOutcome, ApplyStatus, ExitCode, Kind, MergeOptions, ResourceDocument, SeverityRules,
    kinds, merge_values,
};
use ledger::{Event, Origin, RecordUpdate, State, StateStore};
use remote::{ProductProfile, ResourceApi};
use serde_json::Value;
use std::path::PathBuf;

use crate::Context;
use crate::cli::{ApplyArgs, LayerArgs};
use crate::commands::{diff, merge};
use crate::ui;

/// Pushes merged documents through a [`ResourceApi`]
pub struct Applier<'a> {
    pub api: &'a dyn ResourceApi,
    pub profile: &'a ProductProfile,
    pub options: MergeOptions,
    pub update_only: bool,
    pub max_history: usize,
}

impl Applier<'_> {
    /// Apply one document and record it in `state`
    ///
    /// Errors are per-resource; the caller decides whether to continue.
    pub fn apply(&self, doc: &ResourceDocument, state: &mut State) -> Result<ApplyStatus> {
        doc.ensure_resource()?;
        let (kind, name) = (doc.kind, doc.name());

        let live = self
            .api
            .fetch_current(kind, name, self.profile)
            .with_context(|| format!("Failed to fetch {kind} '{name}'"))?;

        let (id, pushed, partial) = match live {
            Some(live) => {
                let merged = merge_values(&live.spec, &doc.spec, self.options);
                let partial = has_unmanaged_fields(kind, &doc.spec, &live.spec);
                self.api
                    .push_update(kind, &live.id, &merged, self.profile)
                    .with_context(|| format!("Failed to update {kind} '{name}'"))?;
                log::info!("Updated {kind} '{name}' ({})", live.id);
                (live.id, merged, partial)
            }
            None if self.update_only => {
                log::warn!("{kind} '{name}' not found and --update-only is set");
                return Ok(ApplyStatus::NotFound);
            }
            None => {
                let id = self
                    .api
                    .push_create(kind, name, &doc.spec, self.profile)
                    .with_context(|| format!("Failed to create {kind} '{name}'"))?;
                log::info!("Created {kind} '{name}' ({id})");
                (id, doc.spec.clone(), false)
            }
        };

        let fields = state.changed_fields(name, &pushed);
        state.record(
            RecordUpdate {
                kind,
                id,
                name: name.to_string(),
                spec: pushed,
                origin: Origin::Applied,
                event: Event::new("apply")
                    .with_fields(fields)
                    .with_partial(partial),
            },
            self.max_history,
        );
        Ok(ApplyStatus::Success)
    }

    /// Show what [`Applier::apply`] would push without changing anything
    pub fn preview(
        &self,
        doc: &ResourceDocument,
        state: &State,
        rules: &SeverityRules,
    ) -> Result<ApplyStatus> {
        doc.ensure_resource()?;
        let (kind, name) = (doc.kind, doc.name());

        match self.api.fetch_current(kind, name, self.profile)? {
            Some(live) => {
                let merged = merge_values(&live.spec, &doc.spec, self.options);
                let changes = diff::compute(kind, &merged, &live.spec, rules, Some(state));
                if changes.is_empty() {
                    ui::dim(&format!("{kind}/{name}: no changes"));
                } else {
                    diff::print_report(&diff::ResourceReport::new(kind, name, changes), false);
                }
                Ok(ApplyStatus::Success)
            }
            None if self.update_only => Ok(ApplyStatus::NotFound),
            None => {
                println!("  {} {kind}/{name} {}", "+".green(), "(would create)".dimmed());
                Ok(ApplyStatus::Success)
            }
        }
    }
}

/// Whether live carries top-level fields the desired spec leaves alone
fn has_unmanaged_fields(kind: Kind, desired: &Value, live: &Value) -> bool {
    let (Some(desired), Some(live)) = (desired.as_object(), live.as_object()) else {
        return false;
    };
    let ignore = kinds::ignore_fields(kind);
    live.iter().any(|(key, value)| {
        !desired.contains_key(key) && !ignore.contains(key) && !value.is_null()
    })
}

fn failed(path: &std::path::Path, err: &anyhow::Error) -> ApplyStatus {
    log::warn!("{}: {err:#}", path.display());
    ApplyStatus::Failed {
        error: format!("{err:#}"),
    }
}

/// Apply every spec under one lock, continuing past per-resource failures
///
/// Lock and ledger failures abort the batch.
pub fn apply_batch(
    applier: &Applier<'_>,
    specs: &[PathBuf],
    layers: &LayerArgs,
    store: &StateStore,
) -> Result<Vec<ApplyStatus>> {
    let mut lock = store.lock();
    lock.acquire().context("Failed to lock the ledger")?;

    let mut state = store
        .load()
        .with_context(|| format!("Failed to load ledger {}", store.path().display()))?;

    let mut results = Vec::with_capacity(specs.len());
    for (i, path) in specs.iter().enumerate() {
        ui::step(i + 1, specs.len(), &path.display().to_string());

        let status = match merge::resolve(path, layers) {
            Ok(doc) => applier
                .apply(&doc, &mut state)
                .unwrap_or_else(|e| failed(path, &e)),
            Err(e) => failed(path, &e),
        };

        if status.is_success() {
            store
                .save(&state)
                .with_context(|| format!("Failed to save ledger {}", store.path().display()))?;
        }
        results.push(status);
    }

    lock.release().context("Failed to release the ledger lock")?;
    Ok(results)
}

fn preview_batch(
    applier: &Applier<'_>,
    specs: &[PathBuf],
    layers: &LayerArgs,
    state: &State,
    rules: &SeverityRules,
) -> Vec<ApplyStatus> {
    specs
        .iter()
        .map(|path| match merge::resolve(path, layers) {
            Ok(doc) => applier
                .preview(&doc, state, rules)
                .unwrap_or_else(|e| failed(path, &e)),
            Err(e) => failed(path, &e),
        })
        .collect()
}

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<ExitCode> {
    let api = ctx.api();
    let profile = ctx.config.product_profile()?;
    let store = ctx.store()?;
    let applier = Applier {
        api: &api,
        profile: &profile,
        options: args.layers.merge_options(),
        update_only: args.update_only,
        max_history: ctx.config.max_history(),
    };

    let results = if args.dry_run {
        let rules = ctx.config.severity_rules()?;
        let state = store
            .load()
            .with_context(|| format!("Failed to load ledger {}", store.path().display()))?;
        ui::header("Dry run: nothing will be pushed or recorded");
        preview_batch(&applier, &args.specs, &args.layers, &state, &rules)
    } else {
        apply_batch(&applier, &args.specs, &args.layers, &store)?
    };

    let outcome = ApplyOutcome::from_results(&results);
    print_outcome(&args.specs, &results, outcome);
    Ok(outcome.exit_code())
}

fn print_outcome(specs: &[PathBuf], results: &[ApplyStatus], outcome: ApplyOutcome) {
    println!();
    for (path, status) in specs.iter().zip(results) {
        match status {
            ApplyStatus::Success => {}
            ApplyStatus::NotFound => ui::warn(&format!("{}: not found", path.display())),
            ApplyStatus::Failed { error } => ui::error(&format!("{}: {error}", path.display())),
        }
    }

    let ok = results.iter().filter(|r| r.is_success()).count();
    let msg = format!("{ok}/{} applied ({outcome})", results.len());
    match outcome {
        ApplyOutcome::AllSucceeded => ui::success(&msg),
        ApplyOutcome::PartialSuccess | ApplyOutcome::SingleNotFound => ui::warn(&msg),
        ApplyOutcome::AllFailed => ui::error(&msg),
    }
}
