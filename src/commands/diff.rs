//! `keel diff`: read-only drift detection
//!
//! Diff never takes the ledger lock. The ledger is read only to supply the
//! `--against-state` baseline, the `--all` resource list and cross-resource
//! severity lookups.

use anyhow::{Context as _, Result, bail};
use colored::Colorize;
use declarative::{
    Difference, DriftOutcome, ExitCode, Kind, ResourceDocument, ResourceLookup, SeverityRules,
    classify, detect_drift, enhance, kinds, sort_by_path,
};
use ledger::{Origin, State};
use remote::{ProductProfile, ResourceApi};
use serde::Serialize;
use serde_json::Value;

use crate::Context;
use crate::cli::DiffArgs;
use crate::commands::merge;
use crate::ui;

/// Drift of one resource
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReport {
    pub kind: Kind,
    pub name: String,
    pub outcome: DriftOutcome,
    pub differences: Vec<Difference>,
}

impl ResourceReport {
    pub fn new(kind: Kind, name: &str, differences: Vec<Difference>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            outcome: DriftOutcome::from_differences(&differences),
            differences,
        }
    }
}

/// Drift across every resource checked in one invocation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub outcome: DriftOutcome,
    pub guidance: &'static str,
    pub resources: Vec<ResourceReport>,
    /// Resources that could not be checked
    pub skipped: usize,
}

impl DiffSummary {
    fn new(resources: Vec<ResourceReport>, skipped: usize) -> Self {
        let outcome = resources
            .iter()
            .map(|r| r.outcome)
            .fold(DriftOutcome::NoDrift, DriftOutcome::combine);
        Self {
            outcome,
            guidance: outcome.guidance(),
            resources,
            skipped,
        }
    }

    /// Nothing checked with failures skipped is an error, never a clean result
    pub fn exit_code(&self) -> ExitCode {
        if self.resources.is_empty() && self.skipped > 0 {
            ExitCode::Error
        } else {
            self.outcome.exit_code()
        }
    }
}

/// Detect, classify, enhance and sort the differences for one resource
pub fn compute(
    kind: Kind,
    desired: &Value,
    live: &Value,
    rules: &SeverityRules,
    lookup: Option<&dyn ResourceLookup>,
) -> Vec<Difference> {
    let diffs = detect_drift(desired, live, &kinds::ignore_fields(kind));
    let mut diffs = enhance(classify(diffs, kind, rules), kind, lookup);
    sort_by_path(&mut diffs);
    diffs
}

/// Diff one merged document against its live counterpart
///
/// Returns `None` when the resource does not exist on the server.
pub fn diff_one(
    api: &dyn ResourceApi,
    profile: &ProductProfile,
    state: &State,
    rules: &SeverityRules,
    doc: &ResourceDocument,
    against_state: bool,
) -> Result<Option<ResourceReport>> {
    doc.ensure_resource()?;
    let name = doc.name();

    let desired = if against_state {
        let record = state.get_resource(name)?;
        if record.kind != doc.kind {
            bail!("'{name}' is recorded as {} but the spec is {}", record.kind, doc.kind);
        }
        &record.spec
    } else {
        &doc.spec
    };

    let Some(live) = api
        .fetch_current(doc.kind, name, profile)
        .with_context(|| format!("Failed to fetch {} '{name}'", doc.kind))?
    else {
        return Ok(None);
    };

    let differences = compute(doc.kind, desired, &live.spec, rules, Some(state));
    Ok(Some(ResourceReport::new(doc.kind, name, differences)))
}

/// Diff every applied record in the ledger against the server
///
/// Per-resource failures are logged and counted, never fatal.
pub fn diff_all(
    api: &dyn ResourceApi,
    profile: &ProductProfile,
    state: &State,
    rules: &SeverityRules,
    kind: Option<Kind>,
) -> DiffSummary {
    let mut reports = Vec::new();
    let mut skipped = 0;

    for record in state
        .list_resources(kind)
        .into_iter()
        .filter(|r| r.origin == Origin::Applied)
    {
        match api.fetch_current(record.kind, &record.name, profile) {
            Ok(Some(live)) => {
                let differences = compute(record.kind, &record.spec, &live.spec, rules, Some(state));
                reports.push(ResourceReport::new(record.kind, &record.name, differences));
            }
            Ok(None) => {
                log::warn!("{} '{}' no longer exists on the server", record.kind, record.name);
                skipped += 1;
            }
            Err(e) => {
                log::warn!("Skipping {} '{}': {e}", record.kind, record.name);
                skipped += 1;
            }
        }
    }

    DiffSummary::new(reports, skipped)
}

pub fn run(ctx: &Context, args: &DiffArgs) -> Result<ExitCode> {
    let api = ctx.api();
    let profile = ctx.config.product_profile()?;
    let rules = ctx.config.severity_rules()?;
    let store = ctx.store()?;
    let state = store
        .load()
        .with_context(|| format!("Failed to load ledger {}", store.path().display()))?;

    let summary = if args.all {
        if state.resources.is_empty() {
            ui::info("No resources recorded; adopt or apply something first");
            return Ok(ExitCode::Success);
        }
        diff_all(&api, &profile, &state, &rules, args.kind)
    } else {
        let Some(spec) = &args.spec else {
            bail!("A spec file or --all is required");
        };
        let doc = merge::resolve(spec, &args.layers)?;
        match diff_one(&api, &profile, &state, &rules, &doc, args.against_state)? {
            Some(report) => DiffSummary::new(vec![report], 0),
            None => {
                ui::warn(&format!("{} '{}' not found on the server", doc.kind, doc.name()));
                return Ok(ExitCode::NotFound);
            }
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if !ctx.quiet {
        print_summary(&summary, ctx.verbose > 0);
    }
    Ok(summary.exit_code())
}

// ============================================================================
// Display
// ============================================================================

/// Print one resource's differences, sorted by path
pub fn print_report(report: &ResourceReport, show_clean: bool) {
    if report.differences.is_empty() {
        if show_clean {
            println!("{} {}/{}", "✓".green(), report.kind, report.name);
        }
        return;
    }

    println!();
    println!("{}", format!("{}/{}", report.kind, report.name).bold());
    for diff in &report.differences {
        let detail = match diff.action {
            declarative::DriftAction::Added => ui::format_value(diff.live_value.as_ref()),
            declarative::DriftAction::Removed => ui::format_value(diff.desired_value.as_ref()),
            declarative::DriftAction::Modified => format!(
                "{} → {}",
                ui::format_value(diff.desired_value.as_ref()),
                ui::format_value(diff.live_value.as_ref())
            ),
        };
        println!(
            "  {} {} {:<40} {}",
            ui::action_symbol(diff.action),
            ui::severity_badge(diff.severity),
            diff.path,
            detail.dimmed()
        );
    }
}

fn print_summary(summary: &DiffSummary, show_clean: bool) {
    for report in &summary.resources {
        print_report(report, show_clean);
    }

    let drifted = summary
        .resources
        .iter()
        .filter(|r| !r.differences.is_empty())
        .count();
    println!();
    if summary.resources.is_empty() && summary.skipped > 0 {
        ui::error(&format!(
            "None of {} resource(s) could be checked",
            summary.skipped
        ));
        return;
    }
    match summary.outcome {
        DriftOutcome::NoDrift => ui::success(&format!(
            "No drift across {} resource(s)",
            summary.resources.len()
        )),
        DriftOutcome::Drift => ui::warn(&format!(
            "Drift in {drifted} of {} resource(s)",
            summary.resources.len()
        )),
        DriftOutcome::CriticalDrift => ui::error(&format!(
            "Critical drift in {drifted} of {} resource(s)",
            summary.resources.len()
        )),
    }
    if summary.skipped > 0 {
        ui::warn(&format!("{} resource(s) could not be checked", summary.skipped));
    }
    ui::dim(summary.guidance);
}
