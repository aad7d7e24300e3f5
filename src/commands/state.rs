//! `keel state`: inspect and edit the local ledger

use anyhow::{Context as _, Result};
use colored::Colorize;
use declarative::{ExitCode, Kind};
use ledger::{Error as LedgerError, ResourceRecord, State, StateStore};

use crate::Context;
use crate::cli::StateCommand;
use crate::ui;

pub fn run(ctx: &Context, cmd: &StateCommand) -> Result<ExitCode> {
    let store = ctx.store()?;
    match cmd {
        StateCommand::List { kind } => list(&store, *kind),
        StateCommand::Show { name } => show(&store, name),
        StateCommand::Rm { name, yes } => {
            if !yes && !confirm_remove(name)? {
                ui::info("Aborted");
                return Ok(ExitCode::Success);
            }
            remove(&store, name)
        }
    }
}

fn load(store: &StateStore) -> Result<State> {
    store
        .load()
        .with_context(|| format!("Failed to load ledger {}", store.path().display()))
}

fn list(store: &StateStore, kind: Option<Kind>) -> Result<ExitCode> {
    let state = load(store)?;
    let records = state.list_resources(kind);

    ui::header(&format!("Ledger: {}", store.path().display()));
    if records.is_empty() {
        ui::dim("(no resources recorded)");
        return Ok(ExitCode::Success);
    }

    for record in records {
        println!(
            "  {:<32} {:<20} {:<9} {}",
            record.name.bold(),
            record.kind.to_string(),
            record.origin.to_string(),
            format!(
                "{} by {}",
                record.last_applied.format("%Y-%m-%d %H:%M"),
                record.last_applied_by
            )
            .dimmed()
        );
    }
    Ok(ExitCode::Success)
}

fn show(store: &StateStore, name: &str) -> Result<ExitCode> {
    let state = load(store)?;
    let record = match state.get_resource(name) {
        Ok(record) => record,
        Err(LedgerError::ResourceNotFound(_)) => {
            ui::warn(&format!("'{name}' is not recorded"));
            return Ok(ExitCode::NotFound);
        }
        Err(e) => return Err(e.into()),
    };
    print_record(record)?;
    Ok(ExitCode::Success)
}

fn print_record(record: &ResourceRecord) -> Result<()> {
    ui::header(&format!("{}/{}", record.kind, record.name));
    ui::kv("id", &record.id);
    ui::kv("origin", &record.origin.to_string());
    ui::kv("last applied", &record.last_applied.to_rfc3339());
    ui::kv("by", &record.last_applied_by);

    println!();
    println!("{}", "spec".cyan().bold());
    println!("{}", serde_json::to_string_pretty(&record.spec)?);

    if !record.history.is_empty() {
        println!();
        println!("{}", "history".cyan().bold());
        for event in &record.history {
            let mut line = format!(
                "  {} {:<9} {}",
                event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                event.action,
                event.user
            );
            if !event.fields.is_empty() {
                line.push_str(&format!("  [{}]", event.fields.join(", ")));
            }
            if event.partial {
                line.push_str("  (partial)");
            }
            println!("{line}");
        }
    }
    Ok(())
}

fn confirm_remove(name: &str) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(format!("Remove '{name}' from the ledger? The live resource is not touched"))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

/// Delete a record under the ledger lock
pub fn remove(store: &StateStore, name: &str) -> Result<ExitCode> {
    let mut lock = store.lock();
    lock.acquire().context("Failed to lock the ledger")?;

    let mut state = load(store)?;
    match state.remove_resource(name) {
        Ok(record) => {
            store
                .save(&state)
                .with_context(|| format!("Failed to save ledger {}", store.path().display()))?;
            lock.release().context("Failed to release the ledger lock")?;
            ui::success(&format!("Removed {} '{}' from the ledger", record.kind, record.name));
            Ok(ExitCode::Success)
        }
        Err(LedgerError::ResourceNotFound(_)) => {
            ui::warn(&format!("'{name}' is not recorded"));
            Ok(ExitCode::NotFound)
        }
        Err(e) => Err(e.into()),
    }
}
