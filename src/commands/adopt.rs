//! `keel adopt` and `keel snapshot`: record live configuration in the ledger

use anyhow::{Context as _, Result, bail};
use declarative::{ExitCode, Kind};
use ledger::{Event, Origin, RecordUpdate, StateStore};
use remote::{ProductProfile, ResourceApi};

use crate::Context;
use crate::cli::TargetArgs;
use crate::ui;

/// What kind of capture to record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Managed baseline; later compared by `diff --all`
    Adopt,
    /// Observe-only record
    Snapshot,
}

impl Capture {
    fn origin(self) -> Origin {
        match self {
            Self::Adopt => Origin::Applied,
            Self::Snapshot => Origin::Observed,
        }
    }

    fn action(self) -> &'static str {
        match self {
            Self::Adopt => "adopt",
            Self::Snapshot => "snapshot",
        }
    }
}

/// Fetch a live resource and record it under the ledger lock
///
/// Returns `false` when the resource does not exist on the server.
pub fn capture(
    api: &dyn ResourceApi,
    profile: &ProductProfile,
    store: &StateStore,
    kind: Kind,
    name: &str,
    mode: Capture,
    max_history: usize,
) -> Result<bool> {
    if kind.is_mixin() {
        bail!("{kind} documents exist only as merge inputs and cannot be recorded");
    }

    let mut lock = store.lock();
    lock.acquire().context("Failed to lock the ledger")?;

    let mut state = store
        .load()
        .with_context(|| format!("Failed to load ledger {}", store.path().display()))?;

    let Some(live) = api
        .fetch_current(kind, name, profile)
        .with_context(|| format!("Failed to fetch {kind} '{name}'"))?
    else {
        return Ok(false);
    };

    let fields = state.changed_fields(name, &live.spec);
    let record = state.record(
        RecordUpdate {
            kind,
            id: live.id,
            name: name.to_string(),
            spec: live.spec,
            origin: mode.origin(),
            event: Event::new(mode.action()).with_fields(fields),
        },
        max_history,
    );
    log::info!("Recorded {kind} '{name}' ({}) as {}", record.id, record.origin);

    store
        .save(&state)
        .with_context(|| format!("Failed to save ledger {}", store.path().display()))?;
    lock.release().context("Failed to release the ledger lock")?;
    Ok(true)
}

pub fn run(ctx: &Context, args: &TargetArgs, mode: Capture) -> Result<ExitCode> {
    let api = ctx.api();
    let profile = ctx.config.product_profile()?;
    let store = ctx.store()?;

    if capture(
        &api,
        &profile,
        &store,
        args.kind,
        &args.name,
        mode,
        ctx.config.max_history(),
    )? {
        ui::success(&format!(
            "{} {} '{}'",
            match mode {
                Capture::Adopt => "Adopted",
                Capture::Snapshot => "Captured",
            },
            args.kind,
            args.name
        ));
        Ok(ExitCode::Success)
    } else {
        ui::warn(&format!("{} '{}' not found on the server", args.kind, args.name));
        Ok(ExitCode::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger::DEFAULT_MAX_HISTORY_EVENTS;
    use remote::MockApi;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, StateStore, MockApi, ProductProfile) {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        let api = MockApi::new();
        let profile = ProductProfile::new("vbr", "mock://server").unwrap();
        (tmp, store, api, profile)
    }

    #[test]
    fn test_adopt_records_applied_baseline() {
        let (_tmp, store, api, profile) = setup();
        api.insert(Kind::BackupJob, "nightly", "42", json!({"isDisabled": false}));

        let found = capture(&api, &profile, &store, Kind::BackupJob, "nightly", Capture::Adopt, DEFAULT_MAX_HISTORY_EVENTS)
            .unwrap();
        assert!(found);

        let state = store.load().unwrap();
        let record = state.get_resource("nightly").unwrap();
        assert_eq!(record.origin, Origin::Applied);
        assert_eq!(record.id, "42");
        assert_eq!(record.spec, json!({"isDisabled": false}));
        assert_eq!(record.history[0].action, "adopt");
        assert!(!store.lock_path().exists());
    }

    #[test]
    fn test_snapshot_records_observed() {
        let (_tmp, store, api, profile) = setup();
        api.insert(Kind::KmsServer, "kms", "k1", json!({"name": "kms"}));

        capture(&api, &profile, &store, Kind::KmsServer, "kms", Capture::Snapshot, DEFAULT_MAX_HISTORY_EVENTS)
            .unwrap();

        let state = store.load().unwrap();
        let record = state.get_resource("kms").unwrap();
        assert_eq!(record.origin, Origin::Observed);
        assert_eq!(record.history[0].action, "snapshot");
    }

    #[test]
    fn test_recapture_tracks_changed_fields_and_history() {
        let (_tmp, store, api, profile) = setup();
        api.insert(Kind::BackupJob, "nightly", "42", json!({"description": "a"}));
        for _ in 0..4 {
            capture(&api, &profile, &store, Kind::BackupJob, "nightly", Capture::Adopt, 3).unwrap();
        }
        api.insert(Kind::BackupJob, "nightly", "42", json!({"description": "b"}));
        capture(&api, &profile, &store, Kind::BackupJob, "nightly", Capture::Snapshot, 3).unwrap();

        let state = store.load().unwrap();
        let record = state.get_resource("nightly").unwrap();
        assert_eq!(record.history.len(), 3);
        assert_eq!(record.history[0].fields, vec!["description"]);
        assert_eq!(record.origin, Origin::Observed);
    }

    #[test]
    fn test_missing_resource_leaves_ledger_alone() {
        let (_tmp, store, api, profile) = setup();
        let found = capture(&api, &profile, &store, Kind::BackupJob, "ghost", Capture::Adopt, 3).unwrap();
        assert!(!found);
        assert!(!store.path().exists());
        assert!(!store.lock_path().exists());
    }

    #[test]
    fn test_mixin_kind_rejected() {
        let (_tmp, store, api, profile) = setup();
        assert!(capture(&api, &profile, &store, Kind::Profile, "gold", Capture::Adopt, 3).is_err());
    }

    #[test]
    fn test_fetch_failure_releases_lock() {
        let (_tmp, store, api, profile) = setup();
        api.fail_on("flaky");
        assert!(capture(&api, &profile, &store, Kind::BackupJob, "flaky", Capture::Adopt, 3).is_err());
        assert!(!store.lock_path().exists());
    }
}
