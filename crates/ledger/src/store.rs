//! Loading and saving the ledger file
//!
//! The store never locks by itself. Mutating flows wrap load, change and
//! save in a [`StateLock`]; read-only flows call [`StateStore::load`] with
//! no contention.

use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::lock::StateLock;
use crate::state::{self, State};

/// Handle on a ledger file and its side-car lock
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Side-car lock marker next to the ledger
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// An unacquired lock for this ledger
    pub fn lock(&self) -> StateLock {
        StateLock::new(self.lock_path())
    }

    /// Load the ledger, or an empty one if the file does not exist
    ///
    /// Older schema versions are migrated in memory before returning.
    pub fn load(&self) -> Result<State> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("Ledger {} does not exist, using empty state", self.path.display());
                return Ok(State::new());
            }
            Err(e) => return Err(Error::io("read ledger", &self.path, e)),
        };
        let mut raw: Value = serde_json::from_str(&content).map_err(|source| Error::Parse {
            path: self.path.clone(),
            source,
        })?;

        state::migrate(&mut raw)?;

        let state: State = serde_json::from_value(raw).map_err(|source| Error::Parse {
            path: self.path.clone(),
            source,
        })?;

        log::debug!(
            "Loaded {} resources from {}",
            state.resources.len(),
            self.path.display()
        );
        Ok(state)
    }

    /// Save the ledger atomically
    ///
    /// The new content goes to a temporary file in the same directory which
    /// is then renamed over the ledger, so readers see either the old or the
    /// new file and never a partial one.
    pub fn save(&self, state: &State) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| Error::io("create state directory", dir, e))?;

        let content = serde_json::to_string_pretty(state).map_err(Error::Serialize)?;
        let tmp = self.temp_path();

        if let Err(e) = write_synced(&tmp, content.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io("replace ledger", &self.path, e));
        }

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = std::ffi::OsString::from(".");
        name.push(self.path.file_name().unwrap_or_default());
        name.push(format!(".tmp-{}", std::process::id()));
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| Error::io("create temp ledger", path, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| Error::io("write temp ledger", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Event, Origin, RecordUpdate, CURRENT_VERSION, DEFAULT_MAX_HISTORY_EVENTS};
    use declarative::Kind;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_state() -> State {
        let mut state = State::new();
        state.record(
            RecordUpdate {
                kind: Kind::BackupJob,
                id: "42".into(),
                name: "nightly".into(),
                spec: json!({"isDisabled": false}),
                origin: Origin::Applied,
                event: Event::new("adopt"),
            },
            DEFAULT_MAX_HISTORY_EVENTS,
        );
        state
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        let state = store.load().unwrap();
        assert_eq!(state.version, CURRENT_VERSION);
        assert!(state.resources.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_unreadable_ledger_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        // Stat fails with ENOTDIR, which is not "missing"
        let store = StateStore::new(blocker.join("state.json"));
        assert!(!store.path().exists());
        assert!(matches!(store.load(), Err(Error::Io { .. })));
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("nested").join("state.json"));
        let state = sample_state();

        store.save(&state).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        store.save(&sample_state()).unwrap();
        store.save(&State::new()).unwrap();

        let entries: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("state.json")]);
    }

    #[test]
    fn test_interrupted_save_keeps_previous_ledger() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        let state = sample_state();
        store.save(&state).unwrap();

        // A crash between writing the temp file and renaming it leaves the
        // half-written temp file behind; the ledger itself is untouched.
        fs::write(store.temp_path(), "{\"version\": 2, \"resour").unwrap();
        assert_eq!(store.load().unwrap(), state);

        // The next save replaces the stale temp file and completes normally.
        store.save(&State::new()).unwrap();
        assert!(!store.temp_path().exists());
        assert!(store.load().unwrap().resources.is_empty());
    }

    #[test]
    fn test_load_migrates_legacy_ledger() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        fs::write(
            store.path(),
            r#"{"version": 1, "resources": {"enc": {"type": "EncryptionPassword", "id": "e1",
               "name": "enc", "spec": {"hint": "x"}, "lastApplied": "2024-05-01T10:00:00Z",
               "lastAppliedBy": "ops"}}}"#,
        )
        .unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.version, CURRENT_VERSION);
        assert_eq!(state.get_resource("enc").unwrap().origin, Origin::Observed);
    }

    #[test]
    fn test_corrupt_ledger_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("state.json"));
        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_lock_path_is_sidecar() {
        let store = StateStore::new("/tmp/keel/state.json");
        assert_eq!(store.lock_path(), PathBuf::from("/tmp/keel/state.json.lock"));
    }
}
