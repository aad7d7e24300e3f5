//! # Ledger
//!
//! Local record of what was last applied to, adopted from, or observed on
//! each managed resource.
//!
//! The ledger is a single JSON file:
//!
//! ```json
//! { "version": 2, "resources": { "<name>": { "type": "BackupJob", "id": "...", ... } } }
//! ```
//!
//! Mutation is guarded by an advisory [`StateLock`] held by the caller:
//!
//! ```no_run
//! use declarative::Kind;
//! use ledger::{Event, Origin, RecordUpdate, StateStore, DEFAULT_MAX_HISTORY_EVENTS};
//! use serde_json::json;
//!
//! let store = StateStore::new("/tmp/keel/state.json");
//! let mut lock = store.lock();
//! lock.acquire()?;
//!
//! let mut state = store.load()?;
//! state.record(
//!     RecordUpdate {
//!         kind: Kind::BackupJob,
//!         id: "42".into(),
//!         name: "nightly".into(),
//!         spec: json!({"isDisabled": false}),
//!         origin: Origin::Applied,
//!         event: Event::new("adopt"),
//!     },
//!     DEFAULT_MAX_HISTORY_EVENTS,
//! );
//! store.save(&state)?;
//! lock.release()?;
//! # Ok::<(), ledger::Error>(())
//! ```

mod error;
mod lock;
mod state;
mod store;

pub use error::{Error, Result};
pub use lock::{StateLock, LOCK_TIMEOUT};
pub use state::{
    current_user, Event, Origin, RecordUpdate, ResourceRecord, State, CURRENT_VERSION,
    DEFAULT_MAX_HISTORY_EVENTS,
};
pub use store::StateStore;
