//! Advisory lock guarding ledger mutation
//!
//! The lock is a marker file next to the ledger holding the time it was
//! taken. A marker younger than the timeout means someone else is mutating
//! the ledger and [`StateLock::acquire`] fails immediately; an older marker
//! is assumed to belong to a dead process and is reclaimed.
//!
//! Reclaiming a stale lock can race with a holder that is merely slow. That
//! window is bounded by [`LOCK_TIMEOUT`].

use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::{Error, Result};

/// Age after which a lock marker is considered stale
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Lock handle; releases on drop if still held
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    timeout: Duration,
    held: bool,
}

impl StateLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: LOCK_TIMEOUT,
            held: false,
        }
    }

    /// Override the staleness window
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Take the lock or fail without waiting
    ///
    /// Calling this twice on the same handle returns [`Error::AlreadyHeld`].
    pub fn acquire(&mut self) -> Result<()> {
        if self.held {
            return Err(Error::AlreadyHeld);
        }
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| Error::io("create lock directory", dir, e))?;
        }

        // Second attempt only happens after reclaiming a stale marker
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&self.path) {
                Ok(file) => {
                    self.stamp(file)?;
                    self.held = true;
                    log::debug!("Acquired lock {}", self.path.display());
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let age = self.marker_age()?;
                    if age < self.timeout {
                        return Err(Error::LockHeld {
                            path: self.path.clone(),
                            age_secs: age.as_secs() as i64,
                        });
                    }
                    log::warn!(
                        "Reclaiming stale lock {} ({}s old)",
                        self.path.display(),
                        age.as_secs()
                    );
                    match fs::remove_file(&self.path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(Error::io("remove stale lock", &self.path, e)),
                    }
                }
                Err(e) => return Err(Error::io("create lock", &self.path, e)),
            }
        }

        Err(Error::LockHeld {
            path: self.path.clone(),
            age_secs: 0,
        })
    }

    /// Write the timestamp and pid into a freshly created marker
    ///
    /// A marker that cannot be stamped is removed so it does not block the
    /// next `acquire` for a full timeout.
    fn stamp(&self, mut file: impl Write) -> Result<()> {
        let stamp = format!("{}\n{}\n", Utc::now().to_rfc3339(), std::process::id());
        if let Err(e) = file.write_all(stamp.as_bytes()).and_then(|()| file.flush()) {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&self.path) {
                log::warn!(
                    "Failed to remove unwritten lock {}: {cleanup}",
                    self.path.display()
                );
            }
            return Err(Error::io("write lock", &self.path, e));
        }
        Ok(())
    }

    /// Drop the lock; a no-op when not held
    pub fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::debug!("Released lock {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("remove lock", &self.path, e)),
        }
    }

    /// Age of the existing marker from its embedded timestamp, falling back
    /// to the file's modification time
    fn marker_age(&self) -> Result<Duration> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            // Holder released between our create and read
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Duration::ZERO),
            Err(e) => return Err(Error::io("read lock", &self.path, e)),
        };

        let stamped = content
            .lines()
            .next()
            .and_then(|line| DateTime::parse_from_rfc3339(line.trim()).ok())
            .map(|t| t.with_timezone(&Utc));

        if let Some(taken) = stamped {
            return Ok((Utc::now() - taken).to_std().unwrap_or(Duration::ZERO));
        }

        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| Error::io("stat lock", &self.path, e))?;
        Ok(SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO))
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to release lock: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_marker(path: &Path, taken: DateTime<Utc>) {
        fs::write(path, format!("{}\n999999\n", taken.to_rfc3339())).unwrap();
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unwritten_marker_is_removed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json.lock");
        fs::write(&path, "").unwrap();
        let mut lock = StateLock::new(&path);

        assert!(lock.stamp(FullDisk).is_err());
        assert!(!lock.is_held());
        assert!(!path.exists());

        lock.acquire().unwrap();
        assert!(lock.is_held());
    }

    #[test]
    fn test_acquire_and_release() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json.lock");
        let mut lock = StateLock::new(&path);

        lock.acquire().unwrap();
        assert!(lock.is_held());
        assert!(path.exists());

        lock.release().unwrap();
        assert!(!lock.is_held());
        assert!(!path.exists());
    }

    #[test]
    fn test_double_acquire_on_same_handle_fails() {
        let tmp = TempDir::new().unwrap();
        let mut lock = StateLock::new(tmp.path().join("lock"));
        lock.acquire().unwrap();
        assert!(matches!(lock.acquire(), Err(Error::AlreadyHeld)));
    }

    #[test]
    fn test_fresh_lock_blocks_second_handle() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lock");
        let mut first = StateLock::new(&path);
        let mut second = StateLock::new(&path);

        first.acquire().unwrap();
        assert!(matches!(second.acquire(), Err(Error::LockHeld { .. })));

        first.release().unwrap();
        second.acquire().unwrap();
    }

    #[test]
    fn test_young_foreign_marker_blocks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lock");
        write_marker(&path, Utc::now() - chrono::Duration::minutes(4));

        let mut lock = StateLock::new(&path);
        assert!(matches!(lock.acquire(), Err(Error::LockHeld { .. })));
        assert!(path.exists());
    }

    #[test]
    fn test_stale_marker_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lock");
        write_marker(&path, Utc::now() - chrono::Duration::minutes(6));

        let mut lock = StateLock::new(&path);
        lock.acquire().unwrap();
        assert!(lock.is_held());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_custom_timeout() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lock");
        write_marker(&path, Utc::now() - chrono::Duration::seconds(10));

        let mut lock = StateLock::new(&path).with_timeout(Duration::from_secs(5));
        lock.acquire().unwrap();
    }

    #[test]
    fn test_unparseable_marker_uses_mtime() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lock");
        fs::write(&path, "garbage").unwrap();

        let mut lock = StateLock::new(&path);
        assert!(matches!(lock.acquire(), Err(Error::LockHeld { .. })));
    }

    #[test]
    fn test_release_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let mut lock = StateLock::new(tmp.path().join("lock"));
        lock.release().unwrap();
        lock.acquire().unwrap();
        lock.release().unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn test_drop_releases() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("lock");
        {
            let mut lock = StateLock::new(&path);
            lock.acquire().unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
