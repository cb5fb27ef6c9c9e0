//! Ledger Store
//!
//! Durable mapping from requester identity to registration record.
//!
//! The whole ledger is one flat JSON document; writes go to a temp file and
//! atomically replace the canonical path after fsync, so a crash mid-write
//! never leaves an unparseable store. Mutual exclusion is a cross-process
//! advisory `flock` on a sibling lock file, acquired with a bounded jittered
//! poll and released by an RAII guard on every exit path.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::address::Address;

/// How long to wait for the store lock before reporting "busy".
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);
const LOCK_POLL_JITTER_MS: u64 = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock not acquired within {0:?}")]
    LockTimeout(Duration),

    #[error("store lock failed: {0}")]
    LockFailed(#[source] io::Error),

    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One record per distinct requester identity.
///
/// Unknown fields are ignored on read and every field has a default, so the
/// on-disk document stays forward- and backward-readable as fields are added.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    /// Registered payout destination; absent until first registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Timestamp of last successful registration (informational).
    #[serde(default)]
    pub registered_at: i64,
    /// Timestamp of last *successful* transfer; 0 means never claimed.
    #[serde(default)]
    pub last_claim_at: i64,
    /// Set while a claim for this identity is between cooldown check and
    /// commit; concurrent claims are rejected while it is live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_pending_since: Option<i64>,
}

/// Full collection of user records, keyed by opaque identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub users: HashMap<String, UserRecord>,
}

impl Ledger {
    pub fn get(&self, identity: &str) -> Option<&UserRecord> {
        self.users.get(identity)
    }

    pub fn entry(&mut self, identity: &str) -> &mut UserRecord {
        self.users.entry(identity.to_string()).or_default()
    }
}

/// Whether `with_exclusive` should persist the ledger the closure mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Persist,
    Discard,
}

/// Holds the cross-process store lock; dropping the guard releases it.
#[derive(Debug)]
pub struct StoreLockGuard {
    _lock_file: File,
}

/// Durable key-value persistence for [`UserRecord`]s.
pub struct LedgerStore {
    data_path: PathBuf,
    lock_path: PathBuf,
}

impl LedgerStore {
    /// Bind a store to its data path. The lock file lives alongside it as
    /// `<path>.lock`. No I/O happens until the first load/save.
    pub fn open(data_path: impl Into<PathBuf>) -> Self {
        let data_path = data_path.into();
        let mut lock_name = data_path.as_os_str().to_owned();
        lock_name.push(".lock");
        Self {
            lock_path: PathBuf::from(lock_name),
            data_path,
        }
    }

    /// Load the current snapshot. A store that does not exist yet is an
    /// empty ledger, not an error.
    pub fn load(&self) -> Result<Ledger, StoreError> {
        let content = match fs::read_to_string(&self.data_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Ledger::default()),
            Err(e) => return Err(StoreError::io(&self.data_path, e)),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Persist the full snapshot: write `<path>.tmp`, fsync, then atomically
    /// rename over the canonical path.
    pub fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        let tmp_path = self.data_path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(ledger)?;

        let mut tmp = File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.sync_all())
            .map_err(|e| StoreError::io(&tmp_path, e))?;
        drop(tmp);

        fs::rename(&tmp_path, &self.data_path).map_err(|e| StoreError::io(&self.data_path, e))?;
        debug!(path = %self.data_path.display(), users = ledger.users.len(), "ledger saved");
        Ok(())
    }

    /// Try to take the cross-process lock once (non-blocking).
    pub fn try_lock(&self) -> Result<Option<StoreLockGuard>, StoreError> {
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| StoreError::io(&self.lock_path, e))?;

        match try_flock_exclusive(&lock_file) {
            Ok(true) => Ok(Some(StoreLockGuard {
                _lock_file: lock_file,
            })),
            Ok(false) => Ok(None),
            Err(e) => Err(StoreError::LockFailed(e)),
        }
    }

    /// Acquire the cross-process lock, polling with jitter until success or
    /// the bounded timeout. Callers surface [`StoreError::LockTimeout`] as a
    /// transient "busy, retry" condition rather than proceeding unlocked.
    pub fn lock_exclusive(&self) -> Result<StoreLockGuard, StoreError> {
        let start = Instant::now();
        loop {
            if let Some(guard) = self.try_lock()? {
                return Ok(guard);
            }
            if start.elapsed() >= LOCK_TIMEOUT {
                warn!(path = %self.lock_path.display(), "store lock contention: timed out");
                return Err(StoreError::LockTimeout(LOCK_TIMEOUT));
            }
            let jitter_ms = rand::random::<u64>() % (LOCK_POLL_JITTER_MS + 1);
            std::thread::sleep(LOCK_POLL_INTERVAL + Duration::from_millis(jitter_ms));
        }
    }

    /// Exclusive read-modify-write: lock, load, run `f`, persist the ledger
    /// `f` mutated if it asked for [`Commit::Persist`], release.
    ///
    /// The in-memory decision is not committed until `save` returns; a save
    /// failure propagates to the caller instead of being swallowed.
    pub fn with_exclusive<T, E>(
        &self,
        f: impl FnOnce(&mut Ledger) -> Result<(T, Commit), E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let _guard = self.lock_exclusive()?;
        let mut ledger = self.load()?;
        let (value, commit) = f(&mut ledger)?;
        if commit == Commit::Persist {
            self.save(&ledger)?;
        }
        Ok(value)
    }
}

/// Try to acquire an exclusive flock on a file (non-blocking).
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if it is held
/// elsewhere. flock is per open file description, so two handles exclude
/// each other even inside one process.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: flock is a standard POSIX call; fd is a valid descriptor
        // owned by `file`. LOCK_EX | LOCK_NB is a non-blocking exclusive lock.
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn temp_store() -> (tempfile::TempDir, LedgerStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::open(dir.path().join("faucet.json"));
        (dir, store)
    }

    fn addr(c: char) -> Address {
        Address::parse(&c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn test_load_missing_store_is_empty() {
        let (_dir, store) = temp_store();
        let ledger = store.load().unwrap();
        assert!(ledger.users.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (_dir, store) = temp_store();
        let mut ledger = Ledger::default();
        let rec = ledger.entry("user-1");
        rec.address = Some(addr('b'));
        rec.registered_at = 100;
        rec.last_claim_at = 200;
        store.save(&ledger).unwrap();

        let loaded = store.load().unwrap();
        let rec = loaded.get("user-1").unwrap();
        assert_eq!(rec.address.as_ref().unwrap().as_str(), "b".repeat(40));
        assert_eq!(rec.registered_at, 100);
        assert_eq!(rec.last_claim_at, 200);
        assert_eq!(rec.claim_pending_since, None);
    }

    #[test]
    fn test_save_leaves_no_tmp_file() {
        let (dir, store) = temp_store();
        store.save(&Ledger::default()).unwrap();
        assert!(dir.path().join("faucet.json").exists());
        assert!(!dir.path().join("faucet.tmp").exists());
    }

    #[test]
    fn test_unknown_fields_ignored_on_read() {
        let (dir, store) = temp_store();
        let json = r#"{
            "users": {
                "user-1": {
                    "address": "cccccccccccccccccccccccccccccccccccccccc",
                    "registered_at": 5,
                    "last_claim_at": 6,
                    "future_field": {"nested": true}
                }
            },
            "schema_version": 2
        }"#;
        fs::write(dir.path().join("faucet.json"), json).unwrap();
        let ledger = store.load().unwrap();
        assert_eq!(ledger.get("user-1").unwrap().last_claim_at, 6);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let (dir, store) = temp_store();
        // An old-format record without the pending marker.
        let json = r#"{"users": {"user-1": {"registered_at": 1}}}"#;
        fs::write(dir.path().join("faucet.json"), json).unwrap();
        let ledger = store.load().unwrap();
        let rec = ledger.get("user-1").unwrap();
        assert!(rec.address.is_none());
        assert_eq!(rec.last_claim_at, 0);
        assert_eq!(rec.claim_pending_since, None);
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let (dir, store) = temp_store();
        fs::write(dir.path().join("faucet.json"), "{not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_lock_excludes_second_holder() {
        let (_dir, store) = temp_store();
        let guard = store.try_lock().unwrap().expect("first lock");
        assert!(store.try_lock().unwrap().is_none(), "second lock must fail");
        drop(guard);
        assert!(store.try_lock().unwrap().is_some(), "released after drop");
    }

    #[test]
    fn test_with_exclusive_persists_on_commit() {
        let (_dir, store) = temp_store();
        store
            .with_exclusive(|ledger| {
                ledger.entry("user-2").registered_at = 42;
                Ok::<_, StoreError>(((), Commit::Persist))
            })
            .unwrap();
        assert_eq!(store.load().unwrap().get("user-2").unwrap().registered_at, 42);
    }

    #[test]
    fn test_with_exclusive_discard_leaves_store_untouched() {
        let (_dir, store) = temp_store();
        store
            .with_exclusive(|ledger| {
                ledger.entry("user-3").registered_at = 42;
                Ok::<_, StoreError>(((), Commit::Discard))
            })
            .unwrap();
        assert!(store.load().unwrap().get("user-3").is_none());
    }

    #[test]
    fn test_with_exclusive_releases_lock_on_error() {
        let (_dir, store) = temp_store();
        let result: Result<(), StoreError> = store.with_exclusive(|_| {
            Err(StoreError::LockFailed(io::Error::other("injected")))
        });
        assert!(result.is_err());
        // Lock must have been released despite the error path.
        assert!(store.try_lock().unwrap().is_some());
    }
}
