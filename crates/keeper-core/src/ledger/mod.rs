//! Key ledger: the ordered set of intermediate key versions.
//!
//! Versions are kept ascending by activation time. The newest version is the
//! active one and wraps every new secret; older versions are retained so a
//! secret can always be opened with the version that was active when it was
//! uploaded.
//!
//! # Concurrency
//!
//! Lookups take a shared read lock for the duration of an in-memory search
//! and never touch the store. Rotation is serialized by its own mutex; the
//! exclusive lock over the version list is only held to register a pending
//! activation and, once the new version is durably stored, to publish it.
//!
//! Every upload timestamp handed out is remembered as a high-water mark, and
//! new activations are placed strictly after it. A stamp therefore keeps
//! resolving to the version it was sealed under even if the wall clock
//! steps backwards between sealing and the next rotation.

mod version;

pub use version::KeyVersion;

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};

use crate::crypto::{Codec, MasterKey};
use crate::error::{KeeperError, Result};
use crate::storage::KeyVersionStore;

/// Read-side view of a key ledger used by the envelope manager.
pub trait KeyLedger: Send + Sync {
    /// The version that wraps new secrets.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::NoActiveKey` if the ledger is empty.
    fn active(&self) -> Result<Arc<KeyVersion>>;

    /// The version that was active at `at`: the one with the greatest
    /// activation not after `at`.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::VersionNotFound` if `at` precedes every version.
    fn version_for(&self, at: DateTime<Utc>) -> Result<Arc<KeyVersion>>;

    /// The active version together with the upload timestamp to record for a
    /// secret sealed under it.
    fn seal_point(&self) -> Result<SealPoint>;
}

/// Where a new secret gets sealed.
///
/// `version_for(at)` on the same ledger is guaranteed to return `version`.
#[derive(Debug, Clone)]
pub struct SealPoint {
    pub version: Arc<KeyVersion>,
    pub at: DateTime<Utc>,
}

/// Age of the active version relative to a rotation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStatus {
    /// The ledger holds no version yet.
    Missing,
    /// The active version is within its interval.
    Current { expires_at: DateTime<Utc> },
    /// The active version outlived its interval.
    Stale { since: DateTime<Utc> },
}

/// Key-free description of one version, for operator listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub index: usize,
    pub activated_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Default)]
struct LedgerState {
    versions: Vec<Arc<KeyVersion>>,
    pending: Option<DateTime<Utc>>,
}

/// In-memory ledger backed by a [`KeyVersionStore`].
pub struct Ledger {
    codec: Arc<dyn Codec>,
    store: Arc<dyn KeyVersionStore>,
    state: RwLock<LedgerState>,
    issued: Mutex<Option<DateTime<Utc>>>,
    rotation: Mutex<()>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new(codec: Arc<dyn Codec>, store: Arc<dyn KeyVersionStore>) -> Self {
        Self {
            codec,
            store,
            state: RwLock::new(LedgerState::default()),
            issued: Mutex::new(None),
            rotation: Mutex::new(()),
        }
    }

    /// Build a ledger from wrapped entries read out of `store`.
    ///
    /// # Errors
    ///
    /// - `UnwrapAuthenticationFailed` if any entry fails to authenticate
    ///   under `master`
    /// - `Configuration` if an entry is undecodable or two entries share an
    ///   activation timestamp
    pub fn load(
        wrapped: &[String],
        master: &MasterKey,
        codec: Arc<dyn Codec>,
        store: Arc<dyn KeyVersionStore>,
    ) -> Result<Self> {
        let mut versions = wrapped
            .iter()
            .map(|entry| KeyVersion::open(entry, master, codec.as_ref()).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        versions.sort_by_key(|v| v.activated_at());
        if let Some(pair) = versions
            .windows(2)
            .find(|pair| pair[0].activated_at() == pair[1].activated_at())
        {
            return Err(KeeperError::Configuration(format!(
                "Two key versions share activation {}",
                pair[0].activated_at()
            )));
        }

        tracing::debug!(versions = versions.len(), "Loaded key ledger");

        Ok(Self {
            codec,
            store,
            state: RwLock::new(LedgerState {
                versions,
                pending: None,
            }),
            issued: Mutex::new(None),
            rotation: Mutex::new(()),
        })
    }

    /// Number of retained versions.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.versions.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Rotate if the ledger is empty or the active version is older than
    /// `interval`.
    ///
    /// Returns the new version, or `None` if no rotation was due. Concurrent
    /// callers are serialized; only the first one that finds the ledger stale
    /// rotates.
    ///
    /// # Errors
    ///
    /// If the new version cannot be persisted, the ledger is left exactly as
    /// it was and the store's error is returned.
    pub fn rotate_if_due(
        &self,
        master: &MasterKey,
        interval: Duration,
    ) -> Result<Option<Arc<KeyVersion>>> {
        let _rotation = self.lock_rotation()?;

        let activation = {
            let mut state = self.write()?;
            let due = match state.versions.last() {
                None => true,
                Some(active) => Utc::now() - active.activated_at() > interval,
            };
            if !due {
                return Ok(None);
            }
            self.reserve_activation(&mut state)?
        };

        self.persist_and_publish(master, activation).map(Some)
    }

    /// Rotate unconditionally.
    pub fn force_rotate(&self, master: &MasterKey) -> Result<Arc<KeyVersion>> {
        let _rotation = self.lock_rotation()?;

        let activation = {
            let mut state = self.write()?;
            self.reserve_activation(&mut state)?
        };

        self.persist_and_publish(master, activation)
    }

    /// Report the age of the active version against `interval`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `interval` pushes the deadline past the
    /// representable date range.
    pub fn rotation_status(&self, interval: Duration) -> Result<RotationStatus> {
        let state = self.read()?;
        Ok(match state.versions.last() {
            None => RotationStatus::Missing,
            Some(active) => {
                let deadline = active
                    .activated_at()
                    .checked_add_signed(interval)
                    .ok_or_else(|| {
                        KeeperError::Configuration(format!(
                            "Rotation interval of {} days overflows activation {}",
                            interval.num_days(),
                            active.activated_at()
                        ))
                    })?;
                if Utc::now() > deadline {
                    RotationStatus::Stale { since: deadline }
                } else {
                    RotationStatus::Current {
                        expires_at: deadline,
                    }
                }
            }
        })
    }

    /// Describe every retained version, oldest first.
    pub fn versions(&self) -> Result<Vec<VersionInfo>> {
        let state = self.read()?;
        let last = state.versions.len().saturating_sub(1);
        Ok(state
            .versions
            .iter()
            .enumerate()
            .map(|(index, v)| VersionInfo {
                index,
                activated_at: v.activated_at(),
                active: index == last,
            })
            .collect())
    }

    /// Pick an activation strictly after the active version and after any
    /// upload timestamp already handed out, and mark it pending.
    ///
    /// Must be called with the write lock held so no `seal_point` can hand
    /// out a later stamp in between.
    fn reserve_activation(&self, state: &mut LedgerState) -> Result<DateTime<Utc>> {
        let issued = *self.lock_issued()?;
        let floors = state
            .versions
            .last()
            .map(|active| active.activated_at())
            .into_iter()
            .chain(issued);

        let mut activation = next_instant(Utc::now())?;
        for floor in floors {
            let floor = next_instant(floor)?;
            if activation < floor {
                activation = floor;
            }
        }

        state.pending = Some(activation);
        Ok(activation)
    }

    fn persist_and_publish(
        &self,
        master: &MasterKey,
        activation: DateTime<Utc>,
    ) -> Result<Arc<KeyVersion>> {
        match self.build_and_persist(master, activation) {
            Ok(version) => {
                let mut state = self.write()?;
                state.versions.push(Arc::clone(&version));
                state.pending = None;
                tracing::info!(
                    activation = %activation,
                    versions = state.versions.len(),
                    "Rotated key version"
                );
                Ok(version)
            }
            Err(e) => {
                self.write()?.pending = None;
                tracing::warn!(error = %e, "Key rotation failed; ledger unchanged");
                Err(e)
            }
        }
    }

    fn build_and_persist(
        &self,
        master: &MasterKey,
        activation: DateTime<Utc>,
    ) -> Result<Arc<KeyVersion>> {
        let version = KeyVersion::new(self.codec.generate_key()?, activation);
        let wrapped = version.seal(master, self.codec.as_ref())?;
        self.store.append(&wrapped)?;
        Ok(Arc::new(version))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| KeeperError::Storage("Key ledger lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| KeeperError::Storage("Key ledger lock poisoned".to_string()))
    }

    fn lock_rotation(&self) -> Result<MutexGuard<'_, ()>> {
        self.rotation
            .lock()
            .map_err(|_| KeeperError::Storage("Key rotation lock poisoned".to_string()))
    }

    fn lock_issued(&self) -> Result<MutexGuard<'_, Option<DateTime<Utc>>>> {
        self.issued
            .lock()
            .map_err(|_| KeeperError::Storage("Upload stamp lock poisoned".to_string()))
    }
}

fn next_instant(at: DateTime<Utc>) -> Result<DateTime<Utc>> {
    at.checked_add_signed(Duration::nanoseconds(1))
        .ok_or_else(|| KeeperError::Configuration(format!("No instant after {}", at)))
}

impl KeyLedger for Ledger {
    fn active(&self) -> Result<Arc<KeyVersion>> {
        self.read()?
            .versions
            .last()
            .cloned()
            .ok_or(KeeperError::NoActiveKey)
    }

    fn version_for(&self, at: DateTime<Utc>) -> Result<Arc<KeyVersion>> {
        let state = self.read()?;
        let idx = state.versions.partition_point(|v| v.activated_at() <= at);
        if idx == 0 {
            return Err(KeeperError::VersionNotFound { at });
        }
        Ok(Arc::clone(&state.versions[idx - 1]))
    }

    fn seal_point(&self) -> Result<SealPoint> {
        let state = self.read()?;
        let version = state.versions.last().cloned().ok_or(KeeperError::NoActiveKey)?;

        let mut at = Utc::now();
        if let Some(pending) = state.pending {
            if at >= pending {
                at = pending - Duration::nanoseconds(1);
            }
        }
        if at < version.activated_at() {
            at = version.activated_at();
        }

        let mut issued = self.lock_issued()?;
        if issued.map_or(true, |highest| at > highest) {
            *issued = Some(at);
        }

        Ok(SealPoint { version, at })
    }
}
