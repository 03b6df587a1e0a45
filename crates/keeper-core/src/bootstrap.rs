//! Startup and rotation control.
//!
//! [`RotationController::bootstrap`] is the only way to obtain a ready
//! ledger: it loads every stored version, unwraps them with the master key,
//! and rotates if the active version is missing or stale. Any failure is
//! returned to the caller, which must treat it as fatal.

use std::sync::Arc;

use chrono::Duration;

use crate::crypto::{Codec, MasterKey};
use crate::envelope::EnvelopeManager;
use crate::error::{KeeperError, Result};
use crate::ledger::{KeyVersion, Ledger, RotationStatus, VersionInfo};
use crate::storage::KeyVersionStore;

/// Default rotation interval (30 days).
pub const DEFAULT_ROTATION_DAYS: i64 = 30;

/// Longest accepted rotation interval (100 years).
pub const MAX_ROTATION_DAYS: i64 = 36_500;

/// How often the active key version is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub interval: Duration,
}

impl RotationPolicy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Reject intervals that would rotate on every check or overflow the
    /// deadline arithmetic.
    pub fn validate(&self) -> Result<()> {
        if self.interval <= Duration::zero() || self.interval > Duration::days(MAX_ROTATION_DAYS) {
            return Err(KeeperError::Configuration(format!(
                "Rotation interval must be positive and at most {} days, got {}s",
                MAX_ROTATION_DAYS,
                self.interval.num_seconds()
            )));
        }
        Ok(())
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::days(DEFAULT_ROTATION_DAYS),
        }
    }
}

/// Owns the master key and the ledger for the lifetime of the process.
pub struct RotationController {
    master: MasterKey,
    policy: RotationPolicy,
    codec: Arc<dyn Codec>,
    ledger: Arc<Ledger>,
}

impl RotationController {
    /// Load the ledger from `key_store` and rotate if due.
    ///
    /// # Errors
    ///
    /// Returns the first error from listing, unwrapping or rotating. No
    /// partially loaded ledger is ever returned.
    pub fn bootstrap(
        master: MasterKey,
        policy: RotationPolicy,
        codec: Arc<dyn Codec>,
        key_store: Arc<dyn KeyVersionStore>,
    ) -> Result<Self> {
        policy.validate()?;
        let wrapped = key_store.list_all()?;
        let ledger = Ledger::load(&wrapped, &master, Arc::clone(&codec), key_store)?;
        ledger.rotate_if_due(&master, policy.interval)?;

        tracing::info!(
            versions = ledger.len()?,
            interval_days = policy.interval.num_days(),
            "Key ledger bootstrapped"
        );

        Ok(Self {
            master,
            policy,
            codec,
            ledger: Arc::new(ledger),
        })
    }

    /// Rotate if the active version has outlived the policy interval.
    pub fn rotate_if_due(&self) -> Result<Option<Arc<KeyVersion>>> {
        self.ledger.rotate_if_due(&self.master, self.policy.interval)
    }

    /// Rotate regardless of the active version's age.
    pub fn force_rotate(&self) -> Result<Arc<KeyVersion>> {
        self.ledger.force_rotate(&self.master)
    }

    /// Rotation status of the active version under this controller's policy.
    pub fn status(&self) -> Result<RotationStatus> {
        self.ledger.rotation_status(self.policy.interval)
    }

    pub fn versions(&self) -> Result<Vec<VersionInfo>> {
        self.ledger.versions()
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn ledger(&self) -> Arc<Ledger> {
        Arc::clone(&self.ledger)
    }

    /// An envelope manager bound to this controller's ledger.
    pub fn envelope(&self) -> EnvelopeManager {
        EnvelopeManager::new(Arc::clone(&self.codec), self.ledger.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmCodec;
    use crate::error::KeeperError;
    use crate::ledger::KeyLedger;
    use crate::storage::MemoryStore;

    fn codec() -> Arc<dyn Codec> {
        Arc::new(AesGcmCodec::new())
    }

    #[test]
    fn test_default_policy_is_thirty_days() {
        assert_eq!(RotationPolicy::default().interval, Duration::days(30));
    }

    #[test]
    fn test_bootstrap_on_empty_store_creates_first_version() {
        let store = Arc::new(MemoryStore::new());
        let controller = RotationController::bootstrap(
            MasterKey::from_bytes([1u8; 32]),
            RotationPolicy::default(),
            codec(),
            store.clone(),
        )
        .unwrap();

        assert_eq!(store.version_count().unwrap(), 1);
        assert!(matches!(controller.status().unwrap(), RotationStatus::Current { .. }));
        assert!(controller.rotate_if_due().unwrap().is_none());
    }

    #[test]
    fn test_bootstrap_reuses_fresh_version() {
        let store = Arc::new(MemoryStore::new());
        let first = RotationController::bootstrap(
            MasterKey::from_bytes([1u8; 32]),
            RotationPolicy::default(),
            codec(),
            store.clone(),
        )
        .unwrap();
        let active = first.ledger().active().unwrap().activated_at();
        drop(first);

        let second = RotationController::bootstrap(
            MasterKey::from_bytes([1u8; 32]),
            RotationPolicy::default(),
            codec(),
            store.clone(),
        )
        .unwrap();

        assert_eq!(store.version_count().unwrap(), 1);
        assert_eq!(second.ledger().active().unwrap().activated_at(), active);
    }

    #[test]
    fn test_bootstrap_with_wrong_master_fails() {
        let store = Arc::new(MemoryStore::new());
        RotationController::bootstrap(
            MasterKey::from_bytes([1u8; 32]),
            RotationPolicy::default(),
            codec(),
            store.clone(),
        )
        .unwrap();

        let result = RotationController::bootstrap(
            MasterKey::from_bytes([2u8; 32]),
            RotationPolicy::default(),
            codec(),
            store.clone(),
        );
        assert!(matches!(result, Err(KeeperError::UnwrapAuthenticationFailed)));
        // Nothing was appended by the failed attempt
        assert_eq!(store.version_count().unwrap(), 1);
    }

    #[test]
    fn test_bootstrap_fails_when_one_stored_version_is_foreign() {
        let store = Arc::new(MemoryStore::new());
        let controller = RotationController::bootstrap(
            MasterKey::from_bytes([1u8; 32]),
            RotationPolicy::default(),
            codec(),
            store.clone(),
        )
        .unwrap();
        controller.force_rotate().unwrap();
        drop(controller);

        // A version written by a deployment with another master key
        let foreign_body = {
            let other = Arc::new(MemoryStore::new());
            RotationController::bootstrap(
                MasterKey::from_bytes([2u8; 32]),
                RotationPolicy::default(),
                codec(),
                other.clone(),
            )
            .unwrap();
            other.list_all().unwrap().remove(0)
        };
        store.append(&foreign_body).unwrap();

        let result = RotationController::bootstrap(
            MasterKey::from_bytes([1u8; 32]),
            RotationPolicy::default(),
            codec(),
            store.clone(),
        );
        assert!(matches!(result, Err(KeeperError::UnwrapAuthenticationFailed)));
        assert_eq!(store.version_count().unwrap(), 3);
    }

    #[test]
    fn test_bootstrap_rejects_out_of_range_interval() {
        for interval in [
            Duration::zero(),
            Duration::seconds(-1),
            Duration::days(MAX_ROTATION_DAYS + 1),
        ] {
            let store = Arc::new(MemoryStore::new());
            let result = RotationController::bootstrap(
                MasterKey::from_bytes([1u8; 32]),
                RotationPolicy::new(interval),
                codec(),
                store.clone(),
            );
            assert!(matches!(result, Err(KeeperError::Configuration(_))));
            assert_eq!(store.version_count().unwrap(), 0);
        }

        assert!(RotationPolicy::new(Duration::days(MAX_ROTATION_DAYS)).validate().is_ok());
    }

    #[test]
    fn test_envelope_round_trip_through_controller() {
        let controller = RotationController::bootstrap(
            MasterKey::from_bytes([1u8; 32]),
            RotationPolicy::default(),
            codec(),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();

        let envelope = controller.envelope();
        let sealed = envelope.wrap(b"payload").unwrap();
        controller.force_rotate().unwrap();

        let opened = controller
            .envelope()
            .unwrap(&sealed.ciphertext, &sealed.wrapped_key, sealed.sealed_at)
            .unwrap();
        assert_eq!(opened.as_slice(), b"payload");
        assert_eq!(controller.versions().unwrap().len(), 2);
    }
}
