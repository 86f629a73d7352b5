//! Policy Store - Holds the active enforcement policy
//!
//! Readers get the current [`PolicySnapshot`] without locking. Reloads build a
//! complete new snapshot and swap it in atomically, so a decision that already
//! holds a snapshot keeps using it until it finishes.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tlsgate_common::{Error, PolicyConfig, Result};
use tracing::{info, warn};

use crate::metrics::EnforcementMetrics;

/// Where a snapshot's policy came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyOrigin {
    /// Parsed from a policy document
    File { path: PathBuf },
    /// Fail-closed default installed after a load failure
    Fallback { reason: String },
    /// Supplied programmatically
    Inline,
}

/// An immutable, versioned policy
#[derive(Debug, Clone, Serialize)]
pub struct PolicySnapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub origin: PolicyOrigin,
    pub policy: PolicyConfig,
}

impl PolicySnapshot {
    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, PolicyOrigin::Fallback { .. })
    }
}

/// Read, normalize and validate a policy document
pub fn load(path: &Path) -> Result<PolicyConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read policy file {}: {}", path.display(), e))
    })?;

    PolicyConfig::from_toml_str(&content)
}

/// Policy Store
pub struct PolicyStore {
    path: Option<PathBuf>,
    current: ArcSwap<PolicySnapshot>,
    next_version: AtomicU64,
    /// Serializes writers; readers never take it
    write_lock: Mutex<()>,
    metrics: Option<Arc<EnforcementMetrics>>,
}

impl PolicyStore {
    /// Open a store backed by a policy file.
    ///
    /// A missing or invalid file never fails: the fail-closed default policy
    /// is installed instead and the failure is logged.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::open_with_metrics(path, None)
    }

    /// Open a store that reports loads to `metrics`
    pub fn open_with_metrics(
        path: impl Into<PathBuf>,
        metrics: Option<Arc<EnforcementMetrics>>,
    ) -> Self {
        let path = path.into();
        let (snapshot, result) = match load(&path) {
            Ok(policy) => {
                info!("Loaded TLS policy from {}", path.display());
                (
                    Self::snapshot(1, PolicyOrigin::File { path: path.clone() }, policy),
                    "loaded",
                )
            }
            Err(e) => {
                warn!(
                    "Failed to load TLS policy from {}: {}. Using fail-closed default.",
                    path.display(),
                    e
                );
                (Self::fallback_snapshot(1, &e), "fallback")
            }
        };

        if let Some(ref metrics) = metrics {
            metrics.record_policy_load(result);
        }

        Self {
            path: Some(path),
            current: ArcSwap::from_pointee(snapshot),
            next_version: AtomicU64::new(2),
            write_lock: Mutex::new(()),
            metrics,
        }
    }

    /// Create a store from an in-memory policy
    pub fn from_policy(policy: PolicyConfig) -> Result<Self> {
        let policy = policy.normalize();
        policy.validate()?;

        Ok(Self {
            path: None,
            current: ArcSwap::from_pointee(Self::snapshot(1, PolicyOrigin::Inline, policy)),
            next_version: AtomicU64::new(2),
            write_lock: Mutex::new(()),
            metrics: None,
        })
    }

    /// The snapshot in effect right now. Never blocks.
    pub fn current(&self) -> Arc<PolicySnapshot> {
        self.current.load_full()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-read the policy file.
    ///
    /// On failure the fail-closed default replaces the current policy and the
    /// error is returned so the caller can report it.
    pub fn reload(&self) -> Result<Arc<PolicySnapshot>> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::Config("Policy store has no backing file".to_string()))?;

        let _guard = self.lock_writers()?;
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);

        match load(&path) {
            Ok(policy) => {
                let snapshot = Arc::new(Self::snapshot(
                    version,
                    PolicyOrigin::File { path: path.clone() },
                    policy,
                ));
                self.current.store(snapshot.clone());
                self.record_load("loaded");
                info!("Reloaded TLS policy from {} (version {})", path.display(), version);
                Ok(snapshot)
            }
            Err(e) => {
                warn!(
                    "Failed to reload TLS policy from {}: {}. Using fail-closed default.",
                    path.display(),
                    e
                );
                self.current
                    .store(Arc::new(Self::fallback_snapshot(version, &e)));
                self.record_load("fallback");
                Err(e)
            }
        }
    }

    /// Install an already-built policy after normalizing and validating it.
    ///
    /// An invalid policy is rejected and the current snapshot stays in place.
    pub fn replace(&self, policy: PolicyConfig) -> Result<Arc<PolicySnapshot>> {
        let policy = policy.normalize();
        policy.validate()?;

        let _guard = self.lock_writers()?;
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let snapshot = Arc::new(Self::snapshot(version, PolicyOrigin::Inline, policy));
        self.current.store(snapshot.clone());
        self.record_load("replaced");
        Ok(snapshot)
    }

    fn lock_writers(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::Internal("Policy store writer lock poisoned".to_string()))
    }

    fn record_load(&self, result: &str) {
        if let Some(ref metrics) = self.metrics {
            metrics.record_policy_load(result);
        }
    }

    fn snapshot(version: u64, origin: PolicyOrigin, policy: PolicyConfig) -> PolicySnapshot {
        PolicySnapshot {
            version,
            loaded_at: Utc::now(),
            origin,
            policy,
        }
    }

    fn fallback_snapshot(version: u64, error: &Error) -> PolicySnapshot {
        Self::snapshot(
            version,
            PolicyOrigin::Fallback {
                reason: error.to_string(),
            },
            PolicyConfig::secure_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn policy_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const LENIENT: &str = r#"
tls_enabled = true
tls_required = false
reject_unencrypted = false
verify_certificate = false
minimum_key_size_bits = 1024
allowed_protocols = ["TLSv1.1", "TLSv1.2", "TLSv1.3"]
bypass_for_private_networks = true
"#;

    #[test]
    fn test_open_loads_file() {
        let file = policy_file(LENIENT);
        let store = PolicyStore::open(file.path());
        let snapshot = store.current();

        assert_eq!(snapshot.version, 1);
        assert!(!snapshot.is_fallback());
        assert!(!snapshot.policy.tls_required);
        assert_eq!(snapshot.policy.minimum_key_size_bits, 1024);
        assert_eq!(
            snapshot.origin,
            PolicyOrigin::File {
                path: file.path().to_path_buf()
            }
        );
    }

    #[test]
    fn test_unreadable_source_falls_back_to_secure_default() {
        let store = PolicyStore::open("/nonexistent/tlsgate/policy.toml");
        let snapshot = store.current();

        assert!(snapshot.is_fallback());
        assert!(snapshot.policy.tls_required);
        assert!(snapshot.policy.verify_certificate);
        assert!(snapshot.policy.reject_unencrypted);
        assert!(snapshot.policy.minimum_key_size_bits >= 2048);
    }

    #[test]
    fn test_malformed_source_falls_back_to_secure_default() {
        let file = policy_file("tls_required = \"sometimes\"\n[[[");
        let metrics = Arc::new(EnforcementMetrics::new().unwrap());
        let store = PolicyStore::open_with_metrics(file.path(), Some(metrics.clone()));

        let snapshot = store.current();
        assert!(snapshot.is_fallback());
        assert_eq!(snapshot.policy, PolicyConfig::secure_default());
        assert_eq!(metrics.policy_load_count("fallback"), 1);
    }

    #[test]
    fn test_reload_swaps_snapshot_atomically() {
        let file = policy_file(LENIENT);
        let store = PolicyStore::open(file.path());
        let held = store.current();

        std::fs::write(file.path(), "minimum_key_size_bits = 4096\n").unwrap();
        let reloaded = store.reload().unwrap();

        assert_eq!(reloaded.version, 2);
        assert_eq!(store.current().policy.minimum_key_size_bits, 4096);
        // A snapshot taken before the reload is unchanged
        assert_eq!(held.version, 1);
        assert_eq!(held.policy.minimum_key_size_bits, 1024);
    }

    #[test]
    fn test_failed_reload_installs_fallback() {
        let file = policy_file(LENIENT);
        let store = PolicyStore::open(file.path());

        std::fs::write(file.path(), "allowed_protocols = [\"TLSv7\"]\n").unwrap();
        assert!(store.reload().is_err());

        let snapshot = store.current();
        assert!(snapshot.is_fallback());
        assert_eq!(snapshot.version, 2);
        assert!(snapshot.policy.tls_required);
    }

    #[test]
    fn test_fallback_snapshot_serializes_reason() {
        let store = PolicyStore::open("/nonexistent/tlsgate/policy.toml");
        let json = serde_json::to_value(&*store.current()).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["origin"]["kind"], "fallback");
        assert!(json["origin"]["reason"]
            .as_str()
            .unwrap()
            .contains("Failed to read policy file"));
        assert_eq!(json["policy"]["reject_unencrypted"], true);
    }

    #[test]
    fn test_reload_without_file_is_error() {
        let store = PolicyStore::from_policy(PolicyConfig::secure_default()).unwrap();
        assert!(store.reload().is_err());
        assert!(!store.current().is_fallback());
    }

    #[test]
    fn test_replace_normalizes_and_bumps_version() {
        let store = PolicyStore::from_policy(PolicyConfig::secure_default()).unwrap();

        let mut policy = PolicyConfig::secure_default();
        policy.tls_enabled = false;
        let snapshot = store.replace(policy).unwrap();

        assert_eq!(snapshot.version, 2);
        assert!(snapshot.policy.tls_enabled);
        assert_eq!(snapshot.origin, PolicyOrigin::Inline);
    }

    #[test]
    fn test_replace_rejects_invalid_policy() {
        let store = PolicyStore::from_policy(PolicyConfig::secure_default()).unwrap();

        let mut policy = PolicyConfig::secure_default();
        policy.allowed_protocols.clear();
        assert!(store.replace(policy).is_err());
        assert_eq!(store.current().version, 1);
    }

    #[test]
    fn test_concurrent_readers_see_complete_snapshots() {
        let store = Arc::new(PolicyStore::from_policy(PolicyConfig::secure_default()).unwrap());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.current();
                        // Every published snapshot is internally consistent
                        assert_eq!(
                            snapshot.policy.minimum_key_size_bits,
                            if snapshot.version == 1 { 2048 } else { 1024 + snapshot.version as u32 }
                        );
                    }
                })
            })
            .collect();

        for i in 2..50u32 {
            let mut policy = PolicyConfig::secure_default();
            policy.minimum_key_size_bits = 1024 + i;
            store.replace(policy).unwrap();
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.current().version, 49);
    }
}
