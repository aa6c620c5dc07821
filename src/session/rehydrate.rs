//! Session rehydration module
//!
//! Reconstructs engine-visible transfer state from durable descriptors at
//! startup and keeps descriptors synchronized with engine lifecycle events
//! afterwards. Locally-originated transfers whose pieces were never
//! hash-verified are re-verified by the engine; while that runs, a
//! progress override supersedes the engine's native progress metric so the
//! session never reports an unverified seed as complete.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace, warn};

use crate::engine::{EngineEvent, TransferEngine, TransferRegistration};
use crate::error::StoreError;
use crate::store::descriptor::TransferDescriptor;
use crate::vault::Vault;

/// Out-of-band map from transfer identity to a progress value in [0, 1]
///
/// Owned by the rehydrator and consulted by the status projection; the
/// engine's own transfer state is never mutated.
#[derive(Debug, Default)]
pub struct ProgressOverrides {
    values: RwLock<HashMap<String, f64>>,
}

impl ProgressOverrides {
    /// Set (or replace) the override for a transfer
    pub async fn set(&self, identity: &str, progress: f64) {
        let clamped = progress.clamp(0.0, 1.0);
        self.values
            .write()
            .await
            .insert(identity.to_string(), clamped);
    }

    /// Update the override only when one is already applied
    pub async fn update_existing(&self, identity: &str, progress: f64) -> bool {
        let mut values = self.values.write().await;
        match values.get_mut(identity) {
            Some(value) => {
                *value = progress.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    /// Current override for a transfer
    pub async fn get(&self, identity: &str) -> Option<f64> {
        self.values.read().await.get(identity).copied()
    }

    /// Remove the override, handing authority back to native progress
    pub async fn remove(&self, identity: &str) {
        self.values.write().await.remove(identity);
    }

    /// Whether a transfer currently has an override
    pub async fn contains(&self, identity: &str) -> bool {
        self.values.read().await.contains_key(identity)
    }
}

/// Observable state of one transfer, as published to the UI layer
///
/// A pure projection of engine stats and the override map; holds no
/// durable state of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSnapshot {
    /// Transfer identity
    pub identity: String,
    /// Effective progress (override when verifying, native otherwise)
    pub progress: f64,
    /// Connected peer count
    pub peers: usize,
    /// Download speed in bytes per second
    pub download_speed: f64,
    /// Upload speed in bytes per second
    pub upload_speed: f64,
    /// True while a verification override is in effect
    pub verifying: bool,
}

/// Outcome of a rehydration pass
#[derive(Debug, Default)]
pub struct RehydrationReport {
    /// Identities re-registered with the engine
    pub restored: Vec<String>,
    /// Identities that failed, with the per-transfer error
    pub failed: Vec<(String, StoreError)>,
}

impl RehydrationReport {
    /// Whether every descriptor was restored
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Rebuilds and tracks engine-visible transfer state
pub struct SessionRehydrator {
    engine: Arc<dyn TransferEngine>,
    vault: Arc<Vault>,
    overrides: ProgressOverrides,
}

impl SessionRehydrator {
    /// Create a rehydrator over the given engine and vault
    pub fn new(engine: Arc<dyn TransferEngine>, vault: Arc<Vault>) -> Self {
        Self {
            engine,
            vault,
            overrides: ProgressOverrides::default(),
        }
    }

    /// The override map, for the status projection
    pub fn overrides(&self) -> &ProgressOverrides {
        &self.overrides
    }

    fn registration_for(&self, descriptor: &TransferDescriptor) -> TransferRegistration {
        TransferRegistration {
            identity: descriptor.identity.clone(),
            origin_uri: descriptor.origin_uri.clone(),
            display_name: descriptor.display_name.clone(),
            file_manifest: descriptor.file_manifest.clone(),
            skip_verification: !descriptor.needs_verification(),
            store: self.vault.store_provider(),
        }
    }

    /// Re-register every persisted transfer with the engine
    ///
    /// Failures are per-transfer: one bad descriptor or engine rejection
    /// is reported and the rest continue.
    pub async fn rehydrate(&self) -> Result<RehydrationReport, StoreError> {
        let descriptors = match self.vault.descriptors() {
            Some(descriptors) => descriptors,
            None => {
                info!("No persistent storage; nothing to rehydrate");
                return Ok(RehydrationReport::default());
            }
        };

        let stored = descriptors.get_all().await?;
        info!("Rehydrating {} transfers", stored.len());

        let mut report = RehydrationReport::default();
        for descriptor in stored {
            let identity = descriptor.identity.clone();
            let needs_verification = descriptor.needs_verification();

            match self
                .engine
                .register_transfer(self.registration_for(&descriptor))
                .await
            {
                Ok(()) => {
                    if needs_verification {
                        // Hold progress at zero until the engine has
                        // actually verified the on-disk pieces.
                        self.overrides.set(&identity, 0.0).await;
                        debug!("Transfer {} awaiting re-verification", identity);
                    }
                    report.restored.push(identity);
                }
                Err(e) => {
                    warn!("Failed to rehydrate transfer {}: {}", identity, e);
                    report.failed.push((identity, e));
                }
            }
        }

        info!(
            "Rehydration complete: {} restored, {} failed",
            report.restored.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Persist a descriptor for a transfer the engine just accepted
    pub async fn record_transfer(&self, descriptor: &TransferDescriptor) -> Result<(), StoreError> {
        match self.vault.descriptors() {
            Some(descriptors) => descriptors.put(descriptor).await,
            None => Ok(()),
        }
    }

    /// Drop all durable state for a transfer
    pub async fn forget_transfer(&self, identity: &str) {
        self.overrides.remove(identity).await;
        if let Some(descriptors) = self.vault.descriptors() {
            descriptors.delete(identity).await;
        }
        if let Some(stores) = self.vault.stores() {
            stores.destroy_transfer(identity).await;
        }
        info!("Forgot transfer {}", identity);
    }

    /// Apply one engine event
    pub async fn handle_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::VerifyProgress { identity, progress } => {
                if self.overrides.update_existing(&identity, progress).await {
                    trace!(
                        "Verification progress for {}: {:.1}%",
                        identity,
                        progress * 100.0
                    );
                }
            }
            EngineEvent::VerifyComplete { identity } => {
                if !self.overrides.contains(&identity).await {
                    return;
                }
                self.overrides.set(&identity, 1.0).await;
                self.mark_verified(&identity).await;
            }
            EngineEvent::TransferRemoved { identity } => {
                self.forget_transfer(&identity).await;
            }
            EngineEvent::DownloadProgress { identity, progress } => {
                trace!(
                    "Download progress for {}: {:.1}%",
                    identity,
                    progress * 100.0
                );
            }
            EngineEvent::PeersChanged {
                identity,
                connected,
            } => {
                trace!("Peers for {}: {}", identity, connected);
            }
        }
    }

    /// Consume engine events until the channel closes
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<EngineEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("Engine event stream closed");
    }

    /// Persist the verified flag, then hand authority back to native
    /// progress
    ///
    /// The descriptor write happens before the override is dropped so a
    /// failure leaves the conservative state and the transfer simply
    /// re-verifies on the next start.
    async fn mark_verified(&self, identity: &str) {
        let descriptors = match self.vault.descriptors() {
            Some(descriptors) => descriptors,
            None => {
                self.overrides.remove(identity).await;
                return;
            }
        };
        let mut descriptor = match descriptors.get(identity).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                warn!("No descriptor to mark verified for {}", identity);
                self.overrides.remove(identity).await;
                return;
            }
            Err(e) => {
                warn!("Cannot load descriptor for {}: {}", identity, e);
                return;
            }
        };
        descriptor.is_verified = true;
        match descriptors.put(&descriptor).await {
            Ok(()) => {
                self.overrides.remove(identity).await;
                info!("Transfer {} verified", identity);
            }
            Err(e) => {
                warn!("Failed to persist verified flag for {}: {}", identity, e);
            }
        }
    }

    /// Project the observable state of a transfer
    pub async fn snapshot(&self, identity: &str) -> Option<TransferSnapshot> {
        let stats = self.engine.transfer_stats(identity).await;
        let override_progress = self.overrides.get(identity).await;
        if stats.is_none() && override_progress.is_none() {
            return None;
        }
        let stats = stats.unwrap_or_default();
        Some(TransferSnapshot {
            identity: identity.to_string(),
            progress: override_progress.unwrap_or(stats.progress),
            peers: stats.peers,
            download_speed: stats.download_speed,
            upload_speed: stats.upload_speed,
            verifying: override_progress.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TransferStats;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tokio::fs;
    use tokio::sync::Mutex;

    fn test_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("torrent_vault_rehydrate_{}", name))
    }

    #[derive(Default)]
    struct StubEngine {
        registrations: Mutex<Vec<TransferRegistration>>,
        stats: Mutex<HashMap<String, TransferStats>>,
        reject: Option<String>,
    }

    impl StubEngine {
        fn rejecting(identity: &str) -> Self {
            Self {
                reject: Some(identity.to_string()),
                ..Default::default()
            }
        }

        async fn set_stats(&self, identity: &str, stats: TransferStats) {
            self.stats
                .lock()
                .await
                .insert(identity.to_string(), stats);
        }

        async fn registration(&self, identity: &str) -> Option<TransferRegistration> {
            self.registrations
                .lock()
                .await
                .iter()
                .find(|r| r.identity == identity)
                .cloned()
        }
    }

    #[async_trait]
    impl TransferEngine for StubEngine {
        async fn register_transfer(
            &self,
            registration: TransferRegistration,
        ) -> Result<(), StoreError> {
            if self.reject.as_deref() == Some(registration.identity.as_str()) {
                return Err(StoreError::engine_rejected_for(
                    "transfer refused",
                    registration.identity,
                ));
            }
            self.registrations.lock().await.push(registration);
            Ok(())
        }

        async fn transfer_stats(&self, identity: &str) -> Option<TransferStats> {
            self.stats.lock().await.get(identity).copied()
        }
    }

    fn descriptor(identity: &str, locally_originated: bool, verified: bool) -> TransferDescriptor {
        let mut descriptor = TransferDescriptor::new(
            identity,
            "Test Transfer",
            format!("magnet:?xt=urn:btih:{}", identity),
            4096,
            Vec::new(),
            locally_originated,
        )
        .unwrap();
        descriptor.is_verified = verified;
        descriptor
    }

    async fn setup(
        name: &str,
        engine: StubEngine,
    ) -> (Arc<StubEngine>, Arc<Vault>, SessionRehydrator, PathBuf) {
        let root = test_root(name);
        let _ = fs::remove_dir_all(&root).await;
        let engine = Arc::new(engine);
        let vault = Arc::new(Vault::open(root.clone()).await);
        let rehydrator = SessionRehydrator::new(engine.clone(), vault.clone());
        (engine, vault, rehydrator, root)
    }

    #[tokio::test]
    async fn test_rehydrate_registers_with_correct_verification_policy() {
        let (engine, vault, rehydrator, root) = setup("policy", StubEngine::default()).await;
        let descriptors = vault.descriptors().unwrap();

        // Downloaded and already verified: trusted at face value
        descriptors
            .put(&descriptor("downloaded", false, true))
            .await
            .unwrap();
        // Locally originated and never verified: must re-verify
        descriptors
            .put(&descriptor("seeded", true, false))
            .await
            .unwrap();

        let report = rehydrator.rehydrate().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.restored.len(), 2);

        let downloaded = engine.registration("downloaded").await.unwrap();
        assert!(downloaded.skip_verification);
        assert!(downloaded.store.is_some());

        let seeded = engine.registration("seeded").await.unwrap();
        assert!(!seeded.skip_verification);

        // Only the seeded transfer is held at zero
        assert_eq!(rehydrator.overrides().get("seeded").await, Some(0.0));
        assert!(rehydrator.overrides().get("downloaded").await.is_none());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_rehydrate_isolates_failures() {
        let (_engine, vault, rehydrator, root) =
            setup("isolate", StubEngine::rejecting("bad")).await;
        let descriptors = vault.descriptors().unwrap();

        descriptors
            .put(&descriptor("good", false, true))
            .await
            .unwrap();
        descriptors
            .put(&descriptor("bad", false, true))
            .await
            .unwrap();

        let report = rehydrator.rehydrate().await.unwrap();
        assert_eq!(report.restored, vec!["good".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_verification_flow_updates_and_clears_override() {
        let (_engine, vault, rehydrator, root) = setup("verify_flow", StubEngine::default()).await;
        let descriptors = vault.descriptors().unwrap();
        descriptors
            .put(&descriptor("seeded", true, false))
            .await
            .unwrap();

        rehydrator.rehydrate().await.unwrap();
        assert_eq!(rehydrator.overrides().get("seeded").await, Some(0.0));

        rehydrator
            .handle_event(EngineEvent::VerifyProgress {
                identity: "seeded".to_string(),
                progress: 0.5,
            })
            .await;
        assert_eq!(rehydrator.overrides().get("seeded").await, Some(0.5));

        rehydrator
            .handle_event(EngineEvent::VerifyComplete {
                identity: "seeded".to_string(),
            })
            .await;

        // Override cleared, descriptor durably verified
        assert!(rehydrator.overrides().get("seeded").await.is_none());
        let stored = descriptors.get("seeded").await.unwrap().unwrap();
        assert!(stored.is_verified);
        assert!(!stored.needs_verification());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_verify_events_for_non_overridden_transfers_are_ignored() {
        let (_engine, vault, rehydrator, root) = setup("ignore_events", StubEngine::default()).await;
        let descriptors = vault.descriptors().unwrap();
        descriptors
            .put(&descriptor("downloaded", false, true))
            .await
            .unwrap();

        rehydrator.rehydrate().await.unwrap();

        rehydrator
            .handle_event(EngineEvent::VerifyProgress {
                identity: "downloaded".to_string(),
                progress: 0.3,
            })
            .await;
        rehydrator
            .handle_event(EngineEvent::VerifyComplete {
                identity: "downloaded".to_string(),
            })
            .await;

        assert!(rehydrator.overrides().get("downloaded").await.is_none());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_snapshot_prefers_override_while_verifying() {
        let (engine, vault, rehydrator, root) = setup("snapshot", StubEngine::default()).await;
        let descriptors = vault.descriptors().unwrap();
        descriptors
            .put(&descriptor("seeded", true, false))
            .await
            .unwrap();
        rehydrator.rehydrate().await.unwrap();

        // Native progress claims complete; the override wins until
        // verification finishes
        engine
            .set_stats(
                "seeded",
                TransferStats {
                    progress: 1.0,
                    peers: 3,
                    download_speed: 0.0,
                    upload_speed: 512.0,
                },
            )
            .await;

        let snapshot = rehydrator.snapshot("seeded").await.unwrap();
        assert_eq!(snapshot.progress, 0.0);
        assert!(snapshot.verifying);
        assert_eq!(snapshot.peers, 3);

        rehydrator
            .handle_event(EngineEvent::VerifyComplete {
                identity: "seeded".to_string(),
            })
            .await;

        let snapshot = rehydrator.snapshot("seeded").await.unwrap();
        assert_eq!(snapshot.progress, 1.0);
        assert!(!snapshot.verifying);

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_snapshot_unknown_transfer_is_none() {
        let (_engine, _vault, rehydrator, root) = setup("unknown", StubEngine::default()).await;
        assert!(rehydrator.snapshot("missing").await.is_none());
        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_record_and_forget_transfer() {
        let (_engine, vault, rehydrator, root) = setup("lifecycle", StubEngine::default()).await;
        let descriptors = vault.descriptors().unwrap();

        rehydrator
            .record_transfer(&descriptor("abc123", false, false))
            .await
            .unwrap();
        assert!(descriptors.get("abc123").await.unwrap().is_some());

        rehydrator.forget_transfer("abc123").await;
        assert!(descriptors.get("abc123").await.unwrap().is_none());
        assert!(!root.join("chunks/abc123").exists());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_transfer_removed_event_forgets_transfer() {
        let (_engine, vault, rehydrator, root) = setup("removed_event", StubEngine::default()).await;
        let descriptors = vault.descriptors().unwrap();
        descriptors
            .put(&descriptor("abc123", true, false))
            .await
            .unwrap();
        rehydrator.rehydrate().await.unwrap();

        rehydrator
            .handle_event(EngineEvent::TransferRemoved {
                identity: "abc123".to_string(),
            })
            .await;

        assert!(descriptors.get("abc123").await.unwrap().is_none());
        assert!(rehydrator.overrides().get("abc123").await.is_none());

        let _ = fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn test_volatile_vault_is_a_clean_no_op() {
        let root = test_root("volatile");
        let _ = fs::remove_dir_all(&root).await;
        let _ = fs::remove_file(&root).await;
        fs::write(&root, b"occupied").await.unwrap();

        let engine = Arc::new(StubEngine::default());
        let vault = Arc::new(Vault::open(root.clone()).await);
        let rehydrator = SessionRehydrator::new(engine.clone(), vault);

        let report = rehydrator.rehydrate().await.unwrap();
        assert!(report.restored.is_empty() && report.failed.is_empty());

        // Persistence operations are no-ops, not failures
        rehydrator
            .record_transfer(&descriptor("abc123", false, false))
            .await
            .unwrap();
        rehydrator.forget_transfer("abc123").await;

        let _ = fs::remove_file(&root).await;
    }
}
