/// Periodic config push loop for the logged-in account
use crate::delivery::MessageQueue;
use crate::error::{CourierError, Result};
use crate::events::DeliveryOutcome;
use crate::shared_config::reconciler::{ConfigReconciler, OutgoingConfResult};
use crate::shared_config::store::ConfigVariantStore;
use crate::shared_config::variant::ConfigVariant;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Summary of one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub failed: usize,
    pub dumps_saved: usize,
}

pub struct ConfigSyncService {
    queue: MessageQueue,
    reconciler: Arc<ConfigReconciler>,
    store: Arc<ConfigVariantStore>,
    transport: Arc<dyn Transport>,
    trigger: Notify,
}

impl ConfigSyncService {
    pub fn new(
        queue: MessageQueue,
        reconciler: Arc<ConfigReconciler>,
        store: Arc<ConfigVariantStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            queue,
            reconciler,
            store,
            transport,
            trigger: Notify::new(),
        }
    }

    /// Push every dirty variant of the local account once
    pub async fn sync_once(&self) -> Result<SyncReport> {
        let own = self.reconciler.own_pubkey().to_string();
        let changes = self.reconciler.pending_changes_for_pubkey(&own).await?;
        let mut report = SyncReport::default();
        if changes.is_empty() {
            return Ok(report);
        }
        debug!(changes = changes.len(), "Pushing config changes");

        for change in changes {
            match self.push_change(&own, change).await {
                Ok(saved) => {
                    report.pushed += 1;
                    if saved {
                        report.dumps_saved += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Config push failed, will retry on the next pass");
                    report.failed += 1;
                }
            }
        }

        info!(pushed = report.pushed, failed = report.failed, "Config sync pass finished");
        Ok(report)
    }

    /// Returns whether a dump was written after confirming
    async fn push_change(&self, own: &str, change: OutgoingConfResult) -> Result<bool> {
        let OutgoingConfResult {
            message,
            envelope,
            namespace,
            variant,
            obsolete_hashes,
        } = change;

        let Some(ticket) = self
            .queue
            .send_sync_message(namespace, Some(message))
            .await?
        else {
            return Ok(false);
        };

        let receipt = match ticket.outcome().await? {
            DeliveryOutcome::Sent(receipt) => receipt,
            DeliveryOutcome::Failed { reason } => return Err(CourierError::Transport(reason)),
            DeliveryOutcome::Dropped => {
                return Err(CourierError::Protocol(format!(
                    "config push for {} was dropped",
                    ConfigVariant::from(variant)
                )))
            }
        };

        let needs_dump = self
            .reconciler
            .mark_as_pushed(variant, own, envelope.seqno, &receipt.message_hash)
            .await?;
        if needs_dump {
            self.store.save_dump(own, variant.into()).await?;
        }

        if !obsolete_hashes.is_empty() {
            // Leftovers are harmless; the next push lists them again
            if let Err(e) = self.transport.delete_messages(own, &obsolete_hashes).await {
                warn!(error = %e, count = obsolete_hashes.len(), "Failed to delete obsolete config messages");
            }
        }
        Ok(needs_dump)
    }

    /// Wake the loop for an immediate pass
    pub fn request_sync(&self) {
        self.trigger.notify_one();
    }

    /// Run passes every `interval` until `shutdown` flips to true
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Config sync loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if let Err(e) = self.sync_once().await {
                warn!(error = %e, "Config sync pass failed");
            }
        }
        info!("Config sync loop stopped");
    }
}
