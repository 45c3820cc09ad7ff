/// Logged-in session: owns the delivery queue, the config state and the sync loop.
/// Built at login, torn down at logout.
use crate::clock::NetworkClock;
use crate::config::Config;
use crate::delivery::MessageQueue;
use crate::error::{CourierError, Result};
use crate::identity::AccountIdentity;
use crate::shared_config::{
    ConfigReconciler, ConfigSyncService, ConfigVariantStore, DumpStore, EngineFactory, InitReport,
};
use crate::storage::KvStore;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Session {
    identity: AccountIdentity,
    queue: MessageQueue,
    variants: Arc<ConfigVariantStore>,
    reconciler: Arc<ConfigReconciler>,
    sync: Arc<ConfigSyncService>,
    clock: NetworkClock,
    sync_interval: Duration,
    init_report: InitReport,
    shutdown: watch::Sender<bool>,
    sync_task: Option<JoinHandle<()>>,
}

impl Session {
    /// Build every session-scoped component and restore config state.
    /// Fails if the account has no signing key.
    pub async fn login(
        config: &Config,
        store: Arc<dyn KvStore>,
        transport: Arc<dyn Transport>,
        engines: Arc<dyn EngineFactory>,
        identity: AccountIdentity,
    ) -> Result<Self> {
        config.validate()?;
        if let Some(expected) = &config.own_pubkey {
            if *expected != identity.pubkey {
                return Err(CourierError::Config(format!(
                    "identity {} does not match configured pubkey {}",
                    identity.pubkey, expected
                )));
            }
        }

        let queue = MessageQueue::new(
            &identity.pubkey,
            store.clone(),
            transport.clone(),
            config.event_buffer,
        )?;
        let variants = Arc::new(ConfigVariantStore::new(DumpStore::new(store), engines));
        let init_report = variants.init_for_account(&identity).await?;

        let clock = NetworkClock::new();
        let reconciler = Arc::new(ConfigReconciler::new(
            variants.clone(),
            identity.pubkey.clone(),
            clock.clone(),
        ));
        let sync = Arc::new(ConfigSyncService::new(
            queue.clone(),
            reconciler.clone(),
            variants.clone(),
            transport,
        ));
        let (shutdown, _) = watch::channel(false);

        info!(pubkey = %identity.pubkey, "Logged in");
        Ok(Self {
            identity,
            queue,
            variants,
            reconciler,
            sync,
            clock,
            sync_interval: config.config_sync_interval,
            init_report,
            shutdown,
            sync_task: None,
        })
    }

    /// Resume cached deliveries and start the config sync loop.
    /// Returns how many cached messages were re-admitted.
    pub async fn start(&mut self) -> usize {
        let resumed = self.queue.process_all_pending().await;
        if self.sync_task.is_none() {
            let sync = self.sync.clone();
            let interval = self.sync_interval;
            let shutdown = self.shutdown.subscribe();
            self.sync_task = Some(tokio::spawn(async move {
                sync.run(interval, shutdown).await;
            }));
        }
        info!(resumed, "Session started");
        resumed
    }

    /// Stop the sync loop and wait for in-flight deliveries to settle
    pub async fn logout(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.sync_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Config sync task ended abnormally");
            }
        }
        self.queue.wait_idle().await;
        info!(pubkey = %self.identity.pubkey, "Logged out");
    }

    pub fn identity(&self) -> &AccountIdentity {
        &self.identity
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn variants(&self) -> &Arc<ConfigVariantStore> {
        &self.variants
    }

    pub fn reconciler(&self) -> &Arc<ConfigReconciler> {
        &self.reconciler
    }

    pub fn sync(&self) -> &Arc<ConfigSyncService> {
        &self.sync
    }

    pub fn clock(&self) -> &NetworkClock {
        &self.clock
    }

    pub fn init_report(&self) -> &InitReport {
        &self.init_report
    }
}
