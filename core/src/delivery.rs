/// Message delivery queue
///
/// Accepts outgoing messages, classifies them (direct, group, sync-to-self,
/// open group, non-durable), enforces the self-send policy and drains the
/// pending cache through one serial job queue per destination.
use crate::error::{CourierError, Result};
use crate::events::{DeliveryEvent, DeliveryOutcome, DeliveryTicket};
use crate::job_queue::JobQueues;
use crate::message::{
    Namespace, OpenGroupMessage, OpenGroupPayload, OpenGroupReceipt, OpenGroupRoom,
    OutgoingMessage, SendReceipt,
};
use crate::pending_cache::{PendingMessage, PendingMessageCache};
use crate::storage::KvStore;
use crate::transport::Transport;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One instance per logged-in session
#[derive(Clone)]
pub struct MessageQueue {
    own_pubkey: Arc<str>,
    cache: Arc<PendingMessageCache>,
    jobs: JobQueues,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<DeliveryEvent>,
}

impl MessageQueue {
    /// Build the queue for `own_pubkey`, loading any cache left by a previous run.
    /// Nothing is sent until `process_all_pending` is called.
    pub fn new(
        own_pubkey: &str,
        store: Arc<dyn KvStore>,
        transport: Arc<dyn Transport>,
        event_buffer: usize,
    ) -> Result<Self> {
        if own_pubkey.is_empty() {
            return Err(CourierError::InvalidArgument("own pubkey is empty".to_string()));
        }
        let cache = PendingMessageCache::load(store)?;
        let (events, _) = broadcast::channel(event_buffer.max(1));

        info!(own_pubkey = %own_pubkey, "Message queue ready");
        Ok(Self {
            own_pubkey: Arc::from(own_pubkey),
            cache: Arc::new(cache),
            jobs: JobQueues::new(),
            transport,
            events,
        })
    }

    pub fn own_pubkey(&self) -> &str {
        &self.own_pubkey
    }

    pub fn cache(&self) -> &PendingMessageCache {
        &self.cache
    }

    pub fn job_queues(&self) -> &JobQueues {
        &self.jobs
    }

    /// Success/failure notifications for every message
    pub fn subscribe(&self) -> broadcast::Receiver<DeliveryEvent> {
        self.events.subscribe()
    }

    /// Durable send to one account. Sync-only kinds must use `send_sync_message`.
    pub async fn send_to_pubkey(
        &self,
        destination: &str,
        message: OutgoingMessage,
        namespace: Namespace,
        is_group: bool,
    ) -> Result<DeliveryTicket> {
        if message.kind.is_sync_only() {
            return Err(CourierError::Protocol(format!(
                "{} message {} must go through send_sync_message",
                message.kind, message.id
            )));
        }
        self.process(destination, message, namespace, is_group).await
    }

    /// Durable send to a closed group: the explicit key wins over the
    /// group id embedded in the message
    pub async fn send_to_group(
        &self,
        message: OutgoingMessage,
        namespace: Namespace,
        group_key: Option<&str>,
    ) -> Result<DeliveryTicket> {
        let destination = match group_key {
            Some(key) => key.to_string(),
            None => message.group_id.clone().ok_or_else(|| {
                CourierError::InvalidArgument(format!(
                    "message {} has no group key and no embedded group id",
                    message.id
                ))
            })?,
        };
        if message.kind.is_sync_only() {
            return Err(CourierError::Protocol(format!(
                "{} message {} cannot target a group",
                message.kind, message.id
            )));
        }
        self.process(&destination, message, namespace, true).await
    }

    /// Durable send to our own account. An absent message is a no-op.
    pub async fn send_sync_message(
        &self,
        namespace: Namespace,
        message: Option<OutgoingMessage>,
    ) -> Result<Option<DeliveryTicket>> {
        let Some(message) = message else {
            return Ok(None);
        };
        if !message.kind.is_self_target() {
            return Err(CourierError::Protocol(format!(
                "{} message {} is not a sync message",
                message.kind, message.id
            )));
        }

        let own = self.own_pubkey.clone();
        let ticket = self.admit(&own, message, namespace, false).await?;
        self.process_pending(&own, true).await;
        Ok(Some(ticket))
    }

    /// Immediate send that never touches the cache. Returns the server
    /// timestamp, or None when the send failed.
    pub async fn send_to_pubkey_non_durably(
        &self,
        destination: &str,
        message: OutgoingMessage,
        namespace: Namespace,
    ) -> Option<i64> {
        match self.transport.send(destination, &message, namespace).await {
            Ok(receipt) => {
                let timestamp = receipt.server_timestamp_ms;
                self.handle_success(destination, &message, namespace, &receipt, false);
                Some(timestamp)
            }
            Err(e) => {
                self.handle_failure(&message.id, destination, e.to_string());
                None
            }
        }
    }

    /// Post to an open group room. Reactions go to the reaction endpoint.
    pub async fn send_to_open_group_v2(
        &self,
        message: &OpenGroupMessage,
        room: &OpenGroupRoom,
        blinded: bool,
    ) -> Result<OpenGroupReceipt> {
        let result = match &message.payload {
            OpenGroupPayload::Reaction(reaction) => {
                self.transport.send_open_group_reaction(room, reaction).await
            }
            OpenGroupPayload::Content { data } => {
                self.transport.send_open_group(room, data, blinded).await
            }
        };
        self.settle_open_group(&message.id, room, result)
    }

    /// Message request to a blinded id via the room's server
    pub async fn send_to_open_group_v2_blinded_request(
        &self,
        payload: &[u8],
        room: &OpenGroupRoom,
        recipient_blinded_id: &str,
    ) -> Result<OpenGroupReceipt> {
        let message_id = Uuid::new_v4().to_string();
        let result = self
            .transport
            .send_blinded_request(room, recipient_blinded_id, payload)
            .await;
        self.settle_open_group(&message_id, room, result)
    }

    /// Admit every cache-resident message for `destination` as a job.
    /// Returns how many new jobs were queued.
    pub async fn process_pending(&self, destination: &str, is_sync: bool) -> usize {
        let pending = self.cache.get_for_device(destination).await;
        if pending.is_empty() {
            return 0;
        }

        let queue = self.jobs.get_or_create(destination).await;
        let mut admitted = 0;
        for entry in pending {
            let id = entry.id().to_string();
            if queue.has(&id).await {
                continue;
            }
            let this = self.clone();
            if queue
                .add_with_id(&id, async move { this.deliver(entry, is_sync).await })
                .await
            {
                admitted += 1;
            }
        }
        debug!(destination = %destination, admitted, "Processed pending messages");
        admitted
    }

    /// Resume delivery for every destination with cached messages.
    /// Call once at session start.
    pub async fn process_all_pending(&self) -> usize {
        let devices = self.cache.get_devices().await;
        if devices.is_empty() {
            return 0;
        }
        info!(destinations = devices.len(), "Resuming pending deliveries");

        let own = self.own_pubkey.clone();
        let admitted = join_all(
            devices
                .iter()
                .map(|device| self.process_pending(device, device.as_str() == &*own)),
        )
        .await;
        admitted.into_iter().sum()
    }

    /// Wait until every destination's queue has drained
    pub async fn wait_idle(&self) {
        self.jobs.wait_all_idle().await;
    }

    async fn process(
        &self,
        destination: &str,
        message: OutgoingMessage,
        namespace: Namespace,
        is_group: bool,
    ) -> Result<DeliveryTicket> {
        if destination == &*self.own_pubkey && !message.kind.is_self_target() {
            warn!(
                message_id = %message.id,
                kind = %message.kind,
                "Dropping non-sync message addressed to ourselves"
            );
            let _ = self.events.send(DeliveryEvent::Dropped {
                message_id: message.id.clone(),
                destination: destination.to_string(),
            });
            return Ok(DeliveryTicket::settled(message.id, DeliveryOutcome::Dropped));
        }

        let ticket = self.admit(destination, message, namespace, is_group).await?;
        let is_sync = destination == &*self.own_pubkey;
        self.process_pending(destination, is_sync).await;
        Ok(ticket)
    }

    async fn admit(
        &self,
        destination: &str,
        message: OutgoingMessage,
        namespace: Namespace,
        is_group: bool,
    ) -> Result<DeliveryTicket> {
        let (tx, ticket) = DeliveryTicket::new(message.id.clone());
        self.cache
            .add(destination, message, namespace, Some(tx), is_group)
            .await?;
        Ok(ticket)
    }

    /// Body of one job. The message leaves the cache whatever the send outcome;
    /// a restart re-admits only what is still cached.
    async fn deliver(&self, entry: PendingMessage, is_sync: bool) -> Result<()> {
        let id = entry.id().to_string();
        // Admitted from a stale snapshot after an earlier job already settled it
        if !self.cache.contains(&id).await {
            debug!(message_id = %id, destination = %entry.destination, "Message already settled, skipping");
            return Ok(());
        }
        debug!(message_id = %id, destination = %entry.destination, "Sending");

        let outcome = match self
            .transport
            .send(&entry.destination, &entry.message, entry.namespace)
            .await
        {
            Ok(receipt) => {
                self.handle_success(
                    &entry.destination,
                    &entry.message,
                    entry.namespace,
                    &receipt,
                    is_sync,
                );
                DeliveryOutcome::Sent(receipt)
            }
            Err(e) => {
                let reason = e.to_string();
                self.handle_failure(&id, &entry.destination, reason.clone());
                DeliveryOutcome::Failed { reason }
            }
        };

        let waiter = self.cache.take_waiter(&id).await;
        let removed = self.cache.remove(&id).await;
        if let Some(waiter) = waiter {
            let _ = waiter.send(outcome);
        }

        match removed {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(message_id = %id, "Message was already gone from the cache");
                Ok(())
            }
            Err(e) => {
                error!(message_id = %id, error = %e, "Failed to remove settled message");
                Err(e)
            }
        }
    }

    fn handle_success(
        &self,
        destination: &str,
        message: &OutgoingMessage,
        namespace: Namespace,
        receipt: &SendReceipt,
        sync: bool,
    ) {
        info!(
            message_id = %message.id,
            destination = %destination,
            namespace = %namespace,
            server_timestamp = receipt.server_timestamp_ms,
            "Message sent"
        );
        let _ = self.events.send(DeliveryEvent::Sent {
            message_id: message.id.clone(),
            destination: destination.to_string(),
            namespace,
            kind: message.kind,
            server_timestamp_ms: receipt.server_timestamp_ms,
            sync,
        });
    }

    fn handle_failure(&self, message_id: &str, destination: &str, reason: String) {
        warn!(
            message_id = %message_id,
            destination = %destination,
            reason = %reason,
            "Message failed to send"
        );
        let _ = self.events.send(DeliveryEvent::Failed {
            message_id: message_id.to_string(),
            destination: destination.to_string(),
            reason,
        });
    }

    fn settle_open_group(
        &self,
        message_id: &str,
        room: &OpenGroupRoom,
        result: Result<OpenGroupReceipt>,
    ) -> Result<OpenGroupReceipt> {
        let room_label = format!("{}/{}", room.server_url, room.room);
        match result.and_then(OpenGroupReceipt::validated) {
            Ok(receipt) => {
                let server_id = receipt.server_id.unwrap_or_default();
                info!(message_id = %message_id, room = %room_label, server_id, "Open group message sent");
                let _ = self.events.send(DeliveryEvent::OpenGroupSent {
                    message_id: message_id.to_string(),
                    room: room_label,
                    server_id,
                    server_timestamp_ms: receipt.server_timestamp_ms,
                });
                Ok(receipt)
            }
            Err(e) => {
                self.handle_failure(message_id, &room_label, e.to_string());
                Err(e)
            }
        }
    }
}
