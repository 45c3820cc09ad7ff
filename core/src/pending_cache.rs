/// Pending-message cache: outgoing messages not yet settled, persisted per
/// destination so delivery can resume after a restart
use crate::error::{CourierError, Result};
use crate::events::DeliveryOutcome;
use crate::message::{Namespace, OutgoingMessage};
use crate::storage::KvStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

const PENDING_PREFIX: &str = "pending:";

/// One cache entry, as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub destination: String,
    pub namespace: Namespace,
    pub is_group: bool,
    pub message: OutgoingMessage,
    /// Insertion counter; defines send order within a destination
    seq: u64,
}

impl PendingMessage {
    pub fn id(&self) -> &str {
        &self.message.id
    }

    fn storage_key(&self) -> String {
        format!("{}{}:{:016x}", PENDING_PREFIX, self.destination, self.seq)
    }
}

#[derive(Default)]
struct CacheState {
    by_destination: HashMap<String, Vec<PendingMessage>>,
    waiters: HashMap<String, oneshot::Sender<DeliveryOutcome>>,
    next_seq: u64,
}

impl CacheState {
    fn find(&self, id: &str) -> Option<&PendingMessage> {
        self.by_destination
            .values()
            .flat_map(|list| list.iter())
            .find(|m| m.id() == id)
    }
}

pub struct PendingMessageCache {
    store: Arc<dyn KvStore>,
    state: Mutex<CacheState>,
}

impl PendingMessageCache {
    /// Load every persisted entry from the store
    pub fn load(store: Arc<dyn KvStore>) -> Result<Self> {
        let mut state = CacheState::default();

        for (key, value) in store.scan_prefix(PENDING_PREFIX)? {
            let entry: PendingMessage = match serde_json::from_slice(&value) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unreadable pending entry");
                    continue;
                }
            };
            state.next_seq = state.next_seq.max(entry.seq + 1);
            state
                .by_destination
                .entry(entry.destination.clone())
                .or_default()
                .push(entry);
        }

        let mut total = 0;
        for list in state.by_destination.values_mut() {
            list.sort_by_key(|m| m.seq);
            total += list.len();
        }
        if total > 0 {
            info!(
                count = total,
                destinations = state.by_destination.len(),
                "Loaded pending messages"
            );
        }

        Ok(Self {
            store,
            state: Mutex::new(state),
        })
    }

    /// Append a message to the destination's sequence and persist it.
    /// Re-adding an identifier already pending for the same destination is a no-op.
    pub async fn add(
        &self,
        destination: &str,
        message: OutgoingMessage,
        namespace: Namespace,
        waiter: Option<oneshot::Sender<DeliveryOutcome>>,
        is_group: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.find(&message.id) {
            if existing.destination != destination {
                return Err(CourierError::InvalidArgument(format!(
                    "message {} is already pending for {}",
                    message.id, existing.destination
                )));
            }
            debug!(message_id = %message.id, "Message already pending, not re-adding");
            if let Some(waiter) = waiter {
                state.waiters.insert(message.id.clone(), waiter);
            }
            return Ok(());
        }

        let entry = PendingMessage {
            destination: destination.to_string(),
            namespace,
            is_group,
            message,
            seq: state.next_seq,
        };
        let value = serde_json::to_vec(&entry)?;
        self.store.put(&entry.storage_key(), &value)?;

        state.next_seq += 1;
        if let Some(waiter) = waiter {
            state.waiters.insert(entry.id().to_string(), waiter);
        }
        debug!(message_id = %entry.id(), destination = %destination, "Cached pending message");
        state
            .by_destination
            .entry(destination.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    /// Pending messages for one destination, in insertion order
    pub async fn get_for_device(&self, destination: &str) -> Vec<PendingMessage> {
        let state = self.state.lock().await;
        state
            .by_destination
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    /// Destinations with at least one pending message
    pub async fn get_devices(&self) -> BTreeSet<String> {
        let state = self.state.lock().await;
        state
            .by_destination
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(dest, _)| dest.clone())
            .collect()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.lock().await.find(id).is_some()
    }

    /// Take the completion waiter registered for a message, if any
    pub async fn take_waiter(&self, id: &str) -> Option<oneshot::Sender<DeliveryOutcome>> {
        self.state.lock().await.waiters.remove(id)
    }

    /// Remove by identifier. Returns false when nothing was pending under it.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;

        let located = state.by_destination.iter().find_map(|(dest, list)| {
            list.iter()
                .position(|m| m.id() == id)
                .map(|idx| (dest.clone(), idx))
        });
        let Some((destination, idx)) = located else {
            return Ok(false);
        };

        let key = state.by_destination[&destination][idx].storage_key();
        self.store.delete(&key)?;

        if let Some(list) = state.by_destination.get_mut(&destination) {
            list.remove(idx);
            if list.is_empty() {
                state.by_destination.remove(&destination);
            }
        }
        state.waiters.remove(id);
        debug!(message_id = %id, destination = %destination, "Removed pending message");
        Ok(true)
    }

    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.by_destination.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
