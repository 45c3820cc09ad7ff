/// Delivery outcomes and the event stream the application listens to
use crate::error::{CourierError, Result};
use crate::message::{MessageKind, Namespace, SendReceipt};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Terminal state of one enqueued message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent(SendReceipt),
    Failed { reason: String },
    /// Never admitted (self-send of a non-sync kind)
    Dropped,
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent(_))
    }
}

/// Process-wide success/failure notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// The relay accepted the message
    Sent {
        message_id: String,
        destination: String,
        namespace: Namespace,
        kind: MessageKind,
        server_timestamp_ms: i64,
        sync: bool,
    },
    /// An open group post was accepted with a valid server id
    OpenGroupSent {
        message_id: String,
        room: String,
        server_id: i64,
        server_timestamp_ms: i64,
    },
    /// The send failed; the message has left the pending cache
    Failed {
        message_id: String,
        destination: String,
        reason: String,
    },
    Dropped {
        message_id: String,
        destination: String,
    },
}

impl DeliveryEvent {
    pub fn message_id(&self) -> &str {
        match self {
            DeliveryEvent::Sent { message_id, .. }
            | DeliveryEvent::OpenGroupSent { message_id, .. }
            | DeliveryEvent::Failed { message_id, .. }
            | DeliveryEvent::Dropped { message_id, .. } => message_id,
        }
    }
}

/// Resolves once the message's job settles. Dropping it does not cancel delivery.
#[derive(Debug)]
pub struct DeliveryTicket {
    message_id: String,
    rx: oneshot::Receiver<DeliveryOutcome>,
}

impl DeliveryTicket {
    pub(crate) fn new(message_id: String) -> (oneshot::Sender<DeliveryOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { message_id, rx })
    }

    /// Ticket that is already settled
    pub(crate) fn settled(message_id: String, outcome: DeliveryOutcome) -> Self {
        let (tx, ticket) = Self::new(message_id);
        let _ = tx.send(outcome);
        ticket
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Wait for the outcome
    pub async fn outcome(self) -> Result<DeliveryOutcome> {
        self.rx.await.map_err(|_| {
            CourierError::Transport(format!(
                "delivery of {} ended without an outcome",
                self.message_id
            ))
        })
    }

    /// Wait for the outcome with a caller-imposed bound
    pub async fn outcome_within(self, limit: std::time::Duration) -> Result<DeliveryOutcome> {
        let id = self.message_id.clone();
        tokio::time::timeout(limit, self.outcome())
            .await
            .map_err(|_| CourierError::Timeout(format!("no outcome for {} within {:?}", id, limit)))?
    }
}
