/// Courier - durable outgoing message delivery and shared config sync
///
/// Per-destination serial delivery backed by a persistent pending cache,
/// plus reconciliation of locally edited config state into sync messages.

pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod events;
pub mod identity;
pub mod job_queue;
pub mod message;
pub mod pending_cache;
pub mod session;
pub mod shared_config;
pub mod storage;
pub mod transport;

pub use config::Config;
pub use delivery::MessageQueue;
pub use error::{CourierError, Result};
pub use events::{DeliveryEvent, DeliveryOutcome, DeliveryTicket};
pub use identity::AccountIdentity;
pub use message::{MessageKind, Namespace, OutgoingMessage, SendReceipt};
pub use session::Session;
pub use storage::{KvStore, MemoryStore, SledStore};
pub use transport::Transport;
