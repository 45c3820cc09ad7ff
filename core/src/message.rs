/// Outgoing message types and storage namespaces
use crate::error::{CourierError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Logical partition on the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(pub i16);

impl Namespace {
    pub const DEFAULT: Namespace = Namespace(0);
    pub const USER_PROFILE: Namespace = Namespace(2);
    pub const CONTACTS: Namespace = Namespace(3);
    pub const CONVO_INFO_VOLATILE: Namespace = Namespace(4);
    pub const USER_GROUPS: Namespace = Namespace(5);
    pub const CLOSED_GROUP_MESSAGES: Namespace = Namespace(-10);
    pub const GROUP_MESSAGES: Namespace = Namespace(11);
    pub const GROUP_KEYS: Namespace = Namespace(12);
    pub const GROUP_INFO: Namespace = Namespace(13);
    pub const GROUP_MEMBERS: Namespace = Namespace(14);

    /// Namespaces that hold shared config rather than conversation traffic
    pub fn is_config(self) -> bool {
        matches!(self.0, 2..=5 | 12..=14)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every kind of message the queue can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Visible,
    TypingIndicator,
    CallSignal,
    ReadReceipt,
    ExpirationUpdate,
    Unsend,
    /// Copy of a sent visible message for our other devices
    SyncTranscript,
    /// Shared config push (profile, contacts, groups, volatile info)
    ConfigSync,
    GroupUpdate,
}

impl MessageKind {
    /// Kinds that may only be sent through the sync path
    pub fn is_sync_only(self) -> bool {
        matches!(self, MessageKind::SyncTranscript | MessageKind::ConfigSync)
    }

    /// Kinds that are legitimate when the destination is our own account
    pub fn is_self_target(self) -> bool {
        self.is_sync_only() || matches!(self, MessageKind::Unsend | MessageKind::ExpirationUpdate)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Visible => "visible",
            MessageKind::TypingIndicator => "typing_indicator",
            MessageKind::CallSignal => "call_signal",
            MessageKind::ReadReceipt => "read_receipt",
            MessageKind::ExpirationUpdate => "expiration_update",
            MessageKind::Unsend => "unsend",
            MessageKind::SyncTranscript => "sync_transcript",
            MessageKind::ConfigSync => "config_sync",
            MessageKind::GroupUpdate => "group_update",
        };
        f.write_str(name)
    }
}

/// A serialized protocol message waiting to go out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub id: String,
    pub kind: MessageKind,
    pub payload: Vec<u8>,
    /// Group this message belongs to, when it targets a closed group
    pub group_id: Option<String>,
    pub timestamp_ms: i64,
}

impl OutgoingMessage {
    /// New message with a derived identifier
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), kind, payload)
    }

    pub fn with_id(id: impl Into<String>, kind: MessageKind, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
            group_id: None,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }
}

/// What the relay hands back for an accepted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub server_timestamp_ms: i64,
    pub message_hash: String,
}

/// Open group room coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenGroupRoom {
    pub server_url: String,
    pub room: String,
    pub server_pubkey: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    /// Server id of the message being reacted to
    pub server_message_id: i64,
    pub action: ReactionAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenGroupPayload {
    Content { data: Vec<u8> },
    Reaction(Reaction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenGroupMessage {
    pub id: String,
    pub payload: OpenGroupPayload,
}

impl OpenGroupMessage {
    pub fn content(data: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload: OpenGroupPayload::Content { data },
        }
    }

    pub fn reaction(reaction: Reaction) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload: OpenGroupPayload::Reaction(reaction),
        }
    }
}

/// Result of an open group post; the server must assign a positive id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenGroupReceipt {
    pub server_id: Option<i64>,
    pub server_timestamp_ms: i64,
}

impl OpenGroupReceipt {
    pub fn validated(self) -> Result<Self> {
        match self.server_id {
            Some(id) if id > 0 => Ok(self),
            other => Err(CourierError::InvalidServerId(other)),
        }
    }
}
