/// Config variants and their wire kind tags
use crate::error::{CourierError, Result};
use crate::message::{MessageKind, OutgoingMessage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account-scoped variants. All four are required for a logged-in account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserVariant {
    UserProfile,
    Contacts,
    UserGroups,
    ConvoInfoVolatile,
}

impl UserVariant {
    pub const REQUIRED: [UserVariant; 4] = [
        UserVariant::UserProfile,
        UserVariant::Contacts,
        UserVariant::UserGroups,
        UserVariant::ConvoInfoVolatile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UserVariant::UserProfile => "UserConfig",
            UserVariant::Contacts => "ContactsConfig",
            UserVariant::UserGroups => "UserGroupsConfig",
            UserVariant::ConvoInfoVolatile => "ConvoInfoVolatileConfig",
        }
    }
}

/// Per-group variants, one set per closed group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GroupVariant {
    Info,
    Members,
    Keys,
}

impl GroupVariant {
    pub fn name(self) -> &'static str {
        match self {
            GroupVariant::Info => "GroupInfo",
            GroupVariant::Members => "GroupMembers",
            GroupVariant::Keys => "GroupKeys",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfigVariant {
    User(UserVariant),
    Group(GroupVariant),
}

impl ConfigVariant {
    pub fn name(self) -> &'static str {
        match self {
            ConfigVariant::User(v) => v.name(),
            ConfigVariant::Group(v) => v.name(),
        }
    }

    pub fn is_user(self) -> bool {
        matches!(self, ConfigVariant::User(_))
    }
}

impl From<UserVariant> for ConfigVariant {
    fn from(v: UserVariant) -> Self {
        ConfigVariant::User(v)
    }
}

impl From<GroupVariant> for ConfigVariant {
    fn from(v: GroupVariant) -> Self {
        ConfigVariant::Group(v)
    }
}

impl fmt::Display for ConfigVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConfigVariant {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        let variant: ConfigVariant = match s {
            "UserConfig" => UserVariant::UserProfile.into(),
            "ContactsConfig" => UserVariant::Contacts.into(),
            "UserGroupsConfig" => UserVariant::UserGroups.into(),
            "ConvoInfoVolatileConfig" => UserVariant::ConvoInfoVolatile.into(),
            "GroupInfo" => GroupVariant::Info.into(),
            "GroupMembers" => GroupVariant::Members.into(),
            "GroupKeys" => GroupVariant::Keys.into(),
            other => {
                return Err(CourierError::InvalidArgument(format!(
                    "unknown config variant: {}",
                    other
                )))
            }
        };
        Ok(variant)
    }
}

/// Wire kind tag of a shared config message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SharedConfigKind {
    UserProfile = 1,
    Contacts = 2,
    ConvoInfoVolatile = 3,
    UserGroups = 4,
}

impl From<UserVariant> for SharedConfigKind {
    fn from(v: UserVariant) -> Self {
        match v {
            UserVariant::UserProfile => SharedConfigKind::UserProfile,
            UserVariant::Contacts => SharedConfigKind::Contacts,
            UserVariant::ConvoInfoVolatile => SharedConfigKind::ConvoInfoVolatile,
            UserVariant::UserGroups => SharedConfigKind::UserGroups,
        }
    }
}

impl From<SharedConfigKind> for UserVariant {
    fn from(kind: SharedConfigKind) -> Self {
        match kind {
            SharedConfigKind::UserProfile => UserVariant::UserProfile,
            SharedConfigKind::Contacts => UserVariant::Contacts,
            SharedConfigKind::ConvoInfoVolatile => UserVariant::ConvoInfoVolatile,
            SharedConfigKind::UserGroups => UserVariant::UserGroups,
        }
    }
}

/// Sync envelope carrying one pushed config state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedConfigMessage {
    pub kind: SharedConfigKind,
    pub seqno: i64,
    pub data: Vec<u8>,
    pub timestamp_ms: i64,
}

impl SharedConfigMessage {
    /// Wrap into a sync-only outgoing message
    pub fn to_outgoing(&self) -> Result<OutgoingMessage> {
        let payload = serde_json::to_vec(self)?;
        let mut message = OutgoingMessage::new(MessageKind::ConfigSync, payload);
        message.timestamp_ms = self.timestamp_ms;
        Ok(message)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}
