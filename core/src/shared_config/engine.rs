/// Capability interface of the state-merge engine behind each variant.
/// The engine itself is an external dependency; this crate only drives it.
use crate::error::Result;
use crate::message::Namespace;
use crate::shared_config::variant::{GroupVariant, UserVariant};

/// Output of a push: the payload to store and what it replaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushData {
    pub data: Vec<u8>,
    pub seqno: i64,
    /// Hashes of earlier messages this push makes obsolete
    pub obsolete_hashes: Vec<String>,
}

/// A config message pulled from the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingConfigMessage {
    pub hash: String,
    pub data: Vec<u8>,
    pub timestamp_ms: i64,
}

pub trait MergeEngine: Send {
    /// Local changes not yet confirmed as pushed
    fn is_dirty(&self) -> bool;

    fn push(&mut self) -> Result<PushData>;

    /// `seqno` was durably stored under `hash`
    fn confirm_pushed(&mut self, seqno: i64, hash: &str);

    fn needs_dump(&self) -> bool;

    /// Snapshot of the merge state; clears `needs_dump`
    fn dump(&mut self) -> Result<Vec<u8>>;

    /// Merge remote messages, returning the hashes that were accepted
    fn merge(&mut self, messages: &[IncomingConfigMessage]) -> Result<Vec<String>>;

    fn storage_namespace(&self) -> Namespace;

    /// Secret key of a closed group, known only to the user-groups variant
    fn group_secret_key(&self, _group_pk: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Creates engines from key material and an optional snapshot
pub trait EngineFactory: Send + Sync {
    fn init_user(
        &self,
        variant: UserVariant,
        ed25519_secret: &[u8],
        dump: Option<&[u8]>,
    ) -> Result<Box<dyn MergeEngine>>;

    /// `group_secret` is None when we are not an admin of the group
    fn init_group(
        &self,
        variant: GroupVariant,
        group_pk: &str,
        user_ed25519_secret: &[u8],
        group_secret: Option<&[u8]>,
        dump: &[u8],
    ) -> Result<Box<dyn MergeEngine>>;
}
