/// Config reconciler: turns dirty variants into outgoing sync messages and
/// confirms pushes back to the merge engines
use crate::clock::NetworkClock;
use crate::error::{CourierError, Result};
use crate::message::{Namespace, OutgoingMessage};
use crate::shared_config::store::ConfigVariantStore;
use crate::shared_config::variant::{
    ConfigVariant, SharedConfigKind, SharedConfigMessage, UserVariant,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// One pending push, ready for the delivery queue
#[derive(Debug, Clone)]
pub struct OutgoingConfResult {
    pub message: OutgoingMessage,
    pub envelope: SharedConfigMessage,
    pub namespace: Namespace,
    pub variant: UserVariant,
    /// Hashes to delete once the push is confirmed
    pub obsolete_hashes: Vec<String>,
}

pub struct ConfigReconciler {
    store: Arc<ConfigVariantStore>,
    own_pubkey: String,
    clock: NetworkClock,
}

impl ConfigReconciler {
    pub fn new(store: Arc<ConfigVariantStore>, own_pubkey: impl Into<String>, clock: NetworkClock) -> Self {
        Self {
            store,
            own_pubkey: own_pubkey.into(),
            clock,
        }
    }

    pub fn own_pubkey(&self) -> &str {
        &self.own_pubkey
    }

    /// Every dirty variant of `pubkey`, each with a freshly pushed envelope.
    /// A variant that fails is logged and left for the next pass.
    pub async fn pending_changes_for_pubkey(&self, pubkey: &str) -> Result<Vec<OutgoingConfResult>> {
        let mut variants: BTreeSet<ConfigVariant> =
            self.store.dumps().variants_for(pubkey)?.into_iter().collect();
        if pubkey == self.own_pubkey {
            // First run: required variants may not have a dump yet
            variants.extend(UserVariant::REQUIRED.map(ConfigVariant::from));
        }

        let mut results = Vec::new();
        for variant in variants {
            let ConfigVariant::User(user_variant) = variant else {
                debug!(owner = %pubkey, variant = %variant, "Group config push not handled here yet");
                continue;
            };
            match self.pending_change(pubkey, user_variant).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => {
                    warn!(owner = %pubkey, variant = %variant, error = %e, "Could not prepare config push");
                }
            }
        }
        Ok(results)
    }

    async fn pending_change(
        &self,
        pubkey: &str,
        variant: UserVariant,
    ) -> Result<Option<OutgoingConfResult>> {
        let config_variant = ConfigVariant::from(variant);
        if !self.store.is_dirty(pubkey, config_variant).await? {
            return Ok(None);
        }

        let push = self.store.push(pubkey, config_variant).await?;
        let namespace = self.store.storage_namespace(pubkey, config_variant).await?;
        let envelope = SharedConfigMessage {
            kind: SharedConfigKind::from(variant),
            seqno: push.seqno,
            data: push.data,
            timestamp_ms: self.clock.now_ms(),
        };
        let message = envelope.to_outgoing()?;
        debug!(
            variant = %config_variant,
            seqno = envelope.seqno,
            obsolete = push.obsolete_hashes.len(),
            "Config push prepared"
        );

        Ok(Some(OutgoingConfResult {
            message,
            envelope,
            namespace,
            variant,
            obsolete_hashes: push.obsolete_hashes,
        }))
    }

    /// Confirm that `seqno` of `variant` is stored under `hash`. Only the local
    /// account's variants can be confirmed. Returns whether the variant now
    /// needs its dump re-persisted.
    pub async fn mark_as_pushed(
        &self,
        variant: UserVariant,
        pubkey: &str,
        seqno: i64,
        hash: &str,
    ) -> Result<bool> {
        if pubkey != self.own_pubkey {
            return Err(CourierError::NotLocalIdentity(pubkey.to_string()));
        }
        self.store
            .confirm_pushed(pubkey, variant.into(), seqno, hash)
            .await
    }
}
