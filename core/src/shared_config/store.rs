/// Config variant store: the in-memory merge state of every variant for the
/// logged-in account and its groups, each dirty-tracked and persisted as a dump
use crate::error::{CourierError, Result};
use crate::identity::AccountIdentity;
use crate::message::Namespace;
use crate::shared_config::dumps::DumpStore;
use crate::shared_config::engine::{EngineFactory, IncomingConfigMessage, MergeEngine, PushData};
use crate::shared_config::variant::{ConfigVariant, UserVariant};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type VariantKey = (String, ConfigVariant);

/// What happened during initialisation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// User variants restored from their dumps
    pub loaded: Vec<UserVariant>,
    /// Required variants that had no usable dump and were created empty
    pub created: Vec<UserVariant>,
    pub groups_loaded: usize,
    /// (group pubkey, reason) for groups whose state could not be restored
    pub group_failures: Vec<(String, String)>,
}

pub struct ConfigVariantStore {
    dumps: DumpStore,
    factory: Arc<dyn EngineFactory>,
    engines: Mutex<HashMap<VariantKey, Box<dyn MergeEngine>>>,
}

impl ConfigVariantStore {
    pub fn new(dumps: DumpStore, factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            dumps,
            factory,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub fn dumps(&self) -> &DumpStore {
        &self.dumps
    }

    /// Restore every variant for `account` from its dumps. Each required
    /// user variant exists afterwards, even if empty.
    pub async fn init_for_account(&self, account: &AccountIdentity) -> Result<InitReport> {
        let secret = account.signing_secret()?;
        let all_dumps = self.dumps.load_all()?;
        let mut report = InitReport::default();
        let mut engines = self.engines.lock().await;

        // User-scoped variants first: group init reads keys from the group list
        for dump in all_dumps.iter().filter(|d| d.variant.is_user()) {
            let ConfigVariant::User(variant) = dump.variant else {
                continue;
            };
            if dump.owner != account.pubkey {
                debug!(owner = %dump.owner, variant = %dump.variant, "Skipping dump of another account");
                continue;
            }
            match self.factory.init_user(variant, secret, Some(&dump.data)) {
                Ok(engine) => {
                    engines.insert((dump.owner.clone(), dump.variant), engine);
                    report.loaded.push(variant);
                }
                Err(e) => {
                    warn!(variant = %dump.variant, error = %e, "Failed to restore config from dump");
                }
            }
        }

        let missing: Vec<UserVariant> = UserVariant::REQUIRED
            .into_iter()
            .filter(|v| !report.loaded.contains(v))
            .collect();
        for variant in missing {
            let mut engine = self.factory.init_user(variant, secret, None)?;
            let snapshot = engine.dump()?;
            self.dumps.save(&account.pubkey, variant.into(), &snapshot)?;
            engines.insert((account.pubkey.clone(), variant.into()), engine);
            warn!(variant = %ConfigVariant::from(variant), "Required config had no dump, created empty");
            report.created.push(variant);
        }

        let groups_key = (account.pubkey.clone(), ConfigVariant::User(UserVariant::UserGroups));
        for dump in all_dumps.iter().filter(|d| !d.variant.is_user()) {
            let ConfigVariant::Group(variant) = dump.variant else {
                continue;
            };
            let group_secret = engines
                .get(&groups_key)
                .and_then(|groups| groups.group_secret_key(&dump.owner));
            if group_secret.is_none() {
                debug!(group = %dump.owner, "No admin key for group");
            }

            match self.factory.init_group(
                variant,
                &dump.owner,
                secret,
                group_secret.as_deref(),
                &dump.data,
            ) {
                Ok(engine) => {
                    engines.insert((dump.owner.clone(), dump.variant), engine);
                    report.groups_loaded += 1;
                }
                Err(e) => {
                    warn!(group = %dump.owner, variant = %dump.variant, error = %e, "Failed to restore group config");
                    report.group_failures.push((dump.owner.clone(), e.to_string()));
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            created = report.created.len(),
            groups = report.groups_loaded,
            group_failures = report.group_failures.len(),
            "Config variants initialised"
        );
        Ok(report)
    }

    pub async fn is_loaded(&self, owner: &str, variant: ConfigVariant) -> bool {
        self.engines
            .lock()
            .await
            .contains_key(&(owner.to_string(), variant))
    }

    pub async fn loaded_variants(&self, owner: &str) -> Vec<ConfigVariant> {
        let mut variants: Vec<ConfigVariant> = self
            .engines
            .lock()
            .await
            .keys()
            .filter(|(key_owner, _)| key_owner == owner)
            .map(|(_, variant)| *variant)
            .collect();
        variants.sort();
        variants
    }

    /// Run `f` against one variant's engine
    async fn with_engine<T>(
        &self,
        owner: &str,
        variant: ConfigVariant,
        f: impl FnOnce(&mut dyn MergeEngine) -> Result<T>,
    ) -> Result<T> {
        let mut engines = self.engines.lock().await;
        let engine = engines
            .get_mut(&(owner.to_string(), variant))
            .ok_or_else(|| CourierError::Engine(format!("{} for {} is not loaded", variant, owner)))?;
        f(engine.as_mut())
    }

    pub async fn is_dirty(&self, owner: &str, variant: ConfigVariant) -> Result<bool> {
        self.with_engine(owner, variant, |engine| Ok(engine.is_dirty()))
            .await
    }

    pub async fn push(&self, owner: &str, variant: ConfigVariant) -> Result<PushData> {
        self.with_engine(owner, variant, |engine| engine.push()).await
    }

    pub async fn storage_namespace(&self, owner: &str, variant: ConfigVariant) -> Result<Namespace> {
        self.with_engine(owner, variant, |engine| Ok(engine.storage_namespace()))
            .await
    }

    /// Tell the engine `seqno` was stored under `hash`; returns its `needs_dump`
    pub async fn confirm_pushed(
        &self,
        owner: &str,
        variant: ConfigVariant,
        seqno: i64,
        hash: &str,
    ) -> Result<bool> {
        self.with_engine(owner, variant, |engine| {
            engine.confirm_pushed(seqno, hash);
            Ok(engine.needs_dump())
        })
        .await
    }

    /// Write the variant's current snapshot
    pub async fn save_dump(&self, owner: &str, variant: ConfigVariant) -> Result<()> {
        let snapshot = self.with_engine(owner, variant, |engine| engine.dump()).await?;
        self.dumps.save(owner, variant, &snapshot)
    }

    /// Persist only if the engine asks for it. Returns whether a dump was written.
    pub async fn persist_if_needed(&self, owner: &str, variant: ConfigVariant) -> Result<bool> {
        let snapshot = self
            .with_engine(owner, variant, |engine| {
                if engine.needs_dump() {
                    engine.dump().map(Some)
                } else {
                    Ok(None)
                }
            })
            .await?;
        match snapshot {
            Some(data) => {
                self.dumps.save(owner, variant, &data)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply a local edit, then persist if the edit requires it
    pub async fn mutate<T>(
        &self,
        owner: &str,
        variant: ConfigVariant,
        f: impl FnOnce(&mut dyn MergeEngine) -> Result<T>,
    ) -> Result<T> {
        let out = self.with_engine(owner, variant, f).await?;
        self.persist_if_needed(owner, variant).await?;
        Ok(out)
    }

    /// Merge config messages pulled from the remote store
    pub async fn merge_incoming(
        &self,
        owner: &str,
        variant: ConfigVariant,
        messages: &[IncomingConfigMessage],
    ) -> Result<Vec<String>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let merged = self
            .with_engine(owner, variant, |engine| engine.merge(messages))
            .await?;
        debug!(owner = %owner, variant = %variant, merged = merged.len(), "Merged incoming config");
        self.persist_if_needed(owner, variant).await?;
        Ok(merged)
    }
}
