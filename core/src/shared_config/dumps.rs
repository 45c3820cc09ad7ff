/// Persisted config dumps, keyed by (owner, variant)
use crate::error::Result;
use crate::shared_config::variant::ConfigVariant;
use crate::storage::KvStore;
use std::sync::Arc;
use tracing::{debug, warn};

const DUMP_PREFIX: &str = "dump:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDump {
    pub owner: String,
    pub variant: ConfigVariant,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct DumpStore {
    kv: Arc<dyn KvStore>,
}

fn dump_key(owner: &str, variant: ConfigVariant) -> String {
    format!("{}{}:{}", DUMP_PREFIX, owner, variant.name())
}

/// Split `dump:<owner>:<variant>` back into its parts
fn parse_key(key: &str) -> Option<(String, ConfigVariant)> {
    let rest = key.strip_prefix(DUMP_PREFIX)?;
    let (owner, variant) = rest.rsplit_once(':')?;
    let variant = variant.parse().ok()?;
    Some((owner.to_string(), variant))
}

impl DumpStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn save(&self, owner: &str, variant: ConfigVariant, data: &[u8]) -> Result<()> {
        debug!(owner = %owner, variant = %variant, bytes = data.len(), "Saving config dump");
        self.kv.put(&dump_key(owner, variant), data)
    }

    pub fn load(&self, owner: &str, variant: ConfigVariant) -> Result<Option<Vec<u8>>> {
        self.kv.get(&dump_key(owner, variant))
    }

    pub fn delete(&self, owner: &str, variant: ConfigVariant) -> Result<()> {
        self.kv.delete(&dump_key(owner, variant))
    }

    /// Every dump in the store, for startup
    pub fn load_all(&self) -> Result<Vec<ConfigDump>> {
        let mut dumps = Vec::new();
        for (key, data) in self.kv.scan_prefix(DUMP_PREFIX)? {
            match parse_key(&key) {
                Some((owner, variant)) => dumps.push(ConfigDump { owner, variant, data }),
                None => warn!(key = %key, "Ignoring dump with unrecognised key"),
            }
        }
        Ok(dumps)
    }

    /// Variants that have a dump for `owner`, without reading payloads
    pub fn variants_for(&self, owner: &str) -> Result<Vec<ConfigVariant>> {
        let prefix = format!("{}{}:", DUMP_PREFIX, owner);
        Ok(self
            .kv
            .keys_with_prefix(&prefix)?
            .iter()
            .filter_map(|key| parse_key(key))
            .filter(|(key_owner, _)| key_owner == owner)
            .map(|(_, variant)| variant)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_config::variant::{GroupVariant, UserVariant};
    use crate::storage::MemoryStore;

    #[test]
    fn test_save_and_load_roundtrip_by_owner() {
        let dumps = DumpStore::new(Arc::new(MemoryStore::new()));
        dumps.save("05aa", UserVariant::Contacts.into(), b"contacts").unwrap();
        dumps.save("03bb", GroupVariant::Info.into(), b"info").unwrap();

        assert_eq!(
            dumps.load("05aa", UserVariant::Contacts.into()).unwrap(),
            Some(b"contacts".to_vec())
        );
        assert!(dumps.load("05aa", UserVariant::UserGroups.into()).unwrap().is_none());
        assert_eq!(dumps.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_variants_for_reads_only_matching_owner() {
        let kv = MemoryStore::new();
        let dumps = DumpStore::new(Arc::new(kv.clone()));
        dumps.save("05aa", UserVariant::Contacts.into(), b"c").unwrap();
        dumps.save("05aa", UserVariant::UserProfile.into(), b"p").unwrap();
        dumps.save("05aab", UserVariant::Contacts.into(), b"other").unwrap();
        kv.put("dump:05aa:NotAVariant", b"junk").unwrap();

        let mut variants = dumps.variants_for("05aa").unwrap();
        variants.sort();
        assert_eq!(
            variants,
            vec![UserVariant::UserProfile.into(), UserVariant::Contacts.into()]
        );
    }
}
