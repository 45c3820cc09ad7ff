/// Logged-in account identity and its on-disk record
use crate::error::{CourierError, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The local account. The signing secret is required to initialise config state.
#[derive(Clone)]
pub struct AccountIdentity {
    pub pubkey: String,
    pub ed25519_secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for AccountIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountIdentity")
            .field("pubkey", &self.pubkey)
            .field("has_secret", &self.ed25519_secret.is_some())
            .finish()
    }
}

impl AccountIdentity {
    pub fn new(pubkey: impl Into<String>, ed25519_secret: Option<Vec<u8>>) -> Self {
        Self {
            pubkey: pubkey.into(),
            ed25519_secret,
        }
    }

    /// Signing secret, or the fatal missing-key error
    pub fn signing_secret(&self) -> Result<&[u8]> {
        self.ed25519_secret
            .as_deref()
            .ok_or(CourierError::MissingSigningKey)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IdentityFileV1 {
    version: u8,
    pubkey: String,
    ed25519_secret_b64: Option<String>,
}

fn identity_path(data_dir: &Path) -> PathBuf {
    data_dir.join("keys").join("identity.json")
}

/// Read the account record, if one was saved
pub fn load(data_dir: &Path) -> Result<Option<AccountIdentity>> {
    let path = identity_path(data_dir);
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: IdentityFileV1 = serde_json::from_str(&raw)?;
    if parsed.version != 1 {
        return Err(CourierError::Config(format!(
            "Unsupported identity file version: {}",
            parsed.version
        )));
    }

    let ed25519_secret = parsed
        .ed25519_secret_b64
        .map(|b64| {
            general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| CourierError::Config(format!("Invalid base64 in identity: {}", e)))
        })
        .transpose()?;

    Ok(Some(AccountIdentity {
        pubkey: parsed.pubkey,
        ed25519_secret,
    }))
}

pub fn save(data_dir: &Path, identity: &AccountIdentity) -> Result<()> {
    let path = identity_path(data_dir);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let file = IdentityFileV1 {
        version: 1,
        pubkey: identity.pubkey.clone(),
        ed25519_secret_b64: identity
            .ed25519_secret
            .as_ref()
            .map(|s| general_purpose::STANDARD.encode(s)),
    };
    let json = serde_json::to_string_pretty(&file)?;
    fs::write(&path, json)?;

    // Best-effort file permissions (0600)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o600));
    }

    Ok(())
}
