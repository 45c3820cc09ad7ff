/// Configuration management
use crate::error::{CourierError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the pending-message cache and config dumps
    pub data_dir: PathBuf,

    /// Hex public key of the logged-in account, if known up front
    pub own_pubkey: Option<String>,

    /// Interval between config reconciliation passes
    pub config_sync_interval: Duration,

    /// Capacity of the delivery event broadcast channel
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".courier"),
            own_pubkey: None,
            config_sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(CourierError::Config(format!(
                "Usage: {} <data-dir> [--pubkey <hex>] [--sync-interval <secs>] [--event-buffer <n>]",
                args.first().map(String::as_str).unwrap_or("courier")
            )));
        }

        let data_dir = PathBuf::from(&args[1]);
        let mut own_pubkey: Option<String> = None;
        let mut sync_secs: Option<u64> = None;
        let mut event_buffer: Option<usize> = None;

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--pubkey" => {
                    let key = args.get(i + 1).ok_or_else(|| {
                        CourierError::Config("--pubkey requires a hex argument".to_string())
                    })?;
                    own_pubkey = Some(key.clone());
                    i += 2;
                }
                "--sync-interval" => {
                    let s = args.get(i + 1).ok_or_else(|| {
                        CourierError::Config("--sync-interval requires seconds".to_string())
                    })?;
                    sync_secs = Some(s.parse::<u64>().map_err(|_| {
                        CourierError::Config("--sync-interval must be a number of seconds".to_string())
                    })?);
                    i += 2;
                }
                "--event-buffer" => {
                    let n = args.get(i + 1).ok_or_else(|| {
                        CourierError::Config("--event-buffer requires a size".to_string())
                    })?;
                    event_buffer = Some(n.parse::<usize>().map_err(|_| {
                        CourierError::Config("--event-buffer must be a number".to_string())
                    })?);
                    i += 2;
                }
                other => {
                    return Err(CourierError::Config(format!("Unknown argument: {}", other)));
                }
            }
        }

        // Env overrides
        if let Ok(key) = std::env::var("COURIER_PUBKEY") {
            own_pubkey = Some(key);
        }
        if let Some(s) = std::env::var("COURIER_SYNC_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            sync_secs = Some(s);
        }

        let config = Self {
            data_dir,
            own_pubkey,
            config_sync_interval: Duration::from_secs(
                sync_secs.unwrap_or(DEFAULT_SYNC_INTERVAL_SECS),
            ),
            event_buffer: event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.config_sync_interval.is_zero() {
            return Err(CourierError::Config(
                "config sync interval must be non-zero".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(CourierError::Config("event buffer must be non-zero".to_string()));
        }
        if let Some(key) = &self.own_pubkey {
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(CourierError::Config(format!("Invalid pubkey: {}", key)));
            }
        }
        Ok(())
    }
}
