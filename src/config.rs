//! Server configuration.
//!
//! All timing options are expressed in whole seconds in the JSON form and
//! as [`Duration`] in memory. `db_path` is the only required field.

use crate::error::{CometDictError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Seconds of heartbeat silence before a client is implicitly
    /// disconnected by its watchdog.
    #[serde(default = "default_client_timeout", with = "duration_secs")]
    pub client_timeout: Duration,

    /// Seconds a `/receive` call blocks before returning an empty body.
    /// Must be strictly smaller than `client_timeout`.
    #[serde(default = "default_receive_timeout", with = "duration_secs")]
    pub receive_timeout: Duration,

    /// Seconds between liveness sweeps over the domain subscriber sets.
    #[serde(default = "default_check_period", with = "duration_secs")]
    pub check_period: Duration,

    /// Directory holding one durable store file per domain.
    pub db_path: PathBuf,

    /// URL prefix for the push endpoints.
    #[serde(default = "default_comet_prefix")]
    pub comet_prefix: String,

    /// URL prefix for the store endpoints.
    #[serde(default = "default_store_prefix")]
    pub store_prefix: String,
}

fn default_client_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_receive_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_check_period() -> Duration {
    Duration::from_secs(60)
}

fn default_comet_prefix() -> String {
    "/comet".to_string()
}

fn default_store_prefix() -> String {
    "/dictionary".to_string()
}

impl Config {
    /// A configuration with default timings and prefixes.
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            client_timeout: default_client_timeout(),
            receive_timeout: default_receive_timeout(),
            check_period: default_check_period(),
            db_path: db_path.into(),
            comet_prefix: default_comet_prefix(),
            store_prefix: default_store_prefix(),
        }
    }

    /// Load configuration from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.receive_timeout >= self.client_timeout {
            return Err(CometDictError::Config(format!(
                "receive_timeout ({:?}) must be smaller than client_timeout ({:?})",
                self.receive_timeout, self.client_timeout
            )));
        }
        if self.receive_timeout.is_zero() {
            return Err(CometDictError::Config(
                "receive_timeout must be positive".to_string(),
            ));
        }
        for prefix in [&self.comet_prefix, &self.store_prefix] {
            if !prefix.starts_with('/') || prefix.len() < 2 {
                return Err(CometDictError::Config(format!(
                    "URL prefix {prefix:?} must start with '/' and be non-empty"
                )));
            }
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
