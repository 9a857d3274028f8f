//! Sync configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use fieldkit_convert::{DEFAULT_COORDINATE_PRECISION, GeometryEncoder};

use crate::error::{SyncError, SyncResult};

pub const ENV_MAX_UPLOAD_ATTEMPTS: &str = "FIELDKIT_MAX_UPLOAD_ATTEMPTS";
pub const ENV_COORDINATE_PRECISION: &str = "FIELDKIT_COORDINATE_PRECISION";

/// Failed attempts before a mutation is marked failed
pub const DEFAULT_MAX_UPLOAD_ATTEMPTS: u32 = 5;

/// Beyond this, rounding no longer changes an `f64` coordinate
const MAX_COORDINATE_PRECISION: u32 = 15;

/// Configuration for the sync layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Failed upload attempts before a mutation becomes terminally failed
    pub max_upload_attempts: u32,
    /// Decimal places kept when encoding coordinates
    pub coordinate_precision: u32,
    /// Whether `load_and_sync` also pulls the survey's LOIs
    pub sync_lois_on_load: bool,
    /// Pause between upload passes while retries are outstanding
    pub retry_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_upload_attempts: DEFAULT_MAX_UPLOAD_ATTEMPTS,
            coordinate_precision: DEFAULT_COORDINATE_PRECISION,
            sync_lois_on_load: true,
            retry_delay_ms: 1_000,
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `FIELDKIT_*` environment variables
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_MAX_UPLOAD_ATTEMPTS) {
            config.max_upload_attempts = parse_env(ENV_MAX_UPLOAD_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_COORDINATE_PRECISION) {
            config.coordinate_precision = parse_env(ENV_COORDINATE_PRECISION, &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.max_upload_attempts == 0 {
            return Err(SyncError::Config(
                "max_upload_attempts must be at least 1".to_string(),
            ));
        }
        if self.coordinate_precision > MAX_COORDINATE_PRECISION {
            return Err(SyncError::Config(format!(
                "coordinate_precision must be at most {MAX_COORDINATE_PRECISION}"
            )));
        }
        Ok(())
    }

    pub fn with_max_upload_attempts(mut self, attempts: u32) -> Self {
        self.max_upload_attempts = attempts;
        self
    }

    pub fn with_coordinate_precision(mut self, precision: u32) -> Self {
        self.coordinate_precision = precision;
        self
    }

    pub fn with_sync_lois_on_load(mut self, enabled: bool) -> Self {
        self.sync_lois_on_load = enabled;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Encoder for outgoing geometry
    pub fn geometry_encoder(&self) -> GeometryEncoder {
        GeometryEncoder::with_precision(self.coordinate_precision)
    }
}

fn parse_env(key: &str, raw: &str) -> SyncResult<u32> {
    raw.trim()
        .parse()
        .map_err(|e| SyncError::Config(format!("{key}={raw:?}: {e}")))
}
