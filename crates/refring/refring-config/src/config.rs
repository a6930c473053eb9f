use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoopbackConfig {
    #[serde(default = "defaults::shm_file_path")]
    pub shm_file_path: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// Ring capacity in units. Must be a power of 2.
    #[serde(default = "defaults::capacity_units")]
    pub capacity_units: u32,
    /// Bytes per unit.
    #[serde(default = "defaults::scale")]
    pub scale: u32,
    /// Bytes offered to the ring per write attempt.
    #[serde(default = "defaults::message_size")]
    pub message_size: usize,
    #[serde(default = "defaults::duration_ms")]
    pub duration_ms: u64,
    /// Fraction of the ring that must be freed before the reader notifies
    /// its peer.
    #[serde(default = "defaults::notify_fraction")]
    pub notify_fraction: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

mod defaults {
    pub fn shm_file_path() -> String {
        "/tmp/refring_loopback".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn capacity_units() -> u32 {
        1 << 16 // 65536
    }

    pub fn scale() -> u32 {
        1
    }

    pub fn message_size() -> usize {
        64
    }

    pub fn duration_ms() -> u64 {
        3_000
    }

    pub fn notify_fraction() -> f64 {
        0.5
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            shm_file_path: defaults::shm_file_path(),
            log_level: defaults::log_level(),
            capacity_units: defaults::capacity_units(),
            scale: defaults::scale(),
            message_size: defaults::message_size(),
            duration_ms: defaults::duration_ms(),
            notify_fraction: defaults::notify_fraction(),
        }
    }
}

impl LoopbackConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&toml_to_str)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: LoopbackConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.capacity_units.is_power_of_two() {
            return Err(invalid("capacity_units", "must be a power of 2"));
        }
        if self.scale == 0 {
            return Err(invalid("scale", "must be non-zero"));
        }
        if self.message_size == 0 {
            return Err(invalid("message_size", "must be non-zero"));
        }
        if !(self.notify_fraction > 0.0 && self.notify_fraction <= 1.0) {
            return Err(invalid("notify_fraction", "must be in (0, 1]"));
        }
        Ok(())
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_units as u64 * self.scale as u64
    }

    /// Freed bytes at which the reader-side notifier fires.
    pub fn notify_threshold(&self) -> u64 {
        ((self.capacity_bytes() as f64 * self.notify_fraction) as u64).max(1)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
