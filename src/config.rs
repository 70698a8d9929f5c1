//! Daemon configuration
//!
//! Read from a TOML file; every key is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "/etc/mailpush/mailpush.toml";

/// Upper bound for every `*_secs` setting
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Upper bound for `stale_max_age_days`
pub const MAX_STALE_AGE_DAYS: u64 = 100 * 365;

/// Configuration for the push daemon
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
    /// Registration database
    pub database_file: PathBuf,
    /// Control socket the mail server plugin connects to
    pub socket_path: PathBuf,
    /// Additional TCP control listener
    pub listen_addr: Option<String>,
    /// Push topic handed to clients on REGISTER; read from the certificate when unset
    pub topic: Option<String>,
    pub certificate_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// Use the APNs development environment
    pub sandbox: bool,
    pub delay_secs: u64,
    pub check_interval_secs: u64,
    pub registry_flush_interval_secs: u64,
    pub stale_sweep_interval_secs: u64,
    pub stale_max_age_days: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            database_file: PathBuf::from("/var/lib/mailpush/registry.json"),
            socket_path: PathBuf::from("/var/run/mailpush/mailpush.sock"),
            listen_addr: None,
            topic: None,
            certificate_file: None,
            key_file: None,
            sandbox: false,
            delay_secs: 30,
            check_interval_secs: 20,
            registry_flush_interval_secs: 15 * 60,
            stale_sweep_interval_secs: 8 * 60 * 60,
            stale_max_age_days: 30,
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject durations the timers cannot represent
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("delay_secs", self.delay_secs),
            ("check_interval_secs", self.check_interval_secs),
            ("registry_flush_interval_secs", self.registry_flush_interval_secs),
            ("stale_sweep_interval_secs", self.stale_sweep_interval_secs),
        ];
        for (name, secs) in intervals {
            if secs > MAX_INTERVAL_SECS {
                return Err(Error::Config(format!(
                    "{} must be at most {} (one year), got {}",
                    name, MAX_INTERVAL_SECS, secs
                )));
            }
        }
        if self.stale_max_age_days > MAX_STALE_AGE_DAYS {
            return Err(Error::Config(format!(
                "stale_max_age_days must be at most {}, got {}",
                MAX_STALE_AGE_DAYS, self.stale_max_age_days
            )));
        }
        Ok(())
    }

    /// Load a config file
    ///
    /// With `required == false` a missing file yields the defaults. A file
    /// that exists but does not parse is always an error.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                log::debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!("cannot read {}: {}", path.display(), e))),
        }
    }

    /// Configured topic override, if any
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref().filter(|t| !t.is_empty())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn registry_flush_interval(&self) -> Duration {
        Duration::from_secs(self.registry_flush_interval_secs)
    }

    pub fn stale_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.stale_sweep_interval_secs.max(1))
    }

    pub fn stale_max_age(&self) -> Duration {
        Duration::from_secs(self.stale_max_age_days.saturating_mul(24 * 60 * 60))
    }
}
