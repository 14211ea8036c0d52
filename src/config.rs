// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load the host tool configuration from TOML.
// Author: Lukas Bower

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::mailbox::{DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};
use crate::otp::LifecycleFuses;
use crate::payload::MAX_CREDENTIAL_LENGTH;
use crate::sim::{ExecutorBehavior, SimulatedDevice};

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "configs/rma_transit.toml";

/// Errors produced while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML document did not match the expected layout.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// Neither `credential.token` nor `credential.file` was set, or both were.
    #[error("exactly one of credential.token or credential.file must be set")]
    CredentialSource,
    /// The credential does not fit the request payload.
    #[error("credential is {len} bytes; the request payload holds at most {max}")]
    CredentialTooLarge {
        /// Credential length in bytes.
        len: usize,
        /// Payload capacity.
        max: usize,
    },
    /// `mailbox.poll_interval_ms` was zero.
    #[error("mailbox.poll_interval_ms must be greater than zero")]
    ZeroPollInterval,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    credential: RawCredential,
    #[serde(default)]
    mailbox: RawMailbox,
    #[serde(default)]
    simulation: RawSimulation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCredential {
    token: Option<String>,
    file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMailbox {
    timeout_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
}

/// Lifecycle bit names accepted in `simulation.fuses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuseName {
    /// `normal`
    Normal,
    /// `secure`
    Secure,
    /// `secure_with_debug`
    SecureWithDebug,
    /// `rma`
    Rma,
}

impl From<FuseName> for LifecycleFuses {
    fn from(name: FuseName) -> Self {
        match name {
            FuseName::Normal => LifecycleFuses::NORMAL,
            FuseName::Secure => LifecycleFuses::SECURE,
            FuseName::SecureWithDebug => LifecycleFuses::SECURE_WITH_DEBUG,
            FuseName::Rma => LifecycleFuses::RMA,
        }
    }
}

/// Executor modes accepted in `simulation.executor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorMode {
    /// Complete after `latency_ms`.
    #[default]
    Complete,
    /// Never release the lock.
    Hang,
    /// Lock held by another transaction.
    Busy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSimulation {
    #[serde(default)]
    fuses: Vec<FuseName>,
    #[serde(default)]
    executor: ExecutorMode,
    latency_ms: Option<u64>,
    status: Option<u32>,
    #[serde(default)]
    reject_credential: bool,
}

/// Mailbox bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSettings {
    /// Upper bound on waiting for the executor.
    pub timeout: Duration,
    /// Interval between lock checks.
    pub poll_interval: Duration,
}

impl Default for MailboxSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Simulated device description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimulationSettings {
    /// Lifecycle bits programmed at start-up.
    pub fuses: LifecycleFuses,
    /// Executor reaction to a posted request.
    pub behavior: ExecutorBehavior,
    /// Forced completion status word.
    pub status: Option<u32>,
    /// Refuse every credential.
    pub reject_credential: bool,
}

impl SimulationSettings {
    /// Build the device described by these settings.
    pub fn device(&self) -> SimulatedDevice {
        let mut device = SimulatedDevice::new(self.fuses, self.behavior);
        if let Some(status) = self.status {
            device = device.with_status_override(status);
        }
        if self.reject_credential {
            device = device.rejecting_credentials();
        }
        device
    }
}

/// Validated host configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitConfig {
    /// Authorization token bytes.
    pub credential: Vec<u8>,
    /// Mailbox bounds.
    pub mailbox: MailboxSettings,
    /// Simulated device.
    pub simulation: SimulationSettings,
}

impl TransitConfig {
    /// Read and validate the configuration at `path`.
    ///
    /// A relative `credential.file` is resolved against the directory holding
    /// `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, path, base)
    }

    /// Validate a TOML document; `origin` is used in error messages and
    /// `base` resolves relative credential files.
    pub fn parse(text: &str, origin: &Path, base: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        let credential = match (raw.credential.token, raw.credential.file) {
            (Some(token), None) => token.trim().as_bytes().to_vec(),
            (None, Some(file)) => {
                let path = if file.is_absolute() { file } else { base.join(file) };
                let text = fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                text.trim().as_bytes().to_vec()
            }
            _ => return Err(ConfigError::CredentialSource),
        };
        if credential.len() > MAX_CREDENTIAL_LENGTH {
            return Err(ConfigError::CredentialTooLarge {
                len: credential.len(),
                max: MAX_CREDENTIAL_LENGTH,
            });
        }

        let mut mailbox = MailboxSettings::default();
        if let Some(secs) = raw.mailbox.timeout_secs {
            mailbox.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = raw.mailbox.poll_interval_ms {
            if ms == 0 {
                return Err(ConfigError::ZeroPollInterval);
            }
            mailbox.poll_interval = Duration::from_millis(ms);
        }

        let sim = raw.simulation;
        let fuses = sim
            .fuses
            .into_iter()
            .fold(LifecycleFuses::empty(), |acc, name| acc | LifecycleFuses::from(name));
        let behavior = match sim.executor {
            ExecutorMode::Complete => match sim.latency_ms {
                Some(ms) => ExecutorBehavior::Complete {
                    latency: Duration::from_millis(ms),
                },
                None => ExecutorBehavior::default(),
            },
            ExecutorMode::Hang => ExecutorBehavior::Hang,
            ExecutorMode::Busy => ExecutorBehavior::Busy,
        };

        Ok(Self {
            credential,
            mailbox,
            simulation: SimulationSettings {
                fuses,
                behavior,
                status: sim.status,
                reject_credential: sim.reject_credential,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<TransitConfig, ConfigError> {
        TransitConfig::parse(text, Path::new("inline.toml"), Path::new("."))
    }

    #[test]
    fn minimal_config_uses_protocol_defaults() {
        let config = parse("[credential]\ntoken = \"eyJ0\"\n").expect("valid config");
        assert_eq!(config.credential, b"eyJ0");
        assert_eq!(config.mailbox, MailboxSettings::default());
        assert_eq!(config.mailbox.timeout, Duration::from_secs(60));
        assert_eq!(config.simulation.fuses, LifecycleFuses::empty());
        assert_eq!(config.simulation.behavior, ExecutorBehavior::default());
    }

    #[test]
    fn full_config_is_decoded() {
        let text = r#"
[credential]
token = "  eyJhbGciOiJFUzI1NiJ9  "

[mailbox]
timeout_secs = 5
poll_interval_ms = 250

[simulation]
fuses = ["normal", "secure_with_debug"]
executor = "complete"
latency_ms = 750
status = 0xF0000000
reject_credential = true
"#;
        let config = parse(text).expect("valid config");
        assert_eq!(config.credential, b"eyJhbGciOiJFUzI1NiJ9");
        assert_eq!(config.mailbox.timeout, Duration::from_secs(5));
        assert_eq!(config.mailbox.poll_interval, Duration::from_millis(250));
        assert_eq!(
            config.simulation.fuses,
            LifecycleFuses::NORMAL | LifecycleFuses::SECURE_WITH_DEBUG
        );
        assert_eq!(
            config.simulation.behavior,
            ExecutorBehavior::Complete {
                latency: Duration::from_millis(750)
            }
        );
        assert_eq!(config.simulation.status, Some(0xF000_0000));
        assert!(config.simulation.reject_credential);
    }

    #[test]
    fn credential_source_must_be_unique() {
        assert!(matches!(
            parse("[credential]\n"),
            Err(ConfigError::CredentialSource)
        ));
        assert!(matches!(
            parse("[credential]\ntoken = \"a\"\nfile = \"b\"\n"),
            Err(ConfigError::CredentialSource)
        ));
    }

    #[test]
    fn oversized_token_is_rejected() {
        let text = format!("[credential]\ntoken = \"{}\"\n", "a".repeat(MAX_CREDENTIAL_LENGTH + 1));
        assert!(matches!(
            parse(&text),
            Err(ConfigError::CredentialTooLarge { len, .. }) if len == MAX_CREDENTIAL_LENGTH + 1
        ));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let text = "[credential]\ntoken = \"a\"\n[mailbox]\npoll_interval_ms = 0\n";
        assert!(matches!(parse(text), Err(ConfigError::ZeroPollInterval)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = "[credential]\ntoken = \"a\"\n[mailbox]\nretries = 3\n";
        assert!(matches!(parse(text), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn hang_and_busy_modes() {
        let hang = parse("[credential]\ntoken = \"a\"\n[simulation]\nexecutor = \"hang\"\n")
            .expect("valid config");
        assert_eq!(hang.simulation.behavior, ExecutorBehavior::Hang);
        let busy = parse("[credential]\ntoken = \"a\"\n[simulation]\nexecutor = \"busy\"\n")
            .expect("valid config");
        assert_eq!(busy.simulation.behavior, ExecutorBehavior::Busy);
        assert!(busy.simulation.device().is_locked());
    }
}
