use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Timeout cannot be 0: {0}")]
    ZeroTimeout(&'static str),

    #[error("Remote config path cannot be empty")]
    EmptyConfigPath,

    #[error("Filesystem state store needs a base_dir and a filename")]
    EmptyStatePath,
}

fn default_enabled() -> bool {
    true
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct GateConfig {
    /// When false every launch goes to the local experience.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub timeouts: Timeouts,
    pub remote_config: RemoteConfigLocation,
    #[serde(default)]
    pub state_store: StateStoreConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
    #[serde(default)]
    pub device: DeviceInfo,
    #[serde(default)]
    pub attribution: AttributionConfig,
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.timeouts.validate()?;

        if self.remote_config.path.trim_matches('/').is_empty() {
            return Err(ValidationError::EmptyConfigPath);
        }

        if let StateStoreConfig::Filesystem { base_dir, filename } = &self.state_store {
            if base_dir.is_empty() || filename.is_empty() {
                return Err(ValidationError::EmptyStatePath);
            }
        }

        Ok(())
    }
}

/// All values in milliseconds.
#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    pub deadline_ms: u64,
    pub backend_ms: u64,
    pub push_token_ms: u64,
    pub redirect_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            deadline_ms: 7000,
            backend_ms: 7000,
            push_token_ms: 3000,
            redirect_ms: 5000,
        }
    }
}

impl Timeouts {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let all = [
            ("deadline_ms", self.deadline_ms),
            ("backend_ms", self.backend_ms),
            ("push_token_ms", self.push_token_ms),
            ("redirect_ms", self.redirect_ms),
        ];
        match all.into_iter().find(|(_, ms)| *ms == 0) {
            Some((name, _)) => Err(ValidationError::ZeroTimeout(name)),
            None => Ok(()),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn backend(&self) -> Duration {
        Duration::from_millis(self.backend_ms)
    }

    pub fn push_token(&self) -> Duration {
        Duration::from_millis(self.push_token_ms)
    }

    pub fn redirect(&self) -> Duration {
        Duration::from_millis(self.redirect_ms)
    }
}

fn default_config_path() -> String {
    "config".into()
}

/// Realtime Database location of the routing record.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct RemoteConfigLocation {
    pub database_url: Url,
    #[serde(default = "default_config_path")]
    pub path: String,
}

#[derive(Clone, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum StateStoreConfig {
    Filesystem {
        base_dir: String,
        filename: String,
    },
    #[default]
    Memory,
}

#[derive(Clone, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum EventLogConfig {
    #[default]
    Tracing,
    RealtimeDb {
        database_url: Url,
    },
}

/// Device metadata reported to the backend.
#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DeviceInfo {
    pub os_version: String,
    pub model: String,
    pub bundle_id: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        DeviceInfo {
            os_version: std::env::consts::OS.into(),
            model: std::env::consts::ARCH.into(),
            bundle_id: "unknown.bundle".into(),
        }
    }
}

/// Fixed values standing in for the attribution, installations and push
/// SDKs. A missing `push_token` makes the push wait run into its timeout.
#[derive(Clone, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AttributionConfig {
    pub install_id: Option<String>,
    pub installation_id: Option<String>,
    pub push_token: Option<String>,
    pub attribution_token: Option<String>,
}
