//! Configuration loading via `ortho-config`.
//!
//! Tunables merge defaults, `snapshooter.toml` and `SNAPSHOOTER_*`
//! environment variables. Project, zone and the run modes come from the
//! command line; see [`RunMode`].

use std::ffi::OsString;
use std::time::Duration;

use chrono::TimeDelta;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::age::AgeWindow;
use crate::controller::{DescriptionStyle, StalenessPolicy};

/// Default path to the Google Cloud CLI.
pub const DEFAULT_GCLOUD_BIN: &str = "gcloud";
/// Name prefix the GKE persistent disk provisioner gives its disks.
pub const DEFAULT_DISK_PREFIX: &str = "gke-";
/// Description prefix marking snapshots created by this tool.
pub const DEFAULT_DESCRIPTION_PREFIX: &str = "[auto] ";

/// Retention policy tunables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SNAPSHOOTER",
    discovery(
        app_name = "snapshooter",
        env_var = "SNAPSHOOTER_CONFIG_PATH",
        config_file_name = "snapshooter.toml",
        dotfile_name = ".snapshooter.toml",
        project_file_name = "snapshooter.toml"
    )
)]
pub struct PolicyConfig {
    /// Path to the `gcloud` executable.
    #[ortho_config(default = DEFAULT_GCLOUD_BIN.to_owned())]
    pub gcloud_bin: String,
    /// Only disks whose name starts with this prefix are considered.
    #[ortho_config(default = DEFAULT_DISK_PREFIX.to_owned())]
    pub disk_prefix: String,
    /// Marker prepended to the description of every snapshot we create.
    #[ortho_config(default = DEFAULT_DESCRIPTION_PREFIX.to_owned())]
    pub description_prefix: String,
    /// Snapshots younger than this many seconds make a new one unnecessary.
    #[ortho_config(default = 86_400)]
    pub min_age_secs: u64,
    /// Owned snapshots older than this many seconds are deleted.
    #[ortho_config(default = 2_592_000)]
    pub max_age_secs: u64,
    /// Clock skew allowance in seconds.
    #[ortho_config(default = 3_600)]
    pub bias_secs: u64,
    /// Delay between operation polls in seconds.
    #[ortho_config(default = 1)]
    pub poll_interval_secs: u64,
    /// Longest wait for one operation in seconds; `0` waits forever.
    #[ortho_config(default = 600)]
    pub operation_timeout_secs: u64,
    /// `always` or `skip-when-fresh`.
    #[ortho_config(default = "always".to_owned())]
    pub staleness_policy: String,
    /// `prefixed` or `verbatim`.
    #[ortho_config(default = "prefixed".to_owned())]
    pub description_style: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            gcloud_bin: DEFAULT_GCLOUD_BIN.to_owned(),
            disk_prefix: DEFAULT_DISK_PREFIX.to_owned(),
            description_prefix: DEFAULT_DESCRIPTION_PREFIX.to_owned(),
            min_age_secs: 86_400,
            max_age_secs: 2_592_000,
            bias_secs: 3_600,
            poll_interval_secs: 1,
            operation_timeout_secs: 600,
            staleness_policy: String::from("always"),
            description_style: String::from("prefixed"),
        }
    }
}

/// Validated policy settings consumed by the controller.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PolicySettings {
    /// Disk name prefix.
    pub disk_prefix: String,
    /// Owned snapshot marker.
    pub description_prefix: String,
    /// Freshness and retention thresholds.
    pub window: AgeWindow,
    /// Delay between operation polls.
    pub poll_interval: Duration,
    /// Operation deadline, `None` for unbounded waits.
    pub operation_timeout: Option<Duration>,
    /// Whether staleness is checked when a fresh snapshot exists.
    pub staleness: StalenessPolicy,
    /// How snapshot descriptions are derived.
    pub description_style: DescriptionStyle,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            disk_prefix: DEFAULT_DISK_PREFIX.to_owned(),
            description_prefix: DEFAULT_DESCRIPTION_PREFIX.to_owned(),
            window: AgeWindow::default(),
            poll_interval: Duration::from_secs(1),
            operation_timeout: Some(Duration::from_secs(600)),
            staleness: StalenessPolicy::Always,
            description_style: DescriptionStyle::Prefixed,
        }
    }
}

/// Execution switches taken from the command line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunMode {
    /// Do not wait for create and delete operations to finish.
    pub fire_and_forget: bool,
    /// Decide but do not mutate.
    pub dry_run: bool,
}

impl PolicyConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("snapshooter")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the raw values and converts them into [`PolicySettings`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is blank, out of range,
    /// or the age thresholds contradict each other.
    pub fn settings(&self) -> Result<PolicySettings, ConfigError> {
        Self::require_value(&self.gcloud_bin, "gcloud_bin")?;
        Self::require_value(&self.disk_prefix, "disk_prefix")?;
        Self::require_value(&self.description_prefix, "description_prefix")?;

        let min_age = seconds(self.min_age_secs, "min_age_secs")?;
        let max_age = seconds(self.max_age_secs, "max_age_secs")?;
        let bias = seconds(self.bias_secs, "bias_secs")?;
        if max_age <= min_age {
            return Err(ConfigError::invalid(
                "max_age_secs",
                "must be greater than min_age_secs",
            ));
        }
        if bias >= min_age {
            return Err(ConfigError::invalid(
                "bias_secs",
                "must be smaller than min_age_secs",
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "poll_interval_secs",
                "must be greater than zero",
            ));
        }

        let staleness = StalenessPolicy::parse(&self.staleness_policy).ok_or_else(|| {
            ConfigError::invalid(
                "staleness_policy",
                "expected `always` or `skip-when-fresh`",
            )
        })?;
        let description_style =
            DescriptionStyle::parse(&self.description_style).ok_or_else(|| {
                ConfigError::invalid("description_style", "expected `prefixed` or `verbatim`")
            })?;

        Ok(PolicySettings {
            disk_prefix: self.disk_prefix.clone(),
            description_prefix: self.description_prefix.clone(),
            window: AgeWindow::new(min_age, max_age, bias),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            operation_timeout: (self.operation_timeout_secs > 0)
                .then(|| Duration::from_secs(self.operation_timeout_secs)),
            staleness,
            description_style,
        })
    }

    fn require_value(value: &str, field: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid(field, "must not be empty"));
        }
        Ok(())
    }
}

fn seconds(value: u64, field: &str) -> Result<TimeDelta, ConfigError> {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| ConfigError::invalid(field, "is too large"))
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when a value is present but unusable.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Configuration key at fault.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: &str) -> Self {
        Self::Invalid {
            field: field.to_owned(),
            reason: reason.to_owned(),
        }
    }
}
