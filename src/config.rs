// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that snapkeeper uses to
//! simplify the process of serialization and deserialization. Parsing also
//! validates every setting, and expands shell variables in paths, so a
//! [`Config`] that parsed successfully can always be turned into a
//! [`MaintenanceConfig`].

use crate::{
    allocator::date_tag_for,
    maintain::MaintenanceConfig,
    naming::{NamingScheme, TagScheme, DEFAULT_CARRY},
    retention::RetentionPolicy,
    store::Step,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Default timeout of external calls in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default date format of date tags.
pub const DEFAULT_DATE_FORMAT: &str = "%Y%m%d";

/// Snapkeeper configuration file layout.
///
/// # General Layout
///
/// The top-level names the dataset to manage, and how long any single
/// external call may take. The remaining tables configure the naming scheme,
/// retention window, optional replication target, maintenance log, and the
/// cleanup and update steps that run after snapshot management.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Dataset whose snapshots are managed.
    pub dataset: String,

    /// Timeout of any single external call in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Path to `zfs` binary to use instead of the one in `$PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zfs_bin: Option<PathBuf>,

    /// Snapshot naming settings.
    pub naming: NamingSettings,

    /// Retention window settings.
    pub retention: RetentionSettings,

    /// Replication settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<ReplicationSettings>,

    /// Maintenance log settings.
    pub log: LogSettings,

    /// Cleanup steps to run before the update step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup: Vec<Step>,

    /// Update step to run last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Step>,
}

impl Config {
    /// Load configuration file from disk.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file cannot be read.
    /// - Return any parsing or validation error of [`Config::from_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_to_string(path.as_ref())
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            })?
            .parse()
    }

    /// Validate settings without expanding anything.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Invalid`] for the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.is_empty() || self.dataset.contains('@') {
            return Err(invalid("dataset", "must be a non-empty dataset name"));
        }

        let prefix = &self.naming.prefix;
        if prefix.is_empty() || prefix.contains(['-', '@', '/']) || prefix.contains(char::is_whitespace)
        {
            return Err(invalid(
                "naming.prefix",
                "must be non-empty, without '-', '@', '/', or whitespace",
            ));
        }

        // INVARIANT: Date tags must keep increasing across a year boundary.
        //   - Formats without the year wrap around, and would rotate out fresh snapshots.
        let scheme = self.naming_scheme();
        let base = scheme.tag_scheme().base();
        let rendered = [(2000, 12, 31), (2001, 1, 1)]
            .into_iter()
            .map(|(year, month, day)| {
                let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default();
                date_tag_for(&self.naming.date_format, date)
                    .map(|date_tag| scheme.format(date_tag, base))
            })
            .collect::<Result<Vec<_>, _>>();
        match rendered.as_deref() {
            Ok([earlier, later]) if earlier < later => {}
            Ok(_) => {
                return Err(invalid(
                    "naming.date_format",
                    "must keep increasing across years, so include the year",
                ))
            }
            Err(_) => {
                return Err(invalid(
                    "naming.date_format",
                    "must render a non-empty run of digits",
                ))
            }
        }

        if self.naming.scheme == SchemeKind::MajorMinor && self.naming.carry == 0 {
            return Err(invalid("naming.carry", "must be at least 1"));
        }

        if self.retention.max_count == 0 {
            return Err(invalid("retention.max_count", "must be at least 1"));
        }

        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "must be at least 1"));
        }

        if let Some(replication) = &self.replication {
            if replication.target.is_empty() || replication.target == self.dataset {
                return Err(invalid(
                    "replication.target",
                    "must be non-empty, and differ from dataset",
                ));
            }
        }

        for step in self.cleanup.iter().chain(self.update.iter()) {
            if step.command.is_empty() || step.command[0].is_empty() {
                return Err(invalid("cleanup/update", "every step needs a command"));
            }
        }

        Ok(())
    }

    /// Build naming scheme from configuration.
    pub fn naming_scheme(&self) -> NamingScheme {
        let tag = match self.naming.scheme {
            SchemeKind::MajorMinor => TagScheme::MajorMinor {
                carry: self.naming.carry,
            },
            SchemeKind::Sequence => TagScheme::Sequence,
        };

        NamingScheme::new(self.naming.prefix.clone(), tag)
    }

    /// Build maintenance settings from configuration.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Invalid`] if validation fails.
    pub fn maintenance(&self) -> Result<MaintenanceConfig> {
        self.validate()?;
        let max_count = NonZeroUsize::new(self.retention.max_count)
            .ok_or_else(|| invalid("retention.max_count", "must be at least 1"))?;

        Ok(MaintenanceConfig {
            dataset: self.dataset.clone(),
            naming: self.naming_scheme(),
            date_format: self.naming.date_format.clone(),
            retention: RetentionPolicy::new(max_count),
            replication_target: self
                .replication
                .as_ref()
                .map(|replication| replication.target.clone()),
            cleanup: self.cleanup.clone(),
            update: self.update.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: Config = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        config.log.path = expand(&config.log.path)?;
        if let Some(zfs_bin) = &config.zfs_bin {
            config.zfs_bin = Some(expand(zfs_bin)?);
        }

        config.validate()?;

        Ok(config)
    }
}

impl Display for Config {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Snapshot naming settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct NamingSettings {
    /// Managed prefix of snapshot names.
    pub prefix: String,

    /// Chrono format string that renders the date tag.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Shape of version tags.
    #[serde(default)]
    pub scheme: SchemeKind,

    /// Carry threshold of `major-minor` scheme.
    #[serde(default = "default_carry")]
    pub carry: u64,
}

/// Shape of version tags as written in configuration.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemeKind {
    /// `v<major>.<minor>` tags.
    #[default]
    MajorMinor,

    /// `n<k>` tags.
    Sequence,
}

/// Retention window settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct RetentionSettings {
    /// Maximum number of managed snapshots to keep.
    pub max_count: usize,
}

/// Replication settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ReplicationSettings {
    /// Secondary dataset to replicate into.
    pub target: String,
}

/// Maintenance log settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct LogSettings {
    /// Path to maintenance log file.
    pub path: PathBuf,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn default_carry() -> u64 {
    DEFAULT_CARRY
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Setting holds an unusable value.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
