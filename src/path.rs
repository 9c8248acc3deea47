// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for files that snapkeeper reads, or
//! manages in some way.

use std::path::PathBuf;

/// Determine default absolute path to configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/snapkeeper/config.toml` as
/// the default. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("snapkeeper").join("config.toml"))
        .ok_or(NoWayHome)
}

/// Determine directory to place run lock files in.
///
/// Prefers `$XDG_RUNTIME_DIR`, falling back to the system temporary directory
/// when no runtime directory is available, e.g., when running as root from
/// cron.
pub fn lock_dir() -> PathBuf {
    dirs::runtime_dir().unwrap_or_else(std::env::temp_dir)
}

/// Determine path of run lock file for dataset.
///
/// Slashes in dataset names are percent-escaped so that every dataset maps
/// onto its own file inside the lock directory.
pub fn lock_path(dataset: &str) -> PathBuf {
    // INVARIANT: Escape '%' before '/', or distinct datasets could share one lock.
    let flat = dataset.replace('%', "%25").replace('/', "%2F");
    lock_dir().join(format!("snapkeeper-{flat}.lock"))
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
