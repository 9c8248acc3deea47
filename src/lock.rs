// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Exclusive run lock.
//!
//! At most one maintenance run may touch a dataset at a time. The lock is a
//! plain file created with `create_new`, so acquisition fails outright if
//! another invocation already holds it. The file records the holder's PID to
//! help whoever has to clean up after a crashed run.

use std::{
    fs::{remove_file, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Held run lock, released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire run lock at given path.
    ///
    /// Creates parent directories of lock file if they do not exist.
    ///
    /// # Errors
    ///
    /// - Return [`LockError::Held`] if lock file already exists.
    /// - Return [`LockError::Io`] if lock file cannot be created.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            mkdirp::mkdirp(parent).map_err(|source| LockError::Io {
                source,
                path: path.clone(),
            })?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path).unwrap_or_default();
                return Err(LockError::Held {
                    path,
                    holder: holder.trim().to_string(),
                });
            }
            Err(source) => return Err(LockError::Io { source, path }),
        };

        writeln!(file, "{}", std::process::id())
            .map_err(|source| LockError::Io {
                source,
                path: path.clone(),
            })?;
        debug!("acquired run lock {:?}", path.display());

        Ok(Self { path })
    }

    /// Path of lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(error) = remove_file(&self.path) {
            warn!("cannot release run lock {:?}: {error}", self.path.display());
        }
    }
}

/// All possible error types for run locking.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another invocation holds the lock.
    #[error("another run holds lock {:?} (pid {holder})", path.display())]
    Held { path: PathBuf, holder: String },

    /// Lock file cannot be created.
    #[error("failed to create lock file {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = LockError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn second_acquire_is_refused_until_release() -> anyhow::Result<()> {
        let path = std::env::current_dir()?.join("locks/snapkeeper-tank.lock");

        let lock = RunLock::acquire(&path)?;
        assert!(path.exists());
        assert!(matches!(
            RunLock::acquire(&path),
            Err(LockError::Held { .. })
        ));

        drop(lock);
        assert!(!path.exists());
        let _lock = RunLock::acquire(&path)?;

        Ok(())
    }
}
