// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Maintenance log file backend.
//!
//! The maintenance log is a plain text file. Runs only ever append to it,
//! while log correlation replaces it wholesale. Replacement goes through a
//! temporary file in the same directory that is persisted over the log, so
//! readers either see the old log or the new one, never a half-written mix.

use crate::store::{LogStore, Result, StoreError};

use std::{
    fs::{read_to_string, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Log store backed by a file on disk.
#[derive(Debug, Clone)]
pub struct FileLog {
    path: PathBuf,
}

impl FileLog {
    /// Construct new log file backend.
    ///
    /// Does not check if the file exists. Missing files and parent
    /// directories are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to log file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    async fn blocking<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> std::io::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || job(path))
            .await
            .map_err(std::io::Error::other)
            .and_then(|result| result)
            .map_err(|err| StoreError::LogFile {
                source: err,
                path: self.path.clone(),
            })
    }
}

impl LogStore for FileLog {
    #[instrument(skip(self), level = "debug")]
    async fn read(&self) -> Result<String> {
        self.blocking(|path| match read_to_string(&path) {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
            result => result,
        })
        .await
    }

    #[instrument(skip(self, text), level = "debug")]
    async fn append(&self, text: &str) -> Result<()> {
        debug!("append {} bytes to {:?}", text.len(), self.path.display());
        let text = text.to_string();
        self.blocking(move |path| {
            create_parent(&path)?;
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()
        })
        .await
    }

    #[instrument(skip(self, content), level = "debug")]
    async fn rewrite(&self, content: &str) -> Result<()> {
        debug!("rewrite {:?} with {} bytes", self.path.display(), content.len());
        let content = content.to_string();
        self.blocking(move |path| {
            let parent = create_parent(&path)?;
            let mut file = NamedTempFile::new_in(parent)?;
            file.write_all(content.as_bytes())?;
            file.as_file().sync_all()?;
            file.persist(&path).map_err(|err| err.error)?;
            Ok(())
        })
        .await
    }
}

fn create_parent(path: &Path) -> std::io::Result<PathBuf> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    mkdirp::mkdirp(&parent)?;

    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn missing_log_reads_as_empty() -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        let log = FileLog::new("state/maintenance.log");
        let result = runtime.block_on(log.read())?;
        assert_eq!(result, "");

        Ok(())
    }

    #[sealed_test]
    fn append_then_rewrite() -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        let log = FileLog::new("state/nested/maintenance.log");

        runtime.block_on(log.append("first\n"))?;
        runtime.block_on(log.append("second\n"))?;
        assert_eq!(runtime.block_on(log.read())?, "first\nsecond\n");

        runtime.block_on(log.rewrite("replaced\n"))?;
        assert_eq!(runtime.block_on(log.read())?, "replaced\n");
        assert_eq!(read_to_string("state/nested/maintenance.log")?, "replaced\n");

        Ok(())
    }

    #[sealed_test]
    fn unreadable_log_reports_path() -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        std::fs::create_dir("maintenance.log")?;
        let log = FileLog::new("maintenance.log");

        let result = runtime.block_on(log.read());
        assert!(matches!(
            result,
            Err(StoreError::LogFile { path, .. }) if path == Path::new("maintenance.log")
        ));

        Ok(())
    }
}
