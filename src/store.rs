// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External store access.
//!
//! Snapkeeper never keeps a private database. Everything it needs to know is
//! re-read from a __snapshot store__ that holds the dataset's snapshots, a
//! __replication store__ that holds the secondary target, and a __log store__
//! that holds the human-readable maintenance log. Cleanup and update steps
//! are handed off to __collaborators__ whose only observable result is
//! whether they succeeded.
//!
//! Each of these is a trait so that the maintenance logic can be exercised
//! against in-memory fakes, while the binary plugs in the real backends:
//!
//! - [`zfs::ZfsCli`] for snapshot and replication stores.
//! - [`logfile::FileLog`] for the log store.
//! - [`command::ShellCollaborator`] for cleanup and update steps.

#![allow(async_fn_in_trait)]

pub mod command;
pub mod logfile;
pub mod zfs;

use serde::{Deserialize, Serialize};
use std::{future::Future, path::PathBuf, time::Duration};

/// Snapshot listing, creation, and destruction for a dataset.
pub trait SnapshotStore {
    /// List snapshot names of dataset, without the `<dataset>@` part.
    async fn list_snapshots(&self, dataset: &str) -> Result<Vec<String>>;

    /// Create snapshot of dataset.
    ///
    /// Must return [`StoreError::AlreadyExists`] when the name is taken.
    async fn create_snapshot(&self, dataset: &str, name: &str) -> Result<()>;

    /// Destroy snapshot of dataset.
    async fn destroy_snapshot(&self, dataset: &str, name: &str) -> Result<()>;
}

/// Secondary target inspection, and snapshot transfer into it.
pub trait ReplicationStore {
    /// Check if target dataset exists.
    async fn exists(&self, target: &str) -> Result<bool>;

    /// List snapshot names held by target dataset.
    async fn list_target_snapshots(&self, target: &str) -> Result<Vec<String>>;

    /// Send snapshot of dataset into target as one chained operation.
    ///
    /// A full transfer happens when `base` is `None`, otherwise only the delta
    /// from `base` to `name` is sent. Failure on either the sending or the
    /// receiving side fails the whole transfer.
    async fn transfer(
        &self,
        dataset: &str,
        name: &str,
        base: Option<&str>,
        target: &str,
    ) -> Result<()>;
}

/// Append-only maintenance log.
pub trait LogStore {
    /// Read full log content.
    ///
    /// A log that does not exist yet reads as empty.
    async fn read(&self) -> Result<String>;

    /// Append text to the end of the log.
    async fn append(&self, text: &str) -> Result<()>;

    /// Replace full log content in one shot.
    async fn rewrite(&self, content: &str) -> Result<()>;
}

/// Best-effort step run outside of snapshot management.
pub trait Collaborator {
    /// Run step, reporting only whether it succeeded.
    async fn run_step(&self, step: &Step) -> bool;
}

/// Named external command.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Step {
    /// Name of step shown in run summary.
    pub name: String,

    /// Program followed by its arguments.
    pub command: Vec<String>,
}

impl Step {
    /// Construct new step.
    pub fn new(
        name: impl Into<String>,
        command: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into_iter().map(Into::into).collect(),
        }
    }
}

/// Bound external call with a timeout.
///
/// # Errors
///
/// - Return [`StoreError::Timeout`] if the call does not finish in time.
/// - Return whatever error the call itself produced.
pub async fn bounded<T>(
    timeout: Duration,
    operation: impl Into<String>,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation: operation.into(),
            timeout,
        }),
    }
}

/// All possible error types for external store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Snapshot name is already taken.
    #[error("snapshot {name:?} already exists")]
    AlreadyExists { name: String },

    /// Dataset or snapshot does not exist.
    #[error("{name:?} does not exist")]
    NotFound { name: String },

    /// External call did not finish in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    /// External command exited unsuccessfully.
    #[error("command {program:?} failed:\n{message}")]
    Command { program: String, message: String },

    /// Log file cannot be accessed.
    #[error("failed to access log file at {:?}", path.display())]
    LogFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// I/O with external process fails.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
