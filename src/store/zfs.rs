// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! ZFS command line backend.
//!
//! Drive snapshot and replication stores through the `zfs` binary. Every call
//! is a child process whose output is captured and chomped. Children are
//! killed when their future is dropped, so a caller can bound any call with a
//! timeout without leaking processes.
//!
//! # Replication Pipe
//!
//! Replication chains `zfs send` into `zfs receive` the same way a shell
//! pipeline would, but observes both ends. The transfer only succeeds if the
//! stream was copied in full, and both processes exited successfully.

use crate::store::{ReplicationStore, Result, SnapshotStore, StoreError};

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Output, Stdio},
};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, info, instrument};

/// Snapshot and replication store backed by the `zfs` binary.
#[derive(Debug, Clone)]
pub struct ZfsCli {
    bin: PathBuf,
}

impl ZfsCli {
    /// Construct new ZFS backend using given binary.
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    /// Path to `zfs` binary in use.
    pub fn bin(&self) -> &Path {
        self.bin.as_path()
    }

    fn command(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Command {
        let mut command = Command::new(&self.bin);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn zfs(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Result<String> {
        let output = self.command(args).output().await?;
        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();

        if !output.status.success() {
            return Err(self.failure(&output));
        }

        Ok(chomp(stdout))
    }

    fn failure(&self, output: &Output) -> StoreError {
        StoreError::Command {
            program: self.bin.display().to_string(),
            message: render_output(output),
        }
    }

    async fn list(&self, dataset: &str) -> Result<Vec<String>> {
        let stdout = self
            .zfs([
                "list", "-H", "-p", "-t", "snapshot", "-o", "name", "-s", "createtxg", "-d", "1",
                dataset,
            ])
            .await
            .map_err(|error| not_found_or(error, dataset))?;

        Ok(parse_snapshot_listing(dataset, &stdout))
    }
}

impl Default for ZfsCli {
    fn default() -> Self {
        Self::new("zfs")
    }
}

impl SnapshotStore for ZfsCli {
    #[instrument(skip(self), level = "debug")]
    async fn list_snapshots(&self, dataset: &str) -> Result<Vec<String>> {
        self.list(dataset).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn create_snapshot(&self, dataset: &str, name: &str) -> Result<()> {
        info!("create snapshot {dataset}@{name}");
        match self.zfs(["snapshot", &format!("{dataset}@{name}")]).await {
            Err(StoreError::Command { message, .. }) if message.contains("already exists") => {
                Err(StoreError::AlreadyExists {
                    name: format!("{dataset}@{name}"),
                })
            }
            Err(error) => Err(not_found_or(error, dataset)),
            Ok(_) => Ok(()),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn destroy_snapshot(&self, dataset: &str, name: &str) -> Result<()> {
        info!("destroy snapshot {dataset}@{name}");
        let snapshot = format!("{dataset}@{name}");
        self.zfs(["destroy", snapshot.as_str()])
            .await
            .map_err(|error| not_found_or(error, &snapshot))?;

        Ok(())
    }
}

impl ReplicationStore for ZfsCli {
    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, target: &str) -> Result<bool> {
        match self.zfs(["list", "-H", "-o", "name", target]).await {
            Ok(_) => Ok(true),
            Err(StoreError::Command { message, .. }) if message.contains("does not exist") => {
                debug!("replication target {target:?} does not exist");
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_target_snapshots(&self, target: &str) -> Result<Vec<String>> {
        self.list(target).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn transfer(
        &self,
        dataset: &str,
        name: &str,
        base: Option<&str>,
        target: &str,
    ) -> Result<()> {
        let send_args = send_args(dataset, name, base);
        let receive_args = receive_args(target, base.is_none());
        info!("pipe zfs {} into zfs {}", send_args.join(" "), receive_args.join(" "));

        let mut send = self.command(&send_args).spawn()?;
        let mut receive = self.command(&receive_args).stdin(Stdio::piped()).spawn()?;

        // INVARIANT: Both ends of the pipe must be present before copying.
        let (Some(mut stream), Some(mut sink)) = (send.stdout.take(), receive.stdin.take()) else {
            return Err(StoreError::Io(std::io::Error::other(
                "zfs send/receive pipe was not set up",
            )));
        };

        // INVARIANT: Close receiving end once sending end is drained, or zfs receive never exits.
        let pipe = async move {
            let copied = tokio::io::copy(&mut stream, &mut sink).await?;
            sink.shutdown().await?;
            drop(sink);
            Ok::<u64, std::io::Error>(copied)
        };

        let (copied, sent, received) =
            tokio::join!(pipe, send.wait_with_output(), receive.wait_with_output());
        let (sent, received) = (sent?, received?);

        if !sent.status.success() {
            return Err(self.failure(&sent));
        }

        if !received.status.success() {
            return Err(self.failure(&received));
        }

        let copied = copied?;
        debug!("transferred {copied} bytes into {target:?}");

        Ok(())
    }
}

fn send_args(dataset: &str, name: &str, base: Option<&str>) -> Vec<String> {
    let mut args = vec!["send".to_string()];
    if let Some(base) = base {
        args.extend(["-i".to_string(), format!("{dataset}@{base}")]);
    }
    args.push(format!("{dataset}@{name}"));
    args
}

fn receive_args(target: &str, full: bool) -> Vec<String> {
    let mut args = vec!["receive".to_string()];

    // INVARIANT: Full transfers overwrite whatever the target currently holds.
    if full {
        args.push("-F".to_string());
    }
    args.push(target.to_string());
    args
}

fn parse_snapshot_listing(dataset: &str, stdout: &str) -> Vec<String> {
    let prefix = format!("{dataset}@");
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(prefix.as_str()))
        .map(ToString::to_string)
        .collect()
}

fn not_found_or(error: StoreError, name: &str) -> StoreError {
    match error {
        StoreError::Command { message, .. } if message.contains("does not exist") => {
            StoreError::NotFound {
                name: name.to_string(),
            }
        }
        error => error,
    }
}

fn render_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    chomp(message)
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}
