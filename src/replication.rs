// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Replication to a secondary target.
//!
//! Replication is best-effort infrastructure. A missing target is not an
//! error, it simply means there is nowhere to replicate to. When the target
//! exists, the way a new snapshot gets there depends on what the target
//! already holds:
//!
//! - No managed snapshot at all: a __full__ transfer of the new snapshot,
//!   overwriting whatever the target dataset holds.
//! - Some managed snapshot: an __incremental__ transfer of the delta between
//!   the newest managed snapshot on the target and the new snapshot. The
//!   base is picked from the target, not from the local dataset, so runs that
//!   skipped replication are caught up in one go.
//!
//! Transfer failures are reported as a distinct outcome, but never stop the
//! rest of a maintenance run.

use crate::{
    naming::{NamingScheme, SnapshotName},
    store::{bounded, ReplicationStore, Result, StoreError},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

/// What a replication target currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetState {
    /// Target dataset does not exist.
    Absent,

    /// Target dataset holds no managed snapshot.
    Empty,

    /// Target dataset holds managed snapshots, newest one given.
    Holding(SnapshotName),
}

/// Reason replication was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No replication target exists.
    TargetAbsent,

    /// Target already holds the snapshot, or something newer.
    UpToDate,
}

impl Display for SkipReason {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::TargetAbsent => fmt.write_str("replication target absent"),
            Self::UpToDate => fmt.write_str("replication target up to date"),
        }
    }
}

/// How a snapshot gets sent into a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    /// Complete snapshot with no base reference.
    Full,

    /// Delta between base and new snapshot.
    Incremental { base: SnapshotName },
}

impl TransferMode {
    fn base(&self) -> Option<&SnapshotName> {
        match self {
            Self::Full => None,
            Self::Incremental { base } => Some(base),
        }
    }
}

impl Display for TransferMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Full => fmt.write_str("full"),
            Self::Incremental { base } => write!(fmt, "incremental from {base}"),
        }
    }
}

/// Decision on what to do with a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationPlan {
    /// Do not transfer anything.
    Skip(SkipReason),

    /// Transfer new snapshot in given mode.
    Transfer(TransferMode),
}

/// Decide how to replicate new snapshot into a target.
pub fn decide(state: &TargetState, new: &SnapshotName) -> ReplicationPlan {
    match state {
        TargetState::Absent => ReplicationPlan::Skip(SkipReason::TargetAbsent),
        TargetState::Empty => ReplicationPlan::Transfer(TransferMode::Full),

        // INVARIANT: An incremental transfer needs a base strictly older than the new snapshot.
        TargetState::Holding(base) if base >= new => ReplicationPlan::Skip(SkipReason::UpToDate),
        TargetState::Holding(base) => ReplicationPlan::Transfer(TransferMode::Incremental {
            base: base.clone(),
        }),
    }
}

/// Determine what a replication target currently holds.
///
/// # Errors
///
/// - Return [`StoreError`] if the target cannot be inspected in time.
#[instrument(skip(store, scheme), level = "debug")]
pub async fn inspect<R>(
    store: &R,
    target: &str,
    scheme: &NamingScheme,
    timeout: Duration,
) -> Result<TargetState>
where
    R: ReplicationStore,
{
    if !bounded(timeout, format!("inspect {target}"), store.exists(target)).await? {
        return Ok(TargetState::Absent);
    }

    let names = bounded(
        timeout,
        format!("list {target}"),
        store.list_target_snapshots(target),
    )
    .await?;
    let state = scheme
        .managed(names.iter().map(String::as_str))
        .pop()
        .map(TargetState::Holding)
        .unwrap_or(TargetState::Empty);
    debug!("replication target {target:?} state: {state:?}");

    Ok(state)
}

/// Result of replicating a snapshot.
#[derive(Debug)]
pub enum ReplicationOutcome {
    /// Nothing was transferred.
    Skipped(SkipReason),

    /// Snapshot was transferred in given mode.
    Replicated(TransferMode),

    /// Target could not be inspected, or transfer failed.
    Failed {
        mode: Option<TransferMode>,
        error: StoreError,
    },
}

impl ReplicationOutcome {
    /// Check if replication failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl Display for ReplicationOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Skipped(reason) => write!(fmt, "skipped: {reason}"),
            Self::Replicated(mode) => write!(fmt, "{mode} transfer done"),
            Self::Failed {
                mode: Some(mode),
                error,
            } => write!(fmt, "{mode} transfer failed: {error}"),
            Self::Failed { mode: None, error } => {
                write!(fmt, "target inspection failed: {error}")
            }
        }
    }
}

/// Replicate new snapshot of dataset into target.
///
/// Never returns an error. Every failure is folded into
/// [`ReplicationOutcome::Failed`].
pub async fn replicate<R>(
    store: &R,
    dataset: &str,
    new: &SnapshotName,
    target: &str,
    scheme: &NamingScheme,
    timeout: Duration,
) -> ReplicationOutcome
where
    R: ReplicationStore,
{
    let state = match inspect(store, target, scheme, timeout).await {
        Ok(state) => state,
        Err(error) => {
            warn!("cannot inspect replication target {target:?}: {error}");
            return ReplicationOutcome::Failed { mode: None, error };
        }
    };

    let mode = match decide(&state, new) {
        ReplicationPlan::Skip(reason) => {
            info!("skip replication of {dataset}@{new}: {reason}");
            return ReplicationOutcome::Skipped(reason);
        }
        ReplicationPlan::Transfer(mode) => mode,
    };

    info!("replicate {dataset}@{new} into {target:?} ({mode})");
    let base = mode.base().map(ToString::to_string);
    let result = bounded(
        timeout,
        format!("transfer {dataset}@{new} into {target}"),
        store.transfer(dataset, &new.to_string(), base.as_deref(), target),
    )
    .await;

    match result {
        Ok(()) => ReplicationOutcome::Replicated(mode),
        Err(error) => {
            warn!("replication of {dataset}@{new} into {target:?} failed: {error}");
            ReplicationOutcome::Failed {
                mode: Some(mode),
                error,
            }
        }
    }
}
