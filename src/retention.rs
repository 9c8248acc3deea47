// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Retention window enforcement.
//!
//! Keep at most a fixed number of managed snapshots per dataset. Anything
//! beyond that count is destroyed, oldest first. Foreign snapshots are never
//! counted, and never destroyed.
//!
//! Selecting snapshots for deletion and actually deleting them are kept as
//! separate facts. Deletion proceeds one snapshot at a time from oldest to
//! newest, and a failure on one snapshot does not stop deletion of the rest.
//! If some deletions fail, the surviving snapshots still form a contiguous
//! run from the cutoff onward, minus whatever could not be removed.

use crate::{
    naming::SnapshotName,
    store::{bounded, SnapshotStore, StoreError},
};

use std::{num::NonZeroUsize, time::Duration};
use tracing::{info, warn};

/// Retention policy of managed snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of managed snapshots to keep.
    pub max_count: NonZeroUsize,
}

impl RetentionPolicy {
    /// Construct new retention policy.
    pub fn new(max_count: NonZeroUsize) -> Self {
        Self { max_count }
    }
}

/// Select snapshots to delete to satisfy retention policy.
///
/// Returns the oldest `count - max_count` snapshots in oldest-first order,
/// or nothing if the set already complies.
pub fn select_for_deletion(
    existing: impl IntoIterator<Item = SnapshotName>,
    policy: &RetentionPolicy,
) -> Vec<SnapshotName> {
    let mut existing = existing.into_iter().collect::<Vec<_>>();
    existing.sort();
    existing.dedup();

    let excess = existing.len().saturating_sub(policy.max_count.get());
    existing.truncate(excess);
    existing
}

/// Select snapshots to delete while never selecting a protected snapshot.
///
/// The window is still counted over every snapshot, protected one included.
/// Whatever must go is taken oldest-first from the rest.
pub fn select_for_deletion_sparing(
    existing: impl IntoIterator<Item = SnapshotName>,
    policy: &RetentionPolicy,
    protected: &SnapshotName,
) -> Vec<SnapshotName> {
    let mut existing = existing.into_iter().collect::<Vec<_>>();
    existing.sort();
    existing.dedup();

    let excess = existing.len().saturating_sub(policy.max_count.get());
    existing
        .into_iter()
        .filter(|name| name != protected)
        .take(excess)
        .collect()
}

/// Result of enforcing retention on a dataset.
#[derive(Debug, Default)]
pub struct RetentionOutcome {
    /// Snapshots selected for deletion, oldest first.
    pub selected: Vec<SnapshotName>,

    /// Snapshots that were actually deleted, oldest first.
    pub deleted: Vec<SnapshotName>,

    /// Snapshots that could not be deleted, with the reason why.
    pub failed: Vec<(SnapshotName, StoreError)>,
}

impl RetentionOutcome {
    /// Check if every selected snapshot was deleted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete selected snapshots from dataset one at a time.
///
/// Each deletion is bounded by `timeout`. Failed deletions are logged and
/// recorded, but never stop the remaining deletions.
pub async fn enforce<S>(
    store: &S,
    dataset: &str,
    selected: Vec<SnapshotName>,
    timeout: Duration,
) -> RetentionOutcome
where
    S: SnapshotStore,
{
    let mut outcome = RetentionOutcome {
        selected,
        ..Default::default()
    };

    for name in &outcome.selected {
        let snapshot = name.to_string();
        let result = bounded(
            timeout,
            format!("destroy {dataset}@{snapshot}"),
            store.destroy_snapshot(dataset, &snapshot),
        )
        .await;

        match result {
            Ok(()) => {
                info!("retention removed {dataset}@{snapshot}");
                outcome.deleted.push(name.clone());
            }
            Err(error) => {
                warn!("retention could not remove {dataset}@{snapshot}: {error}");
                outcome.failed.push((name.clone(), error));
            }
        }
    }

    outcome
}
