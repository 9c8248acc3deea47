// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Snapshot lifecycle and replication manager.
//!
//! Snapkeeper keeps a rolling window of versioned snapshots for a dataset.
//! Each __maintenance run__ allocates the next snapshot identifier, takes the
//! snapshot, prunes the oldest snapshots beyond the retention window, purges
//! their entries from the maintenance log, replicates the new snapshot to a
//! secondary target, and finally hands off to configured update steps.
//!
//! Snapkeeper keeps no state of its own. Every run re-derives what it needs
//! from the snapshot store and the maintenance log.

pub mod allocator;
pub mod config;
pub mod journal;
pub mod lock;
pub mod maintain;
pub mod naming;
pub mod path;
pub mod replication;
pub mod retention;
pub mod store;

pub use allocator::next_identifier;
pub use config::Config;
pub use maintain::{Maintainer, MaintenanceConfig, RunSummary};
pub use naming::{NamingScheme, SnapshotName, TagScheme, VersionTag};
