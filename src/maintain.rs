// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Maintenance run orchestration.
//!
//! A __maintenance run__ is one sequential pass over a dataset that walks
//! through a fixed series of phases:
//!
//! ```text
//! Idle -> AllocatingVersion -> Snapshotting -> Retaining -> Correlating
//!      -> Replicating -> Updating -> Done
//! ```
//!
//! Every phase catches its own errors at the phase boundary, records them in
//! a [`PhaseReport`], and hands control to the next phase. Nothing a phase
//! did is ever rolled back because a later phase failed. The only ordering
//! constraints between phases are data dependencies: correlation consumes
//! what retention actually deleted, and replication needs the identifier
//! that allocation produced.
//!
//! Once all phases ran, the [`RunSummary`] is appended to the maintenance
//! log as the run's own segment, named after the snapshot the run
//! allocated.

use crate::{
    allocator::{date_tag_for, next_identifier, DateTagError},
    journal::{self, PurgeReport},
    naming::{NamingScheme, SnapshotName},
    replication::{self, ReplicationOutcome, ReplicationPlan},
    retention::{self, RetentionOutcome, RetentionPolicy},
    store::{bounded, Collaborator, LogStore, ReplicationStore, SnapshotStore, Step, StoreError},
};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};
use tracing::{debug, info, instrument, warn};

/// Settings of a maintenance run.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Dataset whose snapshots are managed.
    pub dataset: String,

    /// Naming scheme of managed snapshots.
    pub naming: NamingScheme,

    /// Chrono format string that renders the date tag.
    pub date_format: String,

    /// Retention window of managed snapshots.
    pub retention: RetentionPolicy,

    /// Secondary dataset to replicate into, if any.
    pub replication_target: Option<String>,

    /// Cleanup steps to run before the update step.
    pub cleanup: Vec<Step>,

    /// Update step to run last.
    pub update: Option<Step>,

    /// Timeout of any single external call.
    pub timeout: Duration,
}

/// Phase of a maintenance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    AllocatingVersion,
    Snapshotting,
    Retaining,
    Correlating,
    Replicating,
    Updating,
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::AllocatingVersion => "allocating-version",
            Self::Snapshotting => "snapshotting",
            Self::Retaining => "retaining",
            Self::Correlating => "correlating",
            Self::Replicating => "replicating",
            Self::Updating => "updating",
        };
        fmt.write_str(name)
    }
}

/// State of a maintenance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Nothing happened yet.
    Idle,

    /// Given phase is executing.
    At(Phase),

    /// All phases ran.
    Done,
}

impl RunState {
    /// Advance to the next state.
    ///
    /// Always advances regardless of how the current phase went.
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::At(Phase::AllocatingVersion),
            Self::At(Phase::AllocatingVersion) => Self::At(Phase::Snapshotting),
            Self::At(Phase::Snapshotting) => Self::At(Phase::Retaining),
            Self::At(Phase::Retaining) => Self::At(Phase::Correlating),
            Self::At(Phase::Correlating) => Self::At(Phase::Replicating),
            Self::At(Phase::Replicating) => Self::At(Phase::Updating),
            Self::At(Phase::Updating) | Self::Done => Self::Done,
        }
    }
}

/// How a phase went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    Success,
    Partial,
    Failure,
    Skipped,
}

/// Kind of failure a phase ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    AllocationConflict,
    StoreUnavailable,
    TransferFailure,
    LogCorrelationFailure,
}

/// Outcome of one phase of a maintenance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    /// Phase that ran.
    pub phase: Phase,

    /// How the phase went.
    pub status: PhaseStatus,

    /// Human-readable account of what happened.
    pub detail: String,

    /// Kind of failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl PhaseReport {
    fn new(phase: Phase, status: PhaseStatus, detail: impl Into<String>) -> Self {
        Self {
            phase,
            status,
            detail: detail.into(),
            failure: None,
        }
    }

    fn failed(phase: Phase, status: PhaseStatus, error: &MaintenanceError) -> Self {
        warn!("{phase} failed: {error}");
        Self {
            phase,
            status,
            detail: error.to_string(),
            failure: Some(error.kind()),
        }
    }
}

/// Structured record of a whole maintenance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Dataset that was maintained.
    pub dataset: String,

    /// Snapshot identifier the run allocated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,

    /// Whether the run created the snapshot itself.
    pub created: bool,

    /// Local time the run started at.
    pub started_at: String,

    /// Outcome of each phase in order.
    pub phases: Vec<PhaseReport>,

    /// Whether the summary made it into the maintenance log.
    #[serde(skip)]
    pub recorded: bool,
}

impl RunSummary {
    /// Report of given phase.
    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|report| report.phase == phase)
    }

    /// Check if any phase failed, fully or partially.
    pub fn has_failures(&self) -> bool {
        self.phases
            .iter()
            .any(|report| matches!(report.status, PhaseStatus::Failure | PhaseStatus::Partial))
    }

    /// Render summary as TOML.
    pub fn to_toml(&self) -> String {
        toml::ser::to_string_pretty(self).unwrap_or_else(|error| {
            warn!("cannot render run summary: {error}");
            format!("dataset = {:?}\n", self.dataset)
        })
    }
}

/// Preview of what a maintenance run would do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenancePlan {
    /// Snapshot identifier that would be allocated.
    pub snapshot: SnapshotName,

    /// Whether that identifier is already taken.
    pub conflict: bool,

    /// Snapshots that retention would delete, oldest first.
    pub deletions: Vec<SnapshotName>,

    /// What replication would do, if a target is configured.
    pub replication: Option<ReplicationPlan>,
}

impl Display for MaintenancePlan {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        if self.conflict {
            writeln!(fmt, "snapshot: {} (already exists)", self.snapshot)?;
        } else {
            writeln!(fmt, "snapshot: {}", self.snapshot)?;
        }

        if self.deletions.is_empty() {
            writeln!(fmt, "retention: nothing to delete")?;
        } else {
            for name in &self.deletions {
                writeln!(fmt, "retention: delete {name}")?;
            }
        }

        match &self.replication {
            None => writeln!(fmt, "replication: not configured"),
            Some(ReplicationPlan::Skip(reason)) => writeln!(fmt, "replication: skip, {reason}"),
            Some(ReplicationPlan::Transfer(mode)) => writeln!(fmt, "replication: {mode}"),
        }
    }
}

#[derive(Debug, Default)]
struct RunContext {
    allocated: Option<SnapshotName>,
    created: bool,
    present: bool,
    retention: Option<RetentionOutcome>,
}

/// Drive maintenance runs against external stores.
///
/// Keeps no state between runs. Everything is re-derived from the stores
/// each time.
#[derive(Debug)]
pub struct Maintainer<S, R, L, C>
where
    S: SnapshotStore,
    R: ReplicationStore,
    L: LogStore,
    C: Collaborator,
{
    config: MaintenanceConfig,
    snapshots: S,
    replicas: R,
    log: L,
    collaborator: C,
}

impl<S, R, L, C> Maintainer<S, R, L, C>
where
    S: SnapshotStore,
    R: ReplicationStore,
    L: LogStore,
    C: Collaborator,
{
    /// Construct new maintainer.
    pub fn new(config: MaintenanceConfig, snapshots: S, replicas: R, log: L, collaborator: C) -> Self {
        Self {
            config,
            snapshots,
            replicas,
            log,
            collaborator,
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    /// Snapshot store in use.
    pub fn snapshot_store(&self) -> &S {
        &self.snapshots
    }

    /// Log store in use.
    pub fn log_store(&self) -> &L {
        &self.log
    }

    /// Perform maintenance run dated today.
    pub async fn run(&self) -> RunSummary {
        self.run_at(Local::now().date_naive()).await
    }

    /// Perform maintenance run dated at given day.
    ///
    /// Never fails. Every error is recorded in the returned summary.
    #[instrument(skip(self), fields(dataset = %self.config.dataset))]
    pub async fn run_at(&self, date: NaiveDate) -> RunSummary {
        let started_at = Local::now().to_rfc3339();
        let mut context = RunContext::default();
        let mut phases = Vec::new();
        let mut state = RunState::Idle;

        loop {
            state = state.next();
            let RunState::At(phase) = state else {
                break;
            };

            debug!("enter phase {phase}");
            let report = match phase {
                Phase::AllocatingVersion => self.allocate(date, &mut context).await,
                Phase::Snapshotting => self.snapshot(&mut context).await,
                Phase::Retaining => self.retain(&mut context).await,
                Phase::Correlating => self.correlate(&context).await,
                Phase::Replicating => self.replicate(&context).await,
                Phase::Updating => self.update().await,
            };
            info!("{phase}: {:?} ({})", report.status, report.detail);
            phases.push(report);
        }

        let mut summary = RunSummary {
            dataset: self.config.dataset.clone(),
            snapshot: context.allocated.as_ref().map(ToString::to_string),
            created: context.created,
            started_at,
            phases,
            recorded: false,
        };
        summary.recorded = self.record(&summary).await;

        summary
    }

    /// Preview what a maintenance run dated at given day would do.
    ///
    /// # Errors
    ///
    /// - Return [`MaintenanceError::StoreUnavailable`] if the stores cannot
    ///   be inspected.
    /// - Return [`MaintenanceError::DateTag`] if the date tag cannot be
    ///   rendered.
    pub async fn plan_at(&self, date: NaiveDate) -> Result<MaintenancePlan> {
        let existing = self.list(Phase::AllocatingVersion).await?;
        let date_tag = date_tag_for(&self.config.date_format, date)?;
        let snapshot = next_identifier(
            &self.config.naming,
            existing.iter().map(String::as_str),
            &date_tag,
        );
        let conflict = existing.iter().any(|name| *name == snapshot.to_string());

        let mut managed = self.config.naming.managed(existing.iter().map(String::as_str));
        if !conflict {
            managed.push(snapshot.clone());
        }
        let deletions =
            retention::select_for_deletion_sparing(managed, &self.config.retention, &snapshot);

        let replication = match &self.config.replication_target {
            None => None,
            Some(target) => {
                let state = replication::inspect(
                    &self.replicas,
                    target,
                    &self.config.naming,
                    self.config.timeout,
                )
                .await
                .map_err(|source| MaintenanceError::StoreUnavailable {
                    phase: Phase::Replicating,
                    source,
                })?;
                Some(replication::decide(&state, &snapshot))
            }
        };

        Ok(MaintenancePlan {
            snapshot,
            conflict,
            deletions,
            replication,
        })
    }

    /// Compute next snapshot identifier dated at given day.
    ///
    /// # Errors
    ///
    /// - Return [`MaintenanceError::StoreUnavailable`] if listing fails.
    /// - Return [`MaintenanceError::DateTag`] if the date tag cannot be
    ///   rendered.
    pub async fn next_identifier_at(&self, date: NaiveDate) -> Result<SnapshotName> {
        let existing = self.list(Phase::AllocatingVersion).await?;
        let date_tag = date_tag_for(&self.config.date_format, date)?;

        Ok(next_identifier(
            &self.config.naming,
            existing.iter().map(String::as_str),
            &date_tag,
        ))
    }

    /// List raw snapshot names of the managed dataset, managed or not.
    ///
    /// # Errors
    ///
    /// - Return [`MaintenanceError::StoreUnavailable`] if listing fails.
    pub async fn snapshot_names(&self) -> Result<Vec<String>> {
        self.list(Phase::AllocatingVersion).await
    }

    /// Select snapshots that retention would delete right now.
    ///
    /// # Errors
    ///
    /// - Return [`MaintenanceError::StoreUnavailable`] if listing fails.
    pub async fn select_deletions(&self) -> Result<Vec<SnapshotName>> {
        let existing = self.list(Phase::Retaining).await?;
        let managed = self.config.naming.managed(existing.iter().map(String::as_str));

        Ok(retention::select_for_deletion(
            managed,
            &self.config.retention,
        ))
    }

    /// Delete selected snapshots, then purge their log segments.
    ///
    /// Deletion outcome stands regardless of whether the purge succeeded.
    pub async fn delete(
        &self,
        selected: Vec<SnapshotName>,
    ) -> (RetentionOutcome, Result<PurgeReport>) {
        let outcome = retention::enforce(
            &self.snapshots,
            &self.config.dataset,
            selected,
            self.config.timeout,
        )
        .await;

        let deleted = outcome
            .deleted
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        let purge = journal::correlate(&self.log, &deleted, self.config.timeout)
            .await
            .map_err(|source| MaintenanceError::LogCorrelationFailure { source });

        (outcome, purge)
    }

    /// Replicate given snapshot, or the newest managed one.
    ///
    /// # Errors
    ///
    /// - Return [`MaintenanceError::NoReplicationTarget`] if no target is
    ///   configured.
    /// - Return [`MaintenanceError::StoreUnavailable`] if listing fails.
    /// - Return [`MaintenanceError::NoSnapshot`] if there is nothing to
    ///   replicate.
    pub async fn replicate_snapshot(&self, name: Option<&str>) -> Result<ReplicationOutcome> {
        let target = self
            .config
            .replication_target
            .as_deref()
            .ok_or(MaintenanceError::NoReplicationTarget)?;

        let existing = self.list(Phase::Replicating).await?;
        let mut managed = self.config.naming.managed(existing.iter().map(String::as_str));
        let snapshot = match name {
            Some(name) => managed
                .into_iter()
                .find(|managed| managed.to_string() == name),
            None => managed.pop(),
        }
        .ok_or_else(|| MaintenanceError::NoSnapshot {
            dataset: self.config.dataset.clone(),
        })?;

        Ok(replication::replicate(
            &self.replicas,
            &self.config.dataset,
            &snapshot,
            target,
            &self.config.naming,
            self.config.timeout,
        )
        .await)
    }

    async fn list(&self, phase: Phase) -> Result<Vec<String>> {
        let dataset = &self.config.dataset;
        bounded(
            self.config.timeout,
            format!("list snapshots of {dataset}"),
            self.snapshots.list_snapshots(dataset),
        )
        .await
        .map_err(|source| MaintenanceError::StoreUnavailable { phase, source })
    }

    async fn allocate(&self, date: NaiveDate, context: &mut RunContext) -> PhaseReport {
        let phase = Phase::AllocatingVersion;
        match self.next_identifier_at(date).await {
            Ok(name) => {
                let detail = format!("next identifier {name}");
                context.allocated = Some(name);
                PhaseReport::new(phase, PhaseStatus::Success, detail)
            }
            Err(error) => PhaseReport::failed(phase, PhaseStatus::Failure, &error),
        }
    }

    async fn snapshot(&self, context: &mut RunContext) -> PhaseReport {
        let phase = Phase::Snapshotting;
        let Some(name) = &context.allocated else {
            return PhaseReport::new(phase, PhaseStatus::Skipped, "no identifier allocated");
        };

        let dataset = &self.config.dataset;
        let snapshot = name.to_string();
        let result = bounded(
            self.config.timeout,
            format!("create {dataset}@{snapshot}"),
            self.snapshots.create_snapshot(dataset, &snapshot),
        )
        .await;

        match result {
            Ok(()) => {
                context.created = true;
                context.present = true;
                PhaseReport::new(
                    phase,
                    PhaseStatus::Success,
                    format!("created {dataset}@{snapshot}"),
                )
            }
            Err(StoreError::AlreadyExists { .. }) => {
                // INVARIANT: The conflicting snapshot exists, so later phases can still use it.
                context.present = true;
                let error = MaintenanceError::AllocationConflict {
                    dataset: dataset.clone(),
                    name: snapshot,
                };
                PhaseReport::failed(phase, PhaseStatus::Failure, &error)
            }
            Err(source) => {
                let error = MaintenanceError::StoreUnavailable { phase, source };
                PhaseReport::failed(phase, PhaseStatus::Failure, &error)
            }
        }
    }

    async fn retain(&self, context: &mut RunContext) -> PhaseReport {
        let phase = Phase::Retaining;
        let existing = match self.list(phase).await {
            Ok(existing) => existing,
            Err(error) => return PhaseReport::failed(phase, PhaseStatus::Failure, &error),
        };

        // INVARIANT: Never rotate out the snapshot this run just allocated.
        let managed = self.config.naming.managed(existing.iter().map(String::as_str));
        let selected = match context.allocated.as_ref().filter(|_| context.present) {
            Some(allocated) => {
                retention::select_for_deletion_sparing(managed, &self.config.retention, allocated)
            }
            None => retention::select_for_deletion(managed, &self.config.retention),
        };

        if selected.is_empty() {
            context.retention = Some(RetentionOutcome::default());
            return PhaseReport::new(phase, PhaseStatus::Success, "within retention window");
        }

        let outcome = retention::enforce(
            &self.snapshots,
            &self.config.dataset,
            selected,
            self.config.timeout,
        )
        .await;

        let deleted = join_names(&outcome.deleted);
        let report = if outcome.is_complete() {
            PhaseReport::new(phase, PhaseStatus::Success, format!("deleted {deleted}"))
        } else {
            let failed = outcome
                .failed
                .iter()
                .map(|(name, error)| format!("{name} ({error})"))
                .collect::<Vec<_>>()
                .join(", ");
            let status = if outcome.deleted.is_empty() {
                PhaseStatus::Failure
            } else {
                PhaseStatus::Partial
            };
            let mut report = PhaseReport::new(
                phase,
                status,
                format!("deleted [{deleted}], could not delete [{failed}]"),
            );
            report.failure = Some(FailureKind::StoreUnavailable);
            report
        };
        context.retention = Some(outcome);

        report
    }

    async fn correlate(&self, context: &RunContext) -> PhaseReport {
        let phase = Phase::Correlating;
        let Some(outcome) = &context.retention else {
            return PhaseReport::new(phase, PhaseStatus::Skipped, "retention did not run");
        };

        if outcome.deleted.is_empty() {
            return PhaseReport::new(phase, PhaseStatus::Skipped, "no snapshot was deleted");
        }

        let deleted = outcome
            .deleted
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        match journal::correlate(&self.log, &deleted, self.config.timeout).await {
            Ok(report) => PhaseReport::new(
                phase,
                PhaseStatus::Success,
                format!("purged {} log segments", report.removed.len()),
            ),
            Err(source) => {
                let error = MaintenanceError::LogCorrelationFailure { source };
                PhaseReport::failed(phase, PhaseStatus::Failure, &error)
            }
        }
    }

    async fn replicate(&self, context: &RunContext) -> PhaseReport {
        let phase = Phase::Replicating;
        let Some(target) = &self.config.replication_target else {
            return PhaseReport::new(phase, PhaseStatus::Skipped, "no replication target configured");
        };

        let Some(name) = context.allocated.as_ref().filter(|_| context.present) else {
            return PhaseReport::new(phase, PhaseStatus::Skipped, "no snapshot to replicate");
        };

        let outcome = replication::replicate(
            &self.replicas,
            &self.config.dataset,
            name,
            target,
            &self.config.naming,
            self.config.timeout,
        )
        .await;

        match outcome {
            ReplicationOutcome::Replicated(_) => {
                PhaseReport::new(phase, PhaseStatus::Success, outcome.to_string())
            }
            ReplicationOutcome::Skipped(_) => {
                PhaseReport::new(phase, PhaseStatus::Skipped, outcome.to_string())
            }
            ReplicationOutcome::Failed { mode: None, error } => {
                let error = MaintenanceError::StoreUnavailable {
                    phase,
                    source: error,
                };
                PhaseReport::failed(phase, PhaseStatus::Failure, &error)
            }
            ReplicationOutcome::Failed {
                mode: Some(_),
                error,
            } => {
                let error = MaintenanceError::TransferFailure {
                    target: target.clone(),
                    source: error,
                };
                PhaseReport::failed(phase, PhaseStatus::Failure, &error)
            }
        }
    }

    async fn update(&self) -> PhaseReport {
        let phase = Phase::Updating;
        let steps = self
            .config
            .cleanup
            .iter()
            .chain(self.config.update.iter())
            .collect::<Vec<_>>();
        if steps.is_empty() {
            return PhaseReport::new(phase, PhaseStatus::Skipped, "no steps configured");
        }

        let mut results = Vec::new();
        for step in steps {
            let ok = tokio::time::timeout(self.config.timeout, self.collaborator.run_step(step))
                .await
                .unwrap_or_else(|_| {
                    warn!("step {:?} timed out after {:?}", step.name, self.config.timeout);
                    false
                });
            results.push((step.name.as_str(), ok));
        }

        let passed = results.iter().filter(|(_, ok)| *ok).count();
        let status = match passed {
            0 => PhaseStatus::Failure,
            passed if passed == results.len() => PhaseStatus::Success,
            _ => PhaseStatus::Partial,
        };
        let detail = results
            .iter()
            .map(|(name, ok)| format!("{name}: {}", if *ok { "ok" } else { "failed" }))
            .collect::<Vec<_>>()
            .join(", ");

        PhaseReport::new(phase, status, detail)
    }

    async fn record(&self, summary: &RunSummary) -> bool {
        let Some(name) = &summary.snapshot else {
            warn!("{}", unrecorded_notice(summary));
            return false;
        };

        let segment = journal::segment(name, &summary.to_toml());
        let result = bounded(
            self.config.timeout,
            "append maintenance log",
            self.log.append(&segment),
        )
        .await;

        match result {
            Ok(()) => true,
            Err(error) => {
                warn!("cannot record run in maintenance log: {error}");
                warn!("{}", unrecorded_notice(summary));
                false
            }
        }
    }
}

fn unrecorded_notice(summary: &RunSummary) -> String {
    format!(
        "run of {} is not recorded in maintenance log, summary follows:\n{}",
        summary.dataset,
        summary.to_toml()
    )
}

fn join_names(names: &[SnapshotName]) -> String {
    names
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// All possible error types of a maintenance run.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    /// Allocated identifier is already taken.
    #[error("snapshot {dataset}@{name} already exists")]
    AllocationConflict { dataset: String, name: String },

    /// External store call failed or timed out.
    #[error("store unavailable while {phase}")]
    StoreUnavailable {
        phase: Phase,
        #[source]
        source: StoreError,
    },

    /// Sending snapshot into replication target failed.
    #[error("transfer into {target:?} failed")]
    TransferFailure {
        target: String,
        #[source]
        source: StoreError,
    },

    /// Maintenance log could not be purged.
    #[error("log correlation failed")]
    LogCorrelationFailure {
        #[source]
        source: StoreError,
    },

    /// Date tag cannot be rendered.
    #[error(transparent)]
    DateTag(#[from] DateTagError),

    /// No replication target is configured.
    #[error("no replication target configured")]
    NoReplicationTarget,

    /// No managed snapshot to work with.
    #[error("no managed snapshot found for {dataset}")]
    NoSnapshot { dataset: String },
}

impl MaintenanceError {
    /// Kind of failure as recorded in run summaries.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AllocationConflict { .. } => FailureKind::AllocationConflict,
            Self::TransferFailure { .. } => FailureKind::TransferFailure,
            Self::LogCorrelationFailure { .. } => FailureKind::LogCorrelationFailure,
            Self::StoreUnavailable { .. }
            | Self::DateTag(_)
            | Self::NoReplicationTarget
            | Self::NoSnapshot { .. } => FailureKind::StoreUnavailable,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = MaintenanceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn state_machine_visits_every_phase_in_order() {
        let mut state = RunState::Idle;
        let mut visited = Vec::new();
        loop {
            state = state.next();
            match state {
                RunState::At(phase) => visited.push(phase),
                RunState::Done => break,
                RunState::Idle => unreachable!(),
            }
        }

        assert_eq!(
            visited,
            vec![
                Phase::AllocatingVersion,
                Phase::Snapshotting,
                Phase::Retaining,
                Phase::Correlating,
                Phase::Replicating,
                Phase::Updating,
            ]
        );
        assert_eq!(RunState::Done.next(), RunState::Done);
    }

    #[test]
    fn summary_renders_as_toml() {
        let summary = RunSummary {
            dataset: "tank/data".into(),
            snapshot: Some("snap-2105-n1".into()),
            created: true,
            started_at: "2021-05-21T00:00:00+00:00".into(),
            phases: vec![
                PhaseReport::new(Phase::Snapshotting, PhaseStatus::Success, "created"),
                PhaseReport {
                    phase: Phase::Replicating,
                    status: PhaseStatus::Failure,
                    detail: "transfer failed".into(),
                    failure: Some(FailureKind::TransferFailure),
                },
            ],
            recorded: false,
        };

        let result: toml::Table = toml::from_str(&summary.to_toml()).unwrap();
        assert_eq!(result["dataset"].as_str(), Some("tank/data"));
        assert_eq!(result["snapshot"].as_str(), Some("snap-2105-n1"));

        let phases = result["phases"].as_array().unwrap();
        assert_eq!(phases[0]["phase"].as_str(), Some("snapshotting"));
        assert_eq!(phases[0].get("failure"), None);
        assert_eq!(phases[1]["status"].as_str(), Some("failure"));
        assert_eq!(phases[1]["failure"].as_str(), Some("transfer-failure"));
        assert!(summary.has_failures());
        assert_eq!(result.get("recorded"), None);
    }

    #[test]
    fn unrecorded_notice_carries_full_summary() {
        let summary = RunSummary {
            dataset: "tank/data".into(),
            snapshot: None,
            created: false,
            started_at: "2021-05-21T00:00:00+00:00".into(),
            phases: vec![PhaseReport::new(
                Phase::AllocatingVersion,
                PhaseStatus::Failure,
                "store unavailable",
            )],
            recorded: false,
        };

        let notice = unrecorded_notice(&summary);
        let (_, body) = notice.split_once('\n').unwrap();
        let result: toml::Table = toml::from_str(body).unwrap();
        assert_eq!(result["dataset"].as_str(), Some("tank/data"));
        assert_eq!(result["phases"].as_array().unwrap().len(), 1);
    }
}
