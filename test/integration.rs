// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    run_date, sequence_config, weekly_config, FakeLog, FakeSteps, FakeZfs, Transfer, DATASET,
    TARGET,
};

use snapkeeper::{
    journal,
    maintain::{
        FailureKind, MaintenanceConfig, MaintenanceError, Maintainer, Phase, PhaseStatus,
        RunSummary,
    },
    replication::{ReplicationOutcome, ReplicationPlan, TransferMode},
    store::Step,
};

use anyhow::Result;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::time::Duration;

type FakeMaintainer = Maintainer<FakeZfs, FakeZfs, FakeLog, FakeSteps>;

fn maintainer(
    config: MaintenanceConfig,
    zfs: &FakeZfs,
    log: &FakeLog,
    steps: &FakeSteps,
) -> FakeMaintainer {
    Maintainer::new(config, zfs.clone(), zfs.clone(), log.clone(), steps.clone())
}

fn sequence(range: std::ops::RangeInclusive<u32>) -> Vec<String> {
    range.map(|k| format!("snap-2105-n{k}")).collect()
}

fn as_strs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}

fn log_of(names: &[String]) -> String {
    names
        .iter()
        .map(|name| journal::segment(name, "created = true\n"))
        .collect()
}

fn status(summary: &RunSummary, phase: Phase) -> PhaseStatus {
    summary.phase(phase).unwrap().status
}

fn failure(summary: &RunSummary, phase: Phase) -> Option<FailureKind> {
    summary.phase(phase).unwrap().failure
}

#[tokio::test]
async fn fresh_dataset_gets_first_snapshot_and_full_replication() -> Result<()> {
    let zfs = FakeZfs::new()
        .with_dataset(DATASET, &[])
        .with_dataset(TARGET, &[]);
    let log = FakeLog::default();
    let steps = FakeSteps::default();

    let summary = maintainer(sequence_config(5), &zfs, &log, &steps)
        .run_at(run_date())
        .await;

    assert_eq!(summary.snapshot.as_deref(), Some("snap-2105-n1"));
    assert!(summary.created);
    assert!(!summary.has_failures());
    assert_eq!(zfs.snapshots(DATASET), vec!["snap-2105-n1"]);
    assert_eq!(
        zfs.transfers(),
        vec![Transfer {
            name: "snap-2105-n1".into(),
            base: None,
            target: TARGET.into(),
        }]
    );
    assert_eq!(status(&summary, Phase::Correlating), PhaseStatus::Skipped);
    assert_eq!(status(&summary, Phase::Updating), PhaseStatus::Skipped);
    assert_eq!(journal::segments(&log.content()), vec!["snap-2105-n1"]);
    assert!(log.content().contains("dataset = \"tank/data\""));
    assert!(summary.recorded);

    Ok(())
}

#[tokio::test]
async fn full_window_rotates_oldest_snapshot_and_its_log_segment() -> Result<()> {
    let existing = sequence(1..=5);
    let zfs = FakeZfs::new()
        .with_dataset(DATASET, &as_strs(&existing))
        .with_dataset(TARGET, &["snap-2105-n4", "snap-2105-n5"]);
    let log = FakeLog::new(&log_of(&existing));
    let steps = FakeSteps::default();

    let summary = maintainer(sequence_config(5), &zfs, &log, &steps)
        .run_at(run_date())
        .await;

    assert_eq!(summary.snapshot.as_deref(), Some("snap-2105-n6"));
    assert_eq!(zfs.snapshots(DATASET), sequence(2..=6));
    assert_eq!(status(&summary, Phase::Retaining), PhaseStatus::Success);
    assert_eq!(status(&summary, Phase::Correlating), PhaseStatus::Success);
    assert_eq!(journal::segments(&log.content()), sequence(2..=6));
    assert_eq!(
        zfs.transfers(),
        vec![Transfer {
            name: "snap-2105-n6".into(),
            base: Some("snap-2105-n5".into()),
            target: TARGET.into(),
        }]
    );
    assert_eq!(zfs.snapshots(TARGET), sequence(4..=6));

    Ok(())
}

#[tokio::test]
async fn prune_deletes_oldest_excess_first() -> Result<()> {
    let existing = sequence(1..=7);
    let zfs = FakeZfs::new().with_dataset(DATASET, &as_strs(&existing));
    let log = FakeLog::new(&log_of(&existing));
    let steps = FakeSteps::default();
    let maintainer = maintainer(sequence_config(5), &zfs, &log, &steps);

    let selected = maintainer.select_deletions().await?;
    let rendered = selected.iter().map(ToString::to_string).collect::<Vec<_>>();
    assert_eq!(rendered, sequence(1..=2));

    let (outcome, purge) = maintainer.delete(selected).await;
    assert!(outcome.is_complete());
    assert_eq!(purge?.removed, sequence(1..=2));
    assert_eq!(zfs.snapshots(DATASET), sequence(3..=7));
    assert_eq!(journal::segments(&log.content()), sequence(3..=7));

    assert!(maintainer.select_deletions().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn creation_conflict_still_runs_later_phases() -> Result<()> {
    let existing = sequence(1..=5);
    let zfs = FakeZfs::new()
        .with_dataset(DATASET, &as_strs(&existing))
        .with_dataset(TARGET, &["snap-2105-n5"]);
    zfs.race_creation();
    let log = FakeLog::new(&log_of(&existing));
    let steps = FakeSteps::new(&[("autoclean", true)]);
    let mut config = sequence_config(5);
    config.cleanup = vec![Step::new("autoclean", ["apt-get", "autoclean"])];

    let summary = maintainer(config, &zfs, &log, &steps)
        .run_at(run_date())
        .await;

    assert!(!summary.created);
    assert_eq!(status(&summary, Phase::Snapshotting), PhaseStatus::Failure);
    assert_eq!(
        failure(&summary, Phase::Snapshotting),
        Some(FailureKind::AllocationConflict)
    );
    assert_eq!(status(&summary, Phase::Retaining), PhaseStatus::Success);
    assert_eq!(status(&summary, Phase::Correlating), PhaseStatus::Success);
    assert_eq!(status(&summary, Phase::Replicating), PhaseStatus::Success);
    assert_eq!(status(&summary, Phase::Updating), PhaseStatus::Success);
    assert_eq!(zfs.snapshots(DATASET), sequence(2..=6));
    assert_eq!(zfs.transfers().len(), 1);
    assert_eq!(zfs.transfers()[0].base.as_deref(), Some("snap-2105-n5"));
    assert_eq!(steps.ran(), vec!["autoclean"]);

    Ok(())
}

#[tokio::test]
async fn failed_deletion_leaves_partial_retention() -> Result<()> {
    let existing = sequence(1..=7);
    let zfs = FakeZfs::new().with_dataset(DATASET, &as_strs(&existing));
    zfs.break_destroy("snap-2105-n2");
    let log = FakeLog::new(&log_of(&existing));
    let steps = FakeSteps::default();

    let summary = maintainer(sequence_config(5), &zfs, &log, &steps)
        .run_at(run_date())
        .await;

    assert_eq!(status(&summary, Phase::Retaining), PhaseStatus::Partial);
    assert!(summary.has_failures());

    let mut expect = vec!["snap-2105-n2".to_string()];
    expect.extend(sequence(4..=8));
    assert_eq!(zfs.snapshots(DATASET), expect);
    assert_eq!(journal::segments(&log.content()), expect);

    Ok(())
}

#[tokio::test]
async fn absent_target_skips_replication() -> Result<()> {
    let zfs = FakeZfs::new().with_dataset(DATASET, &["snap-2105-n1"]);
    let log = FakeLog::default();
    let steps = FakeSteps::default();

    let summary = maintainer(sequence_config(5), &zfs, &log, &steps)
        .run_at(run_date())
        .await;

    assert_eq!(status(&summary, Phase::Replicating), PhaseStatus::Skipped);
    assert!(zfs.transfers().is_empty());
    assert!(!summary.has_failures());

    Ok(())
}

#[tokio::test]
async fn transfer_failure_is_reported_and_updates_still_run() -> Result<()> {
    let zfs = FakeZfs::new()
        .with_dataset(DATASET, &[])
        .with_dataset(TARGET, &[]);
    zfs.break_transfer();
    let log = FakeLog::default();
    let steps = FakeSteps::new(&[("autoclean", true), ("upgrade", false)]);
    let mut config = sequence_config(5);
    config.cleanup = vec![Step::new("autoclean", ["apt-get", "autoclean"])];
    config.update = Some(Step::new("upgrade", ["apt-get", "-y", "full-upgrade"]));

    let summary = maintainer(config, &zfs, &log, &steps)
        .run_at(run_date())
        .await;

    assert_eq!(status(&summary, Phase::Replicating), PhaseStatus::Failure);
    assert_eq!(
        failure(&summary, Phase::Replicating),
        Some(FailureKind::TransferFailure)
    );
    assert_eq!(status(&summary, Phase::Updating), PhaseStatus::Partial);
    assert_eq!(steps.ran(), vec!["autoclean", "upgrade"]);
    assert_eq!(zfs.snapshots(DATASET), vec!["snap-2105-n1"]);

    Ok(())
}

#[tokio::test]
async fn stuck_listing_times_out_without_aborting_run() -> Result<()> {
    let zfs = FakeZfs::new().with_dataset(DATASET, &["snap-2105-n1"]);
    zfs.stick_listing();
    let log = FakeLog::default();
    let steps = FakeSteps::default();
    let mut config = sequence_config(5);
    config.timeout = Duration::from_millis(50);

    let summary = maintainer(config, &zfs, &log, &steps)
        .run_at(run_date())
        .await;

    assert_eq!(summary.snapshot, None);
    assert_eq!(summary.phases.len(), 6);
    assert_eq!(
        failure(&summary, Phase::AllocatingVersion),
        Some(FailureKind::StoreUnavailable)
    );
    assert_eq!(status(&summary, Phase::Snapshotting), PhaseStatus::Skipped);
    assert_eq!(status(&summary, Phase::Retaining), PhaseStatus::Failure);
    assert_eq!(status(&summary, Phase::Correlating), PhaseStatus::Skipped);
    assert_eq!(status(&summary, Phase::Replicating), PhaseStatus::Skipped);
    assert_eq!(zfs.snapshots(DATASET), vec!["snap-2105-n1"]);
    assert_eq!(log.content(), "");
    assert!(!summary.recorded);

    Ok(())
}

#[tokio::test]
async fn log_rewrite_failure_keeps_deletions() -> Result<()> {
    let existing = sequence(1..=5);
    let zfs = FakeZfs::new().with_dataset(DATASET, &as_strs(&existing));
    let log = FakeLog::new(&log_of(&existing));
    log.break_rewrite();
    let steps = FakeSteps::default();

    let summary = maintainer(sequence_config(5), &zfs, &log, &steps)
        .run_at(run_date())
        .await;

    assert_eq!(status(&summary, Phase::Retaining), PhaseStatus::Success);
    assert_eq!(
        failure(&summary, Phase::Correlating),
        Some(FailureKind::LogCorrelationFailure)
    );
    assert_eq!(zfs.snapshots(DATASET), sequence(2..=6));

    let mut expect = existing.clone();
    expect.push("snap-2105-n6".into());
    assert_eq!(journal::segments(&log.content()), expect);

    Ok(())
}

#[tokio::test]
async fn weekly_identifier_carries_into_major() -> Result<()> {
    let zfs = FakeZfs::new().with_dataset(
        DATASET,
        &["weekly-0514-v3.2", "weekly-0521-v1.8", "weekly-0521-v1.9", "manual"],
    );
    let log = FakeLog::default();
    let steps = FakeSteps::default();
    let maintainer = maintainer(weekly_config(5), &zfs, &log, &steps);

    let name = maintainer.next_identifier_at(run_date()).await?;
    assert_eq!(name.to_string(), "weekly-0521-v2.0");

    let summary = maintainer.run_at(run_date()).await;
    assert_eq!(summary.snapshot.as_deref(), Some("weekly-0521-v2.0"));
    assert!(zfs.snapshots(DATASET).contains(&"manual".to_string()));

    Ok(())
}

#[tokio::test]
async fn new_year_rotates_december_not_january() -> Result<()> {
    let december = ["20211203", "20211210", "20211217", "20211224", "20211231"]
        .map(|date| format!("weekly-{date}-v1.0"));
    let zfs = FakeZfs::new()
        .with_dataset(DATASET, &as_strs(&december))
        .with_dataset(TARGET, &["weekly-20211231-v1.0"]);
    let log = FakeLog::new(&log_of(&december));
    let steps = FakeSteps::default();
    let config = MaintenanceConfig {
        date_format: "%Y%m%d".into(),
        ..weekly_config(5)
    };

    let summary = maintainer(config, &zfs, &log, &steps)
        .run_at(NaiveDate::from_ymd_opt(2022, 1, 7).unwrap())
        .await;

    assert_eq!(summary.snapshot.as_deref(), Some("weekly-20220107-v1.0"));
    assert!(summary.created);
    assert!(!summary.has_failures());

    let mut expect = december[1..].to_vec();
    expect.push("weekly-20220107-v1.0".into());
    assert_eq!(zfs.snapshots(DATASET), expect);
    assert_eq!(journal::segments(&log.content()), expect);
    assert_eq!(
        zfs.transfers(),
        vec![Transfer {
            name: "weekly-20220107-v1.0".into(),
            base: Some("weekly-20211231-v1.0".into()),
            target: TARGET.into(),
        }]
    );

    Ok(())
}

#[tokio::test]
async fn retention_never_rotates_snapshot_just_taken() -> Result<()> {
    let december = ["1203", "1210", "1217", "1224", "1231"].map(|date| format!("weekly-{date}-v1.0"));
    let zfs = FakeZfs::new().with_dataset(DATASET, &as_strs(&december));
    let log = FakeLog::default();
    let steps = FakeSteps::default();

    let summary = maintainer(weekly_config(5), &zfs, &log, &steps)
        .run_at(NaiveDate::from_ymd_opt(2022, 1, 7).unwrap())
        .await;

    assert_eq!(summary.snapshot.as_deref(), Some("weekly-0107-v1.0"));
    assert_eq!(status(&summary, Phase::Retaining), PhaseStatus::Success);

    let snapshots = zfs.snapshots(DATASET);
    assert!(snapshots.contains(&"weekly-0107-v1.0".to_string()));
    assert!(!snapshots.contains(&"weekly-1203-v1.0".to_string()));
    assert_eq!(snapshots.len(), 5);

    Ok(())
}

#[tokio::test]
async fn rotated_out_base_fails_transfer_and_updates_still_run() -> Result<()> {
    let existing = sequence(3..=7);
    let zfs = FakeZfs::new()
        .with_dataset(DATASET, &as_strs(&existing))
        .with_dataset(TARGET, &["snap-2105-n1"]);
    let log = FakeLog::new(&log_of(&existing));
    let steps = FakeSteps::new(&[("upgrade", true)]);
    let mut config = sequence_config(5);
    config.update = Some(Step::new("upgrade", ["apt-get", "-y", "full-upgrade"]));

    let summary = maintainer(config, &zfs, &log, &steps)
        .run_at(run_date())
        .await;

    assert_eq!(summary.snapshot.as_deref(), Some("snap-2105-n8"));
    assert_eq!(status(&summary, Phase::Replicating), PhaseStatus::Failure);
    assert_eq!(
        failure(&summary, Phase::Replicating),
        Some(FailureKind::TransferFailure)
    );
    assert!(zfs.transfers().is_empty());
    assert_eq!(zfs.snapshots(TARGET), vec!["snap-2105-n1"]);
    assert_eq!(status(&summary, Phase::Updating), PhaseStatus::Success);
    assert_eq!(steps.ran(), vec!["upgrade"]);
    assert_eq!(zfs.snapshots(DATASET), sequence(4..=8));

    Ok(())
}

#[tokio::test]
async fn plan_mutates_nothing() -> Result<()> {
    let existing = sequence(1..=5);
    let zfs = FakeZfs::new()
        .with_dataset(DATASET, &as_strs(&existing))
        .with_dataset(TARGET, &["snap-2105-n5"]);
    let log = FakeLog::new(&log_of(&existing));
    let steps = FakeSteps::default();

    let plan = maintainer(sequence_config(5), &zfs, &log, &steps)
        .plan_at(run_date())
        .await?;

    assert_eq!(plan.snapshot.to_string(), "snap-2105-n6");
    assert!(!plan.conflict);
    let deletions = plan.deletions.iter().map(ToString::to_string).collect::<Vec<_>>();
    assert_eq!(deletions, vec!["snap-2105-n1"]);
    assert!(matches!(
        plan.replication,
        Some(ReplicationPlan::Transfer(TransferMode::Incremental { .. }))
    ));

    assert_eq!(zfs.snapshots(DATASET), existing);
    assert!(zfs.transfers().is_empty());
    assert_eq!(log.content(), log_of(&existing));
    assert!(steps.ran().is_empty());

    Ok(())
}

#[tokio::test]
async fn manual_replication_catches_target_up() -> Result<()> {
    let zfs = FakeZfs::new()
        .with_dataset(DATASET, &as_strs(&sequence(1..=3)))
        .with_dataset(TARGET, &["snap-2105-n1"]);
    let log = FakeLog::default();
    let steps = FakeSteps::default();
    let maintainer = maintainer(sequence_config(5), &zfs, &log, &steps);

    let outcome = maintainer.replicate_snapshot(None).await?;
    assert!(matches!(outcome, ReplicationOutcome::Replicated(TransferMode::Incremental { .. })));
    assert_eq!(zfs.snapshots(TARGET), vec!["snap-2105-n1", "snap-2105-n3"]);

    let outcome = maintainer.replicate_snapshot(Some("snap-2105-n2")).await?;
    assert!(matches!(outcome, ReplicationOutcome::Skipped(_)));

    Ok(())
}

#[tokio::test]
async fn manual_replication_needs_target() -> Result<()> {
    let zfs = FakeZfs::new().with_dataset(DATASET, &["snap-2105-n1"]);
    let log = FakeLog::default();
    let steps = FakeSteps::default();
    let mut config = sequence_config(5);
    config.replication_target = None;

    let result = maintainer(config, &zfs, &log, &steps)
        .replicate_snapshot(None)
        .await;
    assert!(matches!(result, Err(MaintenanceError::NoReplicationTarget)));

    Ok(())
}
