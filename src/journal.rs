// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Maintenance log segments.
//!
//! Every maintenance run appends exactly one __segment__ to the maintenance
//! log. A segment is a contiguous block of lines that opens with a start
//! marker, and closes with an end marker, both naming the snapshot that the
//! run allocated:
//!
//! ```text
//! >>> snapkeeper run weekly-0521-v1.0
//! ...
//! <<< snapkeeper run weekly-0521-v1.0
//! ```
//!
//! A segment lives exactly as long as its snapshot. Once retention destroys
//! a snapshot, its segment is purged from the log as well.
//!
//! # Marker Matching
//!
//! Markers are matched by whole-line equality on the snapshot name. A purge
//! of `weekly-0521-v1.0` never touches a segment for `weekly-0521-v1.0-old`.
//! A start marker without a matching end marker is left alone, because
//! removing it would mean guessing where the segment ends.

use crate::store::{bounded, LogStore, Result};

use std::{collections::HashSet, time::Duration};
use tracing::{debug, info, warn};

const START_MARKER: &str = ">>> snapkeeper run ";
const END_MARKER: &str = "<<< snapkeeper run ";

/// Format start marker line of segment.
pub fn start_marker(name: &str) -> String {
    format!("{START_MARKER}{name}")
}

/// Format end marker line of segment.
pub fn end_marker(name: &str) -> String {
    format!("{END_MARKER}{name}")
}

/// Format full segment for a run.
///
/// Body is placed between the markers verbatim, with a trailing newline
/// added if it lacks one.
pub fn segment(name: &str, body: &str) -> String {
    let mut out = String::new();
    out.push_str(&start_marker(name));
    out.push('\n');
    out.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&end_marker(name));
    out.push('\n');
    out
}

/// Result of purging segments out of a log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    /// Log content after purge.
    pub content: String,

    /// Names whose segments were removed, in log order.
    pub removed: Vec<String>,
}

impl PurgeReport {
    /// Check if purge changed anything.
    pub fn is_changed(&self) -> bool {
        !self.removed.is_empty()
    }
}

/// Remove all complete segments of deleted snapshots from log.
pub fn purge<'a>(log: &str, deleted: impl IntoIterator<Item = &'a str>) -> PurgeReport {
    let deleted = deleted.into_iter().collect::<HashSet<_>>();
    let lines = log.split_inclusive('\n').collect::<Vec<_>>();
    let mut report = PurgeReport::default();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        let closing = marker_name(line, START_MARKER)
            .filter(|name| deleted.contains(name))
            .and_then(|name| {
                lines[index + 1..]
                    .iter()
                    .position(|line| marker_name(line, END_MARKER) == Some(name))
                    .map(|offset| (name, index + 1 + offset))
            });

        match closing {
            Some((name, end)) => {
                debug!("purge segment {name:?} spanning lines {index}..={end}");
                report.removed.push(name.to_string());
                index = end + 1;
            }
            None => {
                report.content.push_str(line);
                index += 1;
            }
        }
    }

    report
}

/// List names of every complete segment in log, in log order.
pub fn segments(log: &str) -> Vec<String> {
    let lines = log.lines().collect::<Vec<_>>();
    let mut names = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let closing = marker_name(lines[index], START_MARKER).and_then(|name| {
            lines[index + 1..]
                .iter()
                .position(|line| marker_name(line, END_MARKER) == Some(name))
                .map(|offset| (name, index + 1 + offset))
        });

        match closing {
            Some((name, end)) => {
                names.push(name.to_string());
                index = end + 1;
            }
            None => index += 1,
        }
    }

    names
}

/// Purge segments of deleted snapshots from a log store.
///
/// The log is read once, and rewritten once as a whole, only if anything
/// was removed.
///
/// # Errors
///
/// - Return [`StoreError`](crate::store::StoreError) if the log cannot be
///   read or rewritten in time.
pub async fn correlate<L>(
    store: &L,
    deleted: &[String],
    timeout: Duration,
) -> Result<PurgeReport>
where
    L: LogStore,
{
    if deleted.is_empty() {
        return Ok(PurgeReport::default());
    }

    let log = bounded(timeout, "read maintenance log", store.read()).await?;
    let report = purge(&log, deleted.iter().map(String::as_str));

    let missing = deleted
        .iter()
        .filter(|name| !report.removed.contains(name))
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        warn!("no complete log segment found for {missing:?}");
    }

    if report.is_changed() {
        bounded(
            timeout,
            "rewrite maintenance log",
            store.rewrite(&report.content),
        )
        .await?;
        info!("purged {} log segments", report.removed.len());
    }

    Ok(report)
}

fn marker_name<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.trim_end_matches(['\n', '\r']).strip_prefix(marker)
}
