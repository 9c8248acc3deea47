// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Snapshot identifier allocation.
//!
//! Compute the name of the next snapshot to take from the set of snapshots
//! that already exist. Allocation is a pure function of its inputs, so it can
//! be computed before any mutation happens, and re-derived afterwards to
//! verify what a run did.

use crate::naming::{NamingScheme, SnapshotName};

use chrono::NaiveDate;
use std::fmt::Write;

/// Compute the next snapshot identifier.
///
/// Only managed names that carry `date_tag` are considered. If none exist,
/// a fresh sequence starts at the scheme's base tag. Otherwise, the
/// numerically greatest tag is bumped.
pub fn next_identifier<'a>(
    scheme: &NamingScheme,
    existing: impl IntoIterator<Item = &'a str>,
    date_tag: &str,
) -> SnapshotName {
    let tag_scheme = scheme.tag_scheme();
    let tag = existing
        .into_iter()
        .filter_map(|name| scheme.parse(name))
        .filter(|name| name.date_tag() == date_tag)
        .map(|name| name.tag())
        .max()
        .map(|tag| tag.bump(tag_scheme))
        .unwrap_or_else(|| tag_scheme.base());

    scheme.format(date_tag, tag)
}

/// Render date tag for a given date.
///
/// # Errors
///
/// - Return [`DateTagError::Invalid`] if the format is malformed, or renders
///   anything other than a non-empty run of ASCII digits.
pub fn date_tag_for(format: &str, date: NaiveDate) -> Result<String> {
    let mut date_tag = String::new();

    // INVARIANT: chrono reports malformed format strings through fmt::Error.
    write!(date_tag, "{}", date.format(format)).map_err(|_| DateTagError::Invalid {
        format: format.to_string(),
    })?;

    if date_tag.is_empty() || !date_tag.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(DateTagError::Invalid {
            format: format.to_string(),
        });
    }

    Ok(date_tag)
}

/// Date tag cannot be rendered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateTagError {
    /// Date format does not render a digit-only date tag.
    #[error("date format {format:?} does not render a digit-only date tag")]
    Invalid { format: String },
}

/// Friendly result alias :3
type Result<T, E = DateTagError> = std::result::Result<T, E>;
