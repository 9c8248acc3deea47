// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Snapshot naming scheme.
//!
//! Every snapshot that snapkeeper manages carries a name of the form
//! `<prefix>-<date_tag>-<version_tag>`. The __prefix__ scopes which snapshots
//! snapkeeper is allowed to touch at all. The __date tag__ is a run of digits
//! rendered from the local date at allocation time. The __version tag__
//! distinguishes multiple snapshots taken under the same date tag.
//!
//! # Version Tag Shapes
//!
//! Two shapes are supported, selected through [`TagScheme`]:
//!
//! - `v<major>.<minor>`: bumping increments the minor counter until it
//!   reaches a carry threshold, at which point minor resets to zero and the
//!   major counter increments, e.g., `v1.9` bumps to `v2.0` with a carry of
//!   ten.
//! - `n<k>`: a flat sequence that bumps by one with no carry.
//!
//! # Ordering
//!
//! Snapshot names are ordered by their parsed numeric components, never by
//! string comparison. Thus, `n10` sorts after `n2`, and `v1.10` sorts after
//! `v1.9`. Names that do not parse under the active naming scheme are
//! foreign, and are invisible to allocation, retention, and replication.

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Default carry threshold for `v<major>.<minor>` tags.
pub const DEFAULT_CARRY: u64 = 10;

/// Shape of the version tag at the end of a snapshot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScheme {
    /// Tags of the form `v<major>.<minor>`.
    MajorMinor {
        /// Minor value that triggers a carry into the major counter.
        carry: u64,
    },

    /// Tags of the form `n<k>`.
    Sequence,
}

impl TagScheme {
    /// First version tag of a fresh sequence.
    pub fn base(&self) -> VersionTag {
        match self {
            Self::MajorMinor { .. } => VersionTag::MajorMinor { major: 1, minor: 0 },
            Self::Sequence => VersionTag::Sequence(1),
        }
    }

    /// Parse version tag text under this scheme.
    ///
    /// Returns `None` if the text does not have this scheme's shape.
    pub fn parse_tag(&self, text: &str) -> Option<VersionTag> {
        match self {
            Self::MajorMinor { .. } => {
                let (major, minor) = text.strip_prefix('v')?.split_once('.')?;
                Some(VersionTag::MajorMinor {
                    major: parse_counter(major)?,
                    minor: parse_counter(minor)?,
                })
            }
            Self::Sequence => Some(VersionTag::Sequence(parse_counter(
                text.strip_prefix('n')?,
            )?)),
        }
    }
}

impl Default for TagScheme {
    fn default() -> Self {
        Self::MajorMinor {
            carry: DEFAULT_CARRY,
        }
    }
}

/// Parsed version tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionTag {
    /// Major and minor counter pair.
    MajorMinor { major: u64, minor: u64 },

    /// Flat sequence counter.
    Sequence(u64),
}

impl VersionTag {
    /// Compute the tag that follows this one under a given scheme.
    ///
    /// Counters saturate instead of wrapping around.
    pub fn bump(&self, scheme: &TagScheme) -> Self {
        match (self, scheme) {
            (Self::MajorMinor { major, minor }, TagScheme::MajorMinor { carry }) => {
                let minor = minor.saturating_add(1);
                if minor >= *carry {
                    Self::MajorMinor {
                        major: major.saturating_add(1),
                        minor: 0,
                    }
                } else {
                    Self::MajorMinor {
                        major: *major,
                        minor,
                    }
                }
            }
            (Self::Sequence(k), TagScheme::Sequence) => Self::Sequence(k.saturating_add(1)),

            // INVARIANT: A tag parsed under one scheme is never bumped under another.
            //   - Fall back to the scheme's base tag if it somehow happens.
            (_, scheme) => scheme.base(),
        }
    }

    fn key(&self) -> (u64, u64) {
        match self {
            Self::MajorMinor { major, minor } => (*major, *minor),
            Self::Sequence(k) => (0, *k),
        }
    }
}

impl Ord for VersionTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for VersionTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for VersionTag {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::MajorMinor { major, minor } => write!(fmt, "v{major}.{minor}"),
            Self::Sequence(k) => write!(fmt, "n{k}"),
        }
    }
}

/// Snapshot name managed by snapkeeper.
///
/// # Invariant
///
/// - Ordered by numeric date tag, then by version tag.
/// - Display output always parses back into an equal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotName {
    prefix: String,
    date_tag: String,
    tag: VersionTag,
}

impl SnapshotName {
    /// Managed prefix of snapshot name.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Date tag of snapshot name.
    pub fn date_tag(&self) -> &str {
        &self.date_tag
    }

    /// Version tag of snapshot name.
    pub fn tag(&self) -> VersionTag {
        self.tag
    }

    fn date_key(&self) -> u64 {
        // INVARIANT: Date tags are validated as digits, so only overflow can fail here.
        self.date_tag.parse().unwrap_or(u64::MAX)
    }
}

impl Ord for SnapshotName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date_key()
            .cmp(&other.date_key())
            .then_with(|| self.tag.cmp(&other.tag))
            .then_with(|| self.date_tag.cmp(&other.date_tag))
            .then_with(|| self.prefix.cmp(&other.prefix))
    }
}

impl PartialOrd for SnapshotName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for SnapshotName {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}-{}-{}", self.prefix, self.date_tag, self.tag)
    }
}

/// Naming scheme of managed snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    prefix: String,
    tag: TagScheme,
}

impl NamingScheme {
    /// Construct new naming scheme.
    pub fn new(prefix: impl Into<String>, tag: TagScheme) -> Self {
        Self {
            prefix: prefix.into(),
            tag,
        }
    }

    /// Managed prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Version tag scheme.
    pub fn tag_scheme(&self) -> &TagScheme {
        &self.tag
    }

    /// Parse snapshot name under naming scheme.
    ///
    /// Returns `None` for any name that is not an exact
    /// `<prefix>-<digits>-<tag>` match, which marks the snapshot as foreign.
    pub fn parse(&self, name: &str) -> Option<SnapshotName> {
        let rest = name.strip_prefix(self.prefix.as_str())?.strip_prefix('-')?;
        let (date_tag, tag) = rest.split_once('-')?;
        if date_tag.is_empty() || !date_tag.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }

        Some(SnapshotName {
            prefix: self.prefix.clone(),
            date_tag: date_tag.to_string(),
            tag: self.tag.parse_tag(tag)?,
        })
    }

    /// Build snapshot name from date tag and version tag.
    pub fn format(&self, date_tag: impl Into<String>, tag: VersionTag) -> SnapshotName {
        SnapshotName {
            prefix: self.prefix.clone(),
            date_tag: date_tag.into(),
            tag,
        }
    }

    /// Parse and sort every managed name out of a listing, oldest first.
    ///
    /// Foreign names are dropped.
    pub fn managed<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<SnapshotName> {
        let mut managed = names
            .into_iter()
            .filter_map(|name| self.parse(name))
            .collect::<Vec<_>>();
        managed.sort();
        managed.dedup();
        managed
    }
}

// INVARIANT: Counters are plain decimal digits.
//   - Reject signs, whitespace, and empty text that `u64::from_str` would
//     otherwise let through or choke on.
fn parse_counter(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }

    text.parse().ok()
}
