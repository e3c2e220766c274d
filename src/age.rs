//! Snapshot age windows.
//!
//! A disk needs a new snapshot when none of its snapshots is younger than
//! `min_age - bias`, and an owned snapshot is pruned once it is older than
//! `max_age + bias`. The bias absorbs clock and processing skew so a snapshot
//! taken right at the boundary of the previous pass does not flap.

use chrono::{DateTime, TimeDelta, Utc};

use crate::gateway::Snapshot;

/// Default freshness window.
pub const DEFAULT_MIN_AGE: TimeDelta = TimeDelta::days(1);
/// Default retention window.
pub const DEFAULT_MAX_AGE: TimeDelta = TimeDelta::days(30);
/// Default skew allowance.
pub const DEFAULT_BIAS: TimeDelta = TimeDelta::hours(1);

/// Freshness and retention thresholds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AgeWindow {
    /// Snapshots younger than this (minus bias) make a disk fresh.
    pub min_age: TimeDelta,
    /// Owned snapshots older than this (plus bias) are obsolete.
    pub max_age: TimeDelta,
    /// Skew allowance applied to both comparisons.
    pub bias: TimeDelta,
}

impl Default for AgeWindow {
    fn default() -> Self {
        Self {
            min_age: DEFAULT_MIN_AGE,
            max_age: DEFAULT_MAX_AGE,
            bias: DEFAULT_BIAS,
        }
    }
}

impl AgeWindow {
    /// Builds a window from explicit thresholds.
    #[must_use]
    pub const fn new(min_age: TimeDelta, max_age: TimeDelta, bias: TimeDelta) -> Self {
        Self {
            min_age,
            max_age,
            bias,
        }
    }

    /// Returns the newest snapshot young enough to skip creating another one.
    #[must_use]
    pub fn freshest<'a>(&self, snapshots: &'a [Snapshot], now: DateTime<Utc>) -> Option<&'a Snapshot> {
        let limit = self.min_age - self.bias;
        snapshots
            .iter()
            .filter(|snapshot| now - snapshot.creation_timestamp <= limit)
            .max_by_key(|snapshot| snapshot.creation_timestamp)
    }

    /// Returns `true` when any snapshot, owned or not, is fresh.
    #[must_use]
    pub fn has_fresh_snapshot(&self, snapshots: &[Snapshot], now: DateTime<Utc>) -> bool {
        self.freshest(snapshots, now).is_some()
    }

    /// Returns the owned snapshots that outlived the retention window.
    #[must_use]
    pub fn find_obsolete(
        &self,
        snapshots: &[Snapshot],
        owned_marker: &str,
        now: DateTime<Utc>,
    ) -> Vec<Snapshot> {
        let limit = self.max_age + self.bias;
        snapshots
            .iter()
            .filter(|snapshot| snapshot.is_owned(owned_marker))
            .filter(|snapshot| now - snapshot.creation_timestamp > limit)
            .cloned()
            .collect()
    }
}
