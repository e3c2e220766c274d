//! Results of a snapshot pass.

use crate::eligibility::Rejection;
use crate::gateway::OperationHandle;

use super::Stage;

/// A mutation decided for a disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// A snapshot creation was issued.
    Created {
        /// Snapshot name.
        snapshot: String,
        /// Operation started by the provider.
        operation: OperationHandle,
        /// Whether the operation was awaited.
        awaited: bool,
    },
    /// A snapshot deletion was issued.
    Deleted {
        /// Snapshot name.
        snapshot: String,
        /// Operation started by the provider.
        operation: OperationHandle,
        /// Whether the operation was awaited.
        awaited: bool,
    },
    /// Dry run: a snapshot would have been created.
    WouldCreate {
        /// Snapshot name.
        snapshot: String,
    },
    /// Dry run: a snapshot would have been deleted.
    WouldDelete {
        /// Snapshot name.
        snapshot: String,
    },
}

impl Action {
    /// Name of the snapshot the action concerns.
    #[must_use]
    pub fn snapshot(&self) -> &str {
        match self {
            Self::Created { snapshot, .. }
            | Self::Deleted { snapshot, .. }
            | Self::WouldCreate { snapshot }
            | Self::WouldDelete { snapshot } => snapshot,
        }
    }

    /// Returns `true` for issued or intended creations.
    #[must_use]
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Created { .. } | Self::WouldCreate { .. })
    }

    /// Returns `true` for issued or intended deletions.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self, Self::Deleted { .. } | Self::WouldDelete { .. })
    }
}

/// How handling a disk ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DiskOutcome {
    /// The disk is not managed by the policy.
    Skipped(Rejection),
    /// Every stage ran to completion.
    Managed,
    /// A fresh snapshot exists and staleness was not evaluated.
    Fresh,
    /// A stage failed; later stages were abandoned.
    Failed {
        /// Stage that failed.
        stage: Stage,
        /// Rendered error.
        message: String,
    },
}

/// What happened to a single disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiskReport {
    /// Disk name.
    pub disk: String,
    /// Terminal outcome.
    pub outcome: DiskOutcome,
    /// Mutations issued or intended, in order.
    pub actions: Vec<Action>,
}

impl DiskReport {
    /// Returns `true` when handling the disk failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, DiskOutcome::Failed { .. })
    }
}

/// Ordered per-disk results of one pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PassReport {
    /// One entry per listed disk, in listing order.
    pub disks: Vec<DiskReport>,
}

impl PassReport {
    /// Returns the report for `disk`, if it was listed.
    #[must_use]
    pub fn disk(&self, disk: &str) -> Option<&DiskReport> {
        self.disks.iter().find(|report| report.disk == disk)
    }

    /// Every action of the pass, in order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.disks.iter().flat_map(|report| report.actions.iter())
    }

    /// Number of disks whose handling failed.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.disks.iter().filter(|report| report.is_failure()).count()
    }

    /// Returns `true` when at least one disk failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.disks.iter().any(DiskReport::is_failure)
    }

    /// Number of creations issued or intended.
    #[must_use]
    pub fn creations(&self) -> usize {
        self.actions().filter(|action| action.is_create()).count()
    }

    /// Number of deletions issued or intended.
    #[must_use]
    pub fn deletions(&self) -> usize {
        self.actions().filter(|action| action.is_delete()).count()
    }
}
