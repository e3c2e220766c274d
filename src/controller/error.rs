//! Error types for the snapshot lifecycle.

use std::fmt;

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::waiter::WaitError;

/// Step of the per-disk state machine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Listing all snapshots of the disk.
    CheckFreshness,
    /// Creating a snapshot and waiting for it.
    Create,
    /// Listing owned snapshots of the disk.
    CheckStaleness,
    /// Deleting an obsolete snapshot and waiting for it.
    Delete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CheckFreshness => "check-freshness",
            Self::Create => "create",
            Self::CheckStaleness => "check-staleness",
            Self::Delete => "delete",
        })
    }
}

/// Failure while handling one disk. Never crosses the disk boundary.
#[derive(Debug, Error)]
pub enum DiskError {
    /// A gateway call failed.
    #[error("{stage} failed: {source}")]
    Gateway {
        /// Stage that issued the call.
        stage: Stage,
        /// Underlying gateway error.
        #[source]
        source: GatewayError,
    },
    /// Waiting for an operation failed.
    #[error("{stage} failed: {source}")]
    Wait {
        /// Stage that awaited the operation.
        stage: Stage,
        /// Underlying wait error.
        #[source]
        source: WaitError,
    },
}

impl DiskError {
    /// Stage the failure happened in.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Gateway { stage, .. } | Self::Wait { stage, .. } => *stage,
        }
    }
}

/// Failure that aborts a whole pass.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The zone's disks could not be listed.
    #[error("failed to list disks: {0}")]
    ListDisks(#[source] GatewayError),
}
