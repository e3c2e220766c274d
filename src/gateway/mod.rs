//! Contract between the retention policy and the cloud provider.
//!
//! The policy only ever talks to the provider through [`SnapshotGateway`]:
//! list disks, list snapshots of one disk, create and delete snapshots, and
//! poll the asynchronous operations those mutations start. Project and zone
//! are fixed when a gateway is constructed.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::command::CommandError;

mod types;

pub use types::{
    Disk, DiskMetadata, OperationHandle, OperationScope, OperationState, OperationStatus,
    PV_NAME_KEY, PVC_NAME_KEY, PVC_NAMESPACE_KEY, Snapshot, SnapshotRequest,
};

/// Base URI of the Compute Engine v1 API, used to address disks.
pub const COMPUTE_API_BASE: &str = "https://www.googleapis.com/compute/v1";

/// Returns the URI snapshots use to reference their source disk.
#[must_use]
pub fn disk_uri(project: &str, zone: &str, disk: &str) -> String {
    format!("{COMPUTE_API_BASE}/projects/{project}/zones/{zone}/disks/{disk}")
}

/// Selects the snapshots of a single disk, optionally only those carrying the
/// owned description marker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotFilter {
    /// URI of the source disk.
    pub source_disk: String,
    /// Description prefix every returned snapshot must start with.
    pub description_prefix: Option<String>,
}

impl SnapshotFilter {
    /// Matches every snapshot of `source_disk`.
    #[must_use]
    pub fn for_disk(source_disk: impl Into<String>) -> Self {
        Self {
            source_disk: source_disk.into(),
            description_prefix: None,
        }
    }

    /// Restricts the filter to snapshots whose description starts with
    /// `prefix`.
    #[must_use]
    pub fn owned_by(mut self, prefix: impl Into<String>) -> Self {
        self.description_prefix = Some(prefix.into());
        self
    }

    /// Renders the filter as a `gcloud --filter` expression.
    ///
    /// The description prefix becomes an anchored RE2 pattern; both the regex
    /// metacharacters and the quoting are escaped.
    #[must_use]
    pub fn expression(&self) -> String {
        let disk_clause = format!("sourceDisk = \"{}\"", quote_escape(&self.source_disk));
        match self.description_prefix.as_deref() {
            Some(prefix) => format!(
                "{disk_clause} AND description ~ \"^{}\"",
                quote_escape(&regex_escape(prefix))
            ),
            None => disk_clause,
        }
    }

    /// Evaluates the filter locally.
    #[must_use]
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        snapshot.source_disk == self.source_disk
            && self
                .description_prefix
                .as_deref()
                .is_none_or(|prefix| snapshot.is_owned(prefix))
    }
}

fn regex_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(
            ch,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        ) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn quote_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Errors raised by gateway implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GatewayError {
    /// Raised when the provider CLI exits with a non-zero status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed (typically `gcloud`).
        program: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when provider output cannot be parsed.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// Resource type being parsed (for example `snapshots`).
        resource: String,
        /// Parser error message.
        message: String,
    },
    /// Wrapper for provider level failures not tied to a command.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when command execution fails.
    #[error(transparent)]
    Runner(#[from] CommandError),
}

/// Future returned by gateway operations.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Disk, snapshot and operation access for one project and zone.
pub trait SnapshotGateway {
    /// Lists every disk in the zone.
    fn list_disks(&self) -> GatewayFuture<'_, Vec<Disk>>;

    /// Lists the snapshots selected by `filter`.
    fn list_snapshots<'a>(&'a self, filter: &'a SnapshotFilter)
    -> GatewayFuture<'a, Vec<Snapshot>>;

    /// Starts a snapshot of `disk_name` and returns the operation handle.
    fn create_snapshot<'a>(
        &'a self,
        disk_name: &'a str,
        request: &'a SnapshotRequest,
    ) -> GatewayFuture<'a, OperationHandle>;

    /// Starts deleting `snapshot_name` and returns the operation handle.
    fn delete_snapshot<'a>(&'a self, snapshot_name: &'a str) -> GatewayFuture<'a, OperationHandle>;

    /// Fetches the current state of an operation.
    ///
    /// Returns `Ok(None)` when the provider no longer knows the handle, which
    /// happens when an operation finished before it was first polled.
    fn get_operation<'a>(
        &'a self,
        handle: &'a OperationHandle,
    ) -> GatewayFuture<'a, Option<OperationStatus>>;
}
