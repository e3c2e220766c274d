//! Provider resources as seen by the retention policy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Metadata key naming the persistent volume a disk backs.
pub const PV_NAME_KEY: &str = "kubernetes.io/created-for/pv/name";
/// Metadata key naming the claim the volume was provisioned for.
pub const PVC_NAME_KEY: &str = "kubernetes.io/created-for/pvc/name";
/// Metadata key naming the namespace of that claim.
pub const PVC_NAMESPACE_KEY: &str = "kubernetes.io/created-for/pvc/namespace";

/// A block volume in the managed zone.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    /// Disk name, unique within the zone.
    pub name: String,
    /// Free-form description. Kubernetes provisioners store a JSON object here.
    #[serde(default)]
    pub description: String,
    /// Provider URI of the disk, when reported.
    #[serde(default)]
    pub self_link: Option<String>,
    /// Parsed description payload, attached once the disk passes eligibility.
    #[serde(skip)]
    pub metadata: Option<DiskMetadata>,
}

impl Disk {
    /// Creates a disk record without metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            self_link: None,
            metadata: None,
        }
    }
}

/// Kubernetes provisioning details recovered from a disk description.
#[derive(Clone, Debug, PartialEq)]
pub struct DiskMetadata {
    /// Persistent volume name; used as the snapshot name stem.
    pub pv_name: String,
    /// Persistent volume claim name.
    pub pvc_name: String,
    /// Namespace of the persistent volume claim.
    pub pvc_namespace: String,
    /// Every key of the payload, including the three above.
    pub raw: BTreeMap<String, Value>,
}

/// A point-in-time copy of a disk.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Snapshot name, unique within the project.
    pub name: String,
    /// Description; snapshots created by this tool carry the owned marker.
    #[serde(default)]
    pub description: String,
    /// Creation time, normalised to UTC.
    pub creation_timestamp: DateTime<Utc>,
    /// URI of the disk the snapshot was taken from.
    #[serde(default)]
    pub source_disk: String,
}

impl Snapshot {
    /// Returns `true` when the snapshot description carries `marker`.
    #[must_use]
    pub fn is_owned(&self, marker: &str) -> bool {
        self.description.starts_with(marker)
    }
}

/// Name and description of a snapshot to create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotRequest {
    /// Snapshot name.
    pub name: String,
    /// Snapshot description.
    pub description: String,
}

/// Collection an operation lives in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationScope {
    /// Zonal operation, such as a disk snapshot creation.
    Zonal(String),
    /// Global operation, such as a snapshot deletion.
    Global,
}

/// Reference to an in-flight provider action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationHandle {
    /// Provider operation name.
    pub name: String,
    /// Collection the operation must be polled in.
    pub scope: OperationScope,
}

impl OperationHandle {
    /// Builds a handle for a zonal operation.
    #[must_use]
    pub fn zonal(name: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: OperationScope::Zonal(zone.into()),
        }
    }

    /// Builds a handle for a global operation.
    #[must_use]
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: OperationScope::Global,
        }
    }
}

/// Progress reported for an operation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    /// Accepted but not started.
    Pending,
    /// In progress.
    Running,
    /// Finished, successfully or not.
    Done,
}

/// Snapshot of an operation's state.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct OperationStatus {
    /// Provider operation name.
    pub name: String,
    /// Current progress.
    pub status: OperationState,
    /// Structured failure payload, present only on failed operations.
    #[serde(default)]
    pub error: Option<Value>,
}

impl OperationStatus {
    /// Returns `true` once the provider stopped working on the operation.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.status, OperationState::Done)
    }
}
