//! Core library for the `snapshooter` disk snapshot retention tool.
//!
//! The crate keeps a rolling set of snapshots for the persistent disks a GKE
//! cluster provisions: each pass creates a snapshot when a disk has no recent
//! one and deletes the snapshots it created once they outlive the retention
//! window. The provider is reached through the [`SnapshotGateway`] trait; the
//! [`GcloudGateway`] implementation drives the `gcloud` CLI.

pub mod age;
pub mod command;
pub mod config;
pub mod controller;
pub mod eligibility;
pub mod gateway;
pub mod gcloud;
pub mod test_support;
pub mod waiter;

pub use age::AgeWindow;
pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, PolicyConfig, PolicySettings, RunMode};
pub use controller::{
    Action, DescriptionStyle, DiskOutcome, DiskReport, PassReport, PolicyError,
    SnapshotController, Stage, StalenessPolicy,
};
pub use eligibility::{AlwaysEnabled, EligibilityFilter, OptOutPolicy, Rejection};
pub use gateway::{
    Disk, DiskMetadata, GatewayError, OperationHandle, OperationStatus, Snapshot, SnapshotFilter,
    SnapshotGateway, SnapshotRequest,
};
pub use gcloud::{GcloudConfig, GcloudGateway};
pub use waiter::{OperationOutcome, OperationWaiter, WaitError};
