//! BDD scenarios for the retention pass.

use rstest_bdd_macros::scenario;

use super::test_helpers::{RetentionContext, retention_context};

#[scenario(
    path = "tests/features/retention.feature",
    name = "Stale disk receives a new snapshot"
)]
fn scenario_stale_disk_is_snapshotted(retention_context: RetentionContext) {
    let _ = retention_context;
}

#[scenario(
    path = "tests/features/retention.feature",
    name = "Obsolete owned snapshots are pruned and foreign ones kept"
)]
fn scenario_obsolete_snapshots_are_pruned(retention_context: RetentionContext) {
    let _ = retention_context;
}

#[scenario(
    path = "tests/features/retention.feature",
    name = "Dry run leaves the provider untouched"
)]
fn scenario_dry_run_is_read_only(retention_context: RetentionContext) {
    let _ = retention_context;
}

#[scenario(
    path = "tests/features/retention.feature",
    name = "Disks not provisioned by GKE are ignored"
)]
fn scenario_foreign_disks_are_ignored(retention_context: RetentionContext) {
    let _ = retention_context;
}

#[scenario(
    path = "tests/features/retention.feature",
    name = "A failing disk does not stop the pass"
)]
fn scenario_failures_are_isolated(retention_context: RetentionContext) {
    let _ = retention_context;
}
