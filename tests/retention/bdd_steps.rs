//! BDD step definitions for retention behaviour.

use chrono::TimeDelta;
use rstest_bdd_macros::{given, then, when};
use snapshooter::test_support::{GatewayCall, gke_description};
use snapshooter::{Disk, DiskOutcome, SnapshotController};

use super::test_helpers::{RetentionContext, scenario_now};

const OWNED_MARKER: &str = "[auto] ";

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a GKE disk \"{disk}\" backing volume \"{pv}\"")]
fn gke_disk(mut retention_context: RetentionContext, disk: String, pv: String) -> RetentionContext {
    retention_context
        .gateway
        .add_disk(Disk::new(disk.clone(), gke_description(&pv, "data", "default")));
    retention_context.current_disk = Some(disk);
    retention_context
}

#[given("a disk \"{disk}\" that was not provisioned by GKE")]
fn foreign_disk(mut retention_context: RetentionContext, disk: String) -> RetentionContext {
    retention_context
        .gateway
        .add_disk(Disk::new(disk.clone(), "boot volume"));
    retention_context.current_disk = Some(disk);
    retention_context
}

#[given("the disk has an owned snapshot \"{name}\" created {hours:u32} hours ago")]
fn owned_snapshot_hours(
    retention_context: RetentionContext,
    name: String,
    hours: u32,
) -> RetentionContext {
    let created = scenario_now() - TimeDelta::hours(i64::from(hours));
    let disk = retention_context.current_disk();
    let description = format!("{OWNED_MARKER}{{}}");
    retention_context
        .gateway
        .add_snapshot(&disk, &name, &description, created);
    retention_context
}

#[given("the disk has an owned snapshot \"{name}\" created {days:u32} days ago")]
fn owned_snapshot_days(
    retention_context: RetentionContext,
    name: String,
    days: u32,
) -> RetentionContext {
    let created = scenario_now() - TimeDelta::days(i64::from(days));
    let disk = retention_context.current_disk();
    let description = format!("{OWNED_MARKER}{{}}");
    retention_context
        .gateway
        .add_snapshot(&disk, &name, &description, created);
    retention_context
}

#[given("the disk has a foreign snapshot \"{name}\" created {days:u32} days ago")]
fn foreign_snapshot(
    retention_context: RetentionContext,
    name: String,
    days: u32,
) -> RetentionContext {
    let created = scenario_now() - TimeDelta::days(i64::from(days));
    let disk = retention_context.current_disk();
    retention_context
        .gateway
        .add_snapshot(&disk, &name, "weekly backup taken by an operator", created);
    retention_context
}

#[given("snapshot listing fails for \"{disk}\"")]
fn snapshot_listing_fails(retention_context: RetentionContext, disk: String) -> RetentionContext {
    retention_context.gateway.fail_snapshots_for(&disk);
    retention_context
}

#[given("dry-run mode")]
fn dry_run_mode(mut retention_context: RetentionContext) -> RetentionContext {
    retention_context.mode.dry_run = true;
    retention_context
}

#[when("a retention pass runs")]
fn run_pass(mut retention_context: RetentionContext) -> Result<RetentionContext, StepError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    let controller = SnapshotController::new(
        retention_context.gateway.clone(),
        "project",
        "zone-a",
        retention_context.settings.clone(),
        retention_context.mode,
    )
    .with_clock(scenario_now);

    let result = runtime.block_on(async move { controller.run_pass().await });
    retention_context.outcome = Some(result.map_err(|err| err.to_string()));
    Ok(retention_context)
}

fn created_names(retention_context: &RetentionContext) -> Vec<String> {
    retention_context
        .gateway
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            GatewayCall::CreateSnapshot { request, .. } => Some(request.name),
            _ => None,
        })
        .collect()
}

fn deleted_names(retention_context: &RetentionContext) -> Vec<String> {
    retention_context
        .gateway
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            GatewayCall::DeleteSnapshot(name) => Some(name),
            _ => None,
        })
        .collect()
}

#[then("a snapshot named \"{name}\" is created")]
fn snapshot_created(retention_context: &RetentionContext, name: String) -> Result<(), StepError> {
    let created = created_names(retention_context);
    if created.contains(&name) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {name} to be created, got {created:?}"
        )))
    }
}

#[then("no snapshot is created")]
fn nothing_created(retention_context: &RetentionContext) -> Result<(), StepError> {
    let created = created_names(retention_context);
    if created.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected creations: {created:?}")))
    }
}

#[then("no snapshot is deleted")]
fn nothing_deleted(retention_context: &RetentionContext) -> Result<(), StepError> {
    let deleted = deleted_names(retention_context);
    if deleted.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected deletions: {deleted:?}")))
    }
}

#[then("only \"{name}\" is deleted")]
fn only_deleted(retention_context: &RetentionContext, name: String) -> Result<(), StepError> {
    let deleted = deleted_names(retention_context);
    if deleted == [name.clone()] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected only {name} to be deleted, got {deleted:?}"
        )))
    }
}

#[then("the provider receives no mutations")]
fn no_mutations(retention_context: &RetentionContext) -> Result<(), StepError> {
    let mutations = retention_context.gateway.mutations();
    if mutations.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected mutations: {mutations:?}"
        )))
    }
}

#[then("the report lists {creations:u32} intended creation and {deletions:u32} intended deletion")]
fn intended_actions(
    retention_context: &RetentionContext,
    creations: u32,
    deletions: u32,
) -> Result<(), StepError> {
    let report = retention_context.report().map_err(StepError::Assertion)?;
    if report.creations() == creations as usize && report.deletions() == deletions as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {creations} creations and {deletions} deletions, got {report:?}"
        )))
    }
}

#[then("the disk \"{disk}\" is reported as skipped")]
fn disk_skipped(retention_context: &RetentionContext, disk: String) -> Result<(), StepError> {
    let report = retention_context.report().map_err(StepError::Assertion)?;
    match report.disk(&disk).map(|entry| &entry.outcome) {
        Some(DiskOutcome::Skipped(_)) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {disk} to be skipped, got {other:?}"
        ))),
    }
}

#[then("the disk \"{disk}\" is reported as failed")]
fn disk_failed(retention_context: &RetentionContext, disk: String) -> Result<(), StepError> {
    let report = retention_context.report().map_err(StepError::Assertion)?;
    match report.disk(&disk).map(|entry| &entry.outcome) {
        Some(DiskOutcome::Failed { .. }) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {disk} to fail, got {other:?}"
        ))),
    }
}
