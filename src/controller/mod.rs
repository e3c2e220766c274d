//! Snapshot lifecycle controller.
//!
//! One pass lists the zone's disks and walks each through
//! eligibility → freshness → create → staleness → delete. Disks are handled
//! sequentially and in isolation: a failure abandons the remaining stages of
//! that disk only. Nothing is rolled back; the next pass sees an unconfirmed
//! snapshot as fresh and retries a failed deletion.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::config::{PolicySettings, RunMode};
use crate::eligibility::{EligibilityFilter, OptOutPolicy};
use crate::gateway::{
    Disk, OperationHandle, Snapshot, SnapshotFilter, SnapshotGateway, SnapshotRequest, disk_uri,
};
use crate::waiter::OperationWaiter;

mod error;
mod naming;
mod report;

pub use error::{DiskError, PolicyError, Stage};
pub use naming::{snapshot_description, snapshot_name};
pub use report::{Action, DiskOutcome, DiskReport, PassReport};

/// Whether owned snapshots are pruned on disks that already have a fresh one.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StalenessPolicy {
    /// Prune independently of freshness.
    #[default]
    Always,
    /// Leave a disk alone once a fresh snapshot is found.
    SkipWhenFresh,
}

impl StalenessPolicy {
    /// Parses the configuration spelling (`always`, `skip-when-fresh`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "always" => Some(Self::Always),
            "skip-when-fresh" => Some(Self::SkipWhenFresh),
            _ => None,
        }
    }
}

/// How a new snapshot's description is derived from its disk.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DescriptionStyle {
    /// Owned marker followed by the disk description.
    #[default]
    Prefixed,
    /// Disk description as is. Such snapshots are never recognised as owned.
    Verbatim,
}

impl DescriptionStyle {
    /// Parses the configuration spelling (`prefixed`, `verbatim`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "prefixed" => Some(Self::Prefixed),
            "verbatim" => Some(Self::Verbatim),
            _ => None,
        }
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Applies the retention policy to every disk of one project and zone.
pub struct SnapshotController<G> {
    gateway: G,
    project: String,
    zone: String,
    settings: PolicySettings,
    mode: RunMode,
    eligibility: EligibilityFilter,
    waiter: OperationWaiter,
    clock: Clock,
}

impl<G: std::fmt::Debug> std::fmt::Debug for SnapshotController<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotController")
            .field("gateway", &self.gateway)
            .field("project", &self.project)
            .field("zone", &self.zone)
            .field("settings", &self.settings)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<G: SnapshotGateway> SnapshotController<G> {
    /// Creates a controller using the wall clock and the default opt-out
    /// policy.
    #[must_use]
    pub fn new(
        gateway: G,
        project: impl Into<String>,
        zone: impl Into<String>,
        settings: PolicySettings,
        mode: RunMode,
    ) -> Self {
        let eligibility = EligibilityFilter::new(settings.disk_prefix.clone());
        let waiter = OperationWaiter::new(settings.poll_interval, settings.operation_timeout);
        Self {
            gateway,
            project: project.into(),
            zone: zone.into(),
            settings,
            mode,
            eligibility,
            waiter,
            clock: Box::new(Utc::now),
        }
    }

    /// Installs a per-claim opt-out policy.
    #[must_use]
    pub fn with_opt_out(mut self, policy: impl OptOutPolicy + Send + Sync + 'static) -> Self {
        self.eligibility = self.eligibility.with_opt_out(policy);
        self
    }

    /// Replaces the clock used for age comparisons and snapshot names.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Returns the gateway the controller drives.
    #[must_use]
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Runs one pass over every disk in the zone.
    ///
    /// Per-disk failures are logged and recorded in the report; they never
    /// fail the pass.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::ListDisks`] when the disks cannot be listed.
    pub async fn run_pass(&self) -> Result<PassReport, PolicyError> {
        if self.settings.description_style == DescriptionStyle::Verbatim {
            warn!("snapshots are created without the owned marker and will never be pruned");
        }
        let disks = self
            .gateway
            .list_disks()
            .await
            .map_err(PolicyError::ListDisks)?;
        info!(
            project = %self.project,
            zone = %self.zone,
            disks = disks.len(),
            dry_run = self.mode.dry_run,
            "starting snapshot pass"
        );

        let mut report = PassReport::default();
        for disk in disks {
            report.disks.push(self.handle_disk(disk).await);
        }

        info!(
            created = report.creations(),
            deleted = report.deletions(),
            failed = report.failures(),
            "snapshot pass finished"
        );
        Ok(report)
    }

    async fn handle_disk(&self, mut disk: Disk) -> DiskReport {
        info!(disk = %disk.name, "checking disk");
        let mut actions = Vec::new();
        let outcome = match self.process(&mut disk, &mut actions).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(disk = %disk.name, stage = %err.stage(), error = %err, "failed to handle disk");
                DiskOutcome::Failed {
                    stage: err.stage(),
                    message: err.to_string(),
                }
            }
        };
        DiskReport {
            disk: disk.name,
            outcome,
            actions,
        }
    }

    async fn process(
        &self,
        disk: &mut Disk,
        actions: &mut Vec<Action>,
    ) -> Result<DiskOutcome, DiskError> {
        let pv_name = match self.eligibility.admit(disk) {
            Ok(metadata) => metadata.pv_name.clone(),
            Err(rejection) => return Ok(DiskOutcome::Skipped(rejection)),
        };
        let uri = disk_uri(&self.project, &self.zone, &disk.name);

        let all = self
            .list_snapshots(SnapshotFilter::for_disk(uri.clone()), Stage::CheckFreshness)
            .await?;
        let now = (self.clock)();
        if let Some(fresh) = self.settings.window.freshest(&all, now) {
            info!(
                disk = %disk.name,
                snapshot = %fresh.name,
                created = %fresh.creation_timestamp,
                "fresh snapshot exists already"
            );
            if self.settings.staleness == StalenessPolicy::SkipWhenFresh {
                return Ok(DiskOutcome::Fresh);
            }
        } else {
            actions.push(self.create(disk, &pv_name, now).await?);
        }

        let owned = self
            .list_snapshots(
                SnapshotFilter::for_disk(uri).owned_by(self.settings.description_prefix.clone()),
                Stage::CheckStaleness,
            )
            .await?;
        let obsolete =
            self.settings
                .window
                .find_obsolete(&owned, &self.settings.description_prefix, (self.clock)());
        debug!(disk = %disk.name, owned = owned.len(), obsolete = obsolete.len(), "evaluated retention");
        for snapshot in obsolete {
            actions.push(self.delete(&snapshot).await?);
        }
        Ok(DiskOutcome::Managed)
    }

    async fn list_snapshots(
        &self,
        filter: SnapshotFilter,
        stage: Stage,
    ) -> Result<Vec<Snapshot>, DiskError> {
        self.gateway
            .list_snapshots(&filter)
            .await
            .map_err(|source| DiskError::Gateway { stage, source })
    }

    async fn create(
        &self,
        disk: &Disk,
        pv_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Action, DiskError> {
        let request = SnapshotRequest {
            name: snapshot_name(pv_name, now),
            description: snapshot_description(
                self.settings.description_style,
                &self.settings.description_prefix,
                &disk.description,
            ),
        };
        info!(disk = %disk.name, snapshot = %request.name, "creating snapshot");
        if self.mode.dry_run {
            info!(snapshot = %request.name, "dry run: snapshot not created");
            return Ok(Action::WouldCreate {
                snapshot: request.name,
            });
        }

        let operation = self
            .gateway
            .create_snapshot(&disk.name, &request)
            .await
            .map_err(|source| DiskError::Gateway {
                stage: Stage::Create,
                source,
            })?;
        let awaited = self.settle(&operation, Stage::Create).await?;
        Ok(Action::Created {
            snapshot: request.name,
            operation,
            awaited,
        })
    }

    async fn delete(&self, snapshot: &Snapshot) -> Result<Action, DiskError> {
        info!(
            snapshot = %snapshot.name,
            created = %snapshot.creation_timestamp,
            "deleting snapshot"
        );
        if self.mode.dry_run {
            info!(snapshot = %snapshot.name, "dry run: snapshot not deleted");
            return Ok(Action::WouldDelete {
                snapshot: snapshot.name.clone(),
            });
        }

        let operation = self
            .gateway
            .delete_snapshot(&snapshot.name)
            .await
            .map_err(|source| DiskError::Gateway {
                stage: Stage::Delete,
                source,
            })?;
        let awaited = self.settle(&operation, Stage::Delete).await?;
        Ok(Action::Deleted {
            snapshot: snapshot.name.clone(),
            operation,
            awaited,
        })
    }

    /// Waits for `operation` unless running fire-and-forget. Returns whether
    /// it was awaited.
    async fn settle(&self, operation: &OperationHandle, stage: Stage) -> Result<bool, DiskError> {
        if self.mode.fire_and_forget {
            debug!(operation = %operation.name, "not waiting for operation");
            return Ok(false);
        }
        self.waiter
            .wait(&self.gateway, operation)
            .await
            .map_err(|source| DiskError::Wait { stage, source })?;
        Ok(true)
    }
}
