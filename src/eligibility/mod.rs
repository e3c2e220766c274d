//! Decides which disks the retention policy manages.
//!
//! A disk is managed when its name carries the provisioner prefix, its
//! description is the JSON object the GKE provisioner writes, that object
//! names the persistent volume, claim and namespace, and the configured
//! [`OptOutPolicy`] does not veto it. Every rejection is an expected steady
//! state, logged at INFO and never an error.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::info;

use crate::gateway::{Disk, DiskMetadata, PV_NAME_KEY, PVC_NAME_KEY, PVC_NAMESPACE_KEY};

/// Per-claim veto consulted after the metadata checks pass.
pub trait OptOutPolicy {
    /// Returns `false` to exclude the disk from snapshotting.
    fn allows(&self, disk: &Disk, metadata: &DiskMetadata) -> bool;
}

/// Default policy: every disk with complete metadata is snapshotted.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysEnabled;

impl OptOutPolicy for AlwaysEnabled {
    fn allows(&self, _disk: &Disk, _metadata: &DiskMetadata) -> bool {
        true
    }
}

/// Why a disk was skipped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rejection {
    /// Name lacks the managed prefix.
    NamePrefix,
    /// Description is not a JSON object.
    Description,
    /// A required metadata key is missing or empty.
    MissingKey(&'static str),
    /// The opt-out policy vetoed the disk.
    OptedOut,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamePrefix => f.write_str("name lacks managed prefix"),
            Self::Description => f.write_str("description is not a JSON object"),
            Self::MissingKey(key) => write!(f, "description lacks {key}"),
            Self::OptedOut => f.write_str("opted out of snapshots"),
        }
    }
}

/// Applies the eligibility rules in order.
pub struct EligibilityFilter {
    disk_prefix: String,
    opt_out: Box<dyn OptOutPolicy + Send + Sync>,
}

impl fmt::Debug for EligibilityFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EligibilityFilter")
            .field("disk_prefix", &self.disk_prefix)
            .finish_non_exhaustive()
    }
}

impl EligibilityFilter {
    /// Creates a filter that accepts every fully described disk named with
    /// `disk_prefix`.
    #[must_use]
    pub fn new(disk_prefix: impl Into<String>) -> Self {
        Self {
            disk_prefix: disk_prefix.into(),
            opt_out: Box::new(AlwaysEnabled),
        }
    }

    /// Replaces the opt-out policy.
    #[must_use]
    pub fn with_opt_out(mut self, policy: impl OptOutPolicy + Send + Sync + 'static) -> Self {
        self.opt_out = Box::new(policy);
        self
    }

    /// Returns `true` when the disk is managed, attaching its parsed metadata.
    pub fn check(&self, disk: &mut Disk) -> bool {
        self.admit(disk).is_ok()
    }

    /// Like [`check`](Self::check), returning the attached metadata or the
    /// reason the disk was skipped.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] that applies; it has already been
    /// logged.
    pub fn admit<'a>(&self, disk: &'a mut Disk) -> Result<&'a DiskMetadata, Rejection> {
        match self.evaluate(disk) {
            Ok(metadata) => Ok(disk.metadata.insert(metadata)),
            Err(rejection) => {
                info!(disk = %disk.name, reason = %rejection, "skipping disk");
                Err(rejection)
            }
        }
    }

    /// Runs the rules without side effects.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] that applies.
    pub fn evaluate(&self, disk: &Disk) -> Result<DiskMetadata, Rejection> {
        if !disk.name.starts_with(&self.disk_prefix) {
            return Err(Rejection::NamePrefix);
        }
        let metadata = parse_metadata(&disk.description)?;
        if !self.opt_out.allows(disk, &metadata) {
            return Err(Rejection::OptedOut);
        }
        Ok(metadata)
    }
}

/// Parses a provisioner description into [`DiskMetadata`].
///
/// # Errors
///
/// Returns [`Rejection::Description`] when the text is not a JSON object and
/// [`Rejection::MissingKey`] for the first required key that is absent,
/// empty, or not a string.
pub fn parse_metadata(description: &str) -> Result<DiskMetadata, Rejection> {
    let raw = serde_json::from_str::<BTreeMap<String, Value>>(description)
        .map_err(|_| Rejection::Description)?;
    let pv_name = required(&raw, PV_NAME_KEY)?;
    let pvc_name = required(&raw, PVC_NAME_KEY)?;
    let pvc_namespace = required(&raw, PVC_NAMESPACE_KEY)?;
    Ok(DiskMetadata {
        pv_name,
        pvc_name,
        pvc_namespace,
        raw,
    })
}

fn required(raw: &BTreeMap<String, Value>, key: &'static str) -> Result<String, Rejection> {
    raw.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or(Rejection::MissingKey(key))
}
