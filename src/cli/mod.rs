//! Command-line interface definitions for the `snapshooter` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `snapshooter` binary.
#[derive(Debug, Parser)]
#[command(
    name = "snapshooter",
    version,
    about = "Keep a rolling set of snapshots of the persistent disks of a GKE cluster",
    long_about = "Runs one retention pass over the disks of a zone: creates a snapshot \
                  of every GKE persistent disk without a recent one and deletes the \
                  snapshots this tool created once they are older than the retention \
                  window. Tunables are read from snapshooter.toml and SNAPSHOOTER_* \
                  environment variables."
)]
pub(crate) struct Cli {
    /// Google Cloud project holding the disks.
    #[arg(long, env = "SNAPSHOOTER_PROJECT", value_name = "PROJECT")]
    pub(crate) project: String,
    /// Compute zone holding the disks.
    #[arg(long, env = "SNAPSHOOTER_ZONE", value_name = "ZONE")]
    pub(crate) zone: String,
    /// Do not wait for snapshot creations and deletions to finish.
    #[arg(long = "async")]
    pub(crate) fire_and_forget: bool,
    /// Log the decisions without creating or deleting anything.
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Enable debug logging (`RUST_LOG` takes precedence).
    #[arg(long, short)]
    pub(crate) verbose: bool,
    /// Exit with status 1 when any disk could not be handled.
    #[arg(long)]
    pub(crate) strict: bool,
}
