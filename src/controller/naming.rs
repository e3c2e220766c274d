//! Snapshot naming and descriptions.

use chrono::{DateTime, Utc};

use super::DescriptionStyle;

/// Returns `{pv_name}--{YYYY-MM-DD--HH-MM-SS}` for a snapshot taken at `at`.
///
/// This is the ISO-8601 timestamp at seconds precision without an offset,
/// with `:` replaced by `-` and the `T` separator by `--`, which keeps the
/// name within the provider's `[a-z0-9-]` alphabet.
#[must_use]
pub fn snapshot_name(pv_name: &str, at: DateTime<Utc>) -> String {
    format!("{pv_name}--{}", at.format("%Y-%m-%d--%H-%M-%S"))
}

/// Returns the description for a snapshot of a disk described by
/// `disk_description`.
#[must_use]
pub fn snapshot_description(
    style: DescriptionStyle,
    marker: &str,
    disk_description: &str,
) -> String {
    match style {
        DescriptionStyle::Prefixed => format!("{marker}{disk_description}"),
        DescriptionStyle::Verbatim => disk_description.to_owned(),
    }
}
