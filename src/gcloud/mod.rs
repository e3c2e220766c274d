//! Google Cloud gateway backed by the `gcloud` CLI.
//!
//! Every call shells out to `gcloud compute ... --format=json` through a
//! [`CommandRunner`] and parses the JSON it prints. Mutations run with
//! `--async` so the controller decides whether to wait for the returned
//! operation.

use std::ffi::OsString;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::command::{CommandOutput, CommandRunner, ProcessCommandRunner};
use crate::config::ConfigError;
use crate::gateway::{
    Disk, GatewayError, GatewayFuture, OperationHandle, OperationScope, OperationState,
    OperationStatus, Snapshot, SnapshotFilter, SnapshotGateway, SnapshotRequest,
};

/// Stderr fragments `gcloud` prints when an operation is unknown.
const NOT_FOUND_MARKERS: [&str; 2] = ["was not found", "404"];

/// Project, zone and binary a [`GcloudGateway`] is bound to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GcloudConfig {
    /// Path to the `gcloud` executable.
    pub gcloud_bin: String,
    /// Google Cloud project id.
    pub project: String,
    /// Compute zone holding the disks.
    pub zone: String,
}

impl GcloudConfig {
    /// Constructs a config, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when any field is blank.
    pub fn new(
        gcloud_bin: impl Into<String>,
        project: impl Into<String>,
        zone: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            gcloud_bin: required(gcloud_bin, "gcloud_bin")?,
            project: required(project, "project")?,
            zone: required(zone, "zone")?,
        })
    }
}

fn required(value: impl Into<String>, field: &str) -> Result<String, ConfigError> {
    let raw = value.into();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    Ok(trimmed.to_owned())
}

/// [`SnapshotGateway`] that drives `gcloud compute`.
#[derive(Clone, Debug)]
pub struct GcloudGateway<R: CommandRunner> {
    config: GcloudConfig,
    runner: R,
}

impl GcloudGateway<ProcessCommandRunner> {
    /// Creates a gateway wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(config: GcloudConfig) -> Self {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> GcloudGateway<R> {
    /// Creates a gateway using the provided configuration and runner.
    #[must_use]
    pub const fn new(config: GcloudConfig, runner: R) -> Self {
        Self { config, runner }
    }

    /// Returns the configuration the gateway is bound to.
    #[must_use]
    pub const fn config(&self) -> &GcloudConfig {
        &self.config
    }

    fn project_arg(&self) -> OsString {
        OsString::from(format!("--project={}", self.config.project))
    }

    fn zone_arg(&self) -> OsString {
        OsString::from(format!("--zone={}", self.config.zone))
    }

    fn run(&self, args: &[OsString]) -> Result<CommandOutput, GatewayError> {
        debug!(command = %render(&self.config.gcloud_bin, args), "running gcloud");
        Ok(self.runner.run(&self.config.gcloud_bin, args)?)
    }

    /// Checks command output and converts failure to `GatewayError`.
    fn check_output(
        &self,
        output: CommandOutput,
        resource: &str,
    ) -> Result<CommandOutput, GatewayError> {
        if output.is_success() {
            return Ok(output);
        }
        Err(GatewayError::CommandFailure {
            program: self.config.gcloud_bin.clone(),
            status: output.code,
            status_text: output.status_text(),
            stderr: format!("{resource}: {}", output.stderr.trim()),
        })
    }

    fn run_json(&self, args: &[OsString], resource: &str) -> Result<String, GatewayError> {
        let output = self.run(args)?;
        self.check_output(output, resource).map(|out| out.stdout)
    }

    fn list_resources<T>(&self, args: &[OsString], resource: &str) -> Result<Vec<T>, GatewayError>
    where
        T: DeserializeOwned,
    {
        let stdout = self.run_json(args, resource)?;
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str::<Vec<T>>(&stdout).map_err(|err| parse_error(resource, &err))
    }

    fn list_disks_blocking(&self) -> Result<Vec<Disk>, GatewayError> {
        let args = vec![
            OsString::from("compute"),
            OsString::from("disks"),
            OsString::from("list"),
            self.project_arg(),
            OsString::from(format!("--zones={}", self.config.zone)),
            OsString::from("--format=json"),
        ];
        self.list_resources(&args, "disks")
    }

    fn list_snapshots_blocking(
        &self,
        filter: &SnapshotFilter,
    ) -> Result<Vec<Snapshot>, GatewayError> {
        let args = vec![
            OsString::from("compute"),
            OsString::from("snapshots"),
            OsString::from("list"),
            self.project_arg(),
            OsString::from(format!("--filter={}", filter.expression())),
            OsString::from("--format=json"),
        ];
        self.list_resources(&args, "snapshots")
    }

    fn create_snapshot_blocking(
        &self,
        disk_name: &str,
        request: &SnapshotRequest,
    ) -> Result<OperationHandle, GatewayError> {
        let args = vec![
            OsString::from("compute"),
            OsString::from("disks"),
            OsString::from("snapshot"),
            OsString::from(disk_name),
            self.project_arg(),
            self.zone_arg(),
            OsString::from(format!("--snapshot-names={}", request.name)),
            OsString::from(format!("--description={}", request.description)),
            OsString::from("--async"),
            OsString::from("--format=json"),
        ];
        let stdout = self.run_json(&args, "snapshot create")?;
        parse_operation(&stdout, "snapshot create").map(GcloudOperation::handle)
    }

    fn delete_snapshot_blocking(&self, snapshot_name: &str) -> Result<OperationHandle, GatewayError> {
        let args = vec![
            OsString::from("compute"),
            OsString::from("snapshots"),
            OsString::from("delete"),
            OsString::from(snapshot_name),
            self.project_arg(),
            OsString::from("--quiet"),
            OsString::from("--async"),
            OsString::from("--format=json"),
        ];
        let stdout = self.run_json(&args, "snapshot delete")?;
        parse_operation(&stdout, "snapshot delete").map(GcloudOperation::handle)
    }

    fn get_operation_blocking(
        &self,
        handle: &OperationHandle,
    ) -> Result<Option<OperationStatus>, GatewayError> {
        let scope = match &handle.scope {
            OperationScope::Zonal(zone) => OsString::from(format!("--zone={zone}")),
            OperationScope::Global => OsString::from("--global"),
        };
        let args = vec![
            OsString::from("compute"),
            OsString::from("operations"),
            OsString::from("describe"),
            OsString::from(&handle.name),
            self.project_arg(),
            scope,
            OsString::from("--format=json"),
        ];
        let output = self.run(&args)?;
        if !output.is_success()
            && NOT_FOUND_MARKERS
                .iter()
                .any(|marker| output.stderr.contains(marker))
        {
            debug!(operation = %handle.name, "operation no longer known to the provider");
            return Ok(None);
        }
        let stdout = self.check_output(output, "operation describe")?.stdout;
        let operation = parse_operation(&stdout, "operation")?;
        Ok(Some(OperationStatus {
            name: operation.name,
            status: operation.status,
            error: operation.error,
        }))
    }
}

impl<R: CommandRunner + Sync> SnapshotGateway for GcloudGateway<R> {
    fn list_disks(&self) -> GatewayFuture<'_, Vec<Disk>> {
        Box::pin(async move { self.list_disks_blocking() })
    }

    fn list_snapshots<'a>(
        &'a self,
        filter: &'a SnapshotFilter,
    ) -> GatewayFuture<'a, Vec<Snapshot>> {
        Box::pin(async move { self.list_snapshots_blocking(filter) })
    }

    fn create_snapshot<'a>(
        &'a self,
        disk_name: &'a str,
        request: &'a SnapshotRequest,
    ) -> GatewayFuture<'a, OperationHandle> {
        Box::pin(async move { self.create_snapshot_blocking(disk_name, request) })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_name: &'a str) -> GatewayFuture<'a, OperationHandle> {
        Box::pin(async move { self.delete_snapshot_blocking(snapshot_name) })
    }

    fn get_operation<'a>(
        &'a self,
        handle: &'a OperationHandle,
    ) -> GatewayFuture<'a, Option<OperationStatus>> {
        Box::pin(async move { self.get_operation_blocking(handle) })
    }
}

/// Operation resource as printed by `gcloud`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
struct GcloudOperation {
    name: String,
    status: OperationState,
    #[serde(default)]
    zone: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

impl GcloudOperation {
    /// Zonal operations carry their zone URI; global ones carry none.
    fn handle(self) -> OperationHandle {
        let scope = self
            .zone
            .as_deref()
            .and_then(|zone| zone.rsplit('/').next())
            .filter(|zone| !zone.is_empty())
            .map_or(OperationScope::Global, |zone| {
                OperationScope::Zonal(zone.to_owned())
            });
        OperationHandle {
            name: self.name,
            scope,
        }
    }
}

/// `--async` prints the started operation either bare or as a one-element
/// list.
fn parse_operation(stdout: &str, resource: &str) -> Result<GcloudOperation, GatewayError> {
    let value = serde_json::from_str::<Value>(stdout).map_err(|err| parse_error(resource, &err))?;
    let object = match value {
        Value::Array(items) => items.into_iter().next().ok_or_else(|| GatewayError::Parse {
            resource: resource.to_owned(),
            message: String::from("expected one operation, got an empty list"),
        })?,
        other => other,
    };
    serde_json::from_value(object).map_err(|err| parse_error(resource, &err))
}

fn parse_error(resource: &str, err: &serde_json::Error) -> GatewayError {
    GatewayError::Parse {
        resource: resource.to_owned(),
        message: err.to_string(),
    }
}

fn render(program: &str, args: &[OsString]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_owned());
    parts.extend(args.iter().map(|arg| arg.to_string_lossy().into_owned()));
    parts.join(" ")
}
