//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard as StdMutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::gateway::{
    Disk, GatewayError, GatewayFuture, OperationHandle, OperationState, OperationStatus,
    PV_NAME_KEY, PVC_NAME_KEY, PVC_NAMESPACE_KEY, Snapshot, SnapshotFilter, SnapshotGateway,
    SnapshotRequest,
};

fn lock<T>(mutex: &Mutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds the description the GKE provisioner writes on persistent disks.
#[must_use]
pub fn gke_description(pv_name: &str, pvc_name: &str, pvc_namespace: &str) -> String {
    serde_json::json!({
        PV_NAME_KEY: pv_name,
        PVC_NAME_KEY: pvc_name,
        PVC_NAMESPACE_KEY: pvc_namespace,
        "kubernetes.io/created-by": "pd.csi.storage.gke.io",
    })
    .to_string()
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful response with the given stdout.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// One answer to an operation poll scripted on [`FakeGateway`].
#[derive(Clone, Debug, PartialEq)]
pub enum PollResponse {
    /// Operation accepted but not started.
    Pending,
    /// Operation in progress.
    Running,
    /// Operation finished successfully.
    Done,
    /// Operation finished with the given error payload.
    Failed(Value),
    /// Provider no longer knows the operation.
    NotFound,
    /// The poll itself fails.
    Fault(String),
}

/// A call observed by [`FakeGateway`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GatewayCall {
    /// `list_disks`.
    ListDisks,
    /// `list_snapshots` with the filter used.
    ListSnapshots(SnapshotFilter),
    /// `create_snapshot`.
    CreateSnapshot {
        /// Disk being snapshotted.
        disk: String,
        /// Requested snapshot.
        request: SnapshotRequest,
    },
    /// `delete_snapshot`.
    DeleteSnapshot(String),
    /// `get_operation` with the operation name polled.
    GetOperation(String),
}

impl GatewayCall {
    /// Returns `true` for calls that change provider state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(self, Self::CreateSnapshot { .. } | Self::DeleteSnapshot(_))
    }
}

#[derive(Debug, Default)]
struct FakeState {
    disks: Vec<Disk>,
    snapshots: Vec<Snapshot>,
    calls: Vec<GatewayCall>,
    polls: HashMap<String, VecDeque<PollResponse>>,
    issued: BTreeSet<String>,
    next_operation: usize,
    now: Option<DateTime<Utc>>,
    fail_list_disks: bool,
    fail_snapshots_for: BTreeSet<String>,
    fail_create_for: BTreeSet<String>,
    fail_delete_for: BTreeSet<String>,
    operation_error: Option<Value>,
}

/// In-memory [`SnapshotGateway`] for one project and zone.
///
/// Creations add a snapshot stamped with the fake's clock, deletions remove
/// it, and issued operations complete on the first poll unless a poll
/// sequence was scripted for them.
#[derive(Clone, Debug)]
pub struct FakeGateway {
    project: String,
    zone: String,
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new("project", "zone-a")
    }
}

impl FakeGateway {
    /// Creates an empty fake for `project` and `zone`.
    #[must_use]
    pub fn new(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    /// URI snapshots of `disk` reference.
    #[must_use]
    pub fn disk_uri(&self, disk: &str) -> String {
        crate::gateway::disk_uri(&self.project, &self.zone, disk)
    }

    /// Adds a disk to the inventory.
    pub fn add_disk(&self, disk: Disk) {
        lock(&self.state).disks.push(disk);
    }

    /// Adds a snapshot of `disk` created at `created`.
    pub fn add_snapshot(&self, disk: &str, name: &str, description: &str, created: DateTime<Utc>) {
        let snapshot = Snapshot {
            name: name.to_owned(),
            description: description.to_owned(),
            creation_timestamp: created,
            source_disk: self.disk_uri(disk),
        };
        lock(&self.state).snapshots.push(snapshot);
    }

    /// Stamps created snapshots with `now` instead of the wall clock.
    pub fn set_now(&self, now: DateTime<Utc>) {
        lock(&self.state).now = Some(now);
    }

    /// Scripts the answers to successive polls of `operation`.
    pub fn script_operation(&self, operation: &str, polls: impl IntoIterator<Item = PollResponse>) {
        lock(&self.state)
            .polls
            .insert(operation.to_owned(), polls.into_iter().collect());
    }

    /// Makes disk listing fail.
    pub fn fail_list_disks(&self) {
        lock(&self.state).fail_list_disks = true;
    }

    /// Makes snapshot listing fail for `disk`.
    pub fn fail_snapshots_for(&self, disk: &str) {
        let uri = self.disk_uri(disk);
        lock(&self.state).fail_snapshots_for.insert(uri);
    }

    /// Makes snapshot creation fail for `disk`.
    pub fn fail_create_for(&self, disk: &str) {
        lock(&self.state).fail_create_for.insert(disk.to_owned());
    }

    /// Makes deletion of `snapshot` fail.
    pub fn fail_delete_for(&self, snapshot: &str) {
        lock(&self.state).fail_delete_for.insert(snapshot.to_owned());
    }

    /// Makes every issued operation finish with `error`.
    pub fn fail_operations_with(&self, error: Value) {
        lock(&self.state).operation_error = Some(error);
    }

    /// Returns every call observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.state).calls.clone()
    }

    /// Returns the create and delete calls observed so far.
    #[must_use]
    pub fn mutations(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(GatewayCall::is_mutation)
            .collect()
    }

    /// Returns the names of the snapshots currently stored.
    #[must_use]
    pub fn snapshot_names(&self) -> Vec<String> {
        lock(&self.state)
            .snapshots
            .iter()
            .map(|snapshot| snapshot.name.clone())
            .collect()
    }

    /// Forgets recorded calls, keeping inventory and scripts.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    fn issue_operation(state: &mut FakeState) -> String {
        state.next_operation += 1;
        let name = format!("operation-{}", state.next_operation);
        state.issued.insert(name.clone());
        name
    }

    fn poll(state: &mut FakeState, name: &str) -> Result<Option<OperationStatus>, GatewayError> {
        let scripted = state.polls.get_mut(name).and_then(VecDeque::pop_front);
        let response = match scripted {
            Some(response) => response,
            None if state.issued.contains(name) => state
                .operation_error
                .clone()
                .map_or(PollResponse::Done, PollResponse::Failed),
            None => PollResponse::NotFound,
        };
        let status = |status: OperationState, error: Option<Value>| OperationStatus {
            name: name.to_owned(),
            status,
            error,
        };
        match response {
            PollResponse::Pending => Ok(Some(status(OperationState::Pending, None))),
            PollResponse::Running => Ok(Some(status(OperationState::Running, None))),
            PollResponse::Done => Ok(Some(status(OperationState::Done, None))),
            PollResponse::Failed(error) => Ok(Some(status(OperationState::Done, Some(error)))),
            PollResponse::NotFound => Ok(None),
            PollResponse::Fault(message) => Err(GatewayError::Provider { message }),
        }
    }
}

impl SnapshotGateway for FakeGateway {
    fn list_disks(&self) -> GatewayFuture<'_, Vec<Disk>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.calls.push(GatewayCall::ListDisks);
            if state.fail_list_disks {
                return Err(GatewayError::Provider {
                    message: String::from("disk listing denied"),
                });
            }
            Ok(state.disks.clone())
        })
    }

    fn list_snapshots<'a>(
        &'a self,
        filter: &'a SnapshotFilter,
    ) -> GatewayFuture<'a, Vec<Snapshot>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.calls.push(GatewayCall::ListSnapshots(filter.clone()));
            if state.fail_snapshots_for.contains(&filter.source_disk) {
                return Err(GatewayError::Provider {
                    message: format!("snapshot listing failed for {}", filter.source_disk),
                });
            }
            Ok(state
                .snapshots
                .iter()
                .filter(|snapshot| filter.matches(snapshot))
                .cloned()
                .collect())
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        disk_name: &'a str,
        request: &'a SnapshotRequest,
    ) -> GatewayFuture<'a, OperationHandle> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.calls.push(GatewayCall::CreateSnapshot {
                disk: disk_name.to_owned(),
                request: request.clone(),
            });
            if state.fail_create_for.contains(disk_name) {
                return Err(GatewayError::Provider {
                    message: format!("quota exceeded creating snapshot of {disk_name}"),
                });
            }
            let created = state.now.unwrap_or_else(Utc::now);
            state.snapshots.push(Snapshot {
                name: request.name.clone(),
                description: request.description.clone(),
                creation_timestamp: created,
                source_disk: self.disk_uri(disk_name),
            });
            let operation = Self::issue_operation(&mut state);
            Ok(OperationHandle::zonal(operation, self.zone.clone()))
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_name: &'a str) -> GatewayFuture<'a, OperationHandle> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state
                .calls
                .push(GatewayCall::DeleteSnapshot(snapshot_name.to_owned()));
            if state.fail_delete_for.contains(snapshot_name) {
                return Err(GatewayError::Provider {
                    message: format!("snapshot {snapshot_name} is in use"),
                });
            }
            state
                .snapshots
                .retain(|snapshot| snapshot.name != snapshot_name);
            let operation = Self::issue_operation(&mut state);
            Ok(OperationHandle::global(operation))
        })
    }

    fn get_operation<'a>(
        &'a self,
        handle: &'a OperationHandle,
    ) -> GatewayFuture<'a, Option<OperationStatus>> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.calls.push(GatewayCall::GetOperation(handle.name.clone()));
            Self::poll(&mut state, &handle.name)
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
