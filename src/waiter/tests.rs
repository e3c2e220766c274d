//! Tests for operation polling.

use super::*;
use crate::gateway::OperationState;
use crate::test_support::{FakeGateway, GatewayCall, PollResponse};
use serde_json::json;

const INTERVAL: Duration = Duration::from_secs(1);

fn handle() -> OperationHandle {
    OperationHandle::zonal("operation-create", "zone-a")
}

fn poll_count(gateway: &FakeGateway) -> usize {
    gateway
        .calls()
        .iter()
        .filter(|call| matches!(call, GatewayCall::GetOperation(_)))
        .count()
}

#[tokio::test(start_paused = true)]
async fn pending_operations_are_polled_until_done() {
    let gateway = FakeGateway::default();
    gateway.script_operation(
        "operation-create",
        [
            PollResponse::Pending,
            PollResponse::Pending,
            PollResponse::Done,
        ],
    );
    let started = Instant::now();

    let outcome = OperationWaiter::new(INTERVAL, None)
        .wait(&gateway, &handle())
        .await
        .expect("operation should complete");

    let OperationOutcome::Completed(status) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(status.status, OperationState::Done);
    assert_eq!(poll_count(&gateway), 3);
    assert_eq!(started.elapsed(), INTERVAL * 2, "one sleep between polls");
}

#[tokio::test(start_paused = true)]
async fn vanished_operation_counts_as_done() {
    let gateway = FakeGateway::default();
    gateway.script_operation("operation-create", [PollResponse::NotFound]);

    let outcome = OperationWaiter::default()
        .wait(&gateway, &handle())
        .await
        .expect("missing operation is success");

    assert_eq!(outcome, OperationOutcome::Vanished);
    assert_eq!(poll_count(&gateway), 1);
}

#[tokio::test(start_paused = true)]
async fn operation_vanishing_mid_wait_counts_as_done() {
    let gateway = FakeGateway::default();
    gateway.script_operation(
        "operation-create",
        [PollResponse::Running, PollResponse::NotFound],
    );

    let outcome = OperationWaiter::default().wait(&gateway, &handle()).await;

    assert_eq!(outcome, Ok(OperationOutcome::Vanished));
}

#[tokio::test(start_paused = true)]
async fn done_with_error_surfaces_payload_verbatim() {
    let payload = json!({
        "errors": [{"code": "QUOTA_EXCEEDED", "message": "Quota 'SNAPSHOTS' exceeded."}]
    });
    let gateway = FakeGateway::default();
    gateway.script_operation(
        "operation-create",
        [PollResponse::Failed(payload.clone())],
    );

    let err = OperationWaiter::default()
        .wait(&gateway, &handle())
        .await
        .expect_err("failed operation should error");

    assert_eq!(
        err,
        WaitError::Operation {
            operation: String::from("operation-create"),
            error: payload,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn poll_faults_propagate_without_retry() {
    let gateway = FakeGateway::default();
    gateway.script_operation(
        "operation-create",
        [
            PollResponse::Fault(String::from("permission denied")),
            PollResponse::Done,
        ],
    );

    let err = OperationWaiter::default()
        .wait(&gateway, &handle())
        .await
        .expect_err("poll fault should error");

    assert!(
        matches!(err, WaitError::Gateway { ref source, .. } if source.to_string().contains("permission denied")),
        "unexpected error: {err:?}"
    );
    assert_eq!(poll_count(&gateway), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_never_ending_operations() {
    let gateway = FakeGateway::default();
    gateway.script_operation(
        "operation-create",
        std::iter::repeat_n(PollResponse::Running, 100),
    );

    let err = OperationWaiter::new(INTERVAL, Some(Duration::from_secs(3)))
        .wait(&gateway, &handle())
        .await
        .expect_err("operation should time out");

    let WaitError::Timeout { operation, waited } = err else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(operation, "operation-create");
    assert_eq!(waited, Duration::from_secs(3));
    assert_eq!(poll_count(&gateway), 4);
}
