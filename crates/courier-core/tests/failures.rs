mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{entity_key, harness, harness_with_sink, settle, update};
use courier_core::domain::{CORRELATION_HEADER, TransportError};
use courier_core::impls::{InMemorySink, ScriptedResponse, ScriptedTransport};
use courier_core::ports::{Entity, MutationSink};
use courier_core::{DispatchError, DispatchOptions, FailureCause};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn seeded() -> InMemorySink {
    InMemorySink::with_entities([
        Entity::new(entity_key(42), json!({"title": "old", "color": "red"})),
        Entity::new(entity_key(7), json!({"title": "other"})),
    ])
}

fn server(status: u16) -> TransportError {
    TransportError::Server {
        status,
        message: "nope".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn fatal_rejection_restores_the_exact_previous_state() {
    let h = harness_with_sink(
        ScriptedTransport::always(ScriptedResponse::err(server(422))),
        seeded(),
    );
    let before = h.sink.snapshot();

    let err = h
        .courier
        .dispatch(update(42, "new"), DispatchOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err.cause(), Some(FailureCause::ServerRejected { status: 422, .. })));
    assert_eq!(h.sink.snapshot(), before);
    assert_eq!(h.transport.call_count(), 1);

    let stats = h.courier.stats();
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.total_executed, 0);
    assert_eq!(stats.interrupt_table_size, 0);
}

#[tokio::test(start_paused = true)]
async fn rollback_removes_an_entity_that_did_not_exist_before() {
    let h = harness(ScriptedTransport::always(ScriptedResponse::err(server(404))));

    h.courier
        .dispatch(update(5, "ghost"), DispatchOptions::new())
        .await
        .unwrap_err();
    assert!(h.sink.get(&entity_key(5)).is_none());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_reuse_one_correlation_id_then_roll_back() {
    let h = harness_with_sink(
        ScriptedTransport::always(ScriptedResponse::err(TransportError::Network("reset".into()))),
        seeded(),
    );
    let before = h.sink.snapshot();

    let err = h
        .courier
        .dispatch(update(42, "new"), DispatchOptions::new())
        .await
        .unwrap_err();

    let DispatchError::Failed(failure) = &err else {
        panic!("expected a failed instruction, got {err:?}");
    };
    assert_eq!(failure.attempts, 3);
    assert!(matches!(failure.cause, FailureCause::RetriesExhausted { .. }));

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.correlation_id == failure.correlation_id));
    let header = failure.correlation_id.to_string();
    assert!(calls
        .iter()
        .all(|c| c.header(CORRELATION_HEADER) == Some(header.as_str())));
    assert_eq!(h.sink.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn retryable_failure_then_success_commits() {
    let transport = ScriptedTransport::new();
    transport.push("/entities/42", ScriptedResponse::err(server(503)));
    let h = harness(transport);

    let receipt = h
        .courier
        .dispatch(update(42, "new"), DispatchOptions::new())
        .await
        .unwrap();

    assert_eq!(receipt.attempts, 2);
    assert!(h
        .transport
        .calls()
        .iter()
        .all(|c| c.correlation_id == receipt.correlation_id));

    let stored = h.sink.get(&entity_key(42)).unwrap();
    assert_eq!(stored.body["title"], "new");
    assert_eq!(stored.body["correlationId"], receipt.correlation_id.to_string());
    assert!(stored.body.get("pending").is_none());
}

#[tokio::test(start_paused = true)]
async fn timeout_rolls_back_and_releases_keys() {
    let h = harness_with_sink(ScriptedTransport::echo_after(Duration::from_secs(5)), seeded());
    let before = h.sink.snapshot();

    let err = h
        .courier
        .dispatch(
            update(42, "slow"),
            DispatchOptions::new().timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(h.sink.snapshot(), before);
    // the in-flight call was abandoned
    assert_eq!(h.transport.call_count(), 0);

    // entity:42 is free again
    h.transport
        .push("/entities/42", ScriptedResponse::ok(json!({"title": "fast"})));
    h.courier
        .dispatch(update(42, "fast"), DispatchOptions::new())
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn timeout_covers_retry_backoff() {
    let h = harness(ScriptedTransport::always(ScriptedResponse::err(server(503))));

    let err = h
        .courier
        .dispatch(
            update(42, "new"),
            DispatchOptions::new().timeout(Duration::from_millis(300)),
        )
        .await
        .unwrap_err();

    // attempt 1 at 0ms, attempt 2 at 200ms, the 400ms backoff is cut short
    assert!(err.is_timeout());
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn validation_rejection_never_reaches_scheduler_or_network() {
    let h = harness_with_sink(ScriptedTransport::new(), seeded());
    let before = h.sink.snapshot();

    let err = h
        .courier
        .dispatch(update(42, "   "), DispatchOptions::new())
        .await
        .unwrap_err();

    assert!(err.is_validation_rejected());
    assert_eq!(err.cause(), Some(&FailureCause::ValidationRejected));
    assert_eq!(h.transport.call_count(), 0);
    assert_eq!(h.sink.snapshot(), before);
    assert_eq!(h.courier.stats().total_failed, 1);
}

#[tokio::test]
async fn unknown_type_and_bad_payload_fail_before_ids_are_allocated() {
    let h = harness(ScriptedTransport::new());

    let unknown = h
        .courier
        .dispatch_json("entity.explode", json!({"id": 1}), DispatchOptions::new())
        .await
        .unwrap_err();
    assert_eq!(unknown, DispatchError::UnknownInstructionType("entity.explode".into()));

    let invalid = h
        .courier
        .dispatch_json("entity.update", json!({"id": "x"}), DispatchOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(invalid, DispatchError::InvalidPayload { .. }));

    assert_eq!(h.transport.call_count(), 0);
    assert_eq!(h.courier.stats().total_failed, 0);
}

#[tokio::test(start_paused = true)]
async fn dispatch_json_runs_the_same_pipeline() {
    let h = harness(ScriptedTransport::new());
    let receipt = h
        .courier
        .dispatch_json(
            "entity.update",
            json!({"id": 3, "title": "from json"}),
            DispatchOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(receipt.instruction_type, "entity.update");
    assert_eq!(h.sink.get(&entity_key(3)).unwrap().body["title"], "from json");
}

#[tokio::test(start_paused = true)]
async fn cancel_while_executing_rolls_back() {
    let h = harness_with_sink(ScriptedTransport::echo_after(Duration::from_secs(1)), seeded());
    let before = h.sink.snapshot();
    let token = CancellationToken::new();

    let pending = tokio::spawn({
        let courier = Arc::clone(&h.courier);
        let token = token.clone();
        async move {
            courier
                .dispatch(update(42, "new"), DispatchOptions::new().cancel_token(token))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.sink.get(&entity_key(42)).unwrap().body["title"], "new");

    token.cancel();
    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(h.sink.snapshot(), before);
    assert_eq!(h.courier.stats().total_failed, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_while_waiting_for_admission_leaves_the_queue() {
    let h = harness(ScriptedTransport::echo_after(Duration::from_millis(200)));
    let token = CancellationToken::new();

    let blocker = tokio::spawn({
        let courier = Arc::clone(&h.courier);
        async move { courier.dispatch(update(42, "first"), DispatchOptions::new()).await }
    });
    settle().await;
    let waiting = tokio::spawn({
        let courier = Arc::clone(&h.courier);
        let token = token.clone();
        async move {
            courier
                .dispatch(update(42, "second"), DispatchOptions::new().cancel_token(token))
                .await
        }
    });
    settle().await;
    assert_eq!(h.courier.stats().pending_count, 1);

    token.cancel();
    let err = waiting.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(h.courier.stats().pending_count, 0);

    blocker.await.unwrap().unwrap();
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_dispatch_future_rolls_back_and_releases_keys() {
    let h = harness_with_sink(ScriptedTransport::echo_after(Duration::from_secs(1)), seeded());
    let before = h.sink.snapshot();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        h.courier.dispatch(update(42, "new"), DispatchOptions::new()),
    )
    .await;
    assert!(abandoned.is_err());

    assert_eq!(h.sink.snapshot(), before);
    let stats = h.courier.stats();
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.total_executed, 0);

    h.transport
        .push("/entities/42", ScriptedResponse::ok(json!({"title": "again"})));
    h.courier
        .dispatch(update(42, "again"), DispatchOptions::new())
        .await
        .unwrap();
    assert_eq!(h.sink.get(&entity_key(42)).unwrap().body["title"], "again");
}

#[tokio::test(start_paused = true)]
async fn aborted_dispatch_task_leaves_no_optimistic_state() {
    let h = harness(ScriptedTransport::echo_after(Duration::from_secs(1)));

    let task = tokio::spawn({
        let courier = Arc::clone(&h.courier);
        async move { courier.dispatch(update(5, "ghost"), DispatchOptions::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.sink.get(&entity_key(5)).unwrap().body["pending"], true);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(h.sink.get(&entity_key(5)).is_none());
    assert_eq!(h.courier.stats().total_failed, 1);
    assert_eq!(h.courier.stats().pending_count, 0);
}
