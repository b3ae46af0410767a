//! Integration tests for the bridge actor over an in-memory pipe.
//!
//! The fake worker side reads the requests the bridge writes and plays back
//! response lines, exercising the full submit → encode → write → read →
//! decode → route path without a child process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_relay::{AppError, QueryEvent, QueryOptions};
use serde_json::json;

use super::util::attach_pair;

// ── Ping ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_resolves_on_pong() {
    let (bridge, mut worker) = attach_pair();

    let pinger = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.ping().await })
    };

    let request = worker.read_request().await;
    assert_eq!(request["type"], "ping");
    let id = request["query_id"].as_str().expect("query_id present");
    worker
        .send_json(&json!({"type": "pong", "query_id": id}))
        .await;

    pinger
        .await
        .expect("task join")
        .expect("pong within the window");
}

#[tokio::test]
async fn ping_times_out_when_the_worker_stays_silent() {
    let (bridge, mut worker) = attach_pair();

    let outcome = bridge.ping_with_timeout(Duration::from_millis(50)).await;
    let err = outcome.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)), "got: {err}");

    // The pending entry is deliberately left behind; a late pong reaps it
    // without disturbing anything, and the bridge keeps working.
    let request = worker.read_request().await;
    let stale_id = request["query_id"].as_str().expect("id").to_owned();
    worker
        .send_json(&json!({"type": "pong", "query_id": stale_id}))
        .await;

    let pinger = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.ping().await })
    };
    let request = worker.read_request().await;
    let id = request["query_id"].as_str().expect("id");
    worker
        .send_json(&json!({"type": "pong", "query_id": id}))
        .await;
    pinger.await.expect("join").expect("fresh ping succeeds");
}

// ── Blocking query ────────────────────────────────────────────────────────────

#[tokio::test]
async fn blocking_query_returns_accumulated_messages_in_order() {
    let (bridge, mut worker) = attach_pair();

    let query = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("2+2", QueryOptions::default()).await })
    };

    let request = worker.read_request().await;
    assert_eq!(request["type"], "query");
    assert_eq!(request["prompt"], "2+2");
    let id = request["query_id"].as_str().expect("id").to_owned();

    for seq in 1..=3 {
        worker
            .send_json(&json!({"type": "message", "query_id": id, "data": {"seq": seq}}))
            .await;
    }
    worker.send_json(&json!({"type": "done", "query_id": id})).await;

    let messages = query.await.expect("join").expect("query succeeds");
    assert_eq!(
        messages,
        vec![json!({"seq": 1}), json!({"seq": 2}), json!({"seq": 3})]
    );
}

#[tokio::test]
async fn worker_error_event_surfaces_as_domain_failure() {
    let (bridge, mut worker) = attach_pair();

    let query = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("explode", QueryOptions::default()).await })
    };

    let request = worker.read_request().await;
    let id = request["query_id"].as_str().expect("id").to_owned();
    worker
        .send_json(&json!({"type": "error", "query_id": id, "error": "model refused"}))
        .await;

    let err = query.await.expect("join").unwrap_err();
    assert!(
        matches!(err, AppError::Domain(ref msg) if msg == "model refused"),
        "got: {err}"
    );
}

#[tokio::test]
async fn malformed_line_between_valid_lines_is_dropped() {
    let (bridge, mut worker) = attach_pair();

    let query = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("2+2", QueryOptions::default()).await })
    };

    let request = worker.read_request().await;
    let id = request["query_id"].as_str().expect("id").to_owned();

    worker
        .send_json(&json!({"type": "message", "query_id": id, "data": {"seq": 1}}))
        .await;
    worker.send_line("{this is not json at all").await;
    worker
        .send_json(&json!({"type": "message", "query_id": id, "data": {"seq": 2}}))
        .await;
    worker.send_json(&json!({"type": "done", "query_id": id})).await;

    // Both valid lines around the malformed one are still delivered and the
    // query completes normally.
    let messages = query.await.expect("join").expect("query still completes");
    assert_eq!(messages, vec![json!({"seq": 1}), json!({"seq": 2})]);
}

#[tokio::test]
async fn unknown_response_type_is_skipped_without_breaking_the_query() {
    let (bridge, mut worker) = attach_pair();

    let query = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("hi", QueryOptions::default()).await })
    };

    let request = worker.read_request().await;
    let id = request["query_id"].as_str().expect("id").to_owned();
    worker
        .send_json(&json!({"type": "telemetry", "query_id": id, "data": {}}))
        .await;
    worker.send_json(&json!({"type": "done", "query_id": id})).await;

    assert!(query.await.expect("join").expect("completes").is_empty());
}

#[tokio::test]
async fn events_for_unknown_correlation_ids_are_dropped() {
    let (bridge, mut worker) = attach_pair();

    let query = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("hi", QueryOptions::default()).await })
    };

    let request = worker.read_request().await;
    let id = request["query_id"].as_str().expect("id").to_owned();

    worker
        .send_json(&json!({"type": "text", "query_id": "ghost", "text": "stray"}))
        .await;
    worker.send_json(&json!({"type": "done", "query_id": "ghost"})).await;
    worker.send_json(&json!({"type": "done", "query_id": id})).await;

    assert!(query.await.expect("join").expect("unaffected").is_empty());
}

// ── Concurrency ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_resolves_while_queries_stay_pending() {
    let (bridge, mut worker) = attach_pair();

    let query = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("slow", QueryOptions::default()).await })
    };
    let query_request = worker.read_request().await;
    let query_id = query_request["query_id"].as_str().expect("id").to_owned();

    // A ping issued while the query is pending resolves using only its own id.
    let pinger = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.ping().await })
    };
    let ping_request = worker.read_request().await;
    let ping_id = ping_request["query_id"].as_str().expect("id").to_owned();
    assert_ne!(ping_id, query_id, "correlation ids must be distinct");

    worker
        .send_json(&json!({"type": "pong", "query_id": ping_id}))
        .await;
    pinger.await.expect("join").expect("pong received");

    // The unrelated query entry was not consumed by the ping.
    worker
        .send_json(&json!({"type": "message", "query_id": query_id, "data": {"m": 1}}))
        .await;
    worker
        .send_json(&json!({"type": "done", "query_id": query_id}))
        .await;
    let messages = query.await.expect("join").expect("query completes");
    assert_eq!(messages, vec![json!({"m": 1})]);
}

#[tokio::test]
async fn interleaved_queries_deliver_per_id_in_emission_order() {
    let (bridge, mut worker) = attach_pair();

    let q1 = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("one", QueryOptions::default()).await })
    };
    let id1 = worker.read_request().await["query_id"]
        .as_str()
        .expect("id")
        .to_owned();

    let q2 = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("two", QueryOptions::default()).await })
    };
    let id2 = worker.read_request().await["query_id"]
        .as_str()
        .expect("id")
        .to_owned();

    // Interleave events across the two ids.
    worker
        .send_json(&json!({"type": "message", "query_id": id1, "data": {"q": 1, "seq": 1}}))
        .await;
    worker
        .send_json(&json!({"type": "message", "query_id": id2, "data": {"q": 2, "seq": 1}}))
        .await;
    worker
        .send_json(&json!({"type": "message", "query_id": id1, "data": {"q": 1, "seq": 2}}))
        .await;
    worker.send_json(&json!({"type": "done", "query_id": id2})).await;
    worker.send_json(&json!({"type": "done", "query_id": id1})).await;

    assert_eq!(
        q1.await.expect("join").expect("q1 completes"),
        vec![json!({"q": 1, "seq": 1}), json!({"q": 1, "seq": 2})]
    );
    assert_eq!(
        q2.await.expect("join").expect("q2 completes"),
        vec![json!({"q": 2, "seq": 1})]
    );
}

// ── Async query fan-out ───────────────────────────────────────────────────────

#[tokio::test]
async fn query_async_delivers_to_callback_and_mailbox_identically() {
    let (bridge, mut worker) = attach_pair();

    let callback_events: Arc<Mutex<Vec<QueryEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&callback_events);

    let (query_id, mut mailbox) = bridge
        .query_async("2+2", QueryOptions::default(), move |event| {
            sink.lock().expect("lock").push(event);
        })
        .await
        .expect("query_async submits");

    let request = worker.read_request().await;
    assert_eq!(request["query_id"].as_str(), Some(query_id.as_str()));

    worker
        .send_json(&json!({"type": "message", "query_id": query_id, "data": {"m": 1}}))
        .await;
    worker
        .send_json(&json!({"type": "text", "query_id": query_id, "text": "4"}))
        .await;
    worker
        .send_json(&json!({"type": "done", "query_id": query_id}))
        .await;

    // Pull everything from the mailbox until the terminal event.
    let mut mailbox_events = Vec::new();
    loop {
        let event = mailbox.recv().await.expect("mailbox stays open until done");
        let terminal = event.is_terminal();
        mailbox_events.push(event);
        if terminal {
            break;
        }
    }

    let expected = vec![
        QueryEvent::Message { data: json!({"m": 1}) },
        QueryEvent::Text { text: "4".into() },
        QueryEvent::Done {
            messages: vec![json!({"m": 1})],
        },
    ];
    assert_eq!(mailbox_events, expected);
    assert_eq!(*callback_events.lock().expect("lock"), expected);
}

// ── Fatal stream close ────────────────────────────────────────────────────────

#[tokio::test]
async fn stream_close_fails_all_pending_queries() {
    let (bridge, mut worker) = attach_pair();

    let q1 = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("one", QueryOptions::default()).await })
    };
    let q2 = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.query("two", QueryOptions::default()).await })
    };
    worker.read_request().await;
    worker.read_request().await;

    drop(worker);

    for handle in [q1, q2] {
        let err = handle.await.expect("join").unwrap_err();
        assert!(
            matches!(err, AppError::ChildExit { exit_code: None, .. }),
            "got: {err}"
        );
    }

    // The actor has terminated; new submissions are rejected.
    let err = bridge
        .query("late", QueryOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Closed(_)), "got: {err}");
}
