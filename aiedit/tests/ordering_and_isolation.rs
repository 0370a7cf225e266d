//! Cross-resource concurrency properties: per-file FIFO ordering, failure
//! isolation between queues, resource-claim enforcement, and cancellation.

use std::sync::Arc;

use aiedit::config::EngineConfig;
use aiedit::event::EventHandler;
use aiedit::registry::SessionRegistry;
use aiedit_core::error::EngineError;
use aiedit_core::types::TextEdit;

fn engine() -> (EventHandler, SessionRegistry) {
    let handler = EventHandler::new();
    let registry = SessionRegistry::new(EngineConfig::default(), handler.tx.clone());
    (handler, registry)
}

#[tokio::test]
async fn per_resource_order_holds_under_concurrent_files() {
    let (_handler, registry) = engine();
    let session = registry.create(Some("req-1")).unwrap();
    session.open_resource("a.rs", "a0").unwrap();
    session.open_resource("b.rs", "b0").unwrap();

    // Two tasks drive two files concurrently; within each file the batches
    // are enqueued in sequence. Whatever the scheduler does across files,
    // each file must come out in its own enqueue order.
    let s1 = Arc::clone(&session);
    let s2 = Arc::clone(&session);
    let writer_a = tokio::spawn(async move {
        for i in 1..=10u32 {
            let line_count = i; // document grows one line per batch
            s1.apply_progress(
                "a.rs",
                &format!("it{i}"),
                vec![TextEdit::replace(line_count, 0, line_count, 0, format!("\na{i}"))],
            )
            .await
            .unwrap();
        }
    });
    let writer_b = tokio::spawn(async move {
        for i in 1..=10u32 {
            let line_count = i;
            s2.apply_progress(
                "b.rs",
                &format!("it{i}"),
                vec![TextEdit::replace(line_count, 0, line_count, 0, format!("\nb{i}"))],
            )
            .await
            .unwrap();
        }
    });
    writer_a.await.unwrap();
    writer_b.await.unwrap();

    let expect_a: Vec<String> =
        std::iter::once("a0".to_owned()).chain((1..=10).map(|i| format!("a{i}"))).collect();
    let expect_b: Vec<String> =
        std::iter::once("b0".to_owned()).chain((1..=10).map(|i| format!("b{i}"))).collect();
    assert_eq!(session.working_text("a.rs").await.unwrap(), expect_a.join("\n"));
    assert_eq!(session.working_text("b.rs").await.unwrap(), expect_b.join("\n"));
}

#[tokio::test]
async fn failing_batch_never_touches_sibling_resources() {
    let (mut handler, registry) = engine();
    let session = registry.create(Some("req-1")).unwrap();
    session.open_resource("a.rs", "a").unwrap();
    session.open_resource("b.rs", "b").unwrap();

    // Malformed range on a.rs: the batch dies, the queue survives.
    let err = session
        .apply_progress("a.rs", "it1", vec![TextEdit::replace(42, 0, 42, 1, "X")])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::OutOfRangeEdit { .. }));
    match handler.rx.recv().await.unwrap() {
        aiedit::event::SessionEvent::EditApplicationFailed { resource, .. } => {
            assert_eq!(resource, "a.rs");
        }
        other => panic!("expected EditApplicationFailed, got {other:?}"),
    }

    // a.rs is unchanged and still accepts edits; b.rs never noticed.
    assert_eq!(session.working_text("a.rs").await.unwrap(), "a");
    session
        .apply_progress("a.rs", "it1", vec![TextEdit::replace(0, 0, 0, 1, "A")])
        .await
        .unwrap();
    session
        .apply_progress("b.rs", "it1", vec![TextEdit::replace(0, 0, 0, 1, "B")])
        .await
        .unwrap();
    assert_eq!(session.working_text("a.rs").await.unwrap(), "A");
    assert_eq!(session.working_text("b.rs").await.unwrap(), "B");
}

#[tokio::test]
async fn a_resource_belongs_to_one_session_at_a_time() {
    let (_handler, registry) = engine();
    let first = registry.create(Some("req-1")).unwrap();
    first.open_resource("shared.rs", "content").unwrap();

    let second = registry.create(Some("req-2")).unwrap();
    let err = second.open_resource("shared.rs", "content").unwrap_err();
    assert_eq!(
        err,
        EngineError::ResourceLocked { resource: "shared.rs".into(), owner: "req-1".into() }
    );

    // The same hard failure applies on the batch path.
    let err = second
        .apply_progress("shared.rs", "it1", vec![TextEdit::replace(0, 0, 0, 1, "x")])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ResourceLocked { .. }));

    // Disposal releases the claim.
    registry.dispose("req-1").await.unwrap();
    second.open_resource("shared.rs", "content").unwrap();
}

#[tokio::test]
async fn duplicate_session_ids_are_rejected() {
    let (_handler, registry) = engine();
    registry.create(Some("req-1")).unwrap();
    let err = registry.create(Some("req-1")).unwrap_err();
    assert_eq!(err, EngineError::SessionExists { session_id: "req-1".into() });

    // Generated ids never collide with each other in practice.
    let a = registry.create(None).unwrap();
    let b = registry.create(None).unwrap();
    assert_ne!(a.session_id(), b.session_id());
}

#[tokio::test]
async fn cancelled_session_stops_admitting_batches() {
    let (_handler, registry) = engine();
    let session = registry.create(Some("req-1")).unwrap();
    session.open_resource("f", "a").unwrap();
    session
        .apply_progress("f", "it1", vec![TextEdit::replace(0, 0, 0, 1, "b")])
        .await
        .unwrap();

    registry.cancel("req-1").unwrap();
    let err = session
        .apply_progress("f", "it2", vec![TextEdit::replace(0, 0, 0, 1, "c")])
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Cancelled);

    // Already-applied edits stay visible pending review.
    assert_eq!(session.working_text("f").await.unwrap(), "b");
    session.accept(None).await;
    let (accepted, _) = registry.dispose("req-1").await.unwrap();
    assert_eq!(accepted, vec!["f".to_owned()]);
}

#[tokio::test]
async fn closed_sessions_refuse_everything() {
    let (_handler, registry) = engine();
    let session = registry.create(Some("req-1")).unwrap();
    session.open_resource("f", "a").unwrap();
    registry.dispose("req-1").await.unwrap();

    assert_eq!(session.open_resource("g", "x").unwrap_err(), EngineError::SessionClosed);
    let err = session
        .apply_progress("f", "it1", vec![TextEdit::replace(0, 0, 0, 1, "b")])
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::SessionClosed);
}
