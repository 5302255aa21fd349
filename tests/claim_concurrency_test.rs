//! Concurrent claims against a file-backed queue with a multi-connection pool.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::file_queue;
use workq::db::{Db, DbOptions};
use workq::error::Error;
use workq::model::*;
use workq::queue::{LifecyclePolicy, QueueOptions, RetryPolicy, WorkQueue};

/// Fire `agents` concurrent claims and split the results.
async fn claim_concurrently(queue: &Arc<WorkQueue>, agents: usize) -> (Vec<WorkItem>, Vec<Error>) {
    let mut handles = Vec::new();
    for n in 0..agents {
        let queue = Arc::clone(queue);
        handles.push(tokio::spawn(async move {
            queue.assign_next(&format!("Agent-{n}")).await
        }));
    }

    let mut claimed = Vec::new();
    let mut failed = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(item) => claimed.push(item),
            Err(e) => failed.push(e),
        }
    }
    (claimed, failed)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_agents_never_receive_the_same_item() {
    let (_dir, queue) = file_queue(4).await;
    let a = queue.create("A", "sup").await.unwrap();
    let b = queue.create("B", "sup").await.unwrap();

    let (claimed, failed) = claim_concurrently(&queue, 2).await;

    assert!(failed.is_empty(), "unexpected failures: {failed:?}");
    let ids: HashSet<_> = claimed.iter().map(|i| i.id).collect();
    assert_eq!(ids, HashSet::from([a.id, b.id]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn more_agents_than_items() {
    const ITEMS: usize = 10;
    const AGENTS: usize = 24;

    let (_dir, queue) = file_queue(8).await;
    for n in 0..ITEMS {
        queue.create(&format!("task {n}"), "sup").await.unwrap();
    }

    let (claimed, failed) = claim_concurrently(&queue, AGENTS).await;

    let ids: HashSet<_> = claimed.iter().map(|i| i.id).collect();
    assert_eq!(claimed.len(), ITEMS);
    assert_eq!(ids.len(), ITEMS, "an item was handed out twice");
    assert_eq!(failed.len(), AGENTS - ITEMS);
    assert!(
        failed
            .iter()
            .all(|e| matches!(e, Error::NoItemAvailable | Error::TransientConflict { .. })),
        "unexpected failures: {failed:?}"
    );

    // every item went New -> Assigned through this path exactly once
    let audit = queue.list_audit().await.unwrap();
    let claims: Vec<_> = audit
        .iter()
        .filter(|a| a.action_type == ActionType::AssignNext)
        .collect();
    assert_eq!(claims.len(), ITEMS);
    let claimed_in_audit: HashSet<_> = claims.iter().map(|a| a.work_item_id).collect();
    assert_eq!(claimed_in_audit, ids);

    // the audit actor matches whoever received the item
    for item in &claimed {
        let record = claims
            .iter()
            .find(|a| a.work_item_id == item.id)
            .unwrap();
        assert_eq!(Some(record.actor.as_str()), item.assigned_to.as_deref());
    }

    assert!(
        queue
            .list_queue()
            .await
            .unwrap()
            .iter()
            .all(|i| i.status == WorkStatus::Assigned)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn more_items_than_agents_claims_the_oldest() {
    const ITEMS: usize = 12;
    const AGENTS: usize = 5;

    let (_dir, queue) = file_queue(8).await;
    let mut created = Vec::new();
    for n in 0..ITEMS {
        created.push(queue.create(&format!("task {n}"), "sup").await.unwrap().id);
    }

    let (claimed, failed) = claim_concurrently(&queue, AGENTS).await;
    assert!(failed.is_empty(), "unexpected failures: {failed:?}");

    // FIFO: the claimed set is exactly the oldest AGENTS items
    let ids: HashSet<_> = claimed.iter().map(|i| i.id).collect();
    let oldest: HashSet<_> = created[..AGENTS].iter().copied().collect();
    assert_eq!(ids, oldest);

    let remaining = queue
        .list_queue()
        .await
        .unwrap()
        .into_iter()
        .filter(|i| i.status == WorkStatus::New)
        .count();
    assert_eq!(remaining, ITEMS - AGENTS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn claims_race_with_creates_and_assigns() {
    let (_dir, queue) = file_queue(8).await;
    for n in 0..6 {
        queue.create(&format!("seed {n}"), "sup").await.unwrap();
    }

    let mut handles = Vec::new();
    for n in 0..6 {
        let q = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            q.create(&format!("late {n}"), "sup").await.map(|_| ())
        }));
        let q = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            q.assign(WorkId(1), &format!("Direct-{n}")).await.map(|_| ())
        }));
    }
    let (claimed, _) = claim_concurrently(&queue, 8).await;
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let ids: HashSet<_> = claimed.iter().map(|i| i.id).collect();
    assert_eq!(ids.len(), claimed.len(), "an item was handed out twice");

    // one audit record per committed operation: 12 creates, 6 assigns, the claims
    let audit = queue.list_audit().await.unwrap();
    assert_eq!(audit.len(), 12 + 6 + claimed.len());
    assert!(
        audit
            .windows(2)
            .all(|w| w[0].occurred_at >= w[1].occurred_at)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn held_write_lock_surfaces_transient_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(
        dir.path().join("workq.db"),
        &DbOptions {
            max_connections: 2,
            busy_timeout: Duration::from_millis(50),
            acquire_timeout: Duration::from_secs(5),
        },
    )
    .await
    .unwrap();
    db.migrate().await.unwrap();
    let db = Arc::new(db);
    let queue = WorkQueue::new(
        Arc::clone(&db),
        QueueOptions {
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(5),
            },
            lifecycle: LifecyclePolicy::Lenient,
        },
    );
    let seeded = queue.create("a", "sup").await.unwrap();

    // an open transaction that has written holds SQLite's write lock
    let mut holder = db.begin().await.unwrap();
    holder.insert_item("held", Utc::now()).await.unwrap();

    let err = queue.assign_next("A").await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::TransientConflict {
                operation: "assign_next",
                attempts: 3
            }
        ),
        "expected TransientConflict, got {err:?}"
    );
    assert!(err.is_retryable());

    drop(holder);

    let claimed = queue.assign_next("A").await.unwrap();
    assert_eq!(claimed.id, seeded.id);
    assert_eq!(claimed.title, "a");
    assert_eq!(queue.list_queue().await.unwrap().len(), 1);
}
