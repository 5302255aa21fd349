#![allow(dead_code)] // each test binary uses a different subset

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use workq::db::{Db, DbOptions};
use workq::queue::{LifecyclePolicy, QueueOptions, RetryPolicy, WorkQueue};

/// Queue over a fresh in-memory database.
pub async fn memory_queue(lifecycle: LifecyclePolicy) -> WorkQueue {
    let db = Db::in_memory().await.unwrap();
    WorkQueue::new(
        Arc::new(db),
        QueueOptions {
            lifecycle,
            ..QueueOptions::default()
        },
    )
}

/// Queue over a migrated database file with a multi-connection pool.
/// Keep the `TempDir` alive for the duration of the test.
pub async fn file_queue(max_connections: u32) -> (TempDir, Arc<WorkQueue>) {
    let dir = tempfile::tempdir().unwrap();
    let db = Db::open(
        dir.path().join("workq.db"),
        &DbOptions {
            max_connections,
            busy_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(30),
        },
    )
    .await
    .unwrap();
    db.migrate().await.unwrap();

    let queue = WorkQueue::new(
        Arc::new(db),
        QueueOptions {
            retry: RetryPolicy {
                max_attempts: 10,
                backoff: Duration::from_millis(5),
            },
            lifecycle: LifecyclePolicy::Lenient,
        },
    );
    (dir, Arc::new(queue))
}
