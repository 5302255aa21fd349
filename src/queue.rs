//! The work queue. The public API for creating, claiming, and completing work.
//!
//! Every mutating operation runs in one transaction: the item write and its
//! audit record commit together or not at all. Store contention is retried
//! a bounded number of times before surfacing as `TransientConflict`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{Instrument, debug, error, info, warn};

use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::*;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_outcome, start_queue_span};

/// How `assign` and `complete` treat the item's current status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecyclePolicy {
    /// Writes are unconditional: any existing item can be assigned or
    /// completed, whatever its status.
    #[default]
    Lenient,
    /// `assign` requires `New` and `complete` requires `Assigned`.
    /// Anything else fails with `InvalidTransition`.
    Strict,
}

/// Bounded retry of store contention.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, the first included. At least 1.
    pub max_attempts: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_millis(25),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    pub retry: RetryPolicy,
    pub lifecycle: LifecyclePolicy,
}

/// The work queue. Enforces lifecycle rules and writes the audit trail.
pub struct WorkQueue {
    db: Arc<Db>,
    options: QueueOptions,
}

impl WorkQueue {
    pub fn new(db: Arc<Db>, options: QueueOptions) -> Self {
        Self { db, options }
    }

    /// Create a new item in `New` status on behalf of `supervisor`.
    pub async fn create(&self, title: &str, supervisor: &str) -> Result<WorkItem> {
        require_non_blank("title", title)?;
        require_non_blank("supervisor", supervisor)?;

        let item = self
            .mutate("create", supervisor, ActionType::Create, move || {
                self.create_once(title, supervisor)
            })
            .await?;

        metrics::items_created().add(1, &[]);
        info!(id = %item.id, supervisor, "work item created");
        Ok(item)
    }

    /// Assign an existing item to `agent`.
    pub async fn assign(&self, id: WorkId, agent: &str) -> Result<WorkItem> {
        self.require_agent_for(id, agent).await?;

        let item = self
            .mutate("assign", agent, ActionType::Assign, move || {
                self.transition_once(id, WorkStatus::Assigned, ActionType::Assign, agent)
            })
            .await?;

        info!(id = %item.id, agent, "work item assigned");
        Ok(item)
    }

    /// Mark an existing item completed by `agent`.
    pub async fn complete(&self, id: WorkId, agent: &str) -> Result<WorkItem> {
        self.require_agent_for(id, agent).await?;

        let item = self
            .mutate("complete", agent, ActionType::Complete, move || {
                self.transition_once(id, WorkStatus::Completed, ActionType::Complete, agent)
            })
            .await?;

        info!(id = %item.id, agent, "work item completed");
        Ok(item)
    }

    /// Claim the oldest `New` item for `agent`.
    ///
    /// Concurrent callers never receive the same item, and an item enters
    /// `Assigned` through this path at most once.
    pub async fn assign_next(&self, agent: &str) -> Result<WorkItem> {
        require_non_blank("agent", agent)?;

        let result = self
            .mutate("assign_next", agent, ActionType::AssignNext, move || {
                self.assign_next_once(agent)
            })
            .await;

        match &result {
            Ok(item) => {
                metrics::claims().add(1, &[KeyValue::new("result", "ok")]);
                info!(id = %item.id, agent, "work item claimed");
            }
            Err(Error::NoItemAvailable) => {
                metrics::claims().add(1, &[KeyValue::new("result", "empty")]);
                debug!(agent, "no new work items to claim");
            }
            Err(_) => {}
        }
        result
    }

    /// All items, in creation order.
    pub async fn list_queue(&self) -> Result<Vec<WorkItem>> {
        self.retrying("list_queue", move || self.db.list_items()).await
    }

    /// Items currently in `status`, in creation order.
    pub async fn list_by_status(&self, status: WorkStatus) -> Result<Vec<WorkItem>> {
        self.retrying("list_by_status", move || self.db.list_items_by_status(status))
            .await
    }

    /// The full audit trail, most recent first.
    pub async fn list_audit(&self) -> Result<Vec<WorkAction>> {
        self.retrying("list_audit", move || self.db.list_actions()).await
    }

    /// Get a work item by ID.
    pub async fn get(&self, id: WorkId) -> Result<WorkItem> {
        self.retrying("get", move || self.db.get_item(id)).await
    }

    /// The audit trail of one item, most recent first.
    pub async fn history(&self, id: WorkId) -> Result<Vec<WorkAction>> {
        self.retrying("history", move || async move {
            // resolve the item first so an unknown id is NotFound, not empty
            self.db.get_item(id).await?;
            self.db.list_actions_for_item(id).await
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Single attempts. Each is one transaction; dropping `tx` on error rolls back.
    // -----------------------------------------------------------------------

    async fn create_once(&self, title: &str, supervisor: &str) -> Result<WorkItem> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let item = tx.insert_item(title, now).await?;
        tx.append_action(item.id, ActionType::Create, supervisor, now)
            .await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn transition_once(
        &self,
        id: WorkId,
        to: WorkStatus,
        action: ActionType,
        agent: &str,
    ) -> Result<WorkItem> {
        let expected = match self.options.lifecycle {
            LifecyclePolicy::Lenient => None,
            LifecyclePolicy::Strict => WorkStatus::strict_predecessor(to),
        };

        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let Some(item) = tx.transition_item(id, expected, to, agent, now).await? else {
            // Unknown id surfaces NotFound here; otherwise the guard refused.
            let current = tx.get_item(id).await?;
            return Err(Error::InvalidTransition {
                id,
                from: current.status,
                to,
            });
        };
        tx.append_action(item.id, action, agent, now).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn assign_next_once(&self, agent: &str) -> Result<WorkItem> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        let Some(item) = tx.claim_earliest(agent, now).await? else {
            return Err(Error::NoItemAvailable);
        };
        tx.append_action(item.id, ActionType::AssignNext, agent, now)
            .await?;
        tx.commit().await?;
        Ok(item)
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Reject a blank agent name, unless the id itself is unknown.
    async fn require_agent_for(&self, id: WorkId, agent: &str) -> Result<()> {
        if agent.trim().is_empty() {
            self.get(id).await?;
        }
        require_non_blank("agent", agent)
    }

    /// Run a mutating attempt under a span, with retries and metrics.
    async fn mutate<F, Fut>(
        &self,
        operation: &'static str,
        actor: &str,
        action: ActionType,
        attempt: F,
    ) -> Result<WorkItem>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<WorkItem>>,
    {
        let span = start_queue_span(operation, actor);
        let started = Instant::now();

        let result = self
            .retrying(operation, attempt)
            .instrument(span.clone())
            .await;

        metrics::operation_duration_ms().record(
            started.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", operation)],
        );

        if let Ok(item) = &result {
            record_outcome(&span, item.id.0, item.status.as_str());
            if action != ActionType::Create {
                metrics::state_transitions().add(
                    1,
                    &[
                        KeyValue::new("action", action.as_str()),
                        KeyValue::new("to", item.status.as_str()),
                    ],
                );
            }
        }
        result
    }

    /// Retry `attempt` while it fails with a transient store error.
    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.options.retry.max_attempts.max(1);
        let mut tries = 0;

        loop {
            tries += 1;
            match attempt().await {
                Err(e) if e.is_transient() => {
                    if tries >= max_attempts {
                        error!(operation, attempts = tries, error = %e, "store contention persisted");
                        return Err(Error::TransientConflict {
                            operation,
                            attempts: tries,
                        });
                    }
                    metrics::conflicts_retried()
                        .add(1, &[KeyValue::new("operation", operation)]);
                    warn!(operation, attempt = tries, error = %e, "store contention, retrying");
                    tokio::time::sleep(self.options.retry.backoff * tries).await;
                }
                other => return other,
            }
        }
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be blank")));
    }
    Ok(())
}
