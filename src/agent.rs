//! Narrow entry point for automated agents.

use std::sync::Arc;

use crate::error::Result;
use crate::model::WorkItem;
use crate::queue::WorkQueue;

/// What an automated agent is allowed to do: ask for the next item.
#[derive(Clone)]
pub struct WorkQueueAgent {
    queue: Arc<WorkQueue>,
}

impl WorkQueueAgent {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }

    /// Claim the oldest new item for `agent_name`. See [`WorkQueue::assign_next`].
    pub async fn pick_next(&self, agent_name: &str) -> Result<WorkItem> {
        self.queue.assign_next(agent_name).await
    }
}
