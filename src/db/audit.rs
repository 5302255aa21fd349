//! Audit log: append-only records of every work item transition.
//!
//! There is no update or delete. Schema triggers reject both.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{ActionId, ActionType, WorkAction, WorkId};

impl super::Tx {
    /// Append an audit record for `work_item_id`.
    ///
    /// `occurred_at` is raised to the newest recorded timestamp if the clock
    /// reads earlier. Writers are serialized, so timestamp order is commit order.
    pub async fn append_action(
        &mut self,
        work_item_id: WorkId,
        action_type: ActionType,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<WorkAction> {
        let row: WorkActionRow = sqlx::query_as(
            "INSERT INTO work_actions (work_item_id, action_type, actor, occurred_at)
             VALUES (?1, ?2, ?3, MAX(?4, COALESCE((SELECT MAX(occurred_at) FROM work_actions), 0)))
             RETURNING id, work_item_id, action_type, actor, occurred_at",
        )
        .bind(work_item_id.0)
        .bind(action_type.as_str())
        .bind(actor)
        .bind(now.timestamp_micros())
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into_work_action()
    }
}

impl super::Db {
    /// The full trail, most recent first.
    pub async fn list_actions(&self) -> Result<Vec<WorkAction>> {
        let rows: Vec<WorkActionRow> = sqlx::query_as(
            "SELECT id, work_item_id, action_type, actor, occurred_at
             FROM work_actions ORDER BY occurred_at DESC, id DESC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(WorkActionRow::try_into_work_action)
            .collect()
    }

    /// The trail of a single item, most recent first.
    pub async fn list_actions_for_item(&self, work_item_id: WorkId) -> Result<Vec<WorkAction>> {
        let rows: Vec<WorkActionRow> = sqlx::query_as(
            "SELECT id, work_item_id, action_type, actor, occurred_at
             FROM work_actions WHERE work_item_id = ?1
             ORDER BY occurred_at DESC, id DESC",
        )
        .bind(work_item_id.0)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(WorkActionRow::try_into_work_action)
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct WorkActionRow {
    id: i64,
    work_item_id: i64,
    action_type: String,
    actor: String,
    occurred_at: i64,
}

impl WorkActionRow {
    fn try_into_work_action(self) -> Result<WorkAction> {
        let occurred_at = DateTime::from_timestamp_micros(self.occurred_at).ok_or_else(|| {
            Error::Other(format!(
                "audit record {} has out-of-range timestamp {}",
                self.id, self.occurred_at
            ))
        })?;

        Ok(WorkAction {
            id: ActionId(self.id),
            work_item_id: WorkId(self.work_item_id),
            action_type: self.action_type.parse()?,
            actor: self.actor,
            occurred_at,
        })
    }
}
