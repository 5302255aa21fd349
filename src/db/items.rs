//! Item store: keyed work item records, queryable by id and by status.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite};

use crate::error::{Error, Result};
use crate::model::{WorkId, WorkItem, WorkStatus};

impl super::Tx {
    /// Insert a new item in `New` status. Storage assigns the id.
    pub async fn insert_item(&mut self, title: &str, now: DateTime<Utc>) -> Result<WorkItem> {
        let row: WorkItemRow = sqlx::query_as(
            "INSERT INTO work_items (title, status, assigned_to, created_at, updated_at)
             VALUES (?1, 'new', NULL, ?2, ?2)
             RETURNING id, title, status, assigned_to, created_at, updated_at",
        )
        .bind(title)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into_work_item()
    }

    /// Write `to` and `agent` onto an item in a single guarded statement.
    ///
    /// With `expected = Some(s)` the write only applies while the item is in
    /// status `s`. Returns `None` when no row matched, either because the id
    /// is unknown or because the guard failed.
    pub async fn transition_item(
        &mut self,
        id: WorkId,
        expected: Option<WorkStatus>,
        to: WorkStatus,
        agent: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkItem>> {
        let row: Option<WorkItemRow> = sqlx::query_as(
            "UPDATE work_items SET status = ?1, assigned_to = ?2, updated_at = ?3
             WHERE id = ?4 AND (?5 IS NULL OR status = ?5)
             RETURNING id, title, status, assigned_to, created_at, updated_at",
        )
        .bind(to.as_str())
        .bind(agent)
        .bind(now)
        .bind(id.0)
        .bind(expected.map(WorkStatus::as_str))
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(WorkItemRow::try_into_work_item).transpose()
    }

    /// Claim the `New` item with the smallest id for `agent`.
    ///
    /// Selection and the `Assigned` write are one statement, and the statement
    /// takes SQLite's write lock before it reads, so two concurrent claims can
    /// never select the same row: the second one waits for the first to commit
    /// and then sees the row as `assigned`.
    pub async fn claim_earliest(
        &mut self,
        agent: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<WorkItem>> {
        let row: Option<WorkItemRow> = sqlx::query_as(
            "UPDATE work_items SET status = 'assigned', assigned_to = ?1, updated_at = ?2
             WHERE id = (
                 SELECT id FROM work_items WHERE status = 'new' ORDER BY id ASC LIMIT 1
             )
             AND status = 'new'
             RETURNING id, title, status, assigned_to, created_at, updated_at",
        )
        .bind(agent)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(WorkItemRow::try_into_work_item).transpose()
    }

    pub async fn get_item(&mut self, id: WorkId) -> Result<WorkItem> {
        get_item_on(&mut *self.tx, id).await
    }
}

impl super::Db {
    /// Get a work item by ID.
    pub async fn get_item(&self, id: WorkId) -> Result<WorkItem> {
        get_item_on(self.pool(), id).await
    }

    /// All items, oldest first.
    pub async fn list_items(&self) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(
            "SELECT id, title, status, assigned_to, created_at, updated_at
             FROM work_items ORDER BY id ASC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(WorkItemRow::try_into_work_item)
            .collect()
    }

    /// Items in the given status, oldest first.
    pub async fn list_items_by_status(&self, status: WorkStatus) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(
            "SELECT id, title, status, assigned_to, created_at, updated_at
             FROM work_items WHERE status = ?1 ORDER BY id ASC",
        )
        .bind(status.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.into_iter()
            .map(WorkItemRow::try_into_work_item)
            .collect()
    }

    /// The item with the smallest id in the given status, if any.
    ///
    /// A plain read: not safe to follow with an unguarded write. Claims go
    /// through [`Tx::claim_earliest`](super::Tx::claim_earliest).
    pub async fn find_earliest_by_status(&self, status: WorkStatus) -> Result<Option<WorkItem>> {
        let row: Option<WorkItemRow> = sqlx::query_as(
            "SELECT id, title, status, assigned_to, created_at, updated_at
             FROM work_items WHERE status = ?1 ORDER BY id ASC LIMIT 1",
        )
        .bind(status.as_str())
        .fetch_optional(self.pool())
        .await?;

        row.map(WorkItemRow::try_into_work_item).transpose()
    }
}

async fn get_item_on<'c, E>(executor: E, id: WorkId) -> Result<WorkItem>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row: Option<WorkItemRow> = sqlx::query_as(
        "SELECT id, title, status, assigned_to, created_at, updated_at
         FROM work_items WHERE id = ?1",
    )
    .bind(id.0)
    .fetch_optional(executor)
    .await?;

    row.ok_or(Error::NotFound(id))?.try_into_work_item()
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkItemRow {
    id: i64,
    title: String,
    status: String,
    assigned_to: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkItemRow {
    fn try_into_work_item(self) -> Result<WorkItem> {
        Ok(WorkItem {
            id: WorkId(self.id),
            title: self.title,
            status: self.status.parse()?,
            assigned_to: self.assigned_to,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    async fn seed(db: &Db, titles: &[&str]) -> Vec<WorkItem> {
        let mut tx = db.begin().await.unwrap();
        let mut items = Vec::new();
        for title in titles {
            items.push(tx.insert_item(title, Utc::now()).await.unwrap());
        }
        tx.commit().await.unwrap();
        items
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let db = Db::in_memory().await.unwrap();
        let items = seed(&db, &["a", "b", "c"]).await;

        assert!(items.windows(2).all(|w| w[0].id < w[1].id));
        assert!(items.iter().all(|i| i.status == WorkStatus::New));
        assert!(items.iter().all(|i| i.assigned_to.is_none()));
    }

    #[tokio::test]
    async fn uncommitted_insert_is_rolled_back() {
        let db = Db::in_memory().await.unwrap();
        {
            let mut tx = db.begin().await.unwrap();
            tx.insert_item("dropped", Utc::now()).await.unwrap();
        }
        assert!(db.list_items().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn guarded_transition_skips_mismatched_status() {
        let db = Db::in_memory().await.unwrap();
        let item = seed(&db, &["a"]).await.remove(0);

        let mut tx = db.begin().await.unwrap();
        let skipped = tx
            .transition_item(
                item.id,
                Some(WorkStatus::Assigned),
                WorkStatus::Completed,
                "agent",
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(skipped.is_none());

        let applied = tx
            .transition_item(item.id, None, WorkStatus::Completed, "agent", Utc::now())
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(applied.status, WorkStatus::Completed);
        assert_eq!(applied.assigned_to.as_deref(), Some("agent"));
    }

    #[tokio::test]
    async fn transition_of_unknown_id_matches_nothing() {
        let db = Db::in_memory().await.unwrap();
        let mut tx = db.begin().await.unwrap();
        let result = tx
            .transition_item(WorkId(42), None, WorkStatus::Assigned, "agent", Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn claim_takes_lowest_new_id() {
        let db = Db::in_memory().await.unwrap();
        let items = seed(&db, &["a", "b", "c"]).await;

        let mut tx = db.begin().await.unwrap();
        let first = tx.claim_earliest("w1", Utc::now()).await.unwrap().unwrap();
        let second = tx.claim_earliest("w2", Utc::now()).await.unwrap().unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.id, items[0].id);
        assert_eq!(second.id, items[1].id);
        assert_eq!(
            db.find_earliest_by_status(WorkStatus::New)
                .await
                .unwrap()
                .map(|i| i.id),
            Some(items[2].id)
        );
    }

    #[tokio::test]
    async fn claim_on_empty_store_returns_none() {
        let db = Db::in_memory().await.unwrap();
        let mut tx = db.begin().await.unwrap();
        assert!(tx.claim_earliest("w1", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_unknown_item_is_not_found() {
        let db = Db::in_memory().await.unwrap();
        let err = db.get_item(WorkId(9)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(WorkId(9))));
    }

    #[tokio::test]
    async fn list_by_status_filters_and_orders() {
        let db = Db::in_memory().await.unwrap();
        let items = seed(&db, &["a", "b", "c"]).await;

        let mut tx = db.begin().await.unwrap();
        tx.transition_item(items[1].id, None, WorkStatus::Assigned, "w", Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let new: Vec<_> = db
            .list_items_by_status(WorkStatus::New)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(new, vec![items[0].id, items[2].id]);
    }
}
