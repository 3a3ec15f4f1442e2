//! `PostgreSQL` backend. `reagents` and `histories` are plain tables with
//! the same fields as the documents.

use sqlx::PgPool;
use time::OffsetDateTime;

use super::{ActionType, ArchiveStore, HistoryRecord, ReagentRef, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type HistoryRow = (String, String, String, String, Option<OffsetDateTime>);

fn history_from_row((id, product_number, lot_number, action_type, date): HistoryRow) -> HistoryRecord {
    HistoryRecord { id, product_number, lot_number, action_type: ActionType::from_wire(&action_type), date }
}

#[async_trait::async_trait]
impl ArchiveStore for PgStore {
    async fn list_reagents(&self) -> Result<Vec<ReagentRef>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT product_number, name FROM reagents")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(product_number, name)| ReagentRef { product_number, name })
            .collect())
    }

    async fn list_histories_ordered_by_date(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT id, product_number, lot_number, action_type, date
             FROM histories
             ORDER BY date ASC NULLS LAST, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(history_from_row).collect())
    }

    async fn delete_history(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM histories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
