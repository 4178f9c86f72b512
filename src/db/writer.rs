use sqlx::SqlitePool;
use tracing::debug;

use crate::db::catalog::{resolve_entry_by_name, resolve_listing};
use crate::error::Result;
use crate::types::{format_display_time, NormalizedPrice};

/// Appends normalized price observations to the `prices` table.
/// Never updates existing rows: history is the set of all rows for a key.
#[derive(Clone)]
pub struct PriceWriter {
    pool: SqlitePool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: usize,
    /// Rows whose catalog entry could not be resolved (item_id is NULL).
    pub unresolved_items: usize,
}

impl PriceWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve identifiers and insert every record in one transaction.
    /// Any failure rolls the whole window back (the transaction is dropped
    /// uncommitted) and is returned to the caller.
    pub async fn write_window(&self, records: &[NormalizedPrice]) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        let mut tx = self.pool.begin().await?;

        for rec in records {
            let item_id = resolve_entry_by_name(&mut *tx, &rec.market_hash_name).await?;
            let platform_id = match item_id {
                Some(id) if !rec.platform.is_empty() => resolve_listing(&mut *tx, id, &rec.platform).await?,
                _ => None,
            };
            if item_id.is_none() {
                summary.unresolved_items += 1;
            }

            let platform = (!rec.platform.is_empty()).then_some(rec.platform.as_str());
            let update_time_text = rec.update_time.and_then(format_display_time);

            sqlx::query(
                r#"
                INSERT INTO prices (
                    market_hash_name, platform, platform_item_id, item_id, platform_id,
                    sell_price, bidding_price, sell_count, bidding_count,
                    update_time, update_time_text
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&rec.market_hash_name)
            .bind(platform)
            .bind(&rec.platform_item_id)
            .bind(item_id)
            .bind(platform_id)
            .bind(rec.sell_price)
            .bind(rec.bidding_price)
            .bind(rec.sell_count)
            .bind(rec.bidding_count)
            .bind(rec.update_time)
            .bind(update_time_text)
            .execute(&mut *tx)
            .await?;

            summary.rows += 1;
        }

        tx.commit().await?;
        debug!(rows = summary.rows, unresolved = summary.unresolved_items, "price window committed");
        Ok(summary)
    }
}
