//! One-shot boot pass over the `prices` table. Each step is independent and
//! best-effort: a failing step is logged and the service still starts.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::{MILLIS_THRESHOLD, REPAIR_ROW_LIMIT};
use crate::db::catalog::{resolve_entry_by_name, resolve_listing};
use crate::error::Result;
use crate::platform::canonical_platform_name;
use crate::types::format_display_time;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairStats {
    pub linked_items: u64,
    pub linked_platforms: u64,
    pub rescaled_times: u64,
    pub filled_texts: u64,
}

pub async fn repair_prices(pool: &SqlitePool) -> RepairStats {
    let mut stats = RepairStats::default();

    match link_orphans(pool).await {
        Ok((items, platforms)) => {
            stats.linked_items = items;
            stats.linked_platforms = platforms;
        }
        Err(e) => warn!("Price repair: linking orphan rows failed: {e}"),
    }
    match rescale_second_timestamps(pool).await {
        Ok(n) => stats.rescaled_times = n,
        Err(e) => warn!("Price repair: rescaling update_time failed: {e}"),
    }
    match fill_display_texts(pool).await {
        Ok(n) => stats.filled_texts = n,
        Err(e) => warn!("Price repair: filling update_time_text failed: {e}"),
    }

    info!(
        linked_items = stats.linked_items,
        linked_platforms = stats.linked_platforms,
        rescaled_times = stats.rescaled_times,
        filled_texts = stats.filled_texts,
        "Price repair complete"
    );
    stats
}

/// Attach catalog and listing ids to rows written before their entry existed.
async fn link_orphans(pool: &SqlitePool) -> Result<(u64, u64)> {
    let orphans: Vec<(i64, String, Option<String>)> = sqlx::query_as(
        "SELECT id, market_hash_name, platform FROM prices WHERE item_id IS NULL ORDER BY id LIMIT ?",
    )
    .bind(REPAIR_ROW_LIMIT)
    .fetch_all(pool)
    .await?;

    let mut items = 0;
    let mut platforms = 0;
    let mut tx = pool.begin().await?;
    for (row_id, name, platform) in orphans {
        let Some(item_id) = resolve_entry_by_name(&mut *tx, &name).await? else {
            continue;
        };
        let canonical = canonical_platform_name(platform.as_deref().unwrap_or(""));
        let platform_id = if canonical.is_empty() {
            None
        } else {
            resolve_listing(&mut *tx, item_id, &canonical).await?
        };

        sqlx::query("UPDATE prices SET item_id = ?, platform_id = COALESCE(?, platform_id) WHERE id = ?")
            .bind(item_id)
            .bind(platform_id)
            .bind(row_id)
            .execute(&mut *tx)
            .await?;
        items += 1;
        if platform_id.is_some() {
            platforms += 1;
        }
    }
    tx.commit().await?;
    Ok((items, platforms))
}

async fn rescale_second_timestamps(pool: &SqlitePool) -> Result<u64> {
    let res = sqlx::query(
        "UPDATE prices SET update_time = update_time * 1000 WHERE update_time IS NOT NULL AND update_time < ?",
    )
    .bind(MILLIS_THRESHOLD)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

async fn fill_display_texts(pool: &SqlitePool) -> Result<u64> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT id, update_time FROM prices \
         WHERE update_time IS NOT NULL AND (update_time_text IS NULL OR update_time_text = '')",
    )
    .fetch_all(pool)
    .await?;

    let mut filled = 0;
    let mut tx = pool.begin().await?;
    for (row_id, ms) in rows {
        let Some(text) = format_display_time(ms) else {
            continue;
        };
        sqlx::query("UPDATE prices SET update_time_text = ? WHERE id = ?")
            .bind(text)
            .bind(row_id)
            .execute(&mut *tx)
            .await?;
        filled += 1;
    }
    tx.commit().await?;
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PriceRow;
    use crate::db::test_support::{memory_pool, seed_items, seed_platform};

    #[tokio::test]
    async fn repairs_legacy_rows() {
        let pool = memory_pool().await;
        seed_items(&pool, 1).await;
        let c5 = seed_platform(&pool, 1, "C5GAME", "553").await;

        for (name, platform, ut) in [
            ("item-1", Some("C5"), Some(1_700_000_000_i64)),
            ("item-1", None, Some(1_700_000_000_000)),
            ("never-cataloged", Some("BUFF"), None),
        ] {
            sqlx::query("INSERT INTO prices (market_hash_name, platform, update_time) VALUES (?, ?, ?)")
                .bind(name)
                .bind(platform)
                .bind(ut)
                .execute(&pool)
                .await
                .unwrap();
        }

        let stats = repair_prices(&pool).await;
        assert_eq!(
            stats,
            RepairStats { linked_items: 2, linked_platforms: 1, rescaled_times: 1, filled_texts: 2 }
        );

        let rows = sqlx::query_as::<_, PriceRow>("SELECT * FROM prices ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!((rows[0].item_id, rows[0].platform_id), (Some(1), Some(c5)));
        assert_eq!(rows[0].update_time, Some(1_700_000_000_000));
        assert_eq!(rows[0].update_time_text.as_deref(), Some("2023-11-15 06:13:20"));
        assert_eq!((rows[1].item_id, rows[1].platform_id), (Some(1), None));
        assert_eq!((rows[2].item_id, rows[2].update_time_text.as_deref()), (None, None));

        // Second pass has nothing left to do.
        assert_eq!(repair_prices(&pool).await, RepairStats::default());
    }
}
