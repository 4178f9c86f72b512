//! Catalog reads used by the window scheduler, best-effort lookups used by the
//! price writer, and the catalog refresh upsert.

use serde::Serialize;
use sqlx::sqlite::SqliteExecutor;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::CatalogEntry;
use crate::error::Result;
use crate::normalizer::item_list;
use crate::platform::canonical_platform_name;

/// Highest catalog id, 0 when the catalog is empty.
pub async fn read_max_id(pool: &SqlitePool) -> Result<i64> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM items")
        .fetch_one(pool)
        .await?;
    Ok(max.unwrap_or(0))
}

/// Entries with `min_id <= id <= max_id`, ascending by id.
pub async fn read_entries_in_range(pool: &SqlitePool, min_id: i64, max_id: i64) -> Result<Vec<CatalogEntry>> {
    let rows = sqlx::query_as::<_, CatalogEntry>(
        r#"
        SELECT id, market_hash_name
        FROM items
        WHERE id >= ? AND id <= ?
        ORDER BY id ASC
        "#,
    )
    .bind(min_id)
    .bind(max_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn resolve_entry_by_name<'c>(exec: impl SqliteExecutor<'c>, market_hash_name: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM items WHERE market_hash_name = ?")
        .bind(market_hash_name)
        .fetch_optional(exec)
        .await?;
    Ok(id)
}

/// Listing id for (entry, canonical platform). `platform` must already be canonical.
pub async fn resolve_listing<'c>(exec: impl SqliteExecutor<'c>, item_id: i64, platform: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM platforms WHERE item_id = ? AND name = ?")
        .bind(item_id)
        .bind(platform)
        .fetch_optional(exec)
        .await?;
    Ok(id)
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRefreshSummary {
    /// Entries present in the upstream payload.
    pub count: usize,
    /// New catalog entries created.
    pub inserted: usize,
    /// New platform listings created.
    pub platforms_inserted: usize,
}

/// Upsert a fetch-all-items payload into `items`/`platforms` in one transaction.
///
/// Entries are keyed by external name; an existing entry only has its display
/// name replaced when the new one is non-empty. Listings are keyed by
/// (entry, canonical platform) and keep their platform-side id unless a
/// non-empty one arrives. Nothing is ever deleted here.
pub async fn refresh_catalog(pool: &SqlitePool, payload: &serde_json::Value) -> Result<CatalogRefreshSummary> {
    let entries = item_list(payload);
    let mut summary = CatalogRefreshSummary {
        count: entries.len(),
        ..Default::default()
    };

    let mut tx = pool.begin().await?;
    for entry in entries {
        let market_hash_name = str_field(entry, "marketHashName");
        if market_hash_name.is_empty() {
            continue;
        }
        let display_name = str_field(entry, "name");

        let item_id = match resolve_entry_by_name(&mut *tx, market_hash_name).await? {
            Some(id) => {
                if !display_name.is_empty() {
                    sqlx::query("UPDATE items SET name = ? WHERE id = ?")
                        .bind(display_name)
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
                id
            }
            None => {
                summary.inserted += 1;
                sqlx::query("INSERT INTO items (name, market_hash_name) VALUES (?, ?)")
                    .bind(display_name)
                    .bind(market_hash_name)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid()
            }
        };

        let listings = entry
            .get("platformList")
            .and_then(|p| p.as_array())
            .map(|a| a.as_slice())
            .unwrap_or(&[]);
        for listing in listings {
            let platform = canonical_platform_name(str_field(listing, "name"));
            if platform.is_empty() {
                continue;
            }
            let platform_item_id = id_field(listing, "itemId");

            match resolve_listing(&mut *tx, item_id, &platform).await? {
                Some(listing_id) => {
                    if let Some(pid) = &platform_item_id {
                        sqlx::query("UPDATE platforms SET platform_item_id = ? WHERE id = ?")
                            .bind(pid)
                            .bind(listing_id)
                            .execute(&mut *tx)
                            .await?;
                    }
                }
                None => {
                    summary.platforms_inserted += 1;
                    sqlx::query("INSERT INTO platforms (item_id, name, platform_item_id) VALUES (?, ?, ?)")
                        .bind(item_id)
                        .bind(&platform)
                        .bind(&platform_item_id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
    }
    tx.commit().await?;

    info!(
        count = summary.count,
        inserted = summary.inserted,
        platforms_inserted = summary.platforms_inserted,
        "Catalog refresh complete"
    );
    Ok(summary)
}

fn str_field<'a>(v: &'a serde_json::Value, key: &str) -> &'a str {
    v.get(key).and_then(|s| s.as_str()).unwrap_or("").trim()
}

fn id_field(v: &serde_json::Value, key: &str) -> Option<String> {
    match v.get(key)? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_items, seed_platform};
    use serde_json::json;

    #[tokio::test]
    async fn max_id_of_empty_catalog_is_zero() {
        let pool = memory_pool().await;
        assert_eq!(read_max_id(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn range_read_is_inclusive_and_ordered() {
        let pool = memory_pool().await;
        seed_items(&pool, 10).await;
        assert_eq!(read_max_id(&pool).await.unwrap(), 10);

        let rows = read_entries_in_range(&pool, 3, 6).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4, 5, 6]);
        assert_eq!(rows[0].market_hash_name, "item-3");

        assert!(read_entries_in_range(&pool, 11, 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookups_are_best_effort() {
        let pool = memory_pool().await;
        seed_items(&pool, 2).await;
        let listing = seed_platform(&pool, 2, "C5GAME", "553").await;

        assert_eq!(resolve_entry_by_name(&pool, "item-2").await.unwrap(), Some(2));
        assert_eq!(resolve_entry_by_name(&pool, "nope").await.unwrap(), None);
        assert_eq!(resolve_listing(&pool, 2, "C5GAME").await.unwrap(), Some(listing));
        assert_eq!(resolve_listing(&pool, 1, "C5GAME").await.unwrap(), None);
    }

    #[tokio::test]
    async fn refresh_inserts_then_updates_without_duplicates() {
        let pool = memory_pool().await;
        let payload = json!({"success": true, "data": [
            {"name": "AK-47 | Redline", "marketHashName": "AK-47 | Redline (FT)",
             "platformList": [{"name": "C5", "itemId": "553"}, {"name": "BUFF", "itemId": 33}]},
            {"name": "", "marketHashName": "  "},
        ]});

        let first = refresh_catalog(&pool, &payload).await.unwrap();
        assert_eq!(first, CatalogRefreshSummary { count: 2, inserted: 1, platforms_inserted: 2 });

        let again = json!({"data": [
            {"name": "AK-47 | Redline v2", "marketHashName": "AK-47 | Redline (FT)",
             "platformList": [{"name": "c5game", "itemId": ""}, {"name": "halo", "itemId": "h1"}]},
        ]});
        let second = refresh_catalog(&pool, &again).await.unwrap();
        assert_eq!(second, CatalogRefreshSummary { count: 1, inserted: 0, platforms_inserted: 1 });

        let name: String = sqlx::query_scalar("SELECT name FROM items WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "AK-47 | Redline v2");

        let c5_pid: Option<String> =
            sqlx::query_scalar("SELECT platform_item_id FROM platforms WHERE item_id = 1 AND name = 'C5GAME'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(c5_pid.as_deref(), Some("553"));

        let listings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM platforms")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(listings, 3);
    }
}
