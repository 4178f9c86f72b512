use std::collections::{BTreeMap, HashSet};

use chrono::DateTime;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::AVERAGE_WINDOW_DAYS;
use crate::db::catalog::resolve_entry_by_name;
use crate::db::models::PriceRow;
use crate::error::Result;
use crate::platform::canonical_platform_name;

#[derive(sqlx::FromRow)]
struct JoinedPriceRow {
    #[sqlx(flatten)]
    price: PriceRow,
    listing_name: Option<String>,
    listing_item_id: Option<String>,
}

impl JoinedPriceRow {
    /// Canonical platform of the row, falling back to its listing's name,
    /// then to `UNKNOWN`.
    fn platform_key(&self) -> String {
        self.price
            .platform
            .as_deref()
            .filter(|p| !p.is_empty())
            .or(self.listing_name.as_deref())
            .map(canonical_platform_name)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }
}

/// Every row for one item, newest `update_time` first. Rows match either by
/// the denormalized name or by the resolved catalog id, so rows written before
/// the entry was cataloged are still found. With `since_ms`, only rows updated
/// at or after it are kept; rows without `update_time` are judged by
/// `created_at` (UTC text) instead.
async fn rows_for_item(pool: &SqlitePool, market_hash_name: &str, since_ms: Option<i64>) -> Result<Vec<JoinedPriceRow>> {
    let item_id = resolve_entry_by_name(pool, market_hash_name).await?;
    let since_text = since_ms
        .and_then(DateTime::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());

    let rows = sqlx::query_as::<_, JoinedPriceRow>(
        r#"
        SELECT p.*, pl.name AS listing_name, pl.platform_item_id AS listing_item_id
        FROM prices p
        LEFT JOIN platforms pl ON pl.id = p.platform_id
        WHERE (p.market_hash_name = ? OR (? IS NOT NULL AND p.item_id = ?))
          AND (? IS NULL
               OR p.update_time >= ?
               OR (p.update_time IS NULL AND p.created_at >= ?))
        ORDER BY p.update_time DESC, p.created_at DESC, p.id DESC
        "#,
    )
    .bind(market_hash_name)
    .bind(item_id)
    .bind(item_id)
    .bind(since_ms)
    .bind(since_ms)
    .bind(since_text)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestPlatformPrice {
    pub platform: String,
    #[serde(rename = "itemId")]
    pub platform_item_id: Option<String>,
    pub sell_price: Option<f64>,
    pub bidding_price: Option<f64>,
    pub sell_count: Option<i64>,
    pub bidding_count: Option<i64>,
    pub update_time: Option<i64>,
    pub update_time_text: Option<String>,
    pub created_at: String,
}

/// Newest stored observation per canonical platform for one item.
/// The platform-side id falls back to the listing's when the row has none.
pub async fn latest_prices_by_platform(pool: &SqlitePool, market_hash_name: &str) -> Result<Vec<LatestPlatformPrice>> {
    let rows = rows_for_item(pool, market_hash_name, None).await?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let platform = row.platform_key();
        if !seen.insert(platform.clone()) {
            continue;
        }
        let JoinedPriceRow { price, listing_item_id, .. } = row;
        out.push(LatestPlatformPrice {
            platform,
            platform_item_id: price.platform_item_id.or(listing_item_id),
            sell_price: price.sell_price,
            bidding_price: price.bidding_price,
            sell_count: price.sell_count,
            bidding_count: price.bidding_count,
            update_time: price.update_time,
            update_time_text: price.update_time_text,
            created_at: price.created_at,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Averages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PriceAverage {
    pub sell_avg: Option<f64>,
    pub bidding_avg: Option<f64>,
    pub sell_samples: usize,
    pub bidding_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformAverage {
    pub platform: String,
    #[serde(flatten)]
    pub average: PriceAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAverages {
    pub market_hash_name: String,
    pub window_days: i64,
    /// Sorted by platform name.
    pub platforms: Vec<PlatformAverage>,
    pub overall: PriceAverage,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    sell_sum: f64,
    sell_n: usize,
    bid_sum: f64,
    bid_n: usize,
}

impl Tally {
    fn add(&mut self, sell: Option<f64>, bid: Option<f64>) {
        if let Some(v) = sell {
            self.sell_sum += v;
            self.sell_n += 1;
        }
        if let Some(v) = bid {
            self.bid_sum += v;
            self.bid_n += 1;
        }
    }

    fn average(&self) -> PriceAverage {
        let avg = |sum: f64, n: usize| (n > 0).then(|| sum / n as f64);
        PriceAverage {
            sell_avg: avg(self.sell_sum, self.sell_n),
            bidding_avg: avg(self.bid_sum, self.bid_n),
            sell_samples: self.sell_n,
            bidding_samples: self.bid_n,
        }
    }
}

/// Mean sell and bid prices over the last `AVERAGE_WINDOW_DAYS` days, per
/// canonical platform and overall. Missing prices are not samples.
pub async fn average_prices(pool: &SqlitePool, market_hash_name: &str, now_ms: i64) -> Result<PriceAverages> {
    let since_ms = now_ms - AVERAGE_WINDOW_DAYS * 24 * 3600 * 1000;
    let rows = rows_for_item(pool, market_hash_name, Some(since_ms)).await?;

    let mut per_platform: BTreeMap<String, Tally> = BTreeMap::new();
    let mut overall = Tally::default();
    for row in &rows {
        let (sell, bid) = (row.price.sell_price, row.price.bidding_price);
        per_platform.entry(row.platform_key()).or_default().add(sell, bid);
        overall.add(sell, bid);
    }

    Ok(PriceAverages {
        market_hash_name: market_hash_name.to_string(),
        window_days: AVERAGE_WINDOW_DAYS,
        platforms: per_platform
            .into_iter()
            .map(|(platform, tally)| PlatformAverage {
                platform,
                average: tally.average(),
            })
            .collect(),
        overall: overall.average(),
    })
}
