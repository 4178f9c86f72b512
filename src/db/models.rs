//! Database row types matching `migrations/0001_init.sql`.
//! Used with `sqlx::query_as`.
use serde::Serialize;

/// One catalog entry as the window scheduler reads it: row id and external name.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CatalogEntry {
    pub id: i64,
    pub market_hash_name: String,
}

/// Append-only price observation. Both foreign keys are best-effort.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct PriceRow {
    pub id: i64,
    pub market_hash_name: String,
    pub platform: Option<String>,
    pub platform_item_id: Option<String>,
    pub item_id: Option<i64>,
    pub platform_id: Option<i64>,
    pub sell_price: Option<f64>,
    pub bidding_price: Option<f64>,
    pub sell_count: Option<i64>,
    pub bidding_count: Option<i64>,
    pub update_time: Option<i64>,
    pub update_time_text: Option<String>,
    pub created_at: String,
}
