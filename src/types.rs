use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::config::{DISPLAY_UTC_OFFSET_SECS, MILLIS_THRESHOLD};

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

/// One (item, platform) observation extracted from a pricing API response.
/// Platform name is already canonical; `update_time` is already milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPrice {
    pub market_hash_name: String,
    pub platform: String,
    pub platform_item_id: Option<String>,
    pub sell_price: Option<f64>,
    pub bidding_price: Option<f64>,
    pub sell_count: Option<i64>,
    pub bidding_count: Option<i64>,
    pub update_time: Option<i64>,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Values under 10^12 are taken to be seconds and scaled to milliseconds.
pub fn normalize_update_time(raw: i64) -> i64 {
    if raw < MILLIS_THRESHOLD {
        raw.saturating_mul(1000)
    } else {
        raw
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC+8. None when the value is out of chrono's range.
pub fn format_display_time(ms: i64) -> Option<String> {
    let offset = FixedOffset::east_opt(DISPLAY_UTC_OFFSET_SECS)?;
    let utc = DateTime::from_timestamp_millis(ms)?;
    Some(utc.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S").to_string())
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
