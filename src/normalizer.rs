//! Maps one pricing API response of unknown shape into flat `NormalizedPrice`
//! records.
//!
//! Every field is read through a `FieldRule`: an ordered list of candidate keys
//! plus a coercion. The first key whose value coerces wins; a value that fails
//! to coerce counts as absent and the next key is tried. Nothing in here
//! returns an error. Malformed input only ever produces fewer or emptier records.

use serde_json::Value;
use tracing::debug;

use crate::platform::canonical_platform_name;
use crate::types::{normalize_update_time, NormalizedPrice};

/// Top-level keys that may hold the item list, in priority order.
const ITEM_LIST_KEYS: &[&str] = &["data", "items", "results"];

/// Keys that may hold an item's per-platform entries (list or single object).
const PLATFORM_LIST_KEYS: &[&str] = &["platforms", "platformList", "dataList"];

pub struct FieldRule<T> {
    pub keys: &'static [&'static str],
    pub coerce: fn(&Value) -> Option<T>,
}

impl<T> FieldRule<T> {
    pub fn pick(&self, record: &Value) -> Option<T> {
        self.keys
            .iter()
            .filter_map(|k| record.get(*k))
            .find_map(|v| (self.coerce)(v))
    }
}

pub const ITEM_NAME: FieldRule<String> = FieldRule {
    keys: &["marketHashName", "market_hash_name"],
    coerce: as_trimmed_string,
};

pub const PLATFORM_NAME: FieldRule<String> = FieldRule {
    keys: &["platform", "name", "plat"],
    coerce: as_trimmed_string,
};

pub const PLATFORM_ITEM_ID: FieldRule<String> = FieldRule {
    keys: &["itemId", "platformItemId", "platform_item_id"],
    coerce: as_id_string,
};

pub const SELL_PRICE: FieldRule<f64> = FieldRule {
    keys: &["sell_price", "sellPrice", "sell", "price"],
    coerce: as_f64,
};

pub const BIDDING_PRICE: FieldRule<f64> = FieldRule {
    keys: &["bidding_price", "biddingPrice", "buy", "buy_price"],
    coerce: as_f64,
};

pub const SELL_COUNT: FieldRule<i64> = FieldRule {
    keys: &["sell_count", "sellCount"],
    coerce: as_i64,
};

pub const BIDDING_COUNT: FieldRule<i64> = FieldRule {
    keys: &["bidding_count", "biddingCount"],
    coerce: as_i64,
};

pub const UPDATE_TIME: FieldRule<i64> = FieldRule {
    keys: &["update_time", "updateTime"],
    coerce: as_i64,
};

/// Flatten a batch (or single) price response into one record per
/// (item, platform entry). `requested` is only used for logging.
pub fn normalize_response(resp: &Value, requested: &[String]) -> Vec<NormalizedPrice> {
    let mut out = Vec::new();
    let items = item_list(resp);

    for item in items {
        let Some(market_hash_name) = ITEM_NAME.pick(item) else {
            continue;
        };
        for entry in platform_entries(item) {
            out.push(normalize_platform_entry(&market_hash_name, entry));
        }
    }

    debug!(
        requested = requested.len(),
        items = items.len(),
        records = out.len(),
        "normalized price response"
    );
    out
}

fn normalize_platform_entry(market_hash_name: &str, entry: &Value) -> NormalizedPrice {
    let platform = PLATFORM_NAME
        .pick(entry)
        .map(|p| canonical_platform_name(&p))
        .unwrap_or_default();

    NormalizedPrice {
        market_hash_name: market_hash_name.to_string(),
        platform,
        platform_item_id: PLATFORM_ITEM_ID.pick(entry),
        sell_price: SELL_PRICE.pick(entry),
        bidding_price: BIDDING_PRICE.pick(entry),
        sell_count: SELL_COUNT.pick(entry),
        bidding_count: BIDDING_COUNT.pick(entry),
        update_time: UPDATE_TIME.pick(entry).map(normalize_update_time),
    }
}

/// A bare array is the list itself; otherwise the first listed key holding an array.
pub fn item_list(resp: &Value) -> &[Value] {
    if let Some(arr) = resp.as_array() {
        return arr;
    }
    ITEM_LIST_KEYS
        .iter()
        .filter_map(|k| resp.get(*k))
        .find_map(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// Platform entries of one item from the first key holding a non-empty list
/// or an object. A single object counts as a one-element list; entries that
/// are not objects are dropped.
fn platform_entries(item: &Value) -> Vec<&Value> {
    let found = PLATFORM_LIST_KEYS
        .iter()
        .filter_map(|k| item.get(*k))
        .find(|v| v.as_array().is_some_and(|a| !a.is_empty()) || v.is_object());

    match found {
        Some(Value::Array(entries)) => entries.iter().filter(|e| e.is_object()).collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Coercions
// ---------------------------------------------------------------------------

fn as_trimmed_string(v: &Value) -> Option<String> {
    let s = v.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn as_id_string(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => Some(n.to_string()),
        _ => as_trimmed_string(v),
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

pub(crate) fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names() -> Vec<String> {
        vec!["AK-47 | Redline (Field-Tested)".to_string()]
    }

    #[test]
    fn camel_case_batch_response() {
        let resp = json!({
            "success": true,
            "data": [{
                "marketHashName": " AK-47 | Redline (Field-Tested) ",
                "dataList": [
                    {"platform": "C5", "platformItemId": 553, "sellPrice": 72.5,
                     "biddingPrice": "70.1", "sellCount": 120, "biddingCount": "33",
                     "updateTime": 1700000000},
                    {"platform": "BUFF", "sellPrice": 71.0, "updateTime": 1700000000123_i64}
                ]
            }]
        });

        let out = normalize_response(&resp, &names());
        assert_eq!(out.len(), 2);

        let c5 = &out[0];
        assert_eq!(c5.market_hash_name, "AK-47 | Redline (Field-Tested)");
        assert_eq!(c5.platform, "C5GAME");
        assert_eq!(c5.platform_item_id.as_deref(), Some("553"));
        assert_eq!(c5.sell_price, Some(72.5));
        assert_eq!(c5.bidding_price, Some(70.1));
        assert_eq!(c5.sell_count, Some(120));
        assert_eq!(c5.bidding_count, Some(33));
        assert_eq!(c5.update_time, Some(1_700_000_000_000));

        let buff = &out[1];
        assert_eq!(buff.platform, "BUFF");
        assert_eq!(buff.platform_item_id, None);
        assert_eq!(buff.bidding_price, None);
        assert_eq!(buff.update_time, Some(1_700_000_000_123));
    }

    #[test]
    fn snake_case_items_key_with_single_platform_object() {
        let resp = json!({
            "items": [{
                "market_hash_name": "AWP | Asiimov",
                "platforms": {"name": "halo", "platform_item_id": "x9", "sell_price": "12",
                              "bidding_count": 4, "update_time": "1700000000"}
            }]
        });

        let out = normalize_response(&resp, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].platform, "HALOSKINS");
        assert_eq!(out[0].platform_item_id.as_deref(), Some("x9"));
        assert_eq!(out[0].sell_price, Some(12.0));
        assert_eq!(out[0].bidding_count, Some(4));
        assert_eq!(out[0].update_time, Some(1_700_000_000_000));
    }

    #[test]
    fn bare_array_and_results_key() {
        let arr = json!([{"marketHashName": "A", "platformList": [{"plat": "steam", "price": 1.5}]}]);
        let out = normalize_response(&arr, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].platform, "STEAM");
        assert_eq!(out[0].sell_price, Some(1.5));

        let results = json!({"results": [{"marketHashName": "B", "platforms": []}]});
        assert!(normalize_response(&results, &[]).is_empty());
    }

    #[test]
    fn first_array_wins_among_list_keys() {
        let resp = json!({
            "data": "not a list",
            "items": [{"marketHashName": "A", "platforms": [{"platform": "BUFF"}]}],
            "results": [{"marketHashName": "B", "platforms": [{"platform": "BUFF"}]}]
        });
        let out = normalize_response(&resp, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].market_hash_name, "A");
    }

    #[test]
    fn empty_platform_list_falls_through_to_next_key() {
        let resp = json!({"data": [{
            "marketHashName": "AWP | Asiimov (Field-Tested)",
            "platforms": [],
            "platformList": {"unused": true},
            "dataList": [{"platform": "BUFF", "sellPrice": 1.0}]
        }]});
        // An object still counts; only empty lists are skipped.
        assert_eq!(normalize_response(&resp, &[]).len(), 1);

        let resp = json!({"data": [{
            "marketHashName": "AWP | Asiimov (Field-Tested)",
            "platforms": [],
            "dataList": [{"platform": "BUFF", "sellPrice": 1.0}, {"platform": "c5", "sellPrice": 2.0}]
        }]});
        let out = normalize_response(&resp, &[]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].platform, "C5GAME");
    }

    #[test]
    fn uncoercible_values_fall_through_to_next_key() {
        let entry = json!({"sell_price": "n/a", "sellPrice": null, "sell": "3.25", "price": 9});
        assert_eq!(SELL_PRICE.pick(&entry), Some(3.25));

        let entry = json!({"sell_count": "many", "sellCount": 7.9});
        assert_eq!(SELL_COUNT.pick(&entry), Some(7));

        let entry = json!({"updateTime": true});
        assert_eq!(UPDATE_TIME.pick(&entry), None);
    }

    #[test]
    fn records_without_names_are_skipped() {
        let resp = json!({"data": [
            {"marketHashName": "   ", "platforms": [{"platform": "BUFF"}]},
            {"platforms": [{"platform": "BUFF"}]},
            "garbage",
            {"marketHashName": "ok", "platforms": [{"platform": "BUFF"}, 42, null]}
        ]});
        let out = normalize_response(&resp, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].market_hash_name, "ok");
    }

    #[test]
    fn malformed_inputs_never_panic() {
        let inputs = [
            json!(null),
            json!(42),
            json!("string"),
            json!({}),
            json!({"data": null}),
            json!({"data": {"marketHashName": "x"}}),
            json!([null, 1, "x", []]),
            json!({"data": [{"marketHashName": "x", "platforms": "BUFF"}]}),
            json!({"data": [{"marketHashName": 5, "platforms": [{}]}]}),
        ];
        for input in inputs {
            assert!(normalize_response(&input, &[]).is_empty(), "input {input}");
        }
    }

    #[test]
    fn platform_entry_without_fields_is_kept_empty() {
        let resp = json!({"data": [{"marketHashName": "x", "platforms": [{}]}]});
        let out = normalize_response(&resp, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0],
            NormalizedPrice {
                market_hash_name: "x".to_string(),
                ..Default::default()
            }
        );
    }
}
