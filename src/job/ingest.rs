//! Fetch-normalize-write path shared by the window scheduler and the one-shot
//! id range ingestion endpoint.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::client::PriceClient;
use crate::config::MAX_BATCH_NAMES;
use crate::db::catalog::read_entries_in_range;
use crate::db::writer::{PriceWriter, WriteSummary};
use crate::error::{AppError, Result};
use crate::normalizer::{as_i64, normalize_response};

/// Fetch prices for `names` in chunks of at most 100 on one client, then
/// write every record in a single transaction. Nothing is written unless
/// every chunk was fetched.
pub async fn ingest_names(client: &dyn PriceClient, writer: &PriceWriter, names: &[String]) -> Result<IngestSummary> {
    let mut records = Vec::new();
    let mut chunks = 0;
    for chunk in names.chunks(MAX_BATCH_NAMES) {
        let resp = client.fetch_price_batch(chunk).await?;
        records.extend(normalize_response(&resp, chunk));
        chunks += 1;
    }
    let written = writer.write_window(&records).await?;
    Ok(IngestSummary { chunks, written })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub chunks: usize,
    pub written: WriteSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeIngestSummary {
    pub start_id: i64,
    pub end_id: i64,
    pub item_count: usize,
    pub processed_names: usize,
    pub chunks: usize,
    pub inserted_rows: usize,
}

/// One-shot ingestion of every catalog entry with id in `[start_id, end_id]`.
pub async fn ingest_id_range(
    pool: &SqlitePool,
    client: &dyn PriceClient,
    start_id: i64,
    end_id: i64,
) -> Result<RangeIngestSummary> {
    let entries = read_entries_in_range(pool, start_id, end_id).await?;
    if entries.is_empty() {
        return Err(AppError::NotFound(format!("no catalog entries with id in {start_id}-{end_id}")));
    }
    let item_count = entries.len();
    let names: Vec<String> = entries
        .into_iter()
        .map(|e| e.market_hash_name.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return Err(AppError::BadRequest("entries in range have no marketHashName".to_string()));
    }

    let writer = PriceWriter::new(pool.clone());
    let summary = ingest_names(client, &writer, &names).await?;
    info!(
        start_id,
        end_id,
        names = names.len(),
        chunks = summary.chunks,
        rows = summary.written.rows,
        "Id range ingested"
    );
    Ok(RangeIngestSummary {
        start_id,
        end_id,
        item_count,
        processed_names: names.len(),
        chunks: summary.chunks,
        inserted_rows: summary.written.rows,
    })
}

/// Reads `idRange` (or `range`) as `"<start>-<end>"` unless both `startId` and
/// `endId` are given. Bounds are swapped when reversed.
pub fn parse_id_range(body: &serde_json::Value) -> Result<(i64, i64)> {
    let explicit = match (body.get("startId"), body.get("endId")) {
        (Some(s), Some(e)) if !s.is_null() && !e.is_null() => Some((
            as_i64(s).ok_or_else(|| AppError::BadRequest("startId must be an integer".to_string()))?,
            as_i64(e).ok_or_else(|| AppError::BadRequest("endId must be an integer".to_string()))?,
        )),
        _ => None,
    };

    let (start_id, end_id) = match explicit {
        Some(bounds) => bounds,
        None => {
            let raw = body
                .get("idRange")
                .or_else(|| body.get("range"))
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| AppError::BadRequest("provide idRange or startId/endId".to_string()))?;
            parse_range_text(raw)
                .ok_or_else(|| AppError::BadRequest(format!("idRange must look like 1-100, got {raw:?}")))?
        }
    };

    if start_id > end_id {
        Ok((end_id, start_id))
    } else {
        Ok((start_id, end_id))
    }
}

fn parse_range_text(raw: &str) -> Option<(i64, i64)> {
    let (start, end) = raw.split_once('-')?;
    let digits = |s: &str| {
        let s = s.trim();
        (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .then(|| s.parse::<i64>().ok())
            .flatten()
    };
    Some((digits(start)?, digits(end)?))
}
