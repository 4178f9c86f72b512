use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::config::{BATCH_TIMEOUT_SECS, MAX_BATCH_NAMES, READ_TIMEOUT_SECS};
use crate::error::{AppError, Result};

/// Which configured credential a client is bound to. Carried by
/// `AppError::MissingCredential` so the admin layer can report which key is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CredentialSlot {
    /// STEAMDT_API_KEY, used by the single job and the proxy endpoints.
    Primary,
    /// STEAMDT_API_KEY_1, first credential of the dual job.
    First,
    /// STEAMDT_API_KEY_2, second credential of the dual job.
    Second,
}

impl CredentialSlot {
    pub fn error_code(&self) -> &'static str {
        match self {
            CredentialSlot::Primary => "MISSING_API_KEY",
            CredentialSlot::First => "MISSING_API_KEY_1",
            CredentialSlot::Second => "MISSING_API_KEY_2",
        }
    }
}

/// The three verbs the ingest core needs from the pricing API. Responses are
/// returned untyped; `normalizer` owns the shape probing.
#[async_trait]
pub trait PriceClient: Send + Sync {
    fn slot(&self) -> CredentialSlot;

    fn has_credential(&self) -> bool;

    async fn fetch_all_items(&self) -> Result<serde_json::Value>;

    async fn fetch_price_single(&self, market_hash_name: &str) -> Result<serde_json::Value>;

    async fn fetch_price_batch(&self, market_hash_names: &[String]) -> Result<serde_json::Value>;
}

pub struct SteamDtClient {
    base_url: String,
    api_key: Option<String>,
    slot: CredentialSlot,
    http: reqwest::Client,
}

impl SteamDtClient {
    pub fn new(base_url: &str, api_key: Option<String>, slot: CredentialSlot) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            slot,
            http,
        })
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or(AppError::MissingCredential(self.slot))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl PriceClient for SteamDtClient {
    fn slot(&self) -> CredentialSlot {
        self.slot
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// GET /open/cs2/v1/base. Upstream rate limit is one call per day.
    async fn fetch_all_items(&self) -> Result<serde_json::Value> {
        let key = self.key()?;
        let resp: serde_json::Value = self
            .http
            .get(self.url("/open/cs2/v1/base"))
            .bearer_auth(key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_envelope(resp)
    }

    /// GET /open/cs2/v1/price/single?marketHashName=...
    async fn fetch_price_single(&self, market_hash_name: &str) -> Result<serde_json::Value> {
        let key = self.key()?;
        let resp: serde_json::Value = self
            .http
            .get(self.url("/open/cs2/v1/price/single"))
            .query(&[("marketHashName", market_hash_name)])
            .bearer_auth(key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_envelope(resp)
    }

    /// POST /open/cs2/v1/price/batch with `{"marketHashNames": [...]}` (1..=100 names).
    async fn fetch_price_batch(&self, market_hash_names: &[String]) -> Result<serde_json::Value> {
        let key = self.key()?;
        if market_hash_names.is_empty() || market_hash_names.len() > MAX_BATCH_NAMES {
            return Err(AppError::BadRequest(format!(
                "batch price lookup takes 1..={MAX_BATCH_NAMES} names, got {}",
                market_hash_names.len()
            )));
        }
        debug!(slot = ?self.slot, names = market_hash_names.len(), "POST price/batch");
        let body = serde_json::json!({ "marketHashNames": market_hash_names });
        let resp: serde_json::Value = self
            .http
            .post(self.url("/open/cs2/v1/price/batch"))
            .timeout(Duration::from_secs(BATCH_TIMEOUT_SECS))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_envelope(resp)
    }
}

/// The API answers HTTP 200 with `{"success": false, "errorMsg": ...}` for
/// quota and auth failures; surface those as errors instead of empty data.
fn check_envelope(resp: serde_json::Value) -> Result<serde_json::Value> {
    if resp.get("success").and_then(|s| s.as_bool()) == Some(false) {
        let msg = resp
            .get("errorMsg")
            .or_else(|| resp.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("request rejected")
            .to_string();
        return Err(AppError::Upstream(msg));
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_codes_are_distinct() {
        assert_eq!(CredentialSlot::Primary.error_code(), "MISSING_API_KEY");
        assert_eq!(CredentialSlot::First.error_code(), "MISSING_API_KEY_1");
        assert_eq!(CredentialSlot::Second.error_code(), "MISSING_API_KEY_2");
    }

    #[test]
    fn envelope_failure_becomes_upstream_error() {
        let err = check_envelope(json!({"success": false, "errorMsg": "quota exceeded"})).unwrap_err();
        assert!(matches!(err, AppError::Upstream(ref m) if m == "quota exceeded"));
    }

    #[test]
    fn envelope_success_and_bare_arrays_pass_through() {
        assert!(check_envelope(json!({"success": true, "data": []})).is_ok());
        assert!(check_envelope(json!([{"marketHashName": "x"}])).is_ok());
    }

    #[tokio::test]
    async fn calls_without_key_fail_fast() {
        let client = SteamDtClient::new("http://127.0.0.1:9", None, CredentialSlot::Second).unwrap();
        assert!(!client.has_credential());
        let err = client.fetch_price_batch(&["AK-47 | Redline".to_string()]).await.unwrap_err();
        assert!(matches!(err, AppError::MissingCredential(CredentialSlot::Second)));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_locally() {
        let client =
            SteamDtClient::new("http://127.0.0.1:9", Some("k".to_string()), CredentialSlot::Primary).unwrap();
        let names: Vec<String> = (0..=MAX_BATCH_NAMES).map(|i| format!("item {i}")).collect();
        let err = client.fetch_price_batch(&names).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
