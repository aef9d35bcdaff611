//! Upstream catalog integration
//!
//! The catalog is an external collaborator: fetches are bounded by a fixed
//! timeout, and a non-200 status, a `success = false` envelope, or any
//! transport error yields zero results (logged, not retried within the call —
//! the next scheduled sync tick retries).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, warn};

use crate::config::CatalogConfig;
use crate::models::NewInstrument;

/// One instrument as listed by the upstream catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogInstrument {
    pub token: String,
    pub symbol: String,
    #[serde(default)]
    pub underlying: Option<String>,
    #[serde(default)]
    pub instrument_type: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub strike: Option<f64>,
}

/// Envelope every catalog endpoint responds with
#[derive(Debug, Deserialize)]
struct CatalogResponse {
    success: bool,
    #[serde(default)]
    payload: Vec<CatalogInstrument>,
}

impl From<CatalogInstrument> for NewInstrument {
    fn from(listed: CatalogInstrument) -> Self {
        let expiry = listed.expiry.as_deref().and_then(parse_expiry);
        Self {
            token: listed.token,
            symbol: listed.symbol,
            underlying: listed.underlying,
            instrument_type: listed.instrument_type,
            expiry,
            strike: listed.strike,
        }
    }
}

/// The catalog reports expiry either as a full timestamp or a bare date; an
/// empty or unparseable value maps to no expiry.
fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    warn!("unparseable expiry from catalog: {raw}");
    None
}

/// Source of the upstream instrument catalog
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Current top-level listings; empty on any failure
    async fn fetch_underlyings(&self) -> Vec<CatalogInstrument>;

    /// Current derivative listings for one underlying; empty on any failure
    async fn fetch_derivatives(&self, underlying_token: &str) -> Vec<CatalogInstrument>;
}

/// HTTP catalog client
pub struct HttpCatalog {
    client: Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, path: &str) -> Vec<CatalogInstrument> {
        let url = format!("{}{path}", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                error!("catalog request to {url} failed: {err}");
                return Vec::new();
            }
        };
        if !response.status().is_success() {
            error!("catalog request to {url} returned {}", response.status());
            return Vec::new();
        }
        match response.json::<CatalogResponse>().await {
            Ok(body) if body.success => body.payload,
            Ok(_) => {
                error!("catalog request to {url} reported success = false");
                Vec::new()
            }
            Err(err) => {
                error!("catalog response from {url} undecodable: {err}");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn fetch_underlyings(&self) -> Vec<CatalogInstrument> {
        self.fetch("/underlyings").await
    }

    async fn fetch_derivatives(&self, underlying_token: &str) -> Vec<CatalogInstrument> {
        self.fetch(&format!("/derivatives/{underlying_token}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_catalog_envelope() {
        let body = r#"{
            "success": true,
            "payload": [
                {"token": "U1", "symbol": "NIFTY"},
                {"token": "D1", "symbol": "NIFTY24AUGFUT", "underlying": "NIFTY",
                 "instrument_type": "FUT", "expiry": "2024-08-29", "strike": 0.0}
            ]
        }"#;
        let decoded: CatalogResponse = serde_json::from_str(body).expect("decodable");
        assert!(decoded.success);
        assert_eq!(decoded.payload.len(), 2);
        assert_eq!(decoded.payload[1].underlying.as_deref(), Some("NIFTY"));
    }

    #[test]
    fn failure_envelope_carries_no_payload() {
        let decoded: CatalogResponse =
            serde_json::from_str(r#"{"success": false}"#).expect("decodable");
        assert!(!decoded.success);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn expiry_accepts_dates_and_timestamps() {
        assert!(parse_expiry("2024-08-29").is_some());
        assert!(parse_expiry("2024-08-29T15:30:00Z").is_some());
        assert_eq!(parse_expiry(""), None);
        assert_eq!(parse_expiry("next thursday"), None);
    }

    #[test]
    fn listed_instrument_converts_with_parsed_expiry() {
        let listed = CatalogInstrument {
            token: "D1".to_string(),
            symbol: "NIFTY24AUGFUT".to_string(),
            underlying: Some("NIFTY".to_string()),
            instrument_type: Some("FUT".to_string()),
            expiry: Some("2024-08-29".to_string()),
            strike: Some(0.0),
        };
        let row = NewInstrument::from(listed);
        assert_eq!(row.token, "D1");
        assert!(row.expiry.is_some());
    }
}
