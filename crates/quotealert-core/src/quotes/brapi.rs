//! BRAPI quote client

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::{self, Error};
use crate::models::Quote;

use super::{FetchError, PriceSource};

/// Connection settings for the BRAPI quote service
#[derive(Debug, Clone)]
pub struct BrapiConfig {
    /// Bearer token sent with every request
    pub api_key: String,
    /// Service root, e.g. `https://brapi.dev`
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Quote client for `GET /api/quote/{ticker}`
pub struct BrapiClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl BrapiClient {
    /// Create a new client
    pub fn new(config: BrapiConfig) -> error::Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::config("quote provider API key is empty"));
        }

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::config(format!("invalid provider base URL {}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "provider base URL cannot be a base: {}",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            base_url,
        })
    }

    fn quote_url(&self, ticker: &str) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FetchError::Http(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "quote", ticker]);
        Ok(url)
    }

    async fn request(&self, ticker: &str) -> Result<Quote, FetchError> {
        let url = self.quote_url(ticker)?;

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let quote = parse_quote(ticker, &body)?;

        debug!(ticker = %ticker, price = %quote.price, "Fetched quote");
        Ok(quote)
    }
}

#[async_trait]
impl PriceSource for BrapiClient {
    async fn fetch_price(
        &self,
        ticker: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, FetchError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.request(ticker) => result,
        }
    }
}

/// Extract the first result's market price from a quote response body
fn parse_quote(ticker: &str, body: &str) -> Result<Quote, FetchError> {
    let response: BrapiResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::InvalidResponse(format!("failed to parse quote response: {e}")))?;

    let result = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::InvalidResponse(format!("no results for {ticker}")))?;

    let price = result.regular_market_price.ok_or_else(|| {
        FetchError::InvalidResponse(format!("missing regularMarketPrice for {ticker}"))
    })?;

    let observed_at = result
        .regular_market_time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map_or_else(Utc::now, |t| t.with_timezone(&Utc));

    Ok(Quote::observed(ticker, price, observed_at))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrapiResponse {
    #[serde(default)]
    results: Vec<BrapiResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrapiResult {
    #[serde(default)]
    regular_market_price: Option<Decimal>,
    #[serde(default)]
    regular_market_time: Option<String>,
}
