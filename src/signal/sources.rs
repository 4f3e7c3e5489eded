//! Upstream data for the signal job: daily closes and the index PE ratio.

use crate::config::SignalConfig;
use crate::models::{PricePoint, PriceSeries};
use crate::scraper::cleaner::parse_pe_ratio;
use crate::scraper::parsers::first_table_cell;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

// ── Chart endpoint wire format ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Decode a chart payload into closes, dropping days without a close.
pub fn parse_chart(symbol: &str, body: &str) -> Result<PriceSeries> {
    let resp: ChartResponse = serde_json::from_str(body).context("chart JSON")?;

    if let Some(err) = resp.chart.error {
        bail!("chart error for {}: {} ({})", symbol, err.description, err.code);
    }

    let result = resp
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .with_context(|| format!("empty chart result for {}", symbol))?;

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let points = result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| {
            let date = DateTime::from_timestamp(*ts, 0)?.date_naive();
            Some(PricePoint { date, close: close? })
        })
        .collect();

    Ok(PriceSeries {
        symbol: symbol.to_string(),
        points,
    })
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct MarketDataClient {
    client: reqwest::Client,
    config: SignalConfig,
}

impl MarketDataClient {
    pub fn new(config: &SignalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn chart_url(&self, symbol: &str, now: DateTime<Utc>) -> Result<Url> {
        let start = now - ChronoDuration::days(self.config.lookback_days);
        let mut url = Url::parse(&self.config.chart_base_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("chart base URL cannot take a path"))?
            .pop_if_empty()
            .push(symbol);
        url.query_pairs_mut()
            .append_pair("period1", &start.timestamp().to_string())
            .append_pair("period2", &now.timestamp().to_string())
            .append_pair("interval", "1d");
        Ok(url)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .with_context(|| format!("request {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP {} from {}", status, url);
        }
        Ok(resp.text().await?)
    }

    /// Daily closes for `symbol` over the configured lookback window.
    pub async fn daily_closes(&self, symbol: &str) -> Result<PriceSeries> {
        let url = self.chart_url(symbol, Utc::now())?;
        let body = self.get_text(url.as_str()).await?;
        let series = parse_chart(symbol, &body)?;
        debug!("{}: {} daily closes", symbol, series.len());
        Ok(series)
    }

    /// Latest index PE ratio, or `None` when the table cannot be read.
    pub async fn latest_pe_ratio(&self) -> Option<f64> {
        match self.fetch_pe_ratio().await {
            Ok(pe) => Some(pe),
            Err(e) => {
                warn!("Could not fetch PE ratio: {:#}", e);
                None
            }
        }
    }

    async fn fetch_pe_ratio(&self) -> Result<f64> {
        let html = self.get_text(&self.config.pe_url).await?;
        let cell = first_table_cell(&html, 1)?.context("PE table has no data row")?;
        parse_pe_ratio(&cell).with_context(|| format!("unparseable PE cell {:?}", cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    const CHART: &str = r#"{"chart":{"result":[{
        "meta":{"symbol":"SPY"},
        "timestamp":[1704205800,1704292200,1704378600],
        "indicators":{"quote":[{"close":[472.65,null,467.28],"open":[1,2,3]}]}
    }],"error":null}}"#;

    #[test]
    fn test_parse_chart_drops_null_closes() {
        let series = parse_chart("SPY", CHART).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(series.last().unwrap().close, 467.28);
    }

    #[test]
    fn test_parse_chart_surfaces_api_error() {
        let body = r#"{"chart":{"result":null,
            "error":{"code":"Not Found","description":"No data found"}}}"#;
        let err = parse_chart("NOPE", body).unwrap_err();
        assert!(err.to_string().contains("No data found"));
    }

    #[test]
    fn test_chart_url_escapes_symbol_and_sets_window() {
        let client = MarketDataClient::new(&SignalConfig::default()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let url = client.chart_url("^VIX", now).unwrap();

        assert!(url.path().starts_with("/v8/finance/chart/"));
        assert!(url.path().ends_with("VIX"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let start = now - ChronoDuration::days(130);
        assert_eq!(pairs[0], ("period1".into(), start.timestamp().to_string()));
        assert_eq!(pairs[2], ("interval".into(), "1d".into()));
    }
}
