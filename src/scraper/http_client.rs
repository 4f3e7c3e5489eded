use crate::config::ScraperConfig;
use anyhow::Context;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue, REFERER, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT,
};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why a retrieval tier produced nothing for a page.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("page had no table rows")]
    Opaque,

    #[error("browser automation unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("browser automation failed: {0}")]
    Browser(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Thin wrapper over a reqwest client that always presents itself as a desktop browser.
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    /// `keep_cookies` turns the client into a session: cookies set by one
    /// response are sent with the next request.
    pub fn new(config: &ScraperConfig, keep_cookies: bool) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .default_headers(browser_headers(config)?)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .cookie_store(keep_cookies)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }

    /// GET a page and decode the body as UTF-8 regardless of the declared charset.
    pub async fn get_text(&self, url: &str) -> Result<String, RetrievalError> {
        debug!("GET {}", url);

        let resp = self.inner.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::Status(status));
        }

        let bytes = resp.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

fn browser_headers(config: &ScraperConfig) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent).context("user agent")?);
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&config.accept_language).context("accept language")?,
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(REFERER, HeaderValue::from_str(&config.referer).context("referer")?);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_headers_carry_user_agent_and_referer() {
        let config = ScraperConfig::default();
        let headers = browser_headers(&config).unwrap();
        assert!(headers[USER_AGENT].to_str().unwrap().starts_with("Mozilla/5.0"));
        assert_eq!(headers[REFERER], "https://www.aastocks.com/");
        assert_eq!(headers[ACCEPT_LANGUAGE], "zh-TW,zh;q=0.9,en;q=0.8");
    }

    #[test]
    fn test_client_builds_with_and_without_cookies() {
        let config = ScraperConfig::default();
        assert!(HttpClient::new(&config, false).is_ok());
        assert!(HttpClient::new(&config, true).is_ok());
    }
}
