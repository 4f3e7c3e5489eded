pub mod browser;
pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::models::RawTable;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use self::browser::{BrowserRequest, render_page};
use self::http_client::{HttpClient, RetrievalError};
use self::parsers::{extract_tables, page_title};

// ── Tier trait ────────────────────────────────────────────────────────────────

/// One way of getting a listing page's tables. Every tier hands back the same
/// tokenized shape so callers never care which one succeeded.
#[async_trait]
pub trait RetrievalTier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_tables(&self, page: u32) -> Result<Vec<RawTable>, RetrievalError>;
}

/// Turn a page body into tables, treating a page without table rows as a miss.
fn tables_from_html(html: &str) -> Result<Vec<RawTable>, RetrievalError> {
    if let Some(title) = page_title(html) {
        debug!("page title: {}", title);
    }
    let tables = extract_tables(html)?;
    if tables.iter().any(RawTable::has_rows) {
        Ok(tables)
    } else {
        Err(RetrievalError::Opaque)
    }
}

// ── aastocks endpoints ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ListingEndpoint {
    listing_url: Url,
    site_root: String,
}

impl ListingEndpoint {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        Ok(Self {
            listing_url: base.join(&config.listing_path)?,
            site_root: config.site_root.clone(),
        })
    }

    /// URL for one listing page, e.g. `...listedipo.aspx?s=3&o=0&page=2`.
    pub fn page_url(&self, page: u32) -> String {
        let mut url = self.listing_url.clone();
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url.to_string()
    }

    pub fn site_root(&self) -> &str {
        &self.site_root
    }
}

// ── Tier 1: single stateless GET ──────────────────────────────────────────────

pub struct StatelessFetch {
    client: HttpClient,
    endpoint: ListingEndpoint,
}

impl StatelessFetch {
    pub fn new(config: &ScraperConfig, endpoint: ListingEndpoint) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config, false)?,
            endpoint,
        })
    }
}

#[async_trait]
impl RetrievalTier for StatelessFetch {
    fn name(&self) -> &'static str {
        "stateless"
    }

    async fn fetch_tables(&self, page: u32) -> Result<Vec<RawTable>, RetrievalError> {
        let html = self.client.get_text(&self.endpoint.page_url(page)).await?;
        tables_from_html(&html)
    }
}

// ── Tier 2: cookie session primed on the site root ────────────────────────────

pub struct SessionFetch {
    config: ScraperConfig,
    endpoint: ListingEndpoint,
    pause: Duration,
}

impl SessionFetch {
    pub fn new(config: &ScraperConfig, endpoint: ListingEndpoint) -> Self {
        Self {
            config: config.clone(),
            endpoint,
            pause: Duration::from_millis(config.session_pause_ms),
        }
    }
}

#[async_trait]
impl RetrievalTier for SessionFetch {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn fetch_tables(&self, page: u32) -> Result<Vec<RawTable>, RetrievalError> {
        // A fresh session per page; the root visit only matters for the cookies it sets.
        let session = HttpClient::new(&self.config, true)?;
        match session.get_text(self.endpoint.site_root()).await {
            Ok(_) => {}
            Err(RetrievalError::Status(status)) => {
                debug!("site root answered {}, fetching page {} anyway", status, page);
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(self.pause).await;

        let html = session.get_text(&self.endpoint.page_url(page)).await?;
        tables_from_html(&html)
    }
}

// ── Tier 3: headless browser ──────────────────────────────────────────────────

pub struct BrowserFetch {
    endpoint: ListingEndpoint,
    user_agent: String,
    wait: Duration,
}

impl BrowserFetch {
    pub fn new(config: &ScraperConfig, endpoint: ListingEndpoint) -> Self {
        Self {
            endpoint,
            user_agent: config.user_agent.clone(),
            wait: Duration::from_secs(config.browser_timeout_secs),
        }
    }
}

#[async_trait]
impl RetrievalTier for BrowserFetch {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch_tables(&self, page: u32) -> Result<Vec<RawTable>, RetrievalError> {
        let html = render_page(BrowserRequest {
            url: self.endpoint.page_url(page),
            user_agent: self.user_agent.clone(),
            wait: self.wait,
        })
        .await?;
        tables_from_html(&html)
    }
}

// ── Fallback chain ────────────────────────────────────────────────────────────

/// Tables for one page plus the tier that produced them.
#[derive(Debug)]
pub struct PageTables {
    pub tier: &'static str,
    pub tables: Vec<RawTable>,
}

/// Tries each tier in order and keeps the first structured result.
pub struct RetrievalChain {
    tiers: Vec<Box<dyn RetrievalTier>>,
}

impl RetrievalChain {
    pub fn new(tiers: Vec<Box<dyn RetrievalTier>>) -> Self {
        Self { tiers }
    }

    /// stateless → session → browser
    pub fn standard(config: &ScraperConfig) -> Result<Self> {
        let endpoint = ListingEndpoint::new(config)?;
        Ok(Self::new(vec![
            Box::new(StatelessFetch::new(config, endpoint.clone())?),
            Box::new(SessionFetch::new(config, endpoint.clone())),
            Box::new(BrowserFetch::new(config, endpoint)),
        ]))
    }

    /// `None` when every tier failed; failures are logged, never returned.
    pub async fn fetch_page(&self, page: u32) -> Option<PageTables> {
        for tier in &self.tiers {
            match tier.fetch_tables(page).await {
                Ok(tables) => {
                    info!("Page {}: {} tables via {} fetch", page, tables.len(), tier.name());
                    return Some(PageTables {
                        tier: tier.name(),
                        tables,
                    });
                }
                Err(RetrievalError::Opaque) => {
                    info!(
                        "Page {}: {} fetch returned no table rows, trying next tier",
                        page,
                        tier.name()
                    );
                }
                Err(e) => {
                    warn!("Page {}: {} fetch failed: {}", page, tier.name(), e);
                }
            }
        }
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
