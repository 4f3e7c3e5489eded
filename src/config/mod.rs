use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::signal::rules::{PeBand, PullbackBand, ThresholdRule, VixBand};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub signal: SignalConfig,
}

/// IPO listing scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Page visited first by the session tier to pick up cookies.
    #[serde(default = "default_site_root")]
    pub site_root: String,

    #[serde(default = "default_listing_path")]
    pub listing_path: String,

    #[serde(default = "default_first_page")]
    pub first_page: u32,

    #[serde(default = "default_last_page")]
    pub last_page: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_session_pause_ms")]
    pub session_pause_ms: u64,

    #[serde(default = "default_browser_timeout_secs")]
    pub browser_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_referer")]
    pub referer: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

/// CSV output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default = "default_sample_file")]
    pub sample_file: String,

    #[serde(default)]
    pub header_language: HeaderLanguage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLanguage {
    /// Column labels as printed on the listing site.
    #[default]
    Chinese,
    English,
}

/// Market signal configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalConfig {
    #[serde(default = "default_chart_base_url")]
    pub chart_base_url: String,

    #[serde(default = "default_pe_url")]
    pub pe_url: String,

    #[serde(default = "default_equity_symbol")]
    pub equity_symbol: String,

    #[serde(default = "default_volatility_symbol")]
    pub volatility_symbol: String,

    /// Calendar days of history requested from the chart endpoint.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    /// Trading days (excluding the latest) scanned for the recent high.
    #[serde(default = "default_high_window")]
    pub high_window: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default = "default_rules")]
    pub rules: Vec<ThresholdRule>,

    #[serde(default = "default_hold_advice")]
    pub hold_advice: String,

    #[serde(default = "default_notify_title")]
    pub notify_title: String,
}

/// Band boundaries for the signal heuristic.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Thresholds {
    #[serde(default = "default_vix_elevated")]
    pub vix_elevated: f64,
    #[serde(default = "default_vix_extreme")]
    pub vix_extreme: f64,
    #[serde(default = "default_pullback_mild")]
    pub pullback_mild: f64,
    #[serde(default = "default_pullback_moderate")]
    pub pullback_moderate: f64,
    #[serde(default = "default_pullback_deep")]
    pub pullback_deep: f64,
    #[serde(default = "default_pe_cheap")]
    pub pe_cheap: f64,
    #[serde(default = "default_pe_rich")]
    pub pe_rich: f64,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

fn default_base_url() -> String {
    "https://www.aastocks.com".to_string()
}
fn default_site_root() -> String {
    "https://www.aastocks.com/tc/".to_string()
}
fn default_listing_path() -> String {
    "/tc/stocks/market/ipo/listedipo.aspx?s=3&o=0".to_string()
}
fn default_first_page() -> u32 {
    1
}
fn default_last_page() -> u32 {
    11
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_session_pause_ms() -> u64 {
    1000
}
fn default_browser_timeout_secs() -> u64 {
    10
}
fn default_user_agent() -> String {
    BROWSER_UA.to_string()
}
fn default_referer() -> String {
    "https://www.aastocks.com/".to_string()
}
fn default_accept_language() -> String {
    "zh-TW,zh;q=0.9,en;q=0.8".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_file_prefix() -> String {
    "hk_ipo_data".to_string()
}
fn default_sample_file() -> String {
    "hk_ipo_sample_format.csv".to_string()
}
fn default_chart_base_url() -> String {
    "https://query1.finance.yahoo.com/v8/finance/chart".to_string()
}
fn default_pe_url() -> String {
    "https://www.multpl.com/s-p-500-pe-ratio/table/by-month".to_string()
}
fn default_equity_symbol() -> String {
    "SPY".to_string()
}
fn default_volatility_symbol() -> String {
    "^VIX".to_string()
}
fn default_lookback_days() -> i64 {
    130
}
fn default_high_window() -> usize {
    60
}
fn default_vix_elevated() -> f64 {
    30.0
}
fn default_vix_extreme() -> f64 {
    40.0
}
fn default_pullback_mild() -> f64 {
    5.0
}
fn default_pullback_moderate() -> f64 {
    10.0
}
fn default_pullback_deep() -> f64 {
    20.0
}
fn default_pe_cheap() -> f64 {
    20.0
}
fn default_pe_rich() -> f64 {
    27.0
}
fn default_hold_advice() -> String {
    "当前不满足任何预设条件，建议持有".to_string()
}
fn default_notify_title() -> String {
    "📈 交易信号提醒".to_string()
}

fn default_rules() -> Vec<ThresholdRule> {
    vec![
        ThresholdRule {
            vix: vec![VixBand::Extreme],
            pullback: vec![PullbackBand::Deep],
            pe: vec![PeBand::Cheap],
            advice: "✅✅✅ 大量加仓".to_string(),
        },
        ThresholdRule {
            vix: vec![VixBand::Elevated],
            pullback: vec![PullbackBand::Moderate],
            pe: vec![PeBand::Cheap],
            advice: "✅✅ 适度加仓".to_string(),
        },
        ThresholdRule {
            vix: vec![VixBand::Extreme],
            pullback: vec![PullbackBand::Deep],
            pe: vec![PeBand::Rich],
            advice: "✅ 建议关注".to_string(),
        },
        ThresholdRule {
            vix: vec![VixBand::Elevated, VixBand::Extreme],
            pullback: vec![PullbackBand::Mild],
            pe: vec![PeBand::Rich],
            advice: "主动减仓".to_string(),
        },
    ]
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            site_root: default_site_root(),
            listing_path: default_listing_path(),
            first_page: default_first_page(),
            last_page: default_last_page(),
            timeout_secs: default_timeout_secs(),
            session_pause_ms: default_session_pause_ms(),
            browser_timeout_secs: default_browser_timeout_secs(),
            user_agent: default_user_agent(),
            referer: default_referer(),
            accept_language: default_accept_language(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            sample_file: default_sample_file(),
            header_language: HeaderLanguage::default(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            vix_elevated: default_vix_elevated(),
            vix_extreme: default_vix_extreme(),
            pullback_mild: default_pullback_mild(),
            pullback_moderate: default_pullback_moderate(),
            pullback_deep: default_pullback_deep(),
            pe_cheap: default_pe_cheap(),
            pe_rich: default_pe_rich(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            chart_base_url: default_chart_base_url(),
            pe_url: default_pe_url(),
            equity_symbol: default_equity_symbol(),
            volatility_symbol: default_volatility_symbol(),
            lookback_days: default_lookback_days(),
            high_window: default_high_window(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            thresholds: Thresholds::default(),
            rules: default_rules(),
            hold_advice: default_hold_advice(),
            notify_title: default_notify_title(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            output: OutputConfig::default(),
            signal: SignalConfig::default(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::load_from(Path::new("config"))
    }

    /// `default.toml` then `local.toml` from `dir`, then `MARKET_WATCH__*` variables.
    /// Missing files are fine; a value that does not fit its field is an error.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name(&dir.join("default").to_string_lossy())
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name(&dir.join("local").to_string_lossy())
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("MARKET_WATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", dir.display()))?;

        cfg.try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", dir.display()))
    }

    /// Listing pages to crawl, inclusive on both ends.
    pub fn pages(&self) -> std::ops::RangeInclusive<u32> {
        self.scraper.first_page..=self.scraper.last_page
    }
}
