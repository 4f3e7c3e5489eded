//! Pullback / volatility / valuation signal for a broad equity index.
//!
//! `SignalJob::run()`:
//!   1. Download daily closes for the equity ETF and the volatility index.
//!   2. Fetch the latest index PE ratio (optional, a miss is logged).
//!   3. Compute the pullback from the recent high.
//!   4. Classify into bands and walk the threshold table.
//!   5. Hand a Markdown message to the notifier when a rule fires.

pub mod rules;
pub mod sources;

use crate::config::SignalConfig;
use crate::models::PriceSeries;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{info, warn};

use self::rules::{Advice, Bands, evaluate};
use self::sources::MarketDataClient;

// ── Indicators ────────────────────────────────────────────────────────────────

/// Highest close among the `window` closes before the latest one, and the
/// percentage drop of the latest close from it. `None` with fewer than
/// `window + 1` points.
pub fn pullback(series: &PriceSeries, window: usize) -> Option<(f64, f64)> {
    let n = series.points.len();
    if window == 0 || n < window + 1 {
        return None;
    }
    let current = series.points[n - 1].close;
    let high = series.points[n - 1 - window..n - 1]
        .iter()
        .map(|p| p.close)
        .fold(f64::NEG_INFINITY, f64::max);

    Some((high, (high - current) / high * 100.0))
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalSnapshot {
    pub last_trading_day: NaiveDate,
    pub equity_close: f64,
    pub volatility: f64,
    pub pe_ratio: Option<f64>,
    pub recent_high: f64,
    pub pullback_pct: f64,
}

impl SignalSnapshot {
    /// `None` when either series is empty or the equity series is too short.
    pub fn compute(
        equity: &PriceSeries,
        volatility: &PriceSeries,
        pe_ratio: Option<f64>,
        window: usize,
    ) -> Option<Self> {
        let last = equity.last()?;
        let vol = volatility.last()?;
        let (recent_high, pullback_pct) = pullback(equity, window)?;

        Some(Self {
            last_trading_day: last.date,
            equity_close: last.close,
            volatility: vol.close,
            pe_ratio,
            recent_high,
            pullback_pct,
        })
    }
}

// ── Notification ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    /// Markdown.
    pub body: String,
}

pub fn render_notification(
    title: &str,
    snapshot: &SignalSnapshot,
    advice: &Advice,
) -> Notification {
    let pe = snapshot
        .pe_ratio
        .map(|pe| format!("{:.2}", pe))
        .unwrap_or_else(|| "获取失败".to_string());

    let body = format!(
        "**VIX恐慌指数异常！**\n\n\
         - 当前 VIX: {:.2}\n\
         - SPY 回撤: {:.2}%\n\
         - S&P 500 PE: {}\n\
         - 建议操作: {}\n\
         > 最近交易日: {}",
        snapshot.volatility,
        snapshot.pullback_pct,
        pe,
        advice.text,
        snapshot.last_trading_day.format("%Y-%m-%d"),
    );

    Notification {
        title: title.to_string(),
        body,
    }
}

/// Where fired signals go.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes the notification to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!("NOTIFY {}\n{}", notification.title, notification.body);
        Ok(())
    }
}

// ── Job ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    /// Not enough history to compute the pullback.
    InsufficientData { points: usize, needed: usize },
    Evaluated {
        snapshot: SignalSnapshot,
        bands: Bands,
        advice: Advice,
    },
}

pub struct SignalJob<N: Notifier> {
    config: SignalConfig,
    notifier: N,
}

impl<N: Notifier> SignalJob<N> {
    pub fn new(config: SignalConfig, notifier: N) -> Self {
        Self { config, notifier }
    }

    pub async fn run(&self) -> Result<SignalOutcome> {
        let client = MarketDataClient::new(&self.config)?;

        let equity = client
            .daily_closes(&self.config.equity_symbol)
            .await
            .with_context(|| format!("price history for {}", self.config.equity_symbol))?;
        let volatility = client
            .daily_closes(&self.config.volatility_symbol)
            .await
            .with_context(|| format!("price history for {}", self.config.volatility_symbol))?;
        let pe_ratio = client.latest_pe_ratio().await;

        self.evaluate(&equity, &volatility, pe_ratio).await
    }

    /// Everything after the downloads; separated so it runs on canned series.
    pub async fn evaluate(
        &self,
        equity: &PriceSeries,
        volatility: &PriceSeries,
        pe_ratio: Option<f64>,
    ) -> Result<SignalOutcome> {
        let window = self.config.high_window;

        let Some(snapshot) = SignalSnapshot::compute(equity, volatility, pe_ratio, window) else {
            warn!(
                "Not enough data: {} has {} closes, {} needed",
                equity.symbol,
                equity.len(),
                window + 1
            );
            return Ok(SignalOutcome::InsufficientData {
                points: equity.len(),
                needed: window + 1,
            });
        };

        info!("Last trading day: {}", snapshot.last_trading_day);
        info!("{} close: {:.2}", equity.symbol, snapshot.equity_close);
        info!("{}: {:.2}", volatility.symbol, snapshot.volatility);
        match snapshot.pe_ratio {
            Some(pe) => info!("PE ratio: {:.2}", pe),
            None => info!("PE ratio unavailable"),
        }
        info!(
            "Recent high: {:.2}, pullback: {:.2}%",
            snapshot.recent_high, snapshot.pullback_pct
        );

        let bands = Bands::classify(
            &self.config.thresholds,
            snapshot.volatility,
            snapshot.pullback_pct,
            snapshot.pe_ratio,
        );
        let advice = evaluate(&self.config.rules, &bands, &self.config.hold_advice);
        info!("Bands {:?} → {}", bands, advice.text);

        if advice.notify {
            let notification = render_notification(&self.config.notify_title, &snapshot, &advice);
            self.notifier.send(&notification).await?;
        }

        Ok(SignalOutcome::Evaluated {
            snapshot,
            bands,
            advice,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricePoint;
    use crate::signal::rules::{PeBand, PullbackBand, VixBand};
    use std::sync::{Arc, Mutex};

    fn series(symbol: &str, closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceSeries {
            symbol: symbol.to_string(),
            points: closes
                .iter()
                .enumerate()
                .map(|(i, c)| PricePoint {
                    date: start + chrono::Duration::days(i as i64),
                    close: *c,
                })
                .collect(),
        }
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Notification>>>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, notification: &Notification) -> Result<()> {
            self.0.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[test]
    fn test_pullback_uses_window_before_latest() {
        // Window of 3: highs among [110, 100, 105], latest 99 excluded; the 200 is too old.
        let s = series("SPY", &[200.0, 110.0, 100.0, 105.0, 99.0]);
        let (high, pct) = pullback(&s, 3).unwrap();
        assert_eq!(high, 110.0);
        assert!((pct - 10.0).abs() < 1e-9);

        assert!(pullback(&series("SPY", &[1.0, 2.0, 3.0]), 3).is_none());
    }

    #[test]
    fn test_pullback_negative_at_new_high() {
        let (_, pct) = pullback(&series("SPY", &[100.0, 100.0, 110.0]), 2).unwrap();
        assert!(pct < 0.0);
    }

    #[tokio::test]
    async fn test_fired_rule_notifies() {
        let recorder = Recorder::default();
        let config = SignalConfig {
            high_window: 3,
            ..SignalConfig::default()
        };
        let job = SignalJob::new(config, recorder.clone());

        let equity = series("SPY", &[100.0, 100.0, 90.0, 85.0, 75.0]);
        let vix = series("^VIX", &[20.0, 45.0]);
        let outcome = job.evaluate(&equity, &vix, Some(18.5)).await.unwrap();

        let SignalOutcome::Evaluated { bands, advice, snapshot } = outcome else {
            panic!("expected evaluation");
        };
        assert_eq!(
            bands,
            Bands {
                vix: VixBand::Extreme,
                pullback: PullbackBand::Deep,
                pe: PeBand::Cheap
            }
        );
        assert_eq!(advice.text, "✅✅✅ 大量加仓");
        assert_eq!(snapshot.pullback_pct, 25.0);

        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "📈 交易信号提醒");
        assert!(sent[0].body.contains("- 当前 VIX: 45.00"));
        assert!(sent[0].body.contains("- SPY 回撤: 25.00%"));
        assert!(sent[0].body.contains("- S&P 500 PE: 18.50"));
        assert!(sent[0].body.contains("> 最近交易日: 2024-01-05"));
    }

    #[tokio::test]
    async fn test_hold_does_not_notify() {
        let recorder = Recorder::default();
        let config = SignalConfig {
            high_window: 2,
            ..SignalConfig::default()
        };
        let job = SignalJob::new(config, recorder.clone());

        let outcome = job
            .evaluate(&series("SPY", &[100.0, 101.0, 100.5]), &series("^VIX", &[14.0]), None)
            .await
            .unwrap();

        assert!(matches!(outcome, SignalOutcome::Evaluated { ref advice, .. } if !advice.notify));
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_short_history_is_reported_not_evaluated() {
        let job = SignalJob::new(SignalConfig::default(), LogNotifier);
        let outcome = tokio_test::block_on(job.evaluate(
            &series("SPY", &[100.0; 30]),
            &series("^VIX", &[20.0; 30]),
            Some(25.0),
        ))
        .unwrap();
        assert_eq!(outcome, SignalOutcome::InsufficientData { points: 30, needed: 61 });
    }

    #[test]
    fn test_missing_pe_renders_placeholder() {
        let snapshot = SignalSnapshot {
            last_trading_day: NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
            equity_close: 500.0,
            volatility: 46.98,
            pe_ratio: None,
            recent_high: 610.0,
            pullback_pct: 18.03,
        };
        let advice = Advice { text: "hold".into(), notify: true };
        let n = render_notification("t", &snapshot, &advice);
        assert!(n.body.contains("- S&P 500 PE: 获取失败"));
        assert!(n.body.starts_with("**VIX恐慌指数异常！**"));
    }
}
