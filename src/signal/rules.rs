//! Threshold table: maps (volatility, pullback, valuation) bands to advice.

use crate::config::Thresholds;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VixBand {
    Calm,
    Elevated,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullbackBand {
    Shallow,
    Mild,
    Moderate,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeBand {
    Cheap,
    Fair,
    Rich,
    /// Ratio could not be fetched.
    Unknown,
}

impl Thresholds {
    /// Elevated is the open interval (elevated, extreme); Extreme starts at `vix_extreme`.
    pub fn vix_band(&self, vix: f64) -> VixBand {
        if vix >= self.vix_extreme {
            VixBand::Extreme
        } else if vix > self.vix_elevated {
            VixBand::Elevated
        } else {
            VixBand::Calm
        }
    }

    /// Upper bounds are inclusive: 10.0 is Mild, 10.01 is Moderate.
    pub fn pullback_band(&self, pullback_pct: f64) -> PullbackBand {
        if pullback_pct > self.pullback_deep {
            PullbackBand::Deep
        } else if pullback_pct > self.pullback_moderate {
            PullbackBand::Moderate
        } else if pullback_pct > self.pullback_mild {
            PullbackBand::Mild
        } else {
            PullbackBand::Shallow
        }
    }

    pub fn pe_band(&self, pe: Option<f64>) -> PeBand {
        match pe {
            None => PeBand::Unknown,
            Some(pe) if pe < self.pe_cheap => PeBand::Cheap,
            Some(pe) if pe <= self.pe_rich => PeBand::Fair,
            Some(_) => PeBand::Rich,
        }
    }
}

/// One row of the table. An empty band list accepts any band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    #[serde(default)]
    pub vix: Vec<VixBand>,
    #[serde(default)]
    pub pullback: Vec<PullbackBand>,
    #[serde(default)]
    pub pe: Vec<PeBand>,
    pub advice: String,
}

fn accepts<T: PartialEq>(allowed: &[T], band: &T) -> bool {
    allowed.is_empty() || allowed.contains(band)
}

impl ThresholdRule {
    pub fn matches(&self, bands: &Bands) -> bool {
        accepts(&self.vix, &bands.vix)
            && accepts(&self.pullback, &bands.pullback)
            && accepts(&self.pe, &bands.pe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bands {
    pub vix: VixBand,
    pub pullback: PullbackBand,
    pub pe: PeBand,
}

impl Bands {
    pub fn classify(thresholds: &Thresholds, vix: f64, pullback_pct: f64, pe: Option<f64>) -> Self {
        Self {
            vix: thresholds.vix_band(vix),
            pullback: thresholds.pullback_band(pullback_pct),
            pe: thresholds.pe_band(pe),
        }
    }
}

/// Outcome of evaluating the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advice {
    pub text: String,
    /// Only a matched rule warrants a notification.
    pub notify: bool,
}

/// First matching rule wins; no match means hold quietly.
pub fn evaluate(rules: &[ThresholdRule], bands: &Bands, hold_advice: &str) -> Advice {
    match rules.iter().find(|r| r.matches(bands)) {
        Some(rule) => Advice {
            text: rule.advice.clone(),
            notify: true,
        },
        None => Advice {
            text: hold_advice.to_string(),
            notify: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalConfig;

    fn advise(vix: f64, pullback: f64, pe: Option<f64>) -> Advice {
        let cfg = SignalConfig::default();
        let bands = Bands::classify(&cfg.thresholds, vix, pullback, pe);
        evaluate(&cfg.rules, &bands, &cfg.hold_advice)
    }

    #[test]
    fn test_band_edges() {
        let t = Thresholds::default();
        assert_eq!(t.vix_band(30.0), VixBand::Calm);
        assert_eq!(t.vix_band(30.5), VixBand::Elevated);
        assert_eq!(t.vix_band(40.0), VixBand::Extreme);

        assert_eq!(t.pullback_band(5.0), PullbackBand::Shallow);
        assert_eq!(t.pullback_band(10.0), PullbackBand::Mild);
        assert_eq!(t.pullback_band(20.0), PullbackBand::Moderate);
        assert_eq!(t.pullback_band(20.1), PullbackBand::Deep);

        assert_eq!(t.pe_band(Some(19.9)), PeBand::Cheap);
        assert_eq!(t.pe_band(Some(20.0)), PeBand::Fair);
        assert_eq!(t.pe_band(Some(27.0)), PeBand::Fair);
        assert_eq!(t.pe_band(Some(27.1)), PeBand::Rich);
        assert_eq!(t.pe_band(None), PeBand::Unknown);
    }

    #[test]
    fn test_default_table() {
        assert_eq!(advise(45.0, 25.0, Some(18.0)).text, "✅✅✅ 大量加仓");
        assert_eq!(advise(35.0, 15.0, Some(18.0)).text, "✅✅ 适度加仓");
        assert_eq!(advise(45.0, 25.0, Some(30.0)).text, "✅ 建议关注");
        assert_eq!(advise(35.0, 7.0, Some(30.0)).text, "主动减仓");
        assert_eq!(advise(45.0, 7.0, Some(30.0)).text, "主动减仓");
    }

    #[test]
    fn test_no_match_holds_without_notification() {
        let advice = advise(15.0, 2.0, Some(22.0));
        assert!(!advice.notify);
        assert_eq!(advice.text, "当前不满足任何预设条件，建议持有");

        // Without a PE reading no default rule can fire.
        assert!(!advise(45.0, 25.0, None).notify);
    }

    #[test]
    fn test_empty_band_list_matches_anything() {
        let rules = vec![ThresholdRule {
            vix: vec![VixBand::Extreme],
            pullback: vec![],
            pe: vec![],
            advice: "panic".to_string(),
        }];
        let bands = Bands::classify(&Thresholds::default(), 50.0, 0.0, None);
        assert_eq!(evaluate(&rules, &bands, "hold"), Advice { text: "panic".into(), notify: true });
    }

    #[test]
    fn test_rules_deserialize_from_config_shape() {
        let rule: ThresholdRule = serde_json::from_str(
            r#"{ "vix": ["elevated", "extreme"], "pullback": ["mild"],
                 "pe": ["rich"], "advice": "trim" }"#,
        )
        .unwrap();
        assert_eq!(rule.vix, vec![VixBand::Elevated, VixBand::Extreme]);
        assert_eq!(rule.pe, vec![PeBand::Rich]);
    }
}
