//! Analytics tuning knobs.

use tracing::warn;

/// Thresholds and window sizes for the analytics pass.
///
/// Defaults are the production values; each field can be overridden through
/// the environment. An unparseable override keeps the default rather than
/// failing startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    /// A drug spikes when its rate increase exceeds this ratio (strict).
    pub spike_threshold: f64,
    /// Minimum recent reports-per-day for a spike to be considered at all.
    pub min_recent_rate: f64,
    /// With an empty baseline, this many recent reports count as a spike.
    pub baseline_zero_min_reports: u32,
    /// AI interaction judgments at or below this confidence are discarded.
    pub interaction_confidence_threshold: f64,
    /// Default analysis window, in days.
    pub window_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            spike_threshold: 0.15,
            min_recent_rate: 0.1,
            baseline_zero_min_reports: 5,
            interaction_confidence_threshold: 0.7,
            window_days: 30,
        }
    }
}

impl AnalyticsConfig {
    /// Build from the process environment.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Split out from `from_env`
    /// so parsing is testable without touching process globals.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        override_f64(
            &lookup,
            "SIDE_EFFECT_SPIKE_THRESHOLD",
            &mut config.spike_threshold,
        );
        override_f64(
            &lookup,
            "DRUG_INTERACTION_CONFIDENCE_THRESHOLD",
            &mut config.interaction_confidence_threshold,
        );
        override_u32(&lookup, "ANALYTICS_WINDOW_DAYS", &mut config.window_days);
        config
    }
}

fn override_f64(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut f64) {
    if let Some(raw) = lookup(name) {
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => *target = value,
            _ => warn!(var = name, value = %raw, "ignoring invalid override"),
        }
    }
}

fn override_u32(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut u32) {
    if let Some(raw) = lookup(name) {
        match raw.parse::<u32>() {
            Ok(value) if value > 0 => *target = value,
            _ => warn!(var = name, value = %raw, "ignoring invalid override"),
        }
    }
}
