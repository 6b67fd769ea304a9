use serde::Deserialize;
use tracing::trace;

use crate::error::{EngineError, EngineResult};

/// Severity breakpoints for one building.
///
/// Invariant: `0 <= caution <= warning <= danger`. The breakpoints can only
/// be constructed through [`ThresholdProfile::new`], so a value of this type
/// always satisfies the invariant regardless of where it came from
/// (config file, operator input, backend payload).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct ThresholdProfile {
    caution: f64,
    warning: f64,
    danger: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RawThresholds {
    caution: f64,
    warning: f64,
    danger: f64,
}

impl TryFrom<RawThresholds> for ThresholdProfile {
    type Error = EngineError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        ThresholdProfile::new(raw.caution, raw.warning, raw.danger)
    }
}

impl ThresholdProfile {
    pub fn new(caution: f64, warning: f64, danger: f64) -> EngineResult<Self> {
        let ordered = caution >= 0.0 && caution <= warning && warning <= danger;
        if !ordered {
            return Err(EngineError::InvalidThresholds {
                caution,
                warning,
                danger,
            });
        }

        Ok(Self {
            caution,
            warning,
            danger,
        })
    }

    /// A profile that classifies every value as normal. Used before any
    /// building has been selected.
    pub fn disabled() -> Self {
        Self {
            caution: f64::INFINITY,
            warning: f64::INFINITY,
            danger: f64::INFINITY,
        }
    }

    pub fn caution(&self) -> f64 {
        self.caution
    }

    pub fn warning(&self) -> f64 {
        self.warning
    }

    pub fn danger(&self) -> f64 {
        self.danger
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub buildings: Vec<BuildingConfig>,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the telemetry backend, e.g. `http://10.0.0.4:8080`
    pub base_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildingConfig {
    pub id: String,
    pub display: Option<String>,
    pub thresholds: ThresholdProfile,
}

/// Poll intervals and debounce delays driving the engine.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimingConfig {
    /// Fixed liveness poll interval (primary monitoring)
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_secs: u64,

    /// Fixed environmental (wind) poll interval
    #[serde(default = "default_wind_interval")]
    pub wind_interval_secs: u64,

    /// Debounce delay for stream-triggered chart recomputes
    #[serde(default = "default_chart_debounce")]
    pub chart_debounce_ms: u64,

    /// Debounce delay for liveness-driven recomputes
    #[serde(default = "default_liveness_debounce")]
    pub liveness_debounce_ms: u64,

    /// How many alert log entries to request per building selection
    #[serde(default = "default_alert_limit")]
    pub alert_log_limit: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            liveness_interval_secs: default_liveness_interval(),
            wind_interval_secs: default_wind_interval(),
            chart_debounce_ms: default_chart_debounce(),
            liveness_debounce_ms: default_liveness_debounce(),
            alert_log_limit: default_alert_limit(),
        }
    }
}

fn default_liveness_interval() -> u64 {
    5
}

fn default_wind_interval() -> u64 {
    60
}

fn default_chart_debounce() -> u64 {
    400
}

fn default_liveness_debounce() -> u64 {
    250
}

fn default_alert_limit() -> usize {
    100
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("invalid configuration file: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
