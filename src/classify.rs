//! Severity classification of tilt readings against a threshold profile.

use serde::{Deserialize, Serialize};

use crate::config::ThresholdProfile;

/// Severity band of a reading. Ordered: `Normal < Caution < Warning < Danger`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Normal,
    Caution,
    Warning,
    Danger,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Caution => "caution",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

/// Classify a signed axis reading against a profile.
///
/// Only the magnitude matters (a node can lean either way). Boundaries are
/// closed toward the higher band: a value exactly at a breakpoint lands in
/// the more severe classification, which determines color and alert
/// behavior at exact threshold values.
pub fn classify(value: f64, profile: &ThresholdProfile) -> Severity {
    let magnitude = value.abs();

    if magnitude >= profile.danger() {
        Severity::Danger
    } else if magnitude >= profile.warning() {
        Severity::Warning
    } else if magnitude >= profile.caution() {
        Severity::Caution
    } else {
        Severity::Normal
    }
}
