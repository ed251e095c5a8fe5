//! Severity classification
//!
//! A pure function of the finding and the scan's [`DetectorConfig`]:
//!
//! 1. Start from the detector's base severity. External tool findings that
//!    carry a level start from the tool policy instead (`error` is High).
//! 2. If the finding carries a metric and a positive threshold, map
//!    `metric / threshold` through the configured bands and keep the higher
//!    of the two tiers.
//! 3. A detector weight of at least 1.2 raises one tier; at most 0.8 lowers
//!    one, but never below Low.
//! 4. Low-confidence findings drop one tier.
//!
//! Tiers saturate at `Info` and `Critical`.

use crate::config::{DetectorConfig, SeverityBands};
use crate::model::{ClassifiedFinding, Confidence, Finding, Severity};

const RAISE_WEIGHT: f64 = 1.2;
const LOWER_WEIGHT: f64 = 0.8;

/// Tier for a `metric / threshold` ratio; `None` below the medium band
pub fn band_for_ratio(ratio: f64, bands: &SeverityBands) -> Option<Severity> {
    if ratio >= bands.critical {
        Some(Severity::Critical)
    } else if ratio >= bands.high {
        Some(Severity::High)
    } else if ratio >= bands.medium {
        Some(Severity::Medium)
    } else {
        None
    }
}

pub fn classify(finding: &Finding, config: &DetectorConfig) -> Severity {
    let mut severity = config.base_severity_for(finding);

    if let (Some(metric), Some(threshold)) = (finding.metric, finding.threshold) {
        if threshold > 0.0 {
            if let Some(band) = band_for_ratio(metric / threshold, &config.bands) {
                severity = severity.max(band);
            }
        }
    }

    let weight = config.weight(finding.detector);
    if weight >= RAISE_WEIGHT {
        severity = severity.raise();
    } else if weight <= LOWER_WEIGHT && severity > Severity::Low {
        severity = severity.lower();
    }

    if finding.confidence == Confidence::Low {
        severity = severity.lower();
    }

    severity
}

/// Pair a finding with its severity
pub fn classified(finding: Finding, config: &DetectorConfig) -> ClassifiedFinding {
    let severity = classify(&finding, config);
    ClassifiedFinding { finding, severity }
}
