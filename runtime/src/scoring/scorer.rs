//! Weighted divergence score between a regular and an auditor-facing capture.

use crate::capture::profile::CaptureProfile;
use crate::config::{MetricThreshold, ScoringConfig};
use serde::Serialize;

/// A scored profile metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    LoadTimeMs,
    DomSize,
    TotalSize,
    ImagesLoadedCount,
    ExternalScriptCount,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::LoadTimeMs,
        Metric::DomSize,
        Metric::TotalSize,
        Metric::ImagesLoadedCount,
        Metric::ExternalScriptCount,
    ];

    pub fn value(&self, profile: &CaptureProfile) -> f64 {
        match self {
            Metric::LoadTimeMs => profile.load_time_ms,
            Metric::DomSize => profile.dom_size,
            Metric::TotalSize => profile.total_size,
            Metric::ImagesLoadedCount => profile.images_loaded_count as f64,
            Metric::ExternalScriptCount => profile.external_script_count as f64,
        }
    }

    pub fn threshold<'a>(&self, config: &'a ScoringConfig) -> &'a MetricThreshold {
        match self {
            Metric::LoadTimeMs => &config.load_time_ms,
            Metric::DomSize => &config.dom_size,
            Metric::TotalSize => &config.total_size,
            Metric::ImagesLoadedCount => &config.images_loaded_count,
            Metric::ExternalScriptCount => &config.external_script_count,
        }
    }
}

/// How one metric contributed to the score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricContribution {
    pub metric: Metric,
    pub diff: f64,
    /// `min(diff / maxDiff, 1)`.
    pub normalized: f64,
    /// `max(normalized - tolerance, 0) * weight`.
    pub weighted: f64,
    pub weight: f64,
}

/// Full scoring breakdown for one pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub metrics: Vec<MetricContribution>,
    pub svg_penalty_applied: bool,
    pub score: f64,
    pub total_weight: f64,
    /// Rounded to two decimals, within [0, 100].
    pub probability: f64,
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Stateless scorer over a fixed set of thresholds.
#[derive(Debug, Clone, Default)]
pub struct DivergenceScorer {
    config: ScoringConfig,
}

impl DivergenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Cloaking probability in [0, 100]. Symmetric in its arguments.
    pub fn score(&self, regular: &CaptureProfile, auditor: &CaptureProfile) -> f64 {
        self.score_breakdown(regular, auditor).probability
    }

    pub fn score_breakdown(&self, regular: &CaptureProfile, auditor: &CaptureProfile) -> ScoreBreakdown {
        let mut score = 0.0;
        let mut total_weight = 0.0;
        let mut metrics = Vec::with_capacity(Metric::ALL.len());

        for metric in Metric::ALL {
            let t = metric.threshold(&self.config);
            let diff = (metric.value(regular) - metric.value(auditor)).abs();
            let normalized = (diff / t.max_diff).min(1.0);
            let weighted = (normalized - t.tolerance).max(0.0) * t.weight;

            score += weighted;
            total_weight += t.weight;
            metrics.push(MetricContribution {
                metric,
                diff,
                normalized,
                weighted,
                weight: t.weight,
            });
        }

        // Counts as one more metric that fired at full strength.
        let svg_penalty_applied = regular.svg_hack || auditor.svg_hack;
        if svg_penalty_applied {
            score += self.config.svg_penalty;
            total_weight += self.config.svg_penalty;
        }

        let probability = if total_weight > 0.0 {
            round2((score / total_weight * 100.0).clamp(0.0, 100.0))
        } else {
            0.0
        };

        ScoreBreakdown {
            metrics,
            svg_penalty_applied,
            score,
            total_weight,
            probability,
        }
    }
}
