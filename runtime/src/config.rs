//! Run configuration: targets, iteration count, thresholds, and output locations.
//!
//! Every field has a built-in default, so a config file only needs the values it
//! overrides. CLI flags are applied on top of the loaded file by the `scan` command.

use crate::capture::classifier::OriginMatch;
use crate::error::ConfigError;
use crate::identity::IdentityConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of (standard, auditor) trials per URL.
pub const DEFAULT_ITERATIONS: usize = 5;

/// Default navigation bound. Adversarial pages can be very slow on purpose.
pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30 * 60;

/// Default results document name, relative to the working directory.
pub const DEFAULT_OUTPUT: &str = "cloakscope-results.json";

/// Weight, normalization ceiling, and tolerance for one scored metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricThreshold {
    /// Relative importance of the metric.
    pub weight: f64,
    /// Difference at which the metric saturates.
    pub max_diff: f64,
    /// Normalized difference treated as noise.
    pub tolerance: f64,
}

impl MetricThreshold {
    pub const fn new(weight: f64, max_diff: f64, tolerance: f64) -> Self {
        Self {
            weight,
            max_diff,
            tolerance,
        }
    }

    fn validate(&self, metric: &'static str) -> Result<(), ConfigError> {
        let fail = |reason: String| Err(ConfigError::Threshold { metric, reason });
        if !self.weight.is_finite() || self.weight < 0.0 {
            return fail(format!("weight must be >= 0, got {}", self.weight));
        }
        if !self.max_diff.is_finite() || self.max_diff <= 0.0 {
            return fail(format!("maxDiff must be > 0, got {}", self.max_diff));
        }
        if !(0.0..=1.0).contains(&self.tolerance) {
            return fail(format!("tolerance must be in [0, 1], got {}", self.tolerance));
        }
        Ok(())
    }
}

/// Thresholds for the divergence scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    pub load_time_ms: MetricThreshold,
    pub dom_size: MetricThreshold,
    pub total_size: MetricThreshold,
    pub images_loaded_count: MetricThreshold,
    pub external_script_count: MetricThreshold,
    /// Added to both score and total weight when either side shows a decoy LCP.
    pub svg_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            load_time_ms: MetricThreshold::new(1.0, 3000.0, 0.3),
            dom_size: MetricThreshold::new(2.0, 500.0, 0.3),
            total_size: MetricThreshold::new(1.0, 15.0, 0.3),
            images_loaded_count: MetricThreshold::new(3.0, 30.0, 0.2),
            external_script_count: MetricThreshold::new(4.0, 50.0, 0.2),
            svg_penalty: 20.0,
        }
    }
}

impl ScoringConfig {
    /// Check every threshold and the penalty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.load_time_ms.validate("loadTimeMs")?;
        self.dom_size.validate("domSize")?;
        self.total_size.validate("totalSize")?;
        self.images_loaded_count.validate("imagesLoadedCount")?;
        self.external_script_count.validate("externalScriptCount")?;

        if !self.svg_penalty.is_finite() || self.svg_penalty < 0.0 {
            return Err(ConfigError::Threshold {
                metric: "svgPenalty",
                reason: format!("must be >= 0, got {}", self.svg_penalty),
            });
        }

        let total = self.load_time_ms.weight
            + self.dom_size.weight
            + self.total_size.weight
            + self.images_loaded_count.weight
            + self.external_script_count.weight;
        if total <= 0.0 {
            return Err(ConfigError::Threshold {
                metric: "weights",
                reason: "metric weights must not all be zero".into(),
            });
        }
        Ok(())
    }
}

/// What the aggregator does when a capture fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run; no result for the URL.
    #[default]
    Abort,
    /// Record the failed iteration and average the rest.
    Skip,
}

/// Complete configuration of a scan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunConfig {
    pub urls: Vec<String>,
    pub iterations: usize,
    pub navigation_timeout_secs: u64,
    pub trace_dir: Option<PathBuf>,
    pub output: PathBuf,
    pub failure_policy: FailurePolicy,
    pub origin_match: OriginMatch,
    pub identity: IdentityConfig,
    pub scoring: ScoringConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            iterations: DEFAULT_ITERATIONS,
            navigation_timeout_secs: DEFAULT_NAVIGATION_TIMEOUT_SECS,
            trace_dir: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
            failure_policy: FailurePolicy::default(),
            origin_match: OriginMatch::default(),
            identity: IdentityConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        self.scoring.validate()
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    /// Trace directory, falling back to `~/.cloakscope/traces`.
    pub fn trace_dir(&self) -> PathBuf {
        self.trace_dir
            .clone()
            .unwrap_or_else(|| cloakscope_home().join("traces"))
    }
}

/// Base directory for cloakscope artifacts.
pub fn cloakscope_home() -> PathBuf {
    if let Ok(p) = std::env::var("CLOAKSCOPE_HOME") {
        return PathBuf::from(p);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".cloakscope")
}

/// Parse a newline-separated URL list. Blank lines and `#` comments are skipped.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
