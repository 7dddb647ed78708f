//! Typed failures for capture, configuration, and aggregation.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why a single browser capture failed.
///
/// Navigation and evaluation failures are fatal for the capture they occur in.
/// Resource body reads and trace writes never surface here.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} timed out after {}s", .timeout.as_secs())]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("page evaluation failed: {0}")]
    Evaluation(String),
}

impl CaptureError {
    /// Stable reason code used in reports and logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CaptureError::Launch(_) => "launch-error",
            CaptureError::NavigationTimeout { .. } => "navigation-timeout",
            CaptureError::Navigation { .. } => "navigation-error",
            CaptureError::Evaluation(_) => "evaluation-error",
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid threshold for {metric}: {reason}")]
    Threshold { metric: &'static str, reason: String },

    #[error("iterations must be at least 1")]
    NoIterations,
}

/// Failure of a whole URL run inside the trial aggregator.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("{identity} capture of {url} failed on iteration {iteration}: {source}")]
    Capture {
        url: String,
        iteration: usize,
        identity: String,
        #[source]
        source: CaptureError,
    },

    #[error("every iteration for {url} failed ({failures} failures)")]
    NoSuccessfulTrials { url: String, failures: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
