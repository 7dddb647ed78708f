//! Repeated (standard, auditor) trials per URL, averaged into one probability.
//!
//! Everything runs sequentially: URLs one after another, iterations one after
//! another, and the two captures of a trial one after the other. Parallel sessions
//! would share upstream caches and timing, which is exactly what is being measured.

use crate::capture::profile::CaptureProfile;
use crate::capture::runner::SessionRunner;
use crate::config::{FailurePolicy, RunConfig, DEFAULT_ITERATIONS};
use crate::error::{AggregateError, CaptureError, ConfigError};
use crate::identity::Identity;
use crate::scoring::{round2, DivergenceScorer};
use std::path::PathBuf;
use tracing::{info, warn};

/// One matched capture pair and its probability.
#[derive(Debug, Clone)]
pub struct Trial {
    /// Zero-based iteration index.
    pub iteration: usize,
    pub standard: CaptureProfile,
    pub auditor: CaptureProfile,
    /// Trace file of the standard session, if one was written.
    pub standard_trace: Option<PathBuf>,
    /// Trace file of the auditor session, if one was written.
    pub auditor_trace: Option<PathBuf>,
    /// Cloaking probability for this pair, 0 to 100.
    pub probability: f64,
}

impl Trial {
    /// Decoy LCP seen on either side.
    pub fn svg_hack(&self) -> bool {
        self.standard.svg_hack || self.auditor.svg_hack
    }
}

/// An iteration that did not produce a trial under [`FailurePolicy::Skip`].
#[derive(Debug, Clone)]
pub struct TrialFailure {
    /// Zero-based iteration index.
    pub iteration: usize,
    /// Name of the identity whose capture failed.
    pub identity: String,
    /// Stable code from [`CaptureError::reason_code`].
    pub reason: &'static str,
    /// Human-readable error.
    pub message: String,
}

/// All trials for one URL.
#[derive(Debug, Clone)]
pub struct UrlResult {
    pub url: String,
    /// Iterations requested.
    pub iterations: usize,
    pub trials: Vec<Trial>,
    pub failures: Vec<TrialFailure>,
    /// Mean trial probability, two decimals.
    pub probability: f64,
}

/// Arithmetic mean rounded to two decimals; 0 for no values.
pub fn average(probabilities: &[f64]) -> f64 {
    if probabilities.is_empty() {
        return 0.0;
    }
    round2(probabilities.iter().sum::<f64>() / probabilities.len() as f64)
}

/// Runs trials for one URL at a time.
pub struct TrialAggregator {
    runner: SessionRunner,
    scorer: DivergenceScorer,
    standard: Identity,
    auditor: Identity,
    iterations: usize,
    policy: FailurePolicy,
}

impl TrialAggregator {
    pub fn new(runner: SessionRunner, scorer: DivergenceScorer) -> Self {
        Self {
            runner,
            scorer,
            standard: Identity::standard(),
            auditor: Identity::auditor(),
            iterations: DEFAULT_ITERATIONS,
            policy: FailurePolicy::default(),
        }
    }

    /// Build from a run configuration: identities, thresholds, count, policy.
    pub fn from_config(runner: SessionRunner, config: &RunConfig) -> Self {
        Self::new(runner, DivergenceScorer::new(config.scoring.clone()))
            .with_identities(config.identity.standard(), config.identity.auditor())
            .with_iterations(config.iterations)
            .with_policy(config.failure_policy)
    }

    pub fn with_identities(mut self, standard: Identity, auditor: Identity) -> Self {
        self.standard = standard;
        self.auditor = auditor;
        self
    }

    /// Trials per URL. Zero is rejected when a URL is run.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn standard(&self) -> &Identity {
        &self.standard
    }

    pub fn auditor(&self) -> &Identity {
        &self.auditor
    }

    /// Run every URL in order. Under [`FailurePolicy::Abort`] the first failure
    /// ends the whole run.
    pub async fn run_all(&self, urls: &[String]) -> Result<Vec<UrlResult>, AggregateError> {
        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            results.push(self.run_url(url).await?);
        }
        Ok(results)
    }

    pub async fn run_url(&self, url: &str) -> Result<UrlResult, AggregateError> {
        self.run_url_with(url, |_| {}).await
    }

    /// Run all iterations for `url`, calling `on_trial` after each completed trial.
    pub async fn run_url_with(
        &self,
        url: &str,
        mut on_trial: impl FnMut(&Trial),
    ) -> Result<UrlResult, AggregateError> {
        if self.iterations == 0 {
            return Err(ConfigError::NoIterations.into());
        }
        let mut trials = Vec::with_capacity(self.iterations);
        let mut failures = Vec::new();

        for iteration in 0..self.iterations {
            match self.run_trial(url, iteration).await {
                Ok(trial) => {
                    info!(
                        url,
                        iteration = iteration + 1,
                        of = self.iterations,
                        probability = trial.probability,
                        "trial scored"
                    );
                    on_trial(&trial);
                    trials.push(trial);
                }
                Err(err) => match (self.policy, err) {
                    (
                        FailurePolicy::Skip,
                        AggregateError::Capture {
                            identity, source, ..
                        },
                    ) => {
                        warn!(url, iteration = iteration + 1, %identity, "skipping failed trial: {source}");
                        failures.push(TrialFailure {
                            iteration,
                            identity,
                            reason: source.reason_code(),
                            message: source.to_string(),
                        });
                    }
                    (_, err) => return Err(err),
                },
            }
        }

        if trials.is_empty() {
            return Err(AggregateError::NoSuccessfulTrials {
                url: url.to_string(),
                failures: failures.len(),
            });
        }

        let probabilities: Vec<f64> = trials.iter().map(|t| t.probability).collect();
        let probability = average(&probabilities);
        info!(url, probability, trials = trials.len(), "url complete");

        Ok(UrlResult {
            url: url.to_string(),
            iterations: self.iterations,
            trials,
            failures,
            probability,
        })
    }

    async fn run_trial(&self, url: &str, iteration: usize) -> Result<Trial, AggregateError> {
        let capture_err = |identity: &Identity| {
            let identity = identity.name.clone();
            move |source: CaptureError| AggregateError::Capture {
                url: url.to_string(),
                iteration: iteration + 1,
                identity,
                source,
            }
        };

        let standard = self
            .runner
            .capture(url, &self.standard)
            .await
            .map_err(capture_err(&self.standard))?;
        let auditor = self
            .runner
            .capture(url, &self.auditor)
            .await
            .map_err(capture_err(&self.auditor))?;

        let probability = self.scorer.score(&standard.profile, &auditor.profile);

        Ok(Trial {
            iteration,
            standard: standard.profile,
            auditor: auditor.profile,
            standard_trace: standard.trace_file,
            auditor_trace: auditor.trace_file,
            probability,
        })
    }
}
