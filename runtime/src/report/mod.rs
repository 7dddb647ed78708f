//! Results document: one entry per URL with every trial and both profiles.

use crate::capture::profile::CaptureProfile;
use crate::identity::{DeviceEmulation, Identity};
use crate::trial::{Trial, TrialFailure, UrlResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A capture profile with the identity that produced it merged in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub identity: String,
    pub user_agent: String,
    pub device: DeviceEmulation,
    #[serde(flatten)]
    pub profile: CaptureProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_file: Option<PathBuf>,
}

impl ProfileReport {
    fn new(identity: &Identity, profile: &CaptureProfile, trace_file: Option<&PathBuf>) -> Self {
        Self {
            identity: identity.name.clone(),
            user_agent: identity.user_agent.clone(),
            device: identity.device.clone(),
            profile: profile.clone(),
            trace_file: trace_file.cloned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    /// One-based.
    pub iteration: usize,
    pub standard: ProfileReport,
    pub auditor: ProfileReport,
    pub svg_hack: bool,
    pub probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    /// One-based.
    pub iteration: usize,
    /// `standard` or `auditor`.
    pub identity: String,
    /// Reason code such as `navigation-timeout`.
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlReport {
    pub url: String,
    pub probability: f64,
    pub iterations: usize,
    pub tests: Vec<TestReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureReport>,
}

/// Everything one `scan` produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub iterations: usize,
    pub results: Vec<UrlReport>,
}

impl RunReport {
    pub fn new(
        started_at: DateTime<Utc>,
        iterations: usize,
        standard: &Identity,
        auditor: &Identity,
        results: &[UrlResult],
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            iterations,
            results: results
                .iter()
                .map(|r| url_report(standard, auditor, r))
                .collect(),
        }
    }

    /// Write the document as pretty JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write results: {}", path.display()))
    }
}

fn url_report(standard: &Identity, auditor: &Identity, result: &UrlResult) -> UrlReport {
    UrlReport {
        url: result.url.clone(),
        probability: result.probability,
        iterations: result.iterations,
        tests: result
            .trials
            .iter()
            .map(|t| trial_report(standard, auditor, t))
            .collect(),
        failures: result.failures.iter().map(failure_report).collect(),
    }
}

fn trial_report(standard: &Identity, auditor: &Identity, trial: &Trial) -> TestReport {
    TestReport {
        iteration: trial.iteration + 1,
        standard: ProfileReport::new(standard, &trial.standard, trial.standard_trace.as_ref()),
        auditor: ProfileReport::new(auditor, &trial.auditor, trial.auditor_trace.as_ref()),
        svg_hack: trial.svg_hack(),
        probability: trial.probability,
    }
}

fn failure_report(failure: &TrialFailure) -> FailureReport {
    FailureReport {
        iteration: failure.iteration + 1,
        identity: failure.identity.clone(),
        reason: failure.reason.to_string(),
        message: failure.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::profile::{LcpElement, Viewport};
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    fn profile(scripts: u32) -> CaptureProfile {
        CaptureProfile {
            load_time_ms: 1000.0,
            dom_size: 50.0,
            total_size: 1.5,
            images_loaded_count: 4,
            external_script_count: scripts,
            lcp_element: Some(LcpElement {
                tag_name: "IMG".into(),
                width: 400.0,
                height: 300.0,
                is_svg: false,
            }),
            svg_hack: false,
            viewport: Viewport {
                client_width: 412.0,
                client_height: 823.0,
            },
        }
    }

    fn result() -> UrlResult {
        UrlResult {
            url: "https://example.com/".into(),
            iterations: 2,
            trials: vec![Trial {
                iteration: 0,
                standard: profile(10),
                auditor: profile(0),
                standard_trace: Some(PathBuf::from("/tmp/traces/aa.json")),
                auditor_trace: None,
                probability: 0.0,
            }],
            failures: vec![TrialFailure {
                iteration: 1,
                identity: "auditor".into(),
                reason: "navigation-timeout",
                message: "navigation to https://example.com/ timed out after 1800s".into(),
            }],
            probability: 0.0,
        }
    }

    #[test]
    fn test_report_shape() {
        let report = RunReport::new(
            Utc::now(),
            2,
            &Identity::standard(),
            &Identity::auditor(),
            &[result()],
        );
        let value = serde_json::to_value(&report).unwrap();

        assert_json_include!(
            actual: value,
            expected: json!({
                "iterations": 2,
                "results": [{
                    "url": "https://example.com/",
                    "probability": 0.0,
                    "iterations": 2,
                    "tests": [{
                        "iteration": 1,
                        "probability": 0.0,
                        "svgHack": false,
                        "standard": {
                            "identity": "standard",
                            "loadTimeMs": 1000.0,
                            "externalScriptCount": 10,
                            "imagesLoadedCount": 4,
                            "lcpElement": { "tagName": "IMG", "isSvg": false },
                            "traceFile": "/tmp/traces/aa.json",
                            "device": { "width": 412, "height": 823 }
                        },
                        "auditor": {
                            "identity": "auditor",
                            "externalScriptCount": 0
                        }
                    }],
                    "failures": [{ "iteration": 2, "reason": "navigation-timeout" }]
                }]
            })
        );

        let auditor = &value["results"][0]["tests"][0]["auditor"];
        assert!(auditor.get("traceFile").is_none());
        assert!(auditor["userAgent"]
            .as_str()
            .unwrap()
            .ends_with("Chrome-Lighthouse"));
    }

    #[test]
    fn test_profile_report_reads_back_as_profile() {
        let entry = ProfileReport::new(&Identity::standard(), &profile(7), None);
        let json = serde_json::to_string(&entry).unwrap();

        let parsed: CaptureProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, profile(7));
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/results.json");
        let report = RunReport::new(
            Utc::now(),
            2,
            &Identity::standard(),
            &Identity::auditor(),
            &[result()],
        );

        report.write(&path).unwrap();

        let back: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.run_id, report.run_id);
        assert_eq!(back.results[0].tests.len(), 1);
    }
}
