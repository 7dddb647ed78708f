//! `cloakscope score <standard.json> <auditor.json>` — score two saved profiles.
//!
//! Accepts bare capture profiles or `standard`/`auditor` entries copied out of a
//! results document.

use crate::capture::profile::CaptureProfile;
use crate::cli::output::{self, Styled};
use crate::config::RunConfig;
use crate::scoring::{DivergenceScorer, ScoreBreakdown};
use anyhow::{Context, Result};
use std::path::Path;

fn read_profile(path: &Path) -> Result<CaptureProfile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing profile {}", path.display()))
}

/// Score two profile files with thresholds from `config` (or the defaults).
pub fn score_files(standard: &Path, auditor: &Path, config: Option<&Path>) -> Result<ScoreBreakdown> {
    let scoring = match config {
        Some(path) => RunConfig::load(path)?.scoring,
        None => Default::default(),
    };
    let scorer = DivergenceScorer::new(scoring);
    Ok(scorer.score_breakdown(&read_profile(standard)?, &read_profile(auditor)?))
}

/// Run the score command.
pub fn run(standard: &Path, auditor: &Path, config: Option<&Path>) -> Result<()> {
    let breakdown = score_files(standard, auditor, config)?;

    if output::is_json() {
        output::print_json(&breakdown);
        return Ok(());
    }

    let s = Styled::new();
    if !output::is_quiet() {
        output::print_header(&s);
        for m in &breakdown.metrics {
            let sym = if m.weighted > 0.0 { s.warn_sym() } else { s.ok_sym() };
            output::print_check(
                sym,
                &format!("{:?}:", m.metric),
                &format!(
                    "diff {:.2}  normalized {:.2}  weighted {:.2}/{}",
                    m.diff, m.normalized, m.weighted, m.weight
                ),
            );
        }
        if breakdown.svg_penalty_applied {
            output::print_check(s.fail_sym(), "Decoy LCP:", "penalty applied");
        }
        eprintln!();
    }
    println!("{:.2}", breakdown.probability);
    if !output::is_quiet() {
        eprintln!(
            "  Cloaking probability {}",
            output::format_probability(&s, breakdown.probability)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_files() {
        let dir = tempfile::tempdir().unwrap();
        let standard = dir.path().join("standard.json");
        let auditor = dir.path().join("auditor.json");

        std::fs::write(
            &standard,
            json!({
                "identity": "standard",
                "loadTimeMs": 1000.0, "domSize": 100.0, "totalSize": 2.0,
                "imagesLoadedCount": 5, "externalScriptCount": 70
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            &auditor,
            json!({
                "loadTimeMs": 1000.0, "domSize": 100.0, "totalSize": 2.0,
                "imagesLoadedCount": 5, "externalScriptCount": 10
            })
            .to_string(),
        )
        .unwrap();

        let breakdown = score_files(&standard, &auditor, None).unwrap();
        assert_eq!(breakdown.probability, 29.09);
        assert!(!breakdown.svg_penalty_applied);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(score_files(&missing, &missing, None).is_err());
    }
}
