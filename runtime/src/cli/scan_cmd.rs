//! `cloakscope scan <urls...>` — run paired captures and score every URL.

use crate::capture::classifier::OriginMatch;
use crate::capture::runner::SessionRunner;
use crate::capture::trace::TraceWriter;
use crate::cli::output::{self, Styled};
use crate::cli::progress;
use crate::config::{parse_url_list, FailurePolicy, RunConfig};
use crate::renderer::chromium::ChromiumRenderer;
use crate::report::RunReport;
use crate::trial::TrialAggregator;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Options for the scan command.
#[derive(Debug, Clone, Default, Args)]
pub struct ScanOptions {
    /// Target URLs.
    pub urls: Vec<String>,
    /// File with one URL per line.
    #[arg(long)]
    pub urls_file: Option<PathBuf>,
    /// JSON config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Trials per URL.
    #[arg(short = 'n', long)]
    pub iterations: Option<usize>,
    /// Results document path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Directory for performance traces.
    #[arg(long)]
    pub trace_dir: Option<PathBuf>,
    /// Navigation timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    /// Record failed iterations and keep going instead of aborting.
    #[arg(long)]
    pub keep_going: bool,
    /// Compare resource origins instead of URL prefixes.
    #[arg(long)]
    pub same_origin: bool,
}

/// Resolve the effective configuration: file, then URL list, then flags.
pub fn resolve_config(opts: &ScanOptions) -> Result<RunConfig> {
    let mut config = match &opts.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    if let Some(path) = &opts.urls_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading URL list {}", path.display()))?;
        config.urls.extend(parse_url_list(&text));
    }
    config.urls.extend(opts.urls.iter().cloned());

    if let Some(n) = opts.iterations {
        config.iterations = n;
    }
    if let Some(path) = &opts.output {
        config.output = path.clone();
    }
    if let Some(dir) = &opts.trace_dir {
        config.trace_dir = Some(dir.clone());
    }
    if let Some(secs) = opts.timeout_secs {
        config.navigation_timeout_secs = secs;
    }
    if opts.keep_going {
        config.failure_policy = FailurePolicy::Skip;
    }
    if opts.same_origin {
        config.origin_match = OriginMatch::SameOrigin;
    }

    config.validate()?;
    if config.urls.is_empty() {
        bail!("no target URLs given (pass URLs, --urls-file, or a config with \"urls\")");
    }
    Ok(config)
}

/// Run the scan command.
pub async fn run(opts: ScanOptions) -> Result<()> {
    let config = resolve_config(&opts)?;
    let s = Styled::new();
    let quiet = output::is_quiet() || output::is_json();

    if !quiet {
        output::print_header(&s);
        output::print_check(s.ok_sym(), "Targets:", &config.urls.len().to_string());
        output::print_check(s.ok_sym(), "Iterations:", &config.iterations.to_string());
        output::print_check(
            s.ok_sym(),
            "Traces:",
            &config.trace_dir().display().to_string(),
        );
        eprintln!();
    }

    let renderer = Arc::new(ChromiumRenderer::from_env(config.navigation_timeout()));
    let runner = SessionRunner::new(renderer, config.navigation_timeout())
        .with_origin_match(config.origin_match)
        .with_trace_writer(TraceWriter::new(config.trace_dir()));
    let aggregator = TrialAggregator::from_config(runner, &config);

    let started_at = Utc::now();
    info!(urls = config.urls.len(), iterations = config.iterations, "scan started");

    let mut results = Vec::with_capacity(config.urls.len());
    for url in &config.urls {
        let spinner = progress::create_spinner(url, quiet);
        let mut done = 0;
        let outcome = aggregator
            .run_url_with(url, |trial| {
                done += 1;
                spinner.set_message(progress::trial_message(
                    url,
                    done,
                    config.iterations,
                    trial.probability,
                ));
            })
            .await;
        spinner.finish_and_clear();

        match outcome {
            Ok(result) => {
                if !quiet {
                    eprintln!("{}", output::url_summary_line(&s, url, result.probability));
                    for failure in &result.failures {
                        eprintln!(
                            "        {} iteration {} ({}): {}",
                            s.warn_sym(),
                            failure.iteration + 1,
                            failure.identity,
                            failure.reason
                        );
                    }
                }
                results.push(result);
            }
            Err(e) => {
                if !quiet {
                    eprintln!("    {} {url}  {}", s.fail_sym(), s.red(&e.to_string()));
                }
                return Err(e).with_context(|| format!("scan aborted at {url}"));
            }
        }
    }

    let report = RunReport::new(
        started_at,
        config.iterations,
        aggregator.standard(),
        aggregator.auditor(),
        &results,
    );
    report.write(&config.output)?;

    let elapsed = (report.finished_at - report.started_at).num_seconds().max(0) as u64;
    info!(output = %config.output.display(), elapsed_secs = elapsed, "scan complete");

    if output::is_json() {
        output::print_json(&report);
    } else if !output::is_quiet() {
        eprintln!();
        eprintln!(
            "  {} Results written to {} ({})",
            s.ok_sym(),
            config.output.display(),
            output::format_duration(elapsed)
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flags_override_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "urls": ["https://a.example/"], "iterations": 3 }}"#).unwrap();
        let mut list = tempfile::NamedTempFile::new().unwrap();
        writeln!(list, "# more\nhttps://b.example/").unwrap();

        let opts = ScanOptions {
            urls: vec!["https://c.example/".into()],
            urls_file: Some(list.path().to_path_buf()),
            config: Some(file.path().to_path_buf()),
            iterations: Some(7),
            keep_going: true,
            same_origin: true,
            ..Default::default()
        };

        let config = resolve_config(&opts).unwrap();
        assert_eq!(
            config.urls,
            vec!["https://a.example/", "https://b.example/", "https://c.example/"]
        );
        assert_eq!(config.iterations, 7);
        assert_eq!(config.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.origin_match, OriginMatch::SameOrigin);
    }

    #[test]
    fn test_requires_urls() {
        let err = resolve_config(&ScanOptions::default()).unwrap_err();
        assert!(err.to_string().contains("no target URLs"));
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let opts = ScanOptions {
            urls: vec!["https://a.example/".into()],
            iterations: Some(0),
            ..Default::default()
        };
        assert!(resolve_config(&opts).is_err());
    }
}
