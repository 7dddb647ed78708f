//! Drive one browser session under an identity and reduce it to a capture profile.

use crate::capture::classifier::{self, OriginMatch};
use crate::capture::instrument::{SettleProbe, INSTRUMENTATION_SCRIPT, SETTLE_PROBE_SCRIPT};
use crate::capture::profile::CaptureProfile;
use crate::capture::trace::TraceWriter;
use crate::error::CaptureError;
use crate::identity::Identity;
use crate::renderer::{RenderContext, Renderer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A profile plus the auxiliary trace written alongside it.
#[derive(Debug, Clone)]
pub struct SessionCapture {
    pub profile: CaptureProfile,
    pub trace_file: Option<PathBuf>,
}

/// Runs single captures. Holds no per-session state between calls.
pub struct SessionRunner {
    renderer: Arc<dyn Renderer>,
    navigation_timeout: Duration,
    origin_match: OriginMatch,
    traces: Option<TraceWriter>,
}

impl SessionRunner {
    pub fn new(renderer: Arc<dyn Renderer>, navigation_timeout: Duration) -> Self {
        Self {
            renderer,
            navigation_timeout,
            origin_match: OriginMatch::default(),
            traces: None,
        }
    }

    pub fn with_origin_match(mut self, origin_match: OriginMatch) -> Self {
        self.origin_match = origin_match;
        self
    }

    /// Record a performance trace per session into the writer's directory.
    pub fn with_trace_writer(mut self, writer: TraceWriter) -> Self {
        self.traces = Some(writer);
        self
    }

    /// Capture `url` under `identity`.
    ///
    /// The session is closed before this returns, whether the capture succeeded
    /// or not.
    pub async fn capture(&self, url: &str, identity: &Identity) -> Result<SessionCapture, CaptureError> {
        let mut context = self.renderer.new_context(identity).await?;
        let outcome = self.drive(context.as_mut(), url, identity).await;

        if let Err(e) = context.close().await {
            warn!(identity = %identity.name, "failed to close browser session: {e:#}");
        }

        outcome
    }

    async fn drive(
        &self,
        context: &mut dyn RenderContext,
        url: &str,
        identity: &Identity,
    ) -> Result<SessionCapture, CaptureError> {
        // Instrumentation has to be in place before the first document loads.
        context.add_init_script(INSTRUMENTATION_SCRIPT).await?;

        let trace_started = match &self.traces {
            Some(_) => match context.start_trace().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("could not start performance trace: {e:#}");
                    false
                }
            },
            None => false,
        };

        let nav = context.navigate(url, self.navigation_timeout).await?;
        debug!(
            identity = %identity.name,
            final_url = %nav.final_url,
            wall_ms = nav.load_time_ms,
            "navigation settled"
        );

        // Page is settled: measure DOM, LCP and viewport.
        let probe = SettleProbe::from_value(context.execute_js(SETTLE_PROBE_SCRIPT).await?)
            .map_err(|e| CaptureError::Evaluation(format!("unexpected probe result: {e}")))?;

        // Drain the response buffer once.
        let responses = context.take_responses().await;
        let summary = classifier::summarize(&responses, url, self.origin_match);

        let trace_file = match (&self.traces, trace_started) {
            (Some(writer), true) => match context.stop_trace().await {
                Ok(events) => writer.write(events),
                Err(e) => {
                    warn!("could not collect performance trace: {e:#}");
                    None
                }
            },
            _ => None,
        };

        // Assemble the profile.
        let viewport = probe.viewport();
        let svg_hack = classifier::is_large_transparent_svg(probe.lcp.as_ref(), &viewport);
        let profile = CaptureProfile {
            load_time_ms: probe.load_time_ms.unwrap_or(nav.load_time_ms as f64),
            dom_size: probe.dom_size_kb(),
            total_size: summary.total_size,
            images_loaded_count: summary.external_images,
            external_script_count: summary.external_scripts,
            lcp_element: probe.lcp,
            svg_hack,
            viewport,
        };

        info!(
            identity = %identity.name,
            url,
            load_time_ms = profile.load_time_ms,
            dom_kb = profile.dom_size,
            total_mb = profile.total_size,
            external_scripts = profile.external_script_count,
            external_images = profile.images_loaded_count,
            svg_hack,
            "captured profile"
        );

        Ok(SessionCapture {
            profile,
            trace_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::classifier::{ResourceKind, ResourceObservation};
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    const URL: &str = "https://shop.example.com/";

    fn response(url: &str, kind: ResourceKind, size: u64) -> ResourceObservation {
        ResourceObservation {
            url: url.into(),
            method: "GET".into(),
            status: 200,
            kind,
            size_bytes: size,
        }
    }

    fn runner(renderer: Arc<ScriptedRenderer>) -> SessionRunner {
        SessionRunner::new(renderer, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_capture_builds_profile() {
        let page = ScriptedPage {
            load_time_ms: Some(1234.0),
            dom_bytes: 2048,
            responses: vec![
                response(URL, ResourceKind::Document, 512 * 1024),
                response("https://cdn.example.net/a.js", ResourceKind::Script, 512 * 1024),
                response("https://cdn.example.net/b.png", ResourceKind::Image, 1024 * 1024),
            ],
            ..Default::default()
        };
        let renderer = Arc::new(ScriptedRenderer::with_pages(vec![page]));

        let capture = runner(Arc::clone(&renderer))
            .capture(URL, &Identity::standard())
            .await
            .unwrap();

        let profile = capture.profile;
        assert_eq!(profile.load_time_ms, 1234.0);
        assert_eq!(profile.dom_size, 2.0);
        assert_eq!(profile.total_size, 2.0);
        assert_eq!(profile.external_script_count, 1);
        assert_eq!(profile.images_loaded_count, 1);
        assert!(profile.lcp_element.is_none());
        assert!(!profile.svg_hack);
        assert!(capture.trace_file.is_none());

        assert_eq!(renderer.log.init_scripts.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.log.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_identity_reaches_renderer() {
        let renderer = Arc::new(ScriptedRenderer::with_pages(vec![ScriptedPage::default()]));
        runner(Arc::clone(&renderer))
            .capture(URL, &Identity::auditor())
            .await
            .unwrap();

        let agents = renderer.log.user_agents.lock().unwrap();
        assert!(agents[0].ends_with("Chrome-Lighthouse"));
    }

    #[tokio::test]
    async fn test_session_closed_on_navigation_failure() {
        let page = ScriptedPage {
            navigation_error: Some(|url| CaptureError::NavigationTimeout {
                url: url.to_string(),
                timeout: Duration::from_secs(30),
            }),
            ..Default::default()
        };
        let renderer = Arc::new(ScriptedRenderer::with_pages(vec![page]));

        let err = runner(Arc::clone(&renderer))
            .capture(URL, &Identity::standard())
            .await
            .unwrap_err();

        assert_eq!(err.reason_code(), "navigation-timeout");
        assert_eq!(renderer.log.opened.load(Ordering::SeqCst), 1);
        assert_eq!(renderer.log.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decoy_lcp_sets_svg_hack() {
        let page = ScriptedPage {
            lcp: Some(json!({ "tagName": "svg", "width": 2000.0, "height": 3.0, "isSvg": true })),
            ..Default::default()
        };
        let renderer = Arc::new(ScriptedRenderer::with_pages(vec![page]));

        let profile = runner(renderer)
            .capture(URL, &Identity::auditor())
            .await
            .unwrap()
            .profile;

        assert!(profile.svg_hack);
        assert_eq!(profile.lcp_element.unwrap().tag_name, "svg");
    }

    #[tokio::test]
    async fn test_missing_load_time_falls_back_to_wall_clock() {
        let page = ScriptedPage {
            load_time_ms: None,
            ..Default::default()
        };
        let renderer = Arc::new(ScriptedRenderer::with_pages(vec![page]));

        let profile = runner(renderer)
            .capture(URL, &Identity::standard())
            .await
            .unwrap()
            .profile;

        // ScriptedContext reports 1500ms of wall-clock navigation.
        assert_eq!(profile.load_time_ms, 1500.0);
    }

    #[tokio::test]
    async fn test_trace_written_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(ScriptedRenderer::with_pages(vec![ScriptedPage::default()]));

        let capture = runner(renderer)
            .with_trace_writer(TraceWriter::new(dir.path()))
            .capture(URL, &Identity::standard())
            .await
            .unwrap();

        let path = capture.trace_file.unwrap();
        let stem = path.file_stem().unwrap().to_str().unwrap();
        assert_eq!(stem.len(), 32);
        assert!(path.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_launch_failure_propagates() {
        let renderer = Arc::new(ScriptedRenderer::with_pages(Vec::new()));
        let err = runner(Arc::clone(&renderer))
            .capture(URL, &Identity::standard())
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "launch-error");
        assert_eq!(renderer.log.closed.load(Ordering::SeqCst), 0);
    }
}
