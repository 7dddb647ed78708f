//! Chromium renderer over the DevTools protocol.
//!
//! Every context launches its own browser process with a throwaway profile
//! directory, so no cookies, cache, or storage leak between sessions.

use crate::capture::classifier::{ResourceKind, ResourceObservation};
use crate::capture::trace::TRACE_CATEGORIES;
use crate::error::CaptureError;
use crate::identity::Identity;
use crate::renderer::{NavigationResult, RenderContext, Renderer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTouchEmulationEnabledParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, RequestId, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::browser_protocol::tracing::{
    EndParams, EventDataCollected, EventTracingComplete, StartParams, StartTransferMode,
    TraceConfig,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Network counts as idle with at most this many requests in flight...
const IDLE_MAX_INFLIGHT: usize = 2;
/// ...for this long.
const IDLE_QUIET_PERIOD: Duration = Duration::from_millis(500);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound on waiting for the browser to flush trace buffers.
const TRACE_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Tracks whether the network has stayed quiet long enough to call the page idle.
///
/// Quiet means at most `max_inflight` requests pending. The quiet window restarts
/// only when the pending count rises above that limit, so a steady trickle of
/// small requests does not keep the page busy.
#[derive(Debug, Clone)]
struct IdleTracker {
    max_inflight: usize,
    quiet_period: Duration,
    /// Pending requests at the last change.
    inflight: usize,
    /// Start of the current quiet window, `None` while busy.
    quiet_since: Option<Duration>,
}

impl IdleTracker {
    fn new(max_inflight: usize, quiet_period: Duration) -> Self {
        Self {
            max_inflight,
            quiet_period,
            inflight: 0,
            quiet_since: Some(Duration::ZERO),
        }
    }

    /// Start a fresh quiet window, e.g. when a navigation begins.
    fn reset(&mut self, now: Duration) {
        self.quiet_since = (self.inflight <= self.max_inflight).then_some(now);
    }

    /// Record the pending request count observed at `now`.
    fn on_change(&mut self, inflight: usize, now: Duration) {
        self.inflight = inflight;
        if inflight > self.max_inflight {
            self.quiet_since = None;
        } else if self.quiet_since.is_none() {
            self.quiet_since = Some(now);
        }
    }

    fn is_idle(&self, now: Duration) -> bool {
        self.quiet_since
            .is_some_and(|since| now.saturating_sub(since) >= self.quiet_period)
    }
}

fn lock_idle(idle: &Mutex<IdleTracker>) -> MutexGuard<'_, IdleTracker> {
    idle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Find a Chromium binary: `CLOAKSCOPE_CHROMIUM_PATH`, then the system PATH.
///
/// Returns `None` to let chromiumoxide run its own detection.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CLOAKSCOPE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
        warn!("CLOAKSCOPE_CHROMIUM_PATH={p} does not exist, searching PATH");
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    None
}

fn is_docker() -> bool {
    std::path::Path::new("/.dockerenv").exists()
}

/// Launches one headless Chromium per context.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    chromium_path: Option<PathBuf>,
    no_sandbox: bool,
    /// Per-command CDP timeout. Must cover the slowest navigation.
    request_timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(chromium_path: Option<PathBuf>, no_sandbox: bool, request_timeout: Duration) -> Self {
        Self {
            chromium_path,
            no_sandbox,
            request_timeout,
        }
    }

    /// Configure from the environment.
    pub fn from_env(navigation_timeout: Duration) -> Self {
        let no_sandbox = std::env::var("CLOAKSCOPE_CHROMIUM_NO_SANDBOX").is_ok() || is_docker();
        Self::new(find_chromium(), no_sandbox, navigation_timeout)
    }

    fn browser_config(&self, identity: &Identity, profile_dir: &TempDir) -> Result<BrowserConfig, CaptureError> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir.path())
            .request_timeout(self.request_timeout)
            .window_size(identity.device.width, identity.device.height);

        if let Some(path) = &self.chromium_path {
            builder = builder.chrome_executable(path);
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }

        builder.build().map_err(CaptureError::Launch)
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self, identity: &Identity) -> Result<Box<dyn RenderContext>, CaptureError> {
        let profile_dir = tempfile::Builder::new()
            .prefix("cloakscope-profile-")
            .tempdir()
            .map_err(|e| CaptureError::Launch(format!("creating profile dir: {e}")))?;

        let config = self.browser_config(identity, &profile_dir)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CaptureError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("cdp handler: {e}");
                }
            }
        });

        let mut context = ChromiumContext {
            browser,
            page: None,
            handler_task,
            network_task: None,
            trace_task: None,
            events: None,
            idle: Arc::new(Mutex::new(IdleTracker::new(IDLE_MAX_INFLIGHT, IDLE_QUIET_PERIOD))),
            epoch: Instant::now(),
            _profile_dir: profile_dir,
        };

        // A half-configured session is still torn down.
        if let Err(e) = context.prepare(identity).await {
            if let Err(close_err) = Box::new(context).close().await {
                warn!("failed to close browser after setup error: {close_err:#}");
            }
            return Err(e);
        }

        Ok(Box::new(context))
    }
}

/// Raw network events forwarded from the CDP listeners.
#[derive(Debug)]
enum NetworkEvent {
    Request { id: String, method: String },
    Response {
        id: String,
        url: String,
        status: i64,
        resource_type: ResourceType,
    },
}

/// One hermetic browser session.
pub struct ChromiumContext {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    network_task: Option<JoinHandle<()>>,
    trace_task: Option<JoinHandle<Vec<serde_json::Value>>>,
    /// Append-only event buffer, drained once by `take_responses`.
    events: Option<mpsc::UnboundedReceiver<NetworkEvent>>,
    idle: Arc<Mutex<IdleTracker>>,
    /// Time origin for `idle`.
    epoch: Instant,
    _profile_dir: TempDir,
}

impl ChromiumContext {
    fn page(&self) -> Result<&Page, CaptureError> {
        self.page
            .as_ref()
            .ok_or_else(|| CaptureError::Launch("page not created".into()))
    }

    /// Open the page, apply the identity, and attach the network observer.
    async fn prepare(&mut self, identity: &Identity) -> Result<(), CaptureError> {
        let launch = |e: chromiumoxide::error::CdpError| CaptureError::Launch(e.to_string());

        let page = self.browser.new_page("about:blank").await.map_err(launch)?;

        // Identity first: nothing may load under the default user agent.
        page.execute(SetUserAgentOverrideParams::new(identity.user_agent.clone()))
            .await
            .map_err(launch)?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            identity.device.width as i64,
            identity.device.height as i64,
            identity.device.device_scale_factor,
            identity.device.is_mobile,
        ))
        .await
        .map_err(launch)?;
        page.execute(SetTouchEmulationEnabledParams::new(identity.device.has_touch))
            .await
            .map_err(launch)?;
        page.execute(EnableParams::default()).await.map_err(launch)?;

        // Subscribe before any navigation so the first document is observed.
        let requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(launch)?;
        let responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(launch)?;
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(launch)?;
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(launch)?;

        // Pump listener streams into the session buffer and keep the idle
        // tracker current.
        let (tx, rx) = mpsc::unbounded_channel();
        let idle = Arc::clone(&self.idle);
        let epoch = self.epoch;

        self.network_task = Some(tokio::spawn(async move {
            let mut requests = requests.fuse();
            let mut responses = responses.fuse();
            let mut finished = finished.fuse();
            let mut failed = failed.fuse();
            let mut pending: HashSet<String> = HashSet::new();

            loop {
                tokio::select! {
                    Some(ev) = requests.next() => {
                        let id = ev.request_id.inner().clone();
                        pending.insert(id.clone());
                        let _ = tx.send(NetworkEvent::Request { id, method: ev.request.method.clone() });
                    }
                    Some(ev) = responses.next() => {
                        let _ = tx.send(NetworkEvent::Response {
                            id: ev.request_id.inner().clone(),
                            url: ev.response.url.clone(),
                            status: ev.response.status,
                            resource_type: ev.r#type.clone(),
                        });
                    }
                    Some(ev) = finished.next() => {
                        pending.remove(ev.request_id.inner());
                    }
                    Some(ev) = failed.next() => {
                        pending.remove(ev.request_id.inner());
                    }
                    else => break,
                }
                lock_idle(&idle).on_change(pending.len(), epoch.elapsed());
            }
        }));
        self.events = Some(rx);

        self.page = Some(page);
        Ok(())
    }

    /// Wait until the page reports `readyState === "complete"`.
    async fn wait_for_load_event(&self) -> Result<(), CaptureError> {
        loop {
            let state = self
                .execute_js("document.readyState")
                .await
                .unwrap_or(serde_json::Value::Null);
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Wait until at most two requests have been in flight for the quiet period.
    async fn wait_for_network_idle(&self) {
        loop {
            let idle = lock_idle(&self.idle).is_idle(self.epoch.elapsed());
            if idle {
                return;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Decoded size of a response body, or `None` if it cannot be read.
    async fn body_size(&self, request_id: String) -> Option<u64> {
        let page = self.page.as_ref()?;
        let body = page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id.clone())))
            .await
            .map_err(|e| debug!(%request_id, "response body unavailable: {e}"))
            .ok()?;

        decoded_body_len(&body.result.body, body.result.base64_encoded)
            .map_err(|e| debug!(%request_id, "undecodable response body: {e}"))
            .ok()
    }
}

/// Byte length of a response body as returned by `Network.getResponseBody`.
fn decoded_body_len(body: &str, base64_encoded: bool) -> Result<u64, base64::DecodeError> {
    if base64_encoded {
        base64::engine::general_purpose::STANDARD
            .decode(body)
            .map(|bytes| bytes.len() as u64)
    } else {
        Ok(body.len() as u64)
    }
}

/// Pair buffered responses with their requests and size them.
///
/// Responses without a matching request event get their method from the
/// resource type. Counted responses whose body cannot be sized are dropped.
async fn assemble_observations<F, Fut>(
    events: Vec<NetworkEvent>,
    mut body_size: F,
) -> Vec<ResourceObservation>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Option<u64>>,
{
    let mut methods: HashMap<String, String> = HashMap::new();
    let mut responses = Vec::new();
    for event in events {
        match event {
            NetworkEvent::Request { id, method } => {
                methods.insert(id, method);
            }
            NetworkEvent::Response {
                id,
                url,
                status,
                resource_type,
            } => responses.push((id, url, status, resource_type)),
        }
    }

    let mut observations = Vec::with_capacity(responses.len());
    for (id, url, status, resource_type) in responses {
        let method = match (methods.get(&id), &resource_type) {
            (Some(m), _) => m.clone(),
            (None, ResourceType::Preflight) => "OPTIONS".to_string(),
            (None, _) => "GET".to_string(),
        };
        let mut obs = ResourceObservation {
            url,
            method,
            status: u16::try_from(status).unwrap_or(0),
            kind: resource_kind(&resource_type),
            size_bytes: 0,
        };

        // Excluded responses are never counted, so their bodies are not fetched.
        if obs.is_page_content() {
            match body_size(id).await {
                Some(size) => obs.size_bytes = size,
                None => continue,
            }
        }
        observations.push(obs);
    }
    observations
}

fn resource_kind(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Image => ResourceKind::Image,
        _ => ResourceKind::Other,
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn add_init_script(&mut self, script: &str) -> Result<(), CaptureError> {
        self.page()?
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string()))
            .await
            .map_err(|e| CaptureError::Launch(format!("installing instrumentation: {e}")))?;
        Ok(())
    }

    async fn start_trace(&mut self) -> Result<()> {
        let page = self.page().map_err(anyhow::Error::from)?.clone();

        // Collector must be listening before tracing starts.
        let mut chunks = page.event_listener::<EventDataCollected>().await?;
        let mut complete = page.event_listener::<EventTracingComplete>().await?;
        self.trace_task = Some(tokio::spawn(async move {
            let mut events = Vec::new();
            loop {
                tokio::select! {
                    Some(chunk) = chunks.next() => events.extend(chunk.value.iter().cloned()),
                    _ = complete.next() => break,
                }
            }
            // Chunks delivered just before completion.
            while let Some(Some(chunk)) = futures::FutureExt::now_or_never(chunks.next()) {
                events.extend(chunk.value.iter().cloned());
            }
            events
        }));

        page.execute(
            StartParams::builder()
                .trace_config(
                    TraceConfig::builder()
                        .included_categories(TRACE_CATEGORIES.iter().map(|c| c.to_string()))
                        .build(),
                )
                .transfer_mode(StartTransferMode::ReportEvents)
                .build(),
        )
        .await
        .context("starting trace")?;
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<NavigationResult, CaptureError> {
        let start = Instant::now();
        let page = self.page()?.clone();
        lock_idle(&self.idle).reset(self.epoch.elapsed());

        let settle = async {
            page.goto(url).await.map_err(|e| CaptureError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            self.wait_for_load_event().await?;
            self.wait_for_network_idle().await;
            Ok::<_, CaptureError>(())
        };

        match tokio::time::timeout(timeout, settle).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CaptureError::NavigationTimeout {
                    url: url.to_string(),
                    timeout,
                })
            }
        }

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(NavigationResult {
            final_url,
            load_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value, CaptureError> {
        self.page()?
            .evaluate(script)
            .await
            .map_err(|e| CaptureError::Evaluation(e.to_string()))?
            .into_value::<serde_json::Value>()
            .map_err(|e| CaptureError::Evaluation(e.to_string()))
    }

    async fn take_responses(&mut self) -> Vec<ResourceObservation> {
        let Some(mut rx) = self.events.take() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        let this = &*self;
        assemble_observations(events, move |id| this.body_size(id)).await
    }

    async fn stop_trace(&mut self) -> Result<Vec<serde_json::Value>> {
        let Some(task) = self.trace_task.take() else {
            return Ok(Vec::new());
        };

        self.page()
            .map_err(anyhow::Error::from)?
            .execute(EndParams::default())
            .await
            .context("ending trace")?;

        match tokio::time::timeout(TRACE_FLUSH_TIMEOUT, task).await {
            Ok(events) => events.context("trace collector panicked"),
            Err(_) => anyhow::bail!("trace did not complete within {}s", TRACE_FLUSH_TIMEOUT.as_secs()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = self;
        if let Some(task) = this.network_task.take() {
            task.abort();
        }
        if let Some(task) = this.trace_task.take() {
            task.abort();
        }
        if let Some(page) = this.page.take() {
            if let Err(e) = page.close().await {
                debug!("page close: {e}");
            }
        }

        let closed = this.browser.close().await.context("closing browser");
        let waited = this.browser.wait().await.context("waiting for browser exit");
        this.handler_task.abort();
        closed?;
        waited?;
        Ok(())
    }
}

impl Drop for ChromiumContext {
    fn drop(&mut self) {
        // Backstop for paths that never reach `close`; Browser kills its child on drop.
        self.handler_task.abort();
        if let Some(task) = self.network_task.take() {
            task.abort();
        }
        if let Some(task) = self.trace_task.take() {
            task.abort();
        }
    }
}
