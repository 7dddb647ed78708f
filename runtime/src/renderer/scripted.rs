//! In-memory renderer that replays canned pages, for tests.

use crate::capture::classifier::ResourceObservation;
use crate::error::CaptureError;
use crate::identity::Identity;
use crate::renderer::{NavigationResult, RenderContext, Renderer};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What one scripted session serves.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    pub load_time_ms: Option<f64>,
    pub dom_bytes: u64,
    pub lcp: Option<serde_json::Value>,
    pub client_width: f64,
    pub client_height: f64,
    pub responses: Vec<ResourceObservation>,
    pub navigation_error: Option<fn(&str) -> CaptureError>,
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self {
            load_time_ms: Some(1000.0),
            dom_bytes: 100 * 1024,
            lcp: None,
            client_width: 400.0,
            client_height: 800.0,
            responses: Vec::new(),
            navigation_error: None,
        }
    }
}

/// Records what the renderer was asked to do.
#[derive(Debug, Default)]
pub struct ScriptLog {
    pub user_agents: Mutex<Vec<String>>,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub init_scripts: AtomicUsize,
}

/// Serves pages from a queue, or from a function of the user-agent when the queue
/// is empty.
pub struct ScriptedRenderer {
    queue: Mutex<VecDeque<ScriptedPage>>,
    by_agent: Option<Box<dyn Fn(&str) -> ScriptedPage + Send + Sync>>,
    pub log: Arc<ScriptLog>,
}

impl ScriptedRenderer {
    pub fn with_pages(pages: Vec<ScriptedPage>) -> Self {
        Self {
            queue: Mutex::new(pages.into()),
            by_agent: None,
            log: Arc::new(ScriptLog::default()),
        }
    }

    pub fn by_agent(f: impl Fn(&str) -> ScriptedPage + Send + Sync + 'static) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            by_agent: Some(Box::new(f)),
            log: Arc::new(ScriptLog::default()),
        }
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self, identity: &Identity) -> Result<Box<dyn RenderContext>, CaptureError> {
        let queued = self.queue.lock().unwrap().pop_front();
        let page = match (queued, &self.by_agent) {
            (Some(page), _) => page,
            (None, Some(f)) => f(&identity.user_agent),
            (None, None) => return Err(CaptureError::Launch("no scripted page left".into())),
        };

        self.log
            .user_agents
            .lock()
            .unwrap()
            .push(identity.user_agent.clone());
        self.log.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedContext {
            page,
            log: Arc::clone(&self.log),
            tracing: false,
        }))
    }
}

struct ScriptedContext {
    page: ScriptedPage,
    log: Arc<ScriptLog>,
    tracing: bool,
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn add_init_script(&mut self, _script: &str) -> Result<(), CaptureError> {
        self.log.init_scripts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_trace(&mut self) -> Result<()> {
        self.tracing = true;
        Ok(())
    }

    async fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<NavigationResult, CaptureError> {
        if let Some(err) = self.page.navigation_error {
            return Err(err(url));
        }
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 1500,
        })
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value, CaptureError> {
        Ok(json!({
            "loadTimeMs": self.page.load_time_ms,
            "domBytes": self.page.dom_bytes,
            "lcp": self.page.lcp,
            "clientWidth": self.page.client_width,
            "clientHeight": self.page.client_height,
        }))
    }

    async fn take_responses(&mut self) -> Vec<ResourceObservation> {
        std::mem::take(&mut self.page.responses)
    }

    async fn stop_trace(&mut self) -> Result<Vec<serde_json::Value>> {
        if !self.tracing {
            anyhow::bail!("trace not started");
        }
        Ok(vec![json!({ "name": "TracingStartedInBrowser", "ts": 0 })])
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
