//! Browser rendering abstraction.
//!
//! A `Renderer` launches one hermetic browser session per call, already configured
//! with an identity. The `RenderContext` it returns is owned by exactly one capture
//! and must be closed before that capture returns.

pub mod chromium;
#[cfg(test)]
pub(crate) mod scripted;

use crate::capture::classifier::ResourceObservation;
use crate::error::CaptureError;
use crate::identity::Identity;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Outcome of a settled navigation.
#[derive(Debug, Clone)]
pub struct NavigationResult {
    /// URL of the main frame once settled, after redirects.
    pub final_url: String,
    /// Wall-clock time spent in `navigate`.
    pub load_time_ms: u64,
}

/// Launches isolated browser sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Start a fresh session with the identity's user-agent and device emulation
    /// applied and the network observer already attached.
    async fn new_context(&self, identity: &Identity) -> Result<Box<dyn RenderContext>, CaptureError>;
}

/// A live browser session.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Evaluate `script` in every new document before page scripts run.
    async fn add_init_script(&mut self, script: &str) -> Result<(), CaptureError>;

    /// Begin recording a performance trace.
    async fn start_trace(&mut self) -> Result<()>;

    /// Navigate and wait for the load event and network idle, bounded by `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration)
        -> Result<NavigationResult, CaptureError>;

    /// Evaluate an expression in the page and return its JSON value.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value, CaptureError>;

    /// Drain every response observed so far. Responses whose body could not be
    /// read are left out.
    async fn take_responses(&mut self) -> Vec<ResourceObservation>;

    /// Stop tracing and return the collected trace events.
    async fn stop_trace(&mut self) -> Result<Vec<serde_json::Value>>;

    /// Close the page and shut the browser down.
    async fn close(self: Box<Self>) -> Result<()>;
}
