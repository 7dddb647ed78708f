//! Per-session performance trace files.
//!
//! Traces are auxiliary output for offline inspection. Write failures are logged
//! and swallowed; they never fail a capture.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Trace categories recorded for each session.
pub const TRACE_CATEGORIES: &[&str] = &[
    "devtools.timeline",
    "v8.execute",
    "disabled-by-default-devtools.timeline",
    "disabled-by-default-devtools.timeline.frame",
    "toplevel",
    "blink.console",
    "blink.user_timing",
    "latencyInfo",
    "disabled-by-default-devtools.timeline.stack",
    "disabled-by-default-v8.cpu_profiler",
];

/// Random 16-byte identifier rendered as 32 lowercase hex characters.
pub fn random_trace_id() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Writes trace events into a dedicated directory.
#[derive(Debug, Clone)]
pub struct TraceWriter {
    dir: PathBuf,
}

impl TraceWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write events as `{"traceEvents": [...]}`. Returns the file path on success.
    pub fn write(&self, events: Vec<serde_json::Value>) -> Option<PathBuf> {
        match self.try_write(events) {
            Ok(path) => {
                debug!(path = %path.display(), "wrote performance trace");
                Some(path)
            }
            Err(e) => {
                warn!("failed to write performance trace: {e:#}");
                None
            }
        }
    }

    fn try_write(&self, events: Vec<serde_json::Value>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let path = self.dir.join(format!("{}.json", random_trace_id()));
        let doc = serde_json::json!({ "traceEvents": events });
        let bytes = serde_json::to_vec(&doc)?;
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
