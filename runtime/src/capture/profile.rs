//! The normalized measurement set produced by one browser session.

use serde::{Deserialize, Serialize};

/// Geometry and type of the element behind the last largest-contentful-paint entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LcpElement {
    pub tag_name: String,
    /// Rendered width in CSS pixels.
    pub width: f64,
    /// Rendered height in CSS pixels.
    pub height: f64,
    pub is_svg: bool,
}

/// Page client area at settle time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub client_width: f64,
    pub client_height: f64,
}

/// Result of one completed session.
///
/// Only `SessionRunner::capture` builds these from a live page, after the load event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureProfile {
    /// Navigation start to load event.
    pub load_time_ms: f64,
    /// Serialized DOM, kilobytes.
    pub dom_size: f64,
    /// All counted response bodies, megabytes.
    pub total_size: f64,
    pub images_loaded_count: u32,
    pub external_script_count: u32,
    #[serde(default)]
    pub lcp_element: Option<LcpElement>,
    #[serde(default)]
    pub svg_hack: bool,
    #[serde(default)]
    pub viewport: Viewport,
}
