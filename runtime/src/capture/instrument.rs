//! Page-side instrumentation installed before navigation and read after settle.

use crate::capture::profile::{LcpElement, Viewport};
use serde::Deserialize;

/// Installed on every new document, before any page script runs.
///
/// Records the load event time relative to navigation start and keeps the element
/// of the latest largest-contentful-paint entry.
pub const INSTRUMENTATION_SCRIPT: &str = r#"
(() => {
    const state = { loadTimeMs: null, lcpElement: null };
    Object.defineProperty(window, '__cloakscope', { value: state, enumerable: false });

    window.addEventListener('load', () => {
        state.loadTimeMs = performance.now();
    }, { once: true });

    try {
        new PerformanceObserver((list) => {
            const entries = list.getEntries();
            const last = entries[entries.length - 1];
            if (last && last.element) {
                state.lcpElement = last.element;
            }
        }).observe({ type: 'largest-contentful-paint', buffered: true });
    } catch (e) {
        // LCP unsupported: the probe reports no element.
    }
})();
"#;

/// Evaluated once the page has settled.
pub const SETTLE_PROBE_SCRIPT: &str = r#"
(() => {
    const state = window.__cloakscope || {};
    const markup = new XMLSerializer().serializeToString(document);
    const domBytes = new TextEncoder().encode(markup).length;

    const isSvgSource = (src) =>
        typeof src === 'string' &&
        (src.startsWith('data:image/svg+xml') || /\.svg(\?|#|$)/i.test(src));

    let lcp = null;
    const el = state.lcpElement;
    if (el && el.isConnected && typeof el.getBoundingClientRect === 'function') {
        const rect = el.getBoundingClientRect();
        const tag = (el.tagName || '').toLowerCase();
        lcp = {
            tagName: el.tagName || '',
            width: rect.width,
            height: rect.height,
            isSvg: (typeof SVGElement !== 'undefined' && el instanceof SVGElement) ||
                (tag === 'img' && isSvgSource(el.currentSrc || el.src)),
        };
    }

    const root = document.documentElement;
    return {
        loadTimeMs: state.loadTimeMs,
        domBytes: domBytes,
        lcp: lcp,
        clientWidth: root ? root.clientWidth : 0,
        clientHeight: root ? root.clientHeight : 0,
    };
})()
"#;

/// Decoded result of [`SETTLE_PROBE_SCRIPT`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleProbe {
    /// `None` when the load listener never ran.
    pub load_time_ms: Option<f64>,
    pub dom_bytes: u64,
    pub lcp: Option<LcpElement>,
    pub client_width: f64,
    pub client_height: f64,
}

impl SettleProbe {
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Serialized DOM size in kilobytes.
    pub fn dom_size_kb(&self) -> f64 {
        self.dom_bytes as f64 / 1024.0
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            client_width: self.client_width,
            client_height: self.client_height,
        }
    }
}
