//! Classify network responses observed during a session.
//!
//! Observations are reduced to counts and a total size; the raw list is dropped
//! once the summary is built.

use crate::capture::profile::{LcpElement, Viewport};
use serde::{Deserialize, Serialize};
use url::Url;

/// Height under which a page-wide SVG counts as a near-invisible strip.
const SLIVER_HEIGHT_PX: f64 = 5.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Coarse resource category used by scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Script,
    Image,
    Other,
}

/// One completed response seen by the session's network observer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceObservation {
    /// Response URL after any redirect hop it belongs to.
    pub url: String,
    /// Request method, `OPTIONS` for CORS preflights.
    pub method: String,
    /// HTTP status, 0 when the browser reported none.
    pub status: u16,
    pub kind: ResourceKind,
    /// Decoded body length.
    pub size_bytes: u64,
}

impl ResourceObservation {
    /// Redirect hops and CORS preflights carry no page content.
    pub fn is_page_content(&self) -> bool {
        !self.method.eq_ignore_ascii_case("OPTIONS") && !(300..=399).contains(&self.status)
    }
}

/// How a resource is judged to belong to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OriginMatch {
    /// Literal prefix test against the full navigated URL. Loose: a page at
    /// `https://a.com/x` treats `https://a.com/y.js` as external.
    #[default]
    Prefix,
    /// Scheme, host, and port comparison.
    SameOrigin,
}

impl OriginMatch {
    /// Whether `resource_url` is external to `page_url`.
    pub fn is_external(&self, page_url: &str, resource_url: &str) -> bool {
        match self {
            OriginMatch::Prefix => !resource_url.starts_with(page_url),
            OriginMatch::SameOrigin => match (Url::parse(page_url), Url::parse(resource_url)) {
                (Ok(page), Ok(resource)) => page.origin() != resource.origin(),
                _ => !resource_url.starts_with(page_url),
            },
        }
    }
}

/// Counts and totals that flow into a capture profile.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceSummary {
    pub external_scripts: u32,
    pub external_images: u32,
    /// Megabytes.
    pub total_size: f64,
}

/// Summarize the responses of one session against the navigated URL.
pub fn summarize(
    observations: &[ResourceObservation],
    page_url: &str,
    origin_match: OriginMatch,
) -> ResourceSummary {
    let mut summary = ResourceSummary::default();
    let mut total_bytes: u64 = 0;

    for obs in observations.iter().filter(|o| o.is_page_content()) {
        total_bytes = total_bytes.saturating_add(obs.size_bytes);

        if !origin_match.is_external(page_url, &obs.url) {
            continue;
        }
        match obs.kind {
            ResourceKind::Script => summary.external_scripts += 1,
            ResourceKind::Image => summary.external_images += 1,
            ResourceKind::Document | ResourceKind::Other => {}
        }
    }

    summary.total_size = total_bytes as f64 / BYTES_PER_MB;
    summary
}

/// Decoy check: an SVG that overflows the viewport in both directions, or spans
/// its width as a sliver under 5px tall.
pub fn is_large_transparent_svg(lcp: Option<&LcpElement>, viewport: &Viewport) -> bool {
    let Some(el) = lcp else {
        return false;
    };
    if !el.is_svg {
        return false;
    }

    let wider = el.width > viewport.client_width;
    let taller = el.height > viewport.client_height;
    (wider && taller) || (wider && el.height < SLIVER_HEIGHT_PX)
}
