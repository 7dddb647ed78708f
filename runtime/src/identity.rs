//! Browser identities presented to the target server.

use serde::{Deserialize, Serialize};

/// User-agent of a mid-range Android phone, matching the auditor's default mobile device.
pub const STANDARD_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 11; moto g power (2022)) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Mobile Safari/537.36";

/// Token the auditor appends to its user-agent.
pub const AUDITOR_UA_SUFFIX: &str = "Chrome-Lighthouse";

/// Device emulation applied to a session before navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEmulation {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    pub is_mobile: bool,
    pub has_touch: bool,
}

impl Default for DeviceEmulation {
    fn default() -> Self {
        Self {
            width: 412,
            height: 823,
            device_scale_factor: 1.75,
            is_mobile: true,
            has_touch: true,
        }
    }
}

/// A (user-agent, device) pair. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Display name, e.g. "standard" or "auditor".
    pub name: String,
    pub user_agent: String,
    pub device: DeviceEmulation,
}

impl Identity {
    pub fn new(name: &str, user_agent: &str, device: DeviceEmulation) -> Self {
        Self {
            name: name.to_string(),
            user_agent: user_agent.to_string(),
            device,
        }
    }

    /// Plain mobile browser.
    pub fn standard() -> Self {
        IdentityConfig::default().standard()
    }

    /// The auditor: same device, user-agent with the auditor token appended.
    pub fn auditor() -> Self {
        IdentityConfig::default().auditor()
    }
}

/// Configurable source of the standard/auditor identity pair.
///
/// Both identities share one device so only the user-agent differs between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdentityConfig {
    pub user_agent: String,
    pub auditor_suffix: String,
    pub device: DeviceEmulation,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_agent: STANDARD_USER_AGENT.to_string(),
            auditor_suffix: AUDITOR_UA_SUFFIX.to_string(),
            device: DeviceEmulation::default(),
        }
    }
}

impl IdentityConfig {
    pub fn standard(&self) -> Identity {
        Identity::new("standard", &self.user_agent, self.device.clone())
    }

    pub fn auditor(&self) -> Identity {
        let ua = format!("{} {}", self.user_agent, self.auditor_suffix);
        Identity::new("auditor", &ua, self.device.clone())
    }
}
