//! Target and engine configuration types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Target ID
pub type TargetId = u64;

/// Per-target mutual-TLS settings.
///
/// Field names are part of the JSON contract shared with the dashboard and
/// the durable store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    #[serde(rename = "usePKI")]
    pub use_pki: bool,

    #[serde(rename = "clientCertPath")]
    pub client_cert_path: String,

    #[serde(rename = "clientKeyPath")]
    pub client_key_path: String,

    #[serde(rename = "skipVerify", alias = "skipTLSVerify")]
    pub skip_verify: bool,

    #[serde(rename = "customRootCAPath")]
    pub custom_root_ca_path: String,
}

impl TlsConfig {
    /// True when this config carries a client certificate/key pair.
    pub fn has_client_identity(&self) -> bool {
        !self.client_cert_path.is_empty() && !self.client_key_path.is_empty()
    }
}

/// A monitored website with the result of its most recent check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: TargetId,
    pub url: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub content_fingerprint: String,

    #[serde(default)]
    pub has_changed: bool,

    #[serde(default = "default_first_check")]
    pub is_first_check: bool,

    #[serde(default)]
    pub last_status_code: u16,

    #[serde(default)]
    pub last_error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_config: Option<TlsConfig>,
}

fn default_first_check() -> bool {
    true
}

impl Target {
    /// A never-checked target.
    pub fn new(
        id: TargetId,
        url: impl Into<String>,
        name: impl Into<String>,
        tls_config: Option<TlsConfig>,
    ) -> Self {
        Self {
            id,
            url: url.into(),
            name: name.into(),
            last_checked_at: None,
            content_fingerprint: String::new(),
            has_changed: false,
            is_first_check: true,
            last_status_code: 0,
            last_error: String::new(),
            tls_config,
        }
    }

    /// TLS settings that require a dedicated client, if any.
    pub fn pki(&self) -> Option<&TlsConfig> {
        self.tls_config.as_ref().filter(|tls| tls.use_pki)
    }
}

/// Request to register a new target.
#[derive(Debug, Clone, Default)]
pub struct NewTarget {
    pub url: String,
    pub name: Option<String>,
    pub tls_config: Option<TlsConfig>,
}

impl NewTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls_config = Some(tls);
        self
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Period between scheduled sweeps
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Timeout applied to every page fetch
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(30),
        }
    }
}
