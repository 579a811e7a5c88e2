//! Types shared by the server components and the HTTP API.

use serde::{Deserialize, Serialize};
use sitewatch::{MonitorConfig, NewTarget, Target, TargetId, TlsConfig};
use std::path::PathBuf;
use tokio::sync::oneshot;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// API listen address
    pub listen_addr: String,

    /// Sweep interval and request timeout
    pub monitor: MonitorConfig,

    /// Path of the durable target store
    pub store_path: PathBuf,

    /// Capacity of the store writer queue
    pub store_queue_size: usize,

    /// Directory receiving uploaded certificate files
    pub certs_dir: PathBuf,

    /// Maximum accepted upload size
    pub max_upload_bytes: usize,

    /// Serve Prometheus metrics at /metrics
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            monitor: MonitorConfig::default(),
            store_path: PathBuf::from("websites.db"),
            store_queue_size: 1024,
            certs_dir: PathBuf::from("./certs"),
            max_upload_bytes: 5 << 20,
            metrics_enabled: true,
        }
    }
}

/// Operation for the store writer
#[derive(Debug)]
pub enum StoreOp {
    /// Upsert the target's latest state
    Save(Target),

    /// Remove the target's record
    Delete(TargetId),

    /// Flush to disk once every earlier op is applied, then reply
    Flush(oneshot::Sender<()>),
}

impl StoreOp {
    /// Label for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            StoreOp::Save(_) => "save",
            StoreOp::Delete(_) => "delete",
            StoreOp::Flush(_) => "flush",
        }
    }
}

/// Body of `POST /api/websites`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CreateTargetRequest {
    pub url: String,
    pub name: String,

    #[serde(rename = "usePKI")]
    pub use_pki: bool,

    pub client_cert_path: String,
    pub client_key_path: String,

    #[serde(alias = "skipTLSVerify")]
    pub skip_verify: bool,

    #[serde(rename = "customRootCAPath")]
    pub custom_root_ca_path: String,
}

impl CreateTargetRequest {
    pub fn into_new_target(self) -> NewTarget {
        let mut new = NewTarget::new(self.url);
        if !self.name.trim().is_empty() {
            new = new.with_name(self.name);
        }
        if self.use_pki {
            new = new.with_tls(TlsConfig {
                use_pki: true,
                client_cert_path: self.client_cert_path,
                client_key_path: self.client_key_path,
                skip_verify: self.skip_verify,
                custom_root_ca_path: self.custom_root_ca_path,
            });
        }
        new
    }
}

/// Response of `POST /api/upload-certificate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file_path: String,

    #[serde(rename = "type")]
    pub cert_type: String,
}
