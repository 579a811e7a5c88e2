//! HTTP client construction, including per-target PKI material.

use crate::types::TlsConfig;
use reqwest::tls::{Certificate, Identity, Version};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// A target's TLS material could not be turned into a client.
///
/// These are configuration problems, never network failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid client certificate or key: {0}")]
    InvalidIdentity(#[source] reqwest::Error),

    #[error("failed to append CA certificate from {}", path.display())]
    NoRootCertificate { path: PathBuf },

    #[error("invalid CA certificate: {0}")]
    InvalidRootCertificate(#[source] reqwest::Error),

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Builds fetch clients.
///
/// Targets without PKI share one pooled client. Every PKI check gets a
/// freshly built client so edits to certificate files take effect on the
/// next check and no TLS setting leaks between targets.
#[derive(Clone)]
pub struct ClientFactory {
    shared: Client,
    timeout: Duration,
}

impl ClientFactory {
    /// Create a factory whose clients all use `timeout` per request
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let shared = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self { shared, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Client for a target with the given TLS settings.
    pub fn client_for(&self, tls: Option<&TlsConfig>) -> Result<Client, ClientError> {
        match tls.filter(|tls| tls.use_pki) {
            Some(tls) => self.build_pki_client(tls),
            None => Ok(self.shared.clone()),
        }
    }

    fn build_pki_client(&self, tls: &TlsConfig) -> Result<Client, ClientError> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .min_tls_version(Version::TLS_1_2);

        if tls.has_client_identity() {
            let identity = load_identity(
                Path::new(&tls.client_cert_path),
                Path::new(&tls.client_key_path),
            )?;
            builder = builder.identity(identity);
        }

        if !tls.custom_root_ca_path.is_empty() {
            let root = load_root_certificate(Path::new(&tls.custom_root_ca_path))?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(root);
        }

        if tls.skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        debug!(
            client_identity = tls.has_client_identity(),
            custom_root = !tls.custom_root_ca_path.is_empty(),
            skip_verify = tls.skip_verify,
            "Built PKI client"
        );

        builder.build().map_err(ClientError::Build)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ClientError> {
    std::fs::read(path).map_err(|source| ClientError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a PEM certificate chain and its private key as one identity.
fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity, ClientError> {
    let mut pem = read_file(key_path)?;
    pem.push(b'\n');
    pem.extend_from_slice(&read_file(cert_path)?);

    Identity::from_pem(&pem).map_err(ClientError::InvalidIdentity)
}

/// Load a PEM CA certificate to serve as the only trust root.
fn load_root_certificate(path: &Path) -> Result<Certificate, ClientError> {
    let pem = read_file(path)?;

    let has_certificate = std::str::from_utf8(&pem)
        .map(|text| text.contains("-----BEGIN CERTIFICATE-----"))
        .unwrap_or(false);
    if !has_certificate {
        return Err(ClientError::NoRootCertificate {
            path: path.to_path_buf(),
        });
    }

    Certificate::from_pem(&pem).map_err(ClientError::InvalidRootCertificate)
}
