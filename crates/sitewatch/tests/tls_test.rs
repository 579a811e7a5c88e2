//! Fetches over TLS using per-target PKI material

use axum::{Router, routing::get};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair,
};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use sitewatch::{CheckOutcome, Monitor, MonitorConfig, Target, TlsConfig, detector};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

const BODY: &str = "secure page";

static CRYPTO_INIT: Once = Once::new();

fn init_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

struct Issued {
    cert: Certificate,
    key: KeyPair,
}

impl Issued {
    fn key_der(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.serialize_der()))
    }

    /// Write cert and key PEM files, returning their paths
    fn write(&self, dir: &Path, name: &str) -> (String, String) {
        let cert_path = dir.join(format!("{name}.pem"));
        let key_path = dir.join(format!("{name}.key"));
        std::fs::write(&cert_path, self.cert.pem()).unwrap();
        std::fs::write(&key_path, self.key.serialize_pem()).unwrap();
        (
            cert_path.to_string_lossy().into_owned(),
            key_path.to_string_lossy().into_owned(),
        )
    }
}

fn private_ca() -> Issued {
    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, "Sitewatch Test CA");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);

    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    Issued { cert, key }
}

fn leaf_params(purpose: ExtendedKeyUsagePurpose) -> CertificateParams {
    let mut params =
        CertificateParams::new(vec!["127.0.0.1".to_string(), "localhost".to_string()]).unwrap();
    params.distinguished_name.push(DnType::CommonName, "127.0.0.1");
    params.extended_key_usages = vec![purpose];
    params
}

fn issue(ca: &Issued, purpose: ExtendedKeyUsagePurpose) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = leaf_params(purpose)
        .signed_by(&key, &ca.cert, &ca.key)
        .unwrap();
    Issued { cert, key }
}

fn self_signed_server() -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = leaf_params(ExtendedKeyUsagePurpose::ServerAuth)
        .self_signed(&key)
        .unwrap();
    Issued { cert, key }
}

/// Server config presenting `server`, requiring client certificates issued
/// by `client_ca` when given
fn server_config(server: &Issued, client_ca: Option<&Issued>) -> ServerConfig {
    init_crypto();
    let builder = ServerConfig::builder();
    let builder = match client_ca {
        Some(ca) => {
            let mut roots = RootCertStore::empty();
            roots.add(ca.cert.der().clone()).unwrap();
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots)).build().unwrap();
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };
    builder
        .with_single_cert(vec![server.cert.der().clone()], server.key_der())
        .unwrap()
}

async fn serve_tls(config: ServerConfig) -> SocketAddr {
    let acceptor = TlsAcceptor::from(Arc::new(config));
    let app = Router::new().route("/", get(|| async { BODY }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let app = app.clone();
            tokio::spawn(async move {
                // Rejected handshakes end here
                let Ok(tls) = acceptor.accept(tcp).await else {
                    return;
                };
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(tls), TowerToHyperService::new(app))
                    .await;
            });
        }
    });
    addr
}

fn monitor() -> Monitor {
    Monitor::builder(MonitorConfig {
        interval: Duration::from_secs(3600),
        request_timeout: Duration::from_secs(5),
    })
    .build()
    .unwrap()
}

async fn check(monitor: &Monitor, id: u64, addr: SocketAddr, tls: TlsConfig) -> (Target, CheckOutcome) {
    monitor
        .restore(Target::new(id, format!("https://{addr}/"), "tls", Some(tls)))
        .await;
    monitor.check_now(id).await.unwrap()
}

#[tokio::test]
async fn test_custom_root_trusts_private_ca() {
    let dir = TempDir::new().unwrap();
    let ca = private_ca();
    let (ca_path, _) = ca.write(dir.path(), "ca");
    let server = issue(&ca, ExtendedKeyUsagePurpose::ServerAuth);
    let addr = serve_tls(server_config(&server, None)).await;
    let monitor = monitor();

    let trusted = TlsConfig {
        use_pki: true,
        custom_root_ca_path: ca_path,
        ..TlsConfig::default()
    };
    let (target, outcome) = check(&monitor, 1, addr, trusted).await;
    assert_eq!(outcome, CheckOutcome::Baseline, "{}", target.last_error);
    assert_eq!(target.last_status_code, 200);
    assert_eq!(target.content_fingerprint, detector::fingerprint(BODY.as_bytes()));

    // Built-in roots do not know the private CA
    let untrusted = TlsConfig {
        use_pki: true,
        ..TlsConfig::default()
    };
    let (target, outcome) = check(&monitor, 2, addr, untrusted).await;
    assert_eq!(outcome, CheckOutcome::TransportError);
    assert!(!target.last_error.is_empty());
}

#[tokio::test]
async fn test_mutual_tls_with_client_identity() {
    let dir = TempDir::new().unwrap();
    let ca = private_ca();
    let (ca_path, _) = ca.write(dir.path(), "ca");
    let server = issue(&ca, ExtendedKeyUsagePurpose::ServerAuth);
    let client = issue(&ca, ExtendedKeyUsagePurpose::ClientAuth);
    let (cert_path, key_path) = client.write(dir.path(), "client");
    let addr = serve_tls(server_config(&server, Some(&ca))).await;
    let monitor = monitor();

    let with_identity = TlsConfig {
        use_pki: true,
        client_cert_path: cert_path,
        client_key_path: key_path,
        custom_root_ca_path: ca_path.clone(),
        ..TlsConfig::default()
    };
    let (target, outcome) = check(&monitor, 1, addr, with_identity).await;
    assert_eq!(outcome, CheckOutcome::Baseline, "{}", target.last_error);
    assert_eq!(target.last_status_code, 200);
    assert!(target.last_error.is_empty());

    let without_identity = TlsConfig {
        use_pki: true,
        custom_root_ca_path: ca_path,
        ..TlsConfig::default()
    };
    let (target, outcome) = check(&monitor, 2, addr, without_identity).await;
    assert_eq!(outcome, CheckOutcome::TransportError);
    assert_eq!(target.last_status_code, 0);
}

#[tokio::test]
async fn test_skip_verify_is_per_target() {
    let server = self_signed_server();
    let addr = serve_tls(server_config(&server, None)).await;
    let monitor = monitor();

    let skipping = TlsConfig {
        use_pki: true,
        skip_verify: true,
        ..TlsConfig::default()
    };
    let (target, outcome) = check(&monitor, 1, addr, skipping).await;
    assert_eq!(outcome, CheckOutcome::Baseline, "{}", target.last_error);
    assert_eq!(target.content_fingerprint, detector::fingerprint(BODY.as_bytes()));

    // Same server, verifying client
    let verifying = TlsConfig {
        use_pki: true,
        ..TlsConfig::default()
    };
    let (_, outcome) = check(&monitor, 2, addr, verifying).await;
    assert_eq!(outcome, CheckOutcome::TransportError);

    // The shared client never inherits the skip
    monitor
        .restore(Target::new(3, format!("https://{addr}/"), "plain", None))
        .await;
    let (_, outcome) = monitor.check_now(3).await.unwrap();
    assert_eq!(outcome, CheckOutcome::TransportError);
}
