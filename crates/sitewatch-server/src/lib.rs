//! Sitewatch server
//!
//! Runs the website change monitor as a long-lived service: targets are
//! managed over an HTTP API, checked on a fixed cadence, and mirrored to a
//! local sled database so they survive restarts.
//!
//! # Components
//!
//! - **Config**: YAML configuration with validation
//! - **TargetStore**: durable copy of every target, replayed at startup
//! - **StoreWriter**: applies persistence requests in order, off the check path
//! - **ApiServer**: target management, certificate upload and `/metrics`
//! - **MetricsRegistry**: Prometheus counters for checks, sweeps and store errors

pub mod config;
pub mod http_server;
pub mod metrics;
pub mod server;
pub mod store;
pub mod types;
pub mod writer;

pub use config::{Config, ConfigError};
pub use http_server::{ApiServer, AppState, router};
pub use metrics::MetricsRegistry;
pub use server::SitewatchServer;
pub use store::{StoreError, TargetStore, load_into};
pub use types::{ServerConfig, StoreOp};
pub use writer::{StoreHandle, StoreWriter};
