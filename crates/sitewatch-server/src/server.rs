//! Main sitewatch server implementation.

use crate::http_server::{ApiServer, AppState};
use crate::metrics::MetricsRegistry;
use crate::store::{TargetStore, load_into};
use crate::types::ServerConfig;
use crate::writer::StoreWriter;
use sitewatch::{CheckOutcome, Monitor, SweepReport, Target};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Sitewatch server
pub struct SitewatchServer {
    config: ServerConfig,
}

impl SitewatchServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> common::Result<()> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl-C"),
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
            let _ = shutdown_tx.send(());
        });

        self.run_until(async {
            let _ = shutdown_rx.await;
        })
        .await
    }

    /// Run until `shutdown` resolves
    pub async fn run_until(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> common::Result<()> {
        info!("Starting sitewatch server");

        let store = TargetStore::open(&self.config.store_path)?;
        info!(path = %self.config.store_path.display(), "Opened target store");

        // Create metrics registry (optional)
        let metrics = if self.config.metrics_enabled {
            info!("Metrics enabled at /metrics");
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            info!("Metrics disabled");
            None
        };

        let (writer, store_handle) =
            StoreWriter::new(store.clone(), self.config.store_queue_size, metrics.clone());

        let mut builder = Monitor::builder(self.config.monitor.clone()).persist_with(store_handle.hook());
        if let Some(ref m) = metrics {
            let sweeps = m.clone();
            let checks = m.clone();
            builder = builder
                .on_sweep(Arc::new(move |report: &SweepReport| {
                    sweeps.record_sweep(report);
                    sweeps.update_target_count(report.dispatched);
                }))
                .on_check(Arc::new(move |_: &Target, outcome: CheckOutcome| {
                    checks.record_check(outcome)
                }));
        }
        let monitor = Arc::new(builder.build().map_err(common::Error::config)?);

        let restored = load_into(&store, &monitor).await?;
        if let Some(ref m) = metrics {
            m.update_target_count(restored);
        }

        let writer_handle = tokio::spawn(writer.run());
        let scheduler_handle = monitor.scheduler().start();

        let api = ApiServer::new(
            AppState {
                monitor: monitor.clone(),
                store: store_handle.clone(),
                metrics,
                certs_dir: self.config.certs_dir.clone(),
                max_upload_bytes: self.config.max_upload_bytes,
            },
            self.config.listen_addr.clone(),
        );

        info!("All tasks spawned, server running");
        let served = api.run(shutdown).await;

        monitor.scheduler().stop();
        if let Err(e) = scheduler_handle.await {
            warn!(error = %e, "Scheduler task failed");
        }

        if !store_handle.flush().await {
            warn!("Store writer exited before final flush");
        }

        // The writer exits once the last handle is gone
        drop(store_handle);
        drop(monitor);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_handle)
            .await
            .is_err()
        {
            warn!("Store writer still busy at shutdown");
        }

        info!("Sitewatch server stopped");
        served.map_err(common::Error::from)
    }
}
