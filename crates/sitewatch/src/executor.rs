//! Single-target check execution.

use crate::client::ClientFactory;
use crate::detector;
use crate::registry::Registry;
use crate::types::{Target, TargetId};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable-state callback, invoked with every created or checked target.
///
/// Runs while the registry lock is held, so it must only hand the target
/// off (e.g. enqueue it) and never block. Failures are the callback's to
/// log; the engine ignores them.
pub type PersistHook = Arc<dyn Fn(&Target) + Send + Sync>;

/// Callback receiving every completed check, sweep or on-demand.
///
/// Runs after the registry lock is released.
pub type CheckListener = Arc<dyn Fn(&Target, CheckOutcome) + Send + Sync>;

/// How a single check attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// First successful fetch, fingerprint recorded
    Baseline,
    /// Body matches the previous fingerprint
    Unchanged,
    /// Body differs from the previous fingerprint
    Changed,
    /// TLS material could not be loaded
    ConfigError,
    /// No response was obtained
    TransportError,
    /// Response status was not 200
    BadStatus(u16),
    /// Response body could not be read
    BodyError,
}

impl CheckOutcome {
    /// Stable label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckOutcome::Baseline => "baseline",
            CheckOutcome::Unchanged => "unchanged",
            CheckOutcome::Changed => "changed",
            CheckOutcome::ConfigError => "config_error",
            CheckOutcome::TransportError => "transport_error",
            CheckOutcome::BadStatus(_) => "bad_status",
            CheckOutcome::BodyError => "body_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CheckOutcome::Baseline | CheckOutcome::Unchanged | CheckOutcome::Changed
        )
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::BadStatus(code) => write!(f, "bad_status({})", code),
            other => f.write_str(other.as_str()),
        }
    }
}

/// What the fetch produced, before it is folded into the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Attempt {
    Failed {
        outcome: CheckOutcome,
        status_code: u16,
        error: String,
    },
    Fetched {
        fingerprint: String,
    },
}

impl Attempt {
    fn failed(outcome: CheckOutcome, status_code: u16, error: impl Into<String>) -> Self {
        Attempt::Failed {
            outcome,
            status_code,
            error: error.into(),
        }
    }
}

/// Fold an attempt into a target's state.
///
/// `last_checked_at` is rewritten with the attempt's start time; the
/// executor already set it before fetching.
///
/// `is_first_check` clears on any completed attempt. The change decision
/// uses the last successful fingerprint, so the first *successful* fetch is
/// always a baseline even if earlier attempts failed.
pub(crate) fn apply_attempt(
    target: &mut Target,
    started_at: DateTime<Utc>,
    attempt: Attempt,
) -> CheckOutcome {
    target.last_checked_at = Some(started_at);

    let outcome = match attempt {
        Attempt::Failed {
            outcome,
            status_code,
            error,
        } => {
            target.last_status_code = status_code;
            target.last_error = error;
            target.has_changed = false;
            outcome
        }
        Attempt::Fetched { fingerprint } => {
            let baseline = target.is_first_check || target.content_fingerprint.is_empty();
            let changed = detector::has_changed(&target.content_fingerprint, &fingerprint, baseline);

            target.last_status_code = StatusCode::OK.as_u16();
            target.last_error.clear();
            target.content_fingerprint = fingerprint;
            target.has_changed = changed;

            if baseline {
                CheckOutcome::Baseline
            } else if changed {
                CheckOutcome::Changed
            } else {
                CheckOutcome::Unchanged
            }
        }
    };

    target.is_first_check = false;
    outcome
}

/// Runs one check for one target: fetch, classify, update, persist.
pub struct CheckExecutor {
    registry: Arc<Registry>,
    clients: ClientFactory,
    persist: Option<PersistHook>,
    listener: Option<CheckListener>,
}

impl CheckExecutor {
    pub fn new(registry: Arc<Registry>, clients: ClientFactory, persist: Option<PersistHook>) -> Self {
        Self {
            registry,
            clients,
            persist,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: CheckListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Check the target with the given id.
    ///
    /// Returns `None` if the target is unknown or was deleted while the
    /// fetch was in flight.
    pub async fn check(&self, id: TargetId) -> Option<(Target, CheckOutcome)> {
        let target = self.registry.get(id).await?;
        self.check_target(target).await
    }

    /// Check using an already-taken snapshot of the target.
    pub async fn check_target(&self, target: Target) -> Option<(Target, CheckOutcome)> {
        let started_at = Utc::now();
        debug!(id = target.id, name = %target.name, url = %target.url, "Checking target");

        // Visible to readers while the fetch runs; persisted with the result
        self.registry
            .update(target.id, |t| t.last_checked_at = Some(started_at))
            .await?;

        let attempt = self.fetch(&target).await;
        self.record(target.id, started_at, attempt).await
    }

    async fn fetch(&self, target: &Target) -> Attempt {
        let client = match self.clients.client_for(target.pki()) {
            Ok(client) => client,
            Err(e) => {
                warn!(id = target.id, url = %target.url, error = %e, "PKI configuration error");
                return Attempt::failed(
                    CheckOutcome::ConfigError,
                    0,
                    format!("PKI configuration error: {}", e),
                );
            }
        };

        let response = match client.get(&target.url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(id = target.id, url = %target.url, error = %e, "Request failed");
                return Attempt::failed(CheckOutcome::TransportError, 0, error_chain(&e));
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            warn!(id = target.id, url = %target.url, status = status.as_u16(), "Unexpected status");
            return Attempt::failed(
                CheckOutcome::BadStatus(status.as_u16()),
                status.as_u16(),
                format!("Received status: {}", status),
            );
        }

        match response.bytes().await {
            Ok(body) => Attempt::Fetched {
                fingerprint: detector::fingerprint(&body),
            },
            Err(e) => {
                warn!(id = target.id, url = %target.url, error = %e, "Failed to read body");
                Attempt::failed(
                    CheckOutcome::BodyError,
                    status.as_u16(),
                    format!("Failed to read response: {}", error_chain(&e)),
                )
            }
        }
    }

    async fn record(
        &self,
        id: TargetId,
        started_at: DateTime<Utc>,
        attempt: Attempt,
    ) -> Option<(Target, CheckOutcome)> {
        let mut outcome = None;
        let updated = self
            .registry
            .update(id, |target| {
                outcome = Some(apply_attempt(target, started_at, attempt));
                if let Some(persist) = &self.persist {
                    persist(target);
                }
            })
            .await;

        match (updated, outcome) {
            (Some(target), Some(outcome)) => {
                if outcome.is_success() {
                    info!(id, url = %target.url, outcome = %outcome, changed = target.has_changed, "Check completed");
                }
                if let Some(listener) = &self.listener {
                    listener(&target, outcome);
                }
                Some((target, outcome))
            }
            _ => {
                debug!(id, "Target removed during check, result discarded");
                None
            }
        }
    }
}

/// Render an error with its sources, e.g. "error sending request: connection refused".
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
