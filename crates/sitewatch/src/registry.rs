//! In-memory registry of monitored targets.

use crate::types::{NewTarget, Target, TargetId, TlsConfig};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Reasons a target cannot be registered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("URL is required")]
    EmptyUrl,

    #[error("Client key path is required when client certificate is provided")]
    MissingClientKey,

    #[error("Client certificate path is required when client key is provided")]
    MissingClientCert,
}

/// Reject PKI settings that name only half of a client identity.
pub fn validate_tls(tls: &TlsConfig) -> Result<(), RegistryError> {
    if !tls.use_pki {
        return Ok(());
    }
    match (tls.client_cert_path.is_empty(), tls.client_key_path.is_empty()) {
        (false, true) => Err(RegistryError::MissingClientKey),
        (true, false) => Err(RegistryError::MissingClientCert),
        _ => Ok(()),
    }
}

struct Inner {
    targets: BTreeMap<TargetId, Target>,
    next_id: TargetId,
}

/// Thread-safe set of targets plus the id counter.
///
/// One coarse lock guards both the collection and every target's fields.
/// Readers always receive owned copies.
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry whose first id is 1
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                targets: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Validate and store a new target under the next id.
    pub async fn create(&self, new: NewTarget) -> Result<Target, RegistryError> {
        self.create_with(new, |_| {}).await
    }

    /// Like [`Registry::create`], running `on_created` before the write lock
    /// is released so it is ordered with every later mutation.
    pub async fn create_with<F>(&self, new: NewTarget, on_created: F) -> Result<Target, RegistryError>
    where
        F: FnOnce(&Target),
    {
        let url = new.url.trim().to_string();
        if url.is_empty() {
            return Err(RegistryError::EmptyUrl);
        }
        if let Some(tls) = &new.tls_config {
            validate_tls(tls)?;
        }

        let name = match new.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => url.clone(),
        };

        let mut inner = self.inner.write().await;
        let id = inner.next_id;
        inner.next_id += 1;

        let target = Target::new(id, url, name, new.tls_config);
        inner.targets.insert(id, target.clone());
        on_created(&target);
        drop(inner);

        info!(id, url = %target.url, "Registered target");
        Ok(target)
    }

    /// Remove a target. Returns false when the id is unknown.
    pub async fn delete(&self, id: TargetId) -> bool {
        let removed = self.inner.write().await.targets.remove(&id).is_some();
        if removed {
            info!(id, "Removed target");
        }
        removed
    }

    /// Copy of every target, ordered by id
    pub async fn list(&self) -> Vec<Target> {
        self.inner.read().await.targets.values().cloned().collect()
    }

    /// Copy of a single target
    pub async fn get(&self, id: TargetId) -> Option<Target> {
        self.inner.read().await.targets.get(&id).cloned()
    }

    /// Number of registered targets
    pub async fn len(&self) -> usize {
        self.inner.read().await.targets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[cfg(test)]
    pub(crate) fn is_write_locked(&self) -> bool {
        self.inner.try_read().is_err()
    }

    /// Insert a target loaded from durable storage, keeping its id.
    ///
    /// Does not touch the id counter; call [`Registry::advance_counter_past`]
    /// once every stored target has been restored.
    pub async fn restore(&self, target: Target) {
        let id = target.id;
        if self.inner.write().await.targets.insert(id, target).is_some() {
            warn!(id, "Restored target replaced an existing entry");
        } else {
            debug!(id, "Restored target");
        }
    }

    /// Make sure the next created target gets an id greater than `id`.
    pub async fn advance_counter_past(&self, id: TargetId) {
        let mut inner = self.inner.write().await;
        if inner.next_id <= id {
            inner.next_id = id + 1;
        }
    }

    /// Mutate one target under the write lock and return the updated copy.
    ///
    /// Returns `None` without calling `f` when the target no longer exists.
    pub async fn update<F>(&self, id: TargetId, f: F) -> Option<Target>
    where
        F: FnOnce(&mut Target),
    {
        let mut inner = self.inner.write().await;
        let target = inner.targets.get_mut(&id)?;
        f(target);
        Some(target.clone())
    }
}
