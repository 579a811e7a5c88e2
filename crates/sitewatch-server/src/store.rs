//! Durable key-value store mirroring the in-memory registry.

use sitewatch::{Monitor, Target, TargetId};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Tree holding one JSON record per target, keyed by decimal id
const TARGETS_TREE: &str = "websites";

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not open store: {0}")]
    Open(#[source] sled::Error),

    #[error("store operation failed: {0}")]
    Sled(#[from] sled::Error),

    #[error("could not encode target: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<StoreError> for common::Error {
    fn from(err: StoreError) -> Self {
        common::Error::store(err)
    }
}

/// sled-backed target store
#[derive(Clone)]
pub struct TargetStore {
    db: sled::Db,
    targets: sled::Tree,
}

impl TargetStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref()).map_err(StoreError::Open)?;
        let targets = db.open_tree(TARGETS_TREE).map_err(StoreError::Open)?;
        Ok(Self { db, targets })
    }

    /// Upsert a target's latest state
    pub fn save(&self, target: &Target) -> Result<(), StoreError> {
        let value = serde_json::to_vec(target)?;
        self.targets.insert(key(target.id), value)?;
        Ok(())
    }

    /// Remove a target's record. Removing an absent record is not an error.
    pub fn delete(&self, id: TargetId) -> Result<(), StoreError> {
        self.targets.remove(key(id))?;
        Ok(())
    }

    /// Every decodable target record, ordered by id
    pub fn load_all(&self) -> Result<Vec<Target>, StoreError> {
        let mut targets = Vec::new();
        for entry in self.targets.iter() {
            let (k, v) = entry?;
            match serde_json::from_slice::<Target>(&v) {
                Ok(target) => targets.push(target),
                Err(e) => warn!(
                    key = %String::from_utf8_lossy(&k),
                    error = %e,
                    "Skipping unreadable target record"
                ),
            }
        }
        targets.sort_by_key(|t| t.id);
        Ok(targets)
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

fn key(id: TargetId) -> String {
    id.to_string()
}

/// Replay stored targets into the monitor before checks start.
///
/// Ids are preserved and the counter is moved past the highest one, so new
/// targets never collide with restored ones.
pub async fn load_into(store: &TargetStore, monitor: &Monitor) -> Result<usize, StoreError> {
    let targets = store.load_all()?;
    let count = targets.len();
    let highest = targets.iter().map(|t| t.id).max();

    for target in targets {
        monitor.restore(target).await;
    }
    if let Some(highest) = highest {
        monitor.advance_counter_past(highest).await;
    }

    info!(count, "Loaded targets from store");
    Ok(count)
}
