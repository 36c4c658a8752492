// src/config/store.rs

//! Shared, swappable configuration snapshot.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::loader::load;
use crate::config::model::ConfigFile;
use crate::errors::Result;

/// Holds the current configuration snapshot.
///
/// Snapshots are never mutated. A reload builds a complete new snapshot and
/// swaps it in as a whole; readers holding the old `Arc` keep a consistent
/// view.
#[derive(Debug)]
pub struct ConfigStore {
    tx: watch::Sender<Arc<ConfigFile>>,
}

impl ConfigStore {
    pub fn new(config: ConfigFile) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self { tx }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<ConfigFile> {
        self.tx.borrow().clone()
    }

    /// Receiver that observes every swap.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigFile>> {
        self.tx.subscribe()
    }

    /// Load and validate `path`; swap it in only if that succeeds.
    ///
    /// On error the previous snapshot stays current.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<Arc<ConfigFile>> {
        let path = path.as_ref();
        match load(path) {
            Ok(config) => {
                let snapshot = Arc::new(config);
                self.tx.send_replace(snapshot.clone());
                info!(path = %path.display(), jobs = snapshot.job.len(), "configuration reloaded");
                Ok(snapshot)
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "configuration reload rejected; keeping previous snapshot");
                Err(err)
            }
        }
    }
}
