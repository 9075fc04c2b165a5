use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::ViewerConfig;
use crate::error::Result;

/// Configuration store backed by a JSON file
///
/// Uses `ArcSwap` for lock-free reads, providing cheap configuration access
/// in hot paths. Writes persist to disk and broadcast a change event.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    /// Lock-free cache using ArcSwap for zero-cost reads
    cache: Arc<ArcSwap<ViewerConfig>>,
    change_tx: broadcast::Sender<ConfigChange>,
}

/// Configuration change event
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub key: String,
}

impl ConfigStore {
    /// Open the store, reading the file if present or creating it with
    /// defaults otherwise.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let config = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = ViewerConfig::default();
                Self::persist(path, &config).await?;
                config
            }
            Err(e) => return Err(e.into()),
        };

        let (change_tx, _) = broadcast::channel(16);

        Ok(Self {
            path: path.to_path_buf(),
            cache: Arc::new(ArcSwap::from_pointee(config)),
            change_tx,
        })
    }

    /// Get the current configuration
    pub fn get(&self) -> Arc<ViewerConfig> {
        self.cache.load_full()
    }

    /// Apply a mutation, persist it, and notify subscribers
    pub async fn update<F>(&self, key: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut ViewerConfig),
    {
        let mut config = (*self.get()).clone();
        mutate(&mut config);
        Self::persist(&self.path, &config).await?;
        self.cache.store(Arc::new(config));

        // No subscribers is normal for a headless run
        let _ = self.change_tx.send(ConfigChange {
            key: key.to_string(),
        });
        Ok(())
    }

    /// Subscribe to configuration changes
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.change_tx.subscribe()
    }

    async fn persist(path: &Path, config: &ViewerConfig) -> Result<()> {
        let json = serde_json::to_vec_pretty(config)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
