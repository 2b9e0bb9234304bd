use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::{Context, Result};
use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    config::{loader::load_config, models::WardConfig},
    ports::config_provider::ConfigProvider,
};

/// Loads the Ward configuration from a local file and signals when it changes.
pub struct FileConfigProvider {
    path: PathBuf,
    _watcher: notify::RecommendedWatcher,
    update_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (tx, rx) = mpsc::channel(1);

        let config_filename = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("Invalid config path: {}", path.display()))?
            .to_owned();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        if (event.kind.is_modify()
                            || event.kind.is_create()
                            || event.kind.is_remove())
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name() == Some(&config_filename))
                        {
                            tracing::debug!(kind = ?event.kind, "Config file changed");
                            // A pending signal already covers this change
                            let _ = tx.try_send(());
                        }
                    }
                    Err(e) => tracing::error!("File watch error: {:?}", e),
                }
            })?;

        // Editors often replace the file, so watch the directory
        let watch_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher
            .watch(watch_dir, RecursiveMode::NonRecursive)
            .wrap_err_with(|| format!("Failed to watch {}", watch_dir.display()))?;

        Ok(Self {
            path,
            _watcher: watcher,
            update_rx: Mutex::new(Some(rx)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn load_config(&self) -> Result<WardConfig> {
        let path_str = self
            .path
            .to_str()
            .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", self.path.display()))?;
        load_config(path_str).await
    }

    fn watch(&self) -> Option<mpsc::Receiver<()>> {
        self.update_rx.lock().take()
    }
}
