use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;

use thermometer_common::{History, RuntimeConfig};

/// JSON files under the data directory.
#[derive(Clone)]
pub struct AppStore {
    runtime_path: Arc<PathBuf>,
    history_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("THERMOMETER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.thermometer"));
        Self::new(data_dir)
    }

    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            history_path: Arc::new(data_dir.join("history.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(RuntimeConfig::from_json(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Missing file is not an error: a fresh trace is returned.
    pub async fn load_history(&self, capacity: usize) -> anyhow::Result<History> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.history_path.as_ref()).await {
            Ok(raw) => {
                let loaded = serde_json::from_slice::<History>(&raw)?;
                Ok(History::restore(loaded, capacity))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(History::new(capacity)),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save_history(&self, history: &History) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.history_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec(history)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use thermometer_common::Channel;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("thermometer-store-{name}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn missing_files_fall_back_to_defaults() {
        let store = AppStore::new(scratch_dir("missing"));

        let runtime = store.load_runtime_config().await.unwrap();
        let history = store.load_history(8).await.unwrap();

        assert_eq!(runtime, RuntimeConfig::default());
        assert_eq!(history, History::new(8));
    }

    #[tokio::test]
    async fn history_survives_a_restart_with_padding() {
        let dir = scratch_dir("history");
        let store = AppStore::new(dir.clone());
        let mut history = History::new(3);
        history.push(Some(22.5), None);
        store.save_history(&history).await.unwrap();

        let reloaded = store.load_history(5).await.unwrap();

        assert_eq!(
            reloaded.trace(Channel::One).iter().copied().collect::<Vec<_>>(),
            vec![None, None, None, None, Some(22.5)]
        );
        let _ = std::fs::remove_dir_all(dir);
    }
}
