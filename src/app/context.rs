use std::path::PathBuf;

use crate::app::error::Result;
use crate::config::Config;
use crate::engine::Engine;

/// Resolved configuration for one invocation.
pub struct AppContext {
    pub config: Config,
}

impl AppContext {
    /// Load the config file (default path unless `config_path` is given)
    /// and apply command-line overrides.
    pub fn new(
        config_path: Option<PathBuf>,
        db_path: Option<PathBuf>,
        workers: Option<usize>,
    ) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Config::load_from(&path)?,
            None => Config::load()?,
        };

        if db_path.is_some() {
            config.storage.db_path = db_path;
        }
        if let Some(workers) = workers {
            config.fetch.workers = workers;
        }

        Ok(Self { config })
    }

    /// Open the durable store, load the working store and start the workers.
    pub async fn start_engine(&self) -> Result<Engine> {
        Engine::start(&self.config).await
    }
}
