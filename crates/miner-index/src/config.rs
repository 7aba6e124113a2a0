//! Run configuration

use miner_db::{RetryPolicy, StoreOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings shared by the ingestion and attribution pipelines.
///
/// Every field is optional in the TOML file:
///
/// ```toml
/// workers = 8
/// window_months = 1
/// skip_file_names = [".DS_Store"]
///
/// [retry]
/// max_attempts = 10
/// backoff_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Worker threads per pipeline run, 0 = one per core
    pub workers: usize,

    pub retry: RetryPolicy,

    pub busy_timeout_ms: u64,

    /// Stability look-ahead window in calendar months
    pub window_months: u32,

    /// Line sets above this size are stored compressed
    pub compress_threshold: usize,

    /// File names never blamed, matched on the last path component
    pub skip_file_names: Vec<String>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        let store = StoreOptions::default();
        Self {
            workers: 0,
            retry: store.retry,
            busy_timeout_ms: store.busy_timeout_ms,
            window_months: 1,
            compress_threshold: store.compress_threshold,
            skip_file_names: vec![".DS_Store".to_string()],
        }
    }
}

impl MinerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            retry: self.retry,
            busy_timeout_ms: self.busy_timeout_ms,
            compress_threshold: self.compress_threshold,
        }
    }

    /// Effective pool size
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            rayon::current_num_threads()
        } else {
            self.workers
        }
    }

    pub fn is_skipped(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        self.skip_file_names.iter().any(|skip| skip == name)
    }

    pub(crate) fn thread_pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count())
            .build()
    }
}
