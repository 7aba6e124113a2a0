//! Miner Index - history mining pipelines
//!
//! This crate is responsible for:
//! - Reading repository history through the [`VcsBackend`] adapter
//! - Scoring how stable each commit's changes stay ([`stability`])
//! - Ingesting commits with their change statistics ([`Ingestor`])
//! - Attributing current content to developers via blame ([`Attributor`])

pub mod attribution;
pub mod backend;
mod cancel;
mod config;
pub mod formatting;
pub mod ingest;
mod interner;
mod project;
pub mod stability;
mod stats;

pub use attribution::{Attribution, Attributor};
pub use backend::{CommitDiff, CommitScope, GitBackend, RefTarget, TreeEntry, VcsBackend};
pub use cancel::CancelToken;
pub use config::{ConfigError, MinerConfig};
pub use ingest::Ingestor;
pub use interner::Interner;
pub use project::register_project;
pub use stats::{AttributionStats, IngestStats};

pub type Result<T, E = miner_core::MinerError> = std::result::Result<T, E>;
