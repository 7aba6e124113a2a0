//! Miner Core - Shared data models for repository history mining
//!
//! This crate defines the types passed between the backend adapter, the
//! pipelines and the persistence layer: commits, per-file edits, aggregated
//! change statistics, blame lines and per-developer rollups.

mod error;
mod models;

pub use error::MinerError;
pub use models::{
    BlameLine, ChangeKind, ChangeStats, CommitInfo, CommitRecord, DeveloperInfo, Edit, EditKind,
    FileChange, FileOwnership, Project,
};
