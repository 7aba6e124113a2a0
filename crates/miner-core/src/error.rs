//! Error taxonomy shared by the pipelines

/// Failures surfaced by the mining pipelines.
///
/// Setup failures (`BackendUnavailable`, `WorkerPool`, `PersistenceFailure`
/// while opening the store) abort a run. Everything else is scoped to one
/// unit of work (one commit, one file) and is reported without stopping its
/// siblings.
/// Write contention is retried inside the store and only shows up here as a
/// `PersistenceFailure` once the retry budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    #[error("Repository backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Malformed history at {commit}: {reason}")]
    MalformedHistory { commit: String, reason: String },

    #[error("Worker pool unavailable: {0}")]
    WorkerPool(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl MinerError {
    /// Wraps any displayable backend error
    pub fn backend(err: impl std::fmt::Display) -> Self {
        MinerError::BackendUnavailable(err.to_string())
    }
}
