use thiserror::Error;

/// Error taxonomy at the facade boundary.
///
/// The Runner never surfaces these to the Pool — it always resolves with an
/// [`crate::runner::ExecutionResult`]. The Pool only returns `Err` for
/// structural reasons (shutdown, queue overflow); job outcomes are always
/// `Ok`. The facade maps everything here to a text response with `isError`
/// set.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{0}")]
    Validation(String),

    #[error("Unsupported runtime: {0}")]
    UnsupportedLanguage(String),

    #[error("failed to spawn child process: {0}")]
    Spawn(String),

    #[error("Queue overflow")]
    QueueOverflow,

    #[error("Pool is shutting down")]
    PoolShuttingDown,

    #[error("No workers available")]
    NoWorkers,

    #[error("task not found: {0}")]
    TaskNotFound(u64),

    #[error("{0}")]
    Other(String),
}

impl ExecError {
    /// Sanitized message safe to return to an MCP client.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
