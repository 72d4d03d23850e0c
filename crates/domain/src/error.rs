/// Shared error type used across all Quarry crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("blocked by policy: {0}")]
    PolicyBlock(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("investigation already running in channel {0}")]
    DuplicateChannel(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors that fail a single turn but never escape the agent loop.
    pub fn is_turn_local(&self) -> bool {
        matches!(
            self,
            Error::UnknownTool(_) | Error::ToolExecution { .. } | Error::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
