/// Shared error type used across all Opal crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
