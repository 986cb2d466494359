use thiserror::Error;

/// Errors surfaced by the vsum library.
///
/// Poll transport hiccups and malformed chapter sidecars never appear here:
/// both are recovered where they happen and only logged.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Model '{name}' was not registered after {attempts} attempts")]
    PullTimeout { name: String, attempts: u32 },

    #[error("Model pull failed: {0}")]
    PullFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn job_not_found(task_id: &str) -> Self {
        Error::NotFound {
            kind: "Job",
            id: task_id.to_string(),
        }
    }

    pub fn version_not_found(subject: &str, version: Option<i64>) -> Self {
        let id = match version {
            Some(v) => format!("{subject} v{v}"),
            None => subject.to_string(),
        };
        Error::NotFound {
            kind: "Summary version",
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
