//! Crate-wide error types.

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error unifying the domain error enums.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Odata(#[from] OdataError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the OData backend collaborator.
#[derive(Debug, thiserror::Error)]
pub enum OdataError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("backend response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("metadata parse failed: {0}")]
    SchemaParse(String),
}

/// Errors from the vector store.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("LanceDB error: {0}")]
    LanceDb(String),
}

/// Errors from the LLM and embedding collaborators.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("completion failed: {0}")]
    CompletionFailed(String),
}
