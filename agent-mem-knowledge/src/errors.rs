use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("unsupported embedding provider: {0}")]
    UnsupportedProvider(String),
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimMismatch { expected: usize, actual: usize },
    #[error("schema dimension mismatch: configured {configured}, stored VECTOR({stored})")]
    SchemaMismatch { configured: usize, stored: i32 },
    #[error("path outside project root: {0}")]
    PathOutsideRoot(PathBuf),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown knowledge block: {0}")]
    UnknownBlock(String),
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;
