use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Unreadable path while globbing: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Invalid time window selector '{0}' (expected YYYY, YYYYMM or *)")]
    InvalidSelector(String),

    #[error("Reference table {table} is missing column '{column}'")]
    MissingColumn { table: String, column: String },

    /// The grouping logic produced the same natural key twice.
    #[error("Duplicate aggregate key after grouping: {0}")]
    DuplicateKey(String),

    #[error("Aggregate rows out of key order at {0}")]
    OutOfOrder(String),

    #[error("Counter overflow in {0}")]
    CounterOverflow(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
