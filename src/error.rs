/// Failures of the durable store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },
    #[error("store worker is not running")]
    Unavailable,
}

/// Failures surfaced to whoever called the ingest pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid reading: {0}")]
    Invalid(String),
    #[error("failed to persist sample: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no data yet")]
    NoData,
    #[error(transparent)]
    Store(#[from] StoreError),
}
