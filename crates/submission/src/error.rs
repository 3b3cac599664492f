use uuid::Uuid;

/// Errors surfaced across the submission/query contract. Category 1
/// (`Validation`) and category 4 (`Conflict`) from §7 are represented
/// directly here; queue and store failures are wrapped from their own
/// crates' error types.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] fleetq_core::CoreError),

    #[error(transparent)]
    Store(#[from] fleetq_store::StoreError),

    #[error("queue service unavailable: {0}")]
    QueueUnavailable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("job {0} not found")]
    NotFound(Uuid),
}
