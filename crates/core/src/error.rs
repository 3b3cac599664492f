use crate::host::HostValidationError;

/// Domain-level validation failures shared by every component that
/// accepts a [`crate::Job`] or [`crate::Host`] from the outside (§7,
/// category 1: Validation — never retried, always surfaced).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("priority {0} is out of range [1,10]")]
    PriorityOutOfRange(i32),

    #[error("host {0} does not exist")]
    UnknownHost(uuid::Uuid),

    #[error("host {0} is not active")]
    InactiveHost(uuid::Uuid),

    #[error("host record invalid: {0}")]
    InvalidHost(#[from] HostValidationError),
}
