#![forbid(unsafe_code)]

//! The persistent store (S) interface and its implementations.
//!
//! The core depends only on the [`Store`] trait (§6: "the core treats it as
//! an interface; any engine meeting the transactional contract suffices").
//! [`postgres::PgStore`] is the production implementation over `sqlx`;
//! [`memory::InMemoryStore`] backs the worker/queue test suites so they
//! don't need a live database.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use fleetq_core::{Host, Job, JobPatch, JobStatus};
use uuid::Uuid;

/// Errors a [`Store`] implementation may surface. Category 3 in the error
/// taxonomy (§7): transient infrastructure, recovered by the caller via
/// reconnect-with-backoff, not retried inside the store itself.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("host {0} not found")]
    HostNotFound(Uuid),

    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// The persistent store interface consumed by the worker and the
/// submission shim (§6).
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts a new job row. The row must not already exist.
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Reads the authoritative job row.
    async fn get_job(&self, id: Uuid) -> Result<Job, StoreError>;

    /// Applies a partial update to a job row, atomically.
    async fn update_job(&self, id: Uuid, patch: JobPatch) -> Result<(), StoreError>;

    /// Reads a host row.
    async fn get_host(&self, id: Uuid) -> Result<Host, StoreError>;

    /// Counts jobs in a given status for a given host, used for admission
    /// checks prior to host deletion (§6).
    async fn count_jobs_by_status(&self, status: JobStatus, server_id: Uuid) -> Result<i64, StoreError>;

    /// Inserts or replaces a host row. Not part of the core's read path but
    /// needed by every implementation to seed hosts for dispatch.
    async fn put_host(&self, host: &Host) -> Result<(), StoreError>;
}
