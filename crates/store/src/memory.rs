//! An in-memory [`Store`] implementation used by the worker and submission
//! shim test suites. Not wired into either production binary.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use fleetq_core::{Host, Job, JobPatch, JobStatus};
use uuid::Uuid;

use crate::{Store, StoreError};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    hosts: HashMap<Uuid, Host>,
}

/// A `Mutex`-guarded `HashMap` pair standing in for the Postgres schema.
/// Good enough for unit and integration tests; never used outside `dev`
/// contexts.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Job, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner.jobs.get(&id).cloned().ok_or(StoreError::JobNotFound(id))
    }

    async fn update_job(&self, id: Uuid, patch: JobPatch) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        apply_patch(job, patch);
        Ok(())
    }

    async fn get_host(&self, id: Uuid) -> Result<Host, StoreError> {
        let inner = self.inner.lock().unwrap();
        inner
            .hosts
            .get(&id)
            .cloned()
            .ok_or(StoreError::HostNotFound(id))
    }

    async fn count_jobs_by_status(&self, status: JobStatus, server_id: Uuid) -> Result<i64, StoreError> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .jobs
            .values()
            .filter(|j| j.server_id == server_id && j.status == status)
            .count();
        Ok(count as i64)
    }

    async fn put_host(&self, host: &Host) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.hosts.insert(host.id, host.clone());
        Ok(())
    }
}

fn apply_patch(job: &mut Job, patch: JobPatch) {
    if let Some(status) = patch.status {
        job.status = status;
    }
    if let Some(exit_code) = patch.exit_code {
        job.exit_code = exit_code;
    }
    if let Some(stdout) = patch.stdout {
        job.stdout = stdout;
    }
    if let Some(stderr) = patch.stderr {
        job.stderr = stderr;
    }
    if let Some(error) = patch.error {
        job.error = error;
    }
    if let Some(started_at) = patch.started_at {
        job.started_at = Some(started_at);
    }
    if let Some(finished_at) = patch.finished_at {
        job.finished_at = Some(finished_at);
    }
}
