#![forbid(unsafe_code)]

//! The submission/query contract (§4.3): the library surface a REST layer
//! is bolted onto externally. Mediates between submitters and the queue
//! service/store — enqueue, cancel, duplicate/rerun, and read-through
//! queries, nothing more.

mod error;
mod spec;

pub use error::SubmissionError;
pub use spec::{JobOverrides, JobSpec};

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use fleetq_core::{CoreError, Job, JobDescriptor, JobPatch, JobStatus, DEFAULT_PRIORITY, PRIORITY_RANGE};
use fleetq_queue::{CancelPublisher, PushHandle};
use fleetq_store::Store;
use tracing::warn;
use uuid::Uuid;

/// The operations the core depends upon (§4.3), backed by a store and a
/// queue service address. Each call opens its own short-lived connection
/// to the queue; this crate holds no persistent queue connection of its
/// own, unlike the worker's long-lived consumer.
pub struct SubmissionService {
    store: Arc<dyn Store>,
    queue_addr: SocketAddr,
}

impl SubmissionService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, queue_addr: SocketAddr) -> Self {
        Self { store, queue_addr }
    }

    /// Validates `spec`, fills in defaults, writes a `queued` row, and
    /// enqueues the descriptor. On `Push` failure the row is transitioned
    /// to `failed` with a diagnostic rather than left dangling in `queued`.
    pub async fn submit_job(&self, spec: JobSpec) -> Result<Uuid, SubmissionError> {
        if spec.command.trim().is_empty() {
            return Err(CoreError::EmptyCommand.into());
        }

        let priority = spec.priority.unwrap_or(DEFAULT_PRIORITY);
        if !PRIORITY_RANGE.contains(&priority) {
            return Err(CoreError::PriorityOutOfRange(priority).into());
        }

        let host = self
            .store
            .get_host(spec.server_id)
            .await
            .map_err(|_| CoreError::UnknownHost(spec.server_id))?;
        if !host.is_dispatchable() {
            return Err(CoreError::InactiveHost(spec.server_id).into());
        }

        let mut job = Job::new(
            spec.command,
            spec.server_id,
            spec.timeout_seconds.unwrap_or(0),
            priority,
        );
        job.args = spec.args;
        job.original_script = spec.original_script;
        job.shell = spec.shell;

        self.store.insert_job(&job).await?;

        match self.push_descriptor(job.id, priority).await {
            Ok(()) => Ok(job.id),
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "queue push failed, marking job failed");
                let patch = JobPatch::to_terminal_with_error(
                    JobStatus::Failed,
                    format!("queue unavailable: {err}"),
                    Utc::now(),
                );
                if let Err(store_err) = self.store.update_job(job.id, patch).await {
                    warn!(job_id = %job.id, error = %store_err, "failed to record queue-push failure");
                }
                Err(SubmissionError::QueueUnavailable(err.to_string()))
            }
        }
    }

    async fn push_descriptor(&self, job_id: Uuid, priority: i32) -> Result<(), fleetq_queue::QueueError> {
        let mut handle = PushHandle::connect(self.queue_addr).await?;
        handle.push(JobDescriptor::new(job_id, priority)).await
    }

    /// Idempotent: invoking this any number of times on a given job yields
    /// the same final state (§8). A job already terminal is a conflict, not
    /// an error to retry.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<(), SubmissionError> {
        let job = self.fetch_job(job_id).await?;

        if job.status.is_terminal() {
            return Err(SubmissionError::Conflict(format!(
                "job {job_id} is already {status}",
                status = job.status
            )));
        }

        match job.status {
            JobStatus::Queued => {
                let patch = JobPatch::to_terminal_with_error(
                    JobStatus::Canceled,
                    "canceled before dispatch".to_string(),
                    Utc::now(),
                );
                self.store.update_job(job_id, patch).await?;
                Ok(())
            }
            JobStatus::Running => {
                let mut publisher = CancelPublisher::connect(self.queue_addr)
                    .await
                    .map_err(|err| SubmissionError::QueueUnavailable(err.to_string()))?;
                publisher
                    .publish(job_id)
                    .await
                    .map_err(|err| SubmissionError::QueueUnavailable(err.to_string()))?;
                Ok(())
            }
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled => unreachable!("checked above"),
        }
    }

    /// Creates a new job inheriting `command`, `args`, `original_script`,
    /// and `shell` from `job_id`, with `overrides` applied on top.
    pub async fn duplicate_job(&self, job_id: Uuid, overrides: JobOverrides) -> Result<Uuid, SubmissionError> {
        let source = self.fetch_job(job_id).await?;

        let spec = JobSpec {
            command: source.command,
            args: source.args,
            original_script: source.original_script,
            shell: source.shell,
            server_id: overrides.server_id.unwrap_or(source.server_id),
            timeout_seconds: overrides.timeout_seconds.or(Some(source.timeout_seconds)),
            priority: Some(source.priority),
        };

        self.submit_job(spec).await
    }

    /// Resubmits `job_id` unchanged, as if it had just been submitted again.
    pub async fn rerun_job(&self, job_id: Uuid) -> Result<Uuid, SubmissionError> {
        self.duplicate_job(job_id, JobOverrides::default()).await
    }

    /// Read-through to the store; no caching.
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job, SubmissionError> {
        self.fetch_job(job_id).await
    }

    /// Read-through to the store; returns the job's accumulated `stdout`
    /// and `stderr` as captured so far.
    pub async fn get_job_logs(&self, job_id: Uuid) -> Result<(String, String), SubmissionError> {
        let job = self.fetch_job(job_id).await?;
        Ok((job.stdout, job.stderr))
    }

    /// Looks up a job, mapping a missing row to [`SubmissionError::NotFound`]
    /// rather than the transparent store-error wrap.
    async fn fetch_job(&self, job_id: Uuid) -> Result<Job, SubmissionError> {
        match self.store.get_job(job_id).await {
            Err(fleetq_store::StoreError::JobNotFound(id)) => Err(SubmissionError::NotFound(id)),
            other => Ok(other?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetq_core::AuthType;
    use fleetq_core::Host;
    use fleetq_queue::{serve, QueueService};
    use fleetq_store::memory::InMemoryStore;
    use std::time::Duration;

    async fn spawn_queue() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let service = Arc::new(QueueService::new(64));
        tokio::spawn(async move {
            let _ = serve(addr, service).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        addr
    }

    async fn seeded_service() -> (SubmissionService, Uuid) {
        let queue_addr = spawn_queue().await;
        let store = Arc::new(InMemoryStore::new());
        let host = Host {
            id: Uuid::new_v4(),
            name: "web-1".into(),
            hostname: "10.0.0.1".into(),
            port: 22,
            user: "deploy".into(),
            auth_type: AuthType::Password,
            password: Some("secret".into()),
            private_key: None,
            pem_file_url: None,
            is_active: true,
        };
        store.put_host(&host).await.unwrap();
        (SubmissionService::new(store, queue_addr), host.id)
    }

    fn spec_for(server_id: Uuid) -> JobSpec {
        JobSpec {
            command: "echo".into(),
            args: Some("hi".into()),
            original_script: None,
            shell: None,
            server_id,
            timeout_seconds: None,
            priority: None,
        }
    }

    #[tokio::test]
    async fn submit_fills_in_documented_defaults() {
        let (service, host_id) = seeded_service().await;
        let job_id = service.submit_job(spec_for(host_id)).await.unwrap();
        let job = service.get_job(job_id).await.unwrap();
        assert_eq!(job.timeout_seconds, 300);
        assert_eq!(job.priority, 5);
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn submit_rejects_priority_out_of_range() {
        let (service, host_id) = seeded_service().await;
        let mut spec = spec_for(host_id);
        spec.priority = Some(11);
        let err = service.submit_job(spec).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_rejects_an_unknown_host() {
        let (service, _) = seeded_service().await;
        let err = service.submit_job(spec_for(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Validation(_)));
    }

    #[tokio::test]
    async fn cancel_on_a_queued_job_transitions_directly_to_canceled() {
        let (service, host_id) = seeded_service().await;
        let job_id = service.submit_job(spec_for(host_id)).await.unwrap();
        service.cancel_job(job_id).await.unwrap();
        let job = service.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_a_second_call_conflicts() {
        let (service, host_id) = seeded_service().await;
        let job_id = service.submit_job(spec_for(host_id)).await.unwrap();
        service.cancel_job(job_id).await.unwrap();
        let err = service.cancel_job(job_id).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Conflict(_)));
    }

    #[tokio::test]
    async fn get_job_on_an_unknown_id_reports_not_found() {
        let (service, _) = seeded_service().await;
        let err = service.get_job(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_job_on_an_unknown_id_reports_not_found() {
        let (service, _) = seeded_service().await;
        let err = service.cancel_job(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::NotFound(_)));
    }

    #[tokio::test]
    async fn duplicate_job_preserves_command_and_allows_overrides() {
        let (service, host_id) = seeded_service().await;
        let original = service.submit_job(spec_for(host_id)).await.unwrap();

        let duplicate = service
            .duplicate_job(original, JobOverrides { server_id: None, timeout_seconds: Some(42) })
            .await
            .unwrap();

        let job = service.get_job(duplicate).await.unwrap();
        assert_eq!(job.command, "echo");
        assert_eq!(job.args.as_deref(), Some("hi"));
        assert_eq!(job.timeout_seconds, 42);
    }

    #[tokio::test]
    async fn rerun_job_resubmits_with_identical_fields() {
        let (service, host_id) = seeded_service().await;
        let original = service.submit_job(spec_for(host_id)).await.unwrap();
        let rerun = service.rerun_job(original).await.unwrap();
        assert_ne!(rerun, original);

        let job = service.get_job(rerun).await.unwrap();
        assert_eq!(job.command, "echo");
        assert_eq!(job.priority, 5);
    }
}
