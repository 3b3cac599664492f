//! The per-job execution algorithm (§4.2.2): refresh, transition, resolve
//! host and credentials, build the invocation, run it over a remote
//! session, and finalize.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetq_core::{AuthType, Host, Job, JobDescriptor, JobPatch, JobStatus};
use fleetq_ssh::{Credentials, ExitOutcome, KeyFetcher, Session, SessionFactory};
use fleetq_store::Store;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cancel_map::CancelMap;
use crate::flush::{run_job_writer, OutputEvent, StreamKind};
use crate::unbuffer;
use crate::WorkerError;

/// Everything a slot needs to carry a descriptor from `Pop` to a finalized
/// job row. Shared (via `Arc`) across every slot in the pool.
pub struct ExecutionContext {
    pub store: Arc<dyn Store>,
    pub key_fetcher: Arc<dyn KeyFetcher>,
    pub session_factory: Arc<dyn SessionFactory>,
    pub cancel_map: CancelMap,
    pub unbuffer_pattern: Option<String>,
    pub flush_lines: usize,
    pub flush_interval: Duration,
    pub key_fetch_timeout: Duration,
}

/// Drives a single descriptor through the algorithm in §4.2.2. Errors are
/// absorbed here (logged, and reflected onto the job row where the job has
/// already left `queued`) rather than propagated, since a slot must keep
/// running after any one job fails.
pub async fn execute_job(descriptor: JobDescriptor, ctx: Arc<ExecutionContext>) {
    let job = match ctx.store.get_job(descriptor.id).await {
        Ok(job) => job,
        Err(err) => {
            // Transient resolution failure (§4.2.5): the store is
            // unreachable or the row vanished. No terminal state is
            // written; the descriptor is simply not retried, since this
            // queue has no redelivery mechanism to hand it back on.
            warn!(job_id = %descriptor.id, error = %err, "failed to refresh job before dispatch");
            return;
        }
    };

    if job.status.is_terminal() {
        info!(job_id = %job.id, status = %job.status, "dropping descriptor for an already-terminal job");
        return;
    }

    if let Err(err) = ctx.store.update_job(job.id, JobPatch::to_running(Utc::now())).await {
        warn!(job_id = %job.id, error = %err, "failed to transition job to running");
        return;
    }

    let host = match ctx.store.get_host(job.server_id).await {
        Ok(host) => host,
        Err(err) => {
            finalize_diagnostic(&ctx, job.id, JobStatus::Failed, format!("host lookup failed: {err}")).await;
            return;
        }
    };

    if !host.is_dispatchable() {
        finalize_diagnostic(&ctx, job.id, JobStatus::Failed, "host is not active".to_string()).await;
        return;
    }

    let credentials = match resolve_credentials(&host, &ctx).await {
        Ok(credentials) => credentials,
        Err(err) => {
            finalize_diagnostic(&ctx, job.id, JobStatus::Failed, format!("credential resolution failed: {err}")).await;
            return;
        }
    };

    let command_line = build_invocation(&job, ctx.unbuffer_pattern.as_deref());
    let token = ctx.cancel_map.register(job.id);
    let timeout = Duration::from_secs(job.timeout_seconds.max(1) as u64);

    let session = match ctx
        .session_factory
        .open_session(&host.hostname, host.port, &host.user, credentials)
        .await
    {
        Ok(session) => session,
        Err(err) => {
            ctx.cancel_map.unregister(job.id);
            finalize_diagnostic(&ctx, job.id, JobStatus::Failed, format!("session open failed: {err}")).await;
            return;
        }
    };

    let execution = match session.run(&command_line, timeout, token).await {
        Ok(execution) => execution,
        Err(err) => {
            ctx.cancel_map.unregister(job.id);
            finalize_diagnostic(&ctx, job.id, JobStatus::Failed, format!("session run failed: {err}")).await;
            return;
        }
    };

    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
    let writer_handle = tokio::spawn(run_job_writer(
        job.id,
        ctx.store.clone(),
        writer_rx,
        ctx.flush_lines,
        ctx.flush_interval,
    ));

    let stdout_forward = {
        let tx = writer_tx.clone();
        let mut stdout = execution.stdout;
        tokio::spawn(async move {
            while let Some(line) = stdout.next().await {
                if let Ok(text) = line {
                    let _ = tx.send(OutputEvent::Line { stream: StreamKind::Stdout, text });
                }
            }
        })
    };
    let stderr_forward = {
        let tx = writer_tx.clone();
        let mut stderr = execution.stderr;
        tokio::spawn(async move {
            while let Some(line) = stderr.next().await {
                if let Ok(text) = line {
                    let _ = tx.send(OutputEvent::Line { stream: StreamKind::Stderr, text });
                }
            }
        })
    };

    let exit_outcome = execution.exit.await;
    let _ = stdout_forward.await;
    let _ = stderr_forward.await;
    drop(writer_tx);
    let _ = writer_handle.await;

    ctx.cancel_map.unregister(job.id);

    let finished_at = Utc::now();
    let patch = match exit_outcome {
        Ok(ExitOutcome::ExitCode(code)) => JobPatch::to_terminal_with_exit_code(code, finished_at),
        Ok(ExitOutcome::Canceled(reason)) => JobPatch::to_terminal_with_error(JobStatus::Canceled, reason, finished_at),
        Err(err) => JobPatch::to_terminal_with_error(JobStatus::Failed, err.to_string(), finished_at),
    };

    if let Err(err) = ctx.store.update_job(job.id, patch).await {
        warn!(job_id = %job.id, error = %err, "failed to persist final job state");
    }
}

async fn finalize_diagnostic(ctx: &ExecutionContext, job_id: uuid::Uuid, status: JobStatus, error: String) {
    let patch = JobPatch::to_terminal_with_error(status, error, Utc::now());
    if let Err(err) = ctx.store.update_job(job_id, patch).await {
        warn!(%job_id, error = %err, "failed to persist diagnostic terminal state");
    }
}

async fn resolve_credentials(host: &Host, ctx: &ExecutionContext) -> Result<Credentials, WorkerError> {
    match host.auth_type {
        AuthType::Password => Ok(Credentials::Password(host.password.clone().unwrap_or_default())),
        AuthType::Key => {
            if let Some(locator) = &host.pem_file_url {
                let bytes = ctx.key_fetcher.fetch_key(locator, ctx.key_fetch_timeout).await?;
                Ok(Credentials::PrivateKey(bytes))
            } else if let Some(inline) = &host.private_key {
                Ok(Credentials::PrivateKey(inline.clone().into_bytes()))
            } else {
                Err(WorkerError::MissingCredentials)
            }
        }
    }
}

/// Composes the effective remote command line (§4.2.2 step 5): a simple
/// command/args pair, or a script piped to its interpreter, then the
/// output-unbuffering wrapper if configured and matching.
fn build_invocation(job: &Job, unbuffer_pattern: Option<&str>) -> String {
    let base = if job.is_script() {
        let shell = job.shell.as_deref().unwrap_or("/bin/sh");
        let script = job.original_script.as_deref().unwrap_or_default();
        // Positional args go between the shell and the heredoc operator —
        // the delimiter line must otherwise stand alone.
        match job.args.as_deref() {
            Some(args) if !args.is_empty() => {
                format!("{shell} {args} <<'FLEETQ_SCRIPT_EOF'\n{script}\nFLEETQ_SCRIPT_EOF")
            }
            _ => format!("{shell} <<'FLEETQ_SCRIPT_EOF'\n{script}\nFLEETQ_SCRIPT_EOF"),
        }
    } else {
        job.effective_command_line()
    };

    unbuffer::maybe_wrap(base, unbuffer_pattern)
}


/// Exercises the full per-job algorithm against a scripted [`Session`], in
/// place of a real SSH connection (§8 scenarios 1-5).
#[cfg(test)]
mod algorithm_tests {
    use super::*;
    use std::pin::Pin;

    use async_trait::async_trait;
    use fleetq_core::{AuthType, Host};
    use fleetq_ssh::{KeyFetchError, RemoteExecution, SshError};
    use fleetq_store::memory::InMemoryStore;
    use futures::{stream, Stream};
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    struct FakeKeyFetcher;

    #[async_trait]
    impl KeyFetcher for FakeKeyFetcher {
        async fn fetch_key(&self, _locator: &str, _timeout: Duration) -> Result<Vec<u8>, KeyFetchError> {
            Ok(b"fake-key-material".to_vec())
        }
    }

    /// What a scripted session does once its exit future is awaited.
    #[derive(Clone)]
    enum Scripted {
        Exit(i32),
        SessionError(String),
        /// Notifies `started` as soon as it begins running, then blocks on
        /// `cancel` — used to exercise mid-run cancellation deterministically.
        WaitForCancel(Arc<Notify>),
    }

    struct FakeSession(Scripted);

    #[async_trait]
    impl Session for FakeSession {
        async fn run(&self, _command: &str, _timeout: Duration, cancel: CancellationToken) -> Result<RemoteExecution, SshError> {
            let stdout: Pin<Box<dyn Stream<Item = fleetq_ssh::session::OutputLine> + Send>> =
                Box::pin(stream::iter(vec![Ok("line one".to_string())]));
            let stderr: Pin<Box<dyn Stream<Item = fleetq_ssh::session::OutputLine> + Send>> =
                Box::pin(stream::iter(Vec::new()));

            let behavior = self.0.clone();
            let exit = Box::pin(async move {
                match behavior {
                    Scripted::Exit(code) => Ok(ExitOutcome::ExitCode(code)),
                    Scripted::SessionError(msg) => Err(SshError::Channel(msg)),
                    Scripted::WaitForCancel(started) => {
                        started.notify_one();
                        cancel.cancelled().await;
                        Ok(ExitOutcome::Canceled("canceled".into()))
                    }
                }
            });

            Ok(RemoteExecution { stdout, stderr, exit })
        }
    }

    struct FakeSessionFactory(Scripted);

    #[async_trait]
    impl SessionFactory for FakeSessionFactory {
        async fn open_session(
            &self,
            _host: &str,
            _port: u16,
            _user: &str,
            _credentials: Credentials,
        ) -> Result<Box<dyn Session>, SshError> {
            Ok(Box::new(FakeSession(self.0.clone())))
        }
    }

    fn seeded_host() -> Host {
        Host {
            id: Uuid::new_v4(),
            name: "h".into(),
            hostname: "127.0.0.1".into(),
            port: 22,
            user: "root".into(),
            auth_type: AuthType::Password,
            password: Some("secret".into()),
            private_key: None,
            pem_file_url: None,
            is_active: true,
        }
    }

    async fn context_for(behavior: Scripted) -> (Arc<ExecutionContext>, Arc<InMemoryStore>, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let host = seeded_host();
        store.put_host(&host).await.unwrap();
        let job = Job::new("echo".into(), host.id, 60, 5);
        let job_id = job.id;
        store.insert_job(&job).await.unwrap();

        let ctx = Arc::new(ExecutionContext {
            store: store.clone(),
            key_fetcher: Arc::new(FakeKeyFetcher),
            session_factory: Arc::new(FakeSessionFactory(behavior)),
            cancel_map: CancelMap::new(),
            unbuffer_pattern: None,
            flush_lines: 10,
            flush_interval: Duration::from_secs(60),
            key_fetch_timeout: Duration::from_secs(1),
        });

        (ctx, store, job_id)
    }

    #[tokio::test]
    async fn happy_path_persists_completed_with_exit_code_and_output() {
        let (ctx, store, job_id) = context_for(Scripted::Exit(0)).await;
        execute_job(JobDescriptor::new(job_id, 5), ctx).await;

        let job = store.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.exit_code, Some(0));
        assert_eq!(job.stdout, "line one\n");
    }

    #[tokio::test]
    async fn a_non_zero_exit_code_persists_failed() {
        let (ctx, store, job_id) = context_for(Scripted::Exit(7)).await;
        execute_job(JobDescriptor::new(job_id, 5), ctx).await;

        let job = store.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.exit_code, Some(7));
    }

    #[tokio::test]
    async fn a_session_failure_persists_failed_with_a_diagnostic_and_no_exit_code() {
        let (ctx, store, job_id) = context_for(Scripted::SessionError("connection reset".into())).await;
        execute_job(JobDescriptor::new(job_id, 5), ctx).await;

        let job = store.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.exit_code, None);
        assert!(job.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn a_job_already_canceled_before_dispatch_is_left_untouched() {
        let (ctx, store, job_id) = context_for(Scripted::Exit(0)).await;
        let patch = JobPatch::to_terminal_with_error(JobStatus::Canceled, "canceled before dispatch", Utc::now());
        store.update_job(job_id, patch).await.unwrap();

        execute_job(JobDescriptor::new(job_id, 5), ctx).await;

        let job = store.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
        assert_eq!(job.exit_code, None);
    }

    #[tokio::test]
    async fn cancellation_while_running_persists_canceled() {
        let started = Arc::new(Notify::new());
        let (ctx, store, job_id) = context_for(Scripted::WaitForCancel(started.clone())).await;

        let cancel_map = ctx.cancel_map.clone();
        let handle = tokio::spawn(execute_job(JobDescriptor::new(job_id, 5), ctx));

        started.notified().await;
        cancel_map.fire(job_id);
        handle.await.unwrap();

        let job = store.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
    }
}
