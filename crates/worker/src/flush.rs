//! The per-job output writer task (§4.2.3, §9: "single writer per job").
//!
//! Each running job gets exactly one writer task, reached over an mpsc
//! channel, so the periodic flush and the terminal flush never race each
//! other for the same row.

use std::sync::Arc;
use std::time::Duration;

use fleetq_core::JobPatch;
use fleetq_store::Store;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

pub enum OutputEvent {
    Line { stream: StreamKind, text: String },
}

async fn flush(store: &dyn Store, job_id: Uuid, stdout: &str, stderr: &str) {
    if let Err(err) = store
        .update_job(job_id, JobPatch::flush(stdout.to_string(), stderr.to_string()))
        .await
    {
        warn!(%job_id, error = %err, "failed to flush job output");
    }
}

/// Accumulates output lines and writes them through to `store` every
/// `flush_lines` lines or `flush_interval`, whichever comes first. Always
/// performs one final flush when `rx` closes, regardless of how many lines
/// are pending.
pub async fn run_job_writer(
    job_id: Uuid,
    store: Arc<dyn Store>,
    mut rx: mpsc::UnboundedReceiver<OutputEvent>,
    flush_lines: usize,
    flush_interval: Duration,
) {
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut unflushed = 0usize;

    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.reset();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(OutputEvent::Line { stream, text }) => {
                        match stream {
                            StreamKind::Stdout => {
                                stdout.push_str(&text);
                                stdout.push('\n');
                            }
                            StreamKind::Stderr => {
                                stderr.push_str(&text);
                                stderr.push('\n');
                            }
                        }
                        unflushed += 1;
                        if unflushed >= flush_lines {
                            flush(store.as_ref(), job_id, &stdout, &stderr).await;
                            unflushed = 0;
                            ticker.reset();
                        }
                    }
                    None => {
                        flush(store.as_ref(), job_id, &stdout, &stderr).await;
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                if unflushed > 0 {
                    flush(store.as_ref(), job_id, &stdout, &stderr).await;
                    unflushed = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetq_core::{AuthType, Host, Job};
    use fleetq_store::memory::InMemoryStore;

    async fn seeded_job() -> (Arc<InMemoryStore>, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let host = Host {
            id: Uuid::new_v4(),
            name: "h".into(),
            hostname: "127.0.0.1".into(),
            port: 22,
            user: "root".into(),
            auth_type: AuthType::Password,
            password: Some("x".into()),
            private_key: None,
            pem_file_url: None,
            is_active: true,
        };
        store.put_host(&host).await.unwrap();
        let job = Job::new("echo".into(), host.id, 60, 5);
        let id = job.id;
        store.insert_job(&job).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn flushes_after_the_configured_line_count() {
        let (store, job_id) = seeded_job().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_job_writer(
            job_id,
            store.clone(),
            rx,
            2,
            Duration::from_secs(60),
        ));

        tx.send(OutputEvent::Line { stream: StreamKind::Stdout, text: "one".into() }).unwrap();
        tx.send(OutputEvent::Line { stream: StreamKind::Stdout, text: "two".into() }).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let job = store.get_job(job_id).await.unwrap();
        assert_eq!(job.stdout, "one\ntwo\n");

        drop(tx);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn performs_a_final_flush_on_channel_close_with_a_partial_batch() {
        let (store, job_id) = seeded_job().await;
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_job_writer(
            job_id,
            store.clone(),
            rx,
            10,
            Duration::from_secs(60),
        ));

        tx.send(OutputEvent::Line { stream: StreamKind::Stderr, text: "oops".into() }).unwrap();
        drop(tx);
        writer.await.unwrap();

        let job = store.get_job(job_id).await.unwrap();
        assert_eq!(job.stderr, "oops\n");
    }
}
