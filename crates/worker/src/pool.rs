//! Top-level orchestration: wires the consumer, cancel listener, and the
//! N execution slots sharing one bounded channel of descriptors (§4.2.1).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fleetq_ssh::{KeyFetcher, SessionFactory};
use fleetq_store::Store;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cancel_map::CancelMap;
use crate::consumer::{run_cancel_listener, run_consumer};
use crate::execution::{execute_job, ExecutionContext};
use crate::WorkerError;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub queue_addr: SocketAddr,
    pub pool_size: usize,
    pub flush_lines: usize,
    pub flush_interval: Duration,
    pub key_fetch_timeout: Duration,
    pub unbuffer_pattern: Option<String>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            queue_addr: "127.0.0.1:9000".parse().expect("valid default address"),
            pool_size: 16,
            flush_lines: 10,
            flush_interval: Duration::from_secs(2),
            key_fetch_timeout: Duration::from_secs(10),
            unbuffer_pattern: None,
        }
    }
}

/// Runs the worker pool to completion. Returns once every spawned task has
/// exited — which, for a graceful shutdown, is after the consumer has
/// stopped pulling new descriptors and every slot has drained the channel
/// and finished whatever job it was already running.
pub async fn run_worker_pool(
    config: WorkerPoolConfig,
    store: Arc<dyn Store>,
    key_fetcher: Arc<dyn KeyFetcher>,
    session_factory: Arc<dyn SessionFactory>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let cancel_map = CancelMap::new();
    let ctx = Arc::new(ExecutionContext {
        store,
        key_fetcher,
        session_factory,
        cancel_map: cancel_map.clone(),
        unbuffer_pattern: config.unbuffer_pattern.clone(),
        flush_lines: config.flush_lines,
        flush_interval: config.flush_interval,
        key_fetch_timeout: config.key_fetch_timeout,
    });

    // One permit per slot: the consumer only issues the next `Pop` once a
    // permit is available, and a slot returns its permit after the job it
    // received has run to a finalized terminal state (§4.2.1).
    let slot_semaphore = Arc::new(Semaphore::new(config.pool_size));
    let (slot_tx, slot_rx) = mpsc::channel(config.pool_size);
    let shared_rx = Arc::new(Mutex::new(slot_rx));

    let mut tasks = JoinSet::new();

    tasks.spawn(run_consumer(config.queue_addr, slot_tx, slot_semaphore, shutdown.clone()));
    tasks.spawn(async move {
        run_cancel_listener(config.queue_addr, cancel_map, shutdown.clone()).await
    });

    for slot in 0..config.pool_size {
        let shared_rx = shared_rx.clone();
        let ctx = ctx.clone();
        tasks.spawn(async move {
            loop {
                let item = {
                    let mut rx = shared_rx.lock().await;
                    rx.recv().await
                };
                match item {
                    Some((permit, descriptor)) => {
                        execute_job(descriptor, ctx.clone()).await;
                        drop(permit);
                    }
                    None => {
                        info!(slot, "slot exiting, no more descriptors");
                        return Result::<(), WorkerError>::Ok(());
                    }
                }
            }
        });
    }

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "a worker pool task returned an error"),
            Err(err) => warn!(error = %err, "a worker pool task panicked"),
        }
    }

    Ok(())
}
