use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleetq_ssh::{KeyFetcher, LocalFileKeyFetcher, RusshSessionFactory, SessionFactory};
use fleetq_store::postgres;
use fleetq_store::Store;
use fleetq_worker::shutdown::{spawn_ctrl_c_handler, ShutdownController, ShutdownEvent};
use fleetq_worker::{run_worker_pool, ReconnectPolicy, WorkerPoolConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Parser)]
#[command(name = "fleetq-worker", version, about = "Executes dispatched commands over remote SSH sessions")]
struct Cli {
    /// Address of the queue service to pop descriptors from.
    #[arg(long, env = "FLEETQ_QUEUE_ADDR", default_value = "127.0.0.1:9000")]
    queue_addr: SocketAddr,

    /// Postgres connection string for the job/host store.
    #[arg(long, env = "FLEETQ_DATABASE_URL")]
    database_url: String,

    /// Number of concurrently executing jobs.
    #[arg(long, env = "FLEETQ_WORKER_POOL_SIZE", default_value_t = 16)]
    pool_size: usize,

    /// Flush accumulated output after this many lines.
    #[arg(long, env = "FLEETQ_WORKER_FLUSH_LINES", default_value_t = 10)]
    flush_lines: usize,

    /// Flush accumulated output after this many seconds, if any is pending.
    #[arg(long, env = "FLEETQ_WORKER_FLUSH_INTERVAL_SECS", default_value_t = 2)]
    flush_interval_secs: u64,

    /// Timeout for fetching a key referenced by a host's pem_file_url.
    #[arg(long, env = "FLEETQ_WORKER_KEY_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    key_fetch_timeout_secs: u64,

    /// Program basename whose output should be wrapped with a line-buffering
    /// probe (stdbuf/unbuffer). Disabled by default.
    #[arg(long, env = "FLEETQ_WORKER_UNBUFFER_PATTERN")]
    unbuffer_pattern: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

    let shutdown_token = CancellationToken::new();

    let store: Arc<dyn Store> = Arc::new(
        ReconnectPolicy::default()
            .retry(|| postgres::connect(&cli.database_url))
            .await?,
    );

    let key_fetcher: Arc<dyn KeyFetcher> = Arc::new(LocalFileKeyFetcher);
    let session_factory: Arc<dyn SessionFactory> = Arc::new(RusshSessionFactory);

    let config = WorkerPoolConfig {
        queue_addr: cli.queue_addr,
        pool_size: cli.pool_size,
        flush_lines: cli.flush_lines,
        flush_interval: Duration::from_secs(cli.flush_interval_secs),
        key_fetch_timeout: Duration::from_secs(cli.key_fetch_timeout_secs),
        unbuffer_pattern: cli.unbuffer_pattern,
    };

    info!(queue_addr = %config.queue_addr, pool_size = config.pool_size, "starting worker pool");

    let mut pool_fut = Box::pin(run_worker_pool(config, store, key_fetcher, session_factory, shutdown_token.clone()));

    loop {
        tokio::select! {
            result = &mut pool_fut => {
                result?;
                break;
            }
            event = shutdown_rx.recv() => {
                match event {
                    Some(ShutdownEvent::Graceful) => {
                        info!("shutdown requested; draining in-flight jobs");
                        shutdown_token.cancel();
                    }
                    Some(ShutdownEvent::Immediate) | None => {
                        warn!("forced shutdown; exiting without draining");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
