use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use fleetq_queue::shutdown::{spawn_ctrl_c_handler, ShutdownController, ShutdownEvent};
use fleetq_queue::{serve, QueueService, DEFAULT_HEAP_CAPACITY};
use tracing::info;

#[derive(Debug, Clone, Parser)]
#[command(name = "queued", version, about = "Priority queue service for remote-command dispatch")]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "FLEETQ_QUEUE_ADDR", default_value = "0.0.0.0:9000")]
    addr: SocketAddr,

    /// Maximum number of pending descriptors the heap will hold before
    /// refusing `Push` with queue-full.
    #[arg(long, env = "FLEETQ_QUEUE_CAPACITY", default_value_t = DEFAULT_HEAP_CAPACITY)]
    capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let service = Arc::new(QueueService::new(cli.capacity));

    let shutdown = Arc::new(ShutdownController::new());
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown.clone(), shutdown_tx);

    info!(addr = %cli.addr, capacity = cli.capacity, "starting queue service");

    let mut serve_fut = Box::pin(serve(cli.addr, service));

    loop {
        tokio::select! {
            result = &mut serve_fut => {
                result?;
                break;
            }
            event = shutdown_rx.recv() => {
                match event {
                    Some(ShutdownEvent::Graceful) => {
                        info!("shutdown requested; the queue holds no durable state to drain, waiting for in-flight connections");
                    }
                    Some(ShutdownEvent::Immediate) | None => {
                        info!("forced shutdown; exiting immediately");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
