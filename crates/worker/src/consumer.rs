//! The two tasks that connect a worker to the queue service: the consumer
//! (one `Pop` connection, forwarding into the shared slot channel) and the
//! cancel listener (one `CancelSub` connection, firing the local cancel
//! map). Both shut down cleanly when `shutdown` is canceled.

use std::net::SocketAddr;
use std::sync::Arc;

use fleetq_core::JobDescriptor;
use fleetq_queue::{CancelSubscriber, PopHandle, QueueError};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backoff::ReconnectPolicy;
use crate::cancel_map::CancelMap;
use crate::WorkerError;

/// Repeatedly pops descriptors from the queue and forwards them into
/// `slot_tx`, one per free execution slot.
///
/// The next `Pop` is only issued once a slot becomes free again: `slot_tx`
/// carries the permit it was issued alongside its descriptor, and a slot
/// releases that permit only after the job it receives finishes and its
/// terminal state is persisted. This bounds the number of descriptors this
/// worker holds outside the queue to `pool_size`, so a worker crash can
/// strand at most one in-flight descriptor per slot rather than an entire
/// channel's worth — the queue keeps no redelivery state to recover the
/// rest.
pub async fn run_consumer(
    queue_addr: SocketAddr,
    slot_tx: mpsc::Sender<(OwnedSemaphorePermit, JobDescriptor)>,
    slot_semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
) -> Result<(), WorkerError> {
    let mut pop_handle = ReconnectPolicy::default()
        .retry(|| PopHandle::connect(queue_addr))
        .await
        .map_err(|err| QueueError::Unreachable(format!("Pop connection: {err}")))?;

    loop {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("consumer shutting down");
                return Ok(());
            }
            permit = slot_semaphore.clone().acquire_owned() => {
                permit.expect("slot_semaphore is never closed while the pool runs")
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("consumer shutting down with a free slot outstanding");
                return Ok(());
            }
            result = pop_handle.pop() => {
                let descriptor = result?;
                if slot_tx.send((permit, descriptor)).await.is_err() {
                    info!("slot channel closed, consumer exiting");
                    return Ok(());
                }
            }
        }
    }
}

/// Subscribes to cancellation notices and fires the matching entry in
/// `cancel_map` for each one received.
pub async fn run_cancel_listener(
    queue_addr: SocketAddr,
    cancel_map: CancelMap,
    shutdown: CancellationToken,
) -> Result<(), WorkerError> {
    let mut subscriber = ReconnectPolicy::default()
        .retry(|| CancelSubscriber::connect(queue_addr))
        .await
        .map_err(|err| QueueError::Unreachable(format!("CancelSub connection: {err}")))?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("cancel listener shutting down");
                return Ok(());
            }
            notice = subscriber.next_cancel() => {
                match notice? {
                    Some(job_id) => cancel_map.fire(job_id),
                    None => {
                        warn!("cancel subscription connection closed");
                        return Ok(());
                    }
                }
            }
        }
    }
}
