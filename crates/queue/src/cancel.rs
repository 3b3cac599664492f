//! The cancellation fan-out bus: a bounded broadcast channel so publishing a
//! cancel notice never blocks on a slow or absent subscriber (§4.1).

use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 1024;

/// Publishes job-id cancellation notices to any number of subscribers.
/// Publishing with zero subscribers is a no-op, matching the "best-effort,
/// no error when no subscribers" contract for `PublishCancel`.
pub struct CancelBus {
    sender: broadcast::Sender<Uuid>,
}

impl CancelBus {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, job_id: Uuid) {
        // `send` errors only when there are no receivers; that's a valid,
        // silent outcome here.
        let _ = self.sender.send(job_id);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Uuid> {
        self.sender.subscribe()
    }
}

impl Default for CancelBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = CancelBus::new();
        bus.publish(Uuid::new_v4());
    }

    #[tokio::test]
    async fn every_live_subscriber_observes_a_published_id() {
        let bus = CancelBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        let id = Uuid::new_v4();
        bus.publish(id);

        assert_eq!(a.recv().await.unwrap(), id);
        assert_eq!(b.recv().await.unwrap(), id);
    }
}
