//! The `{job_id -> cancel handle}` map shared between the cancel-subscriber
//! task and the running execution slots (§4.2.1, §9).

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Writers are execution slots registering/unregistering their own job;
/// the reader is the cancel-subscriber task firing a token by id.
#[derive(Clone, Default)]
pub struct CancelMap {
    inner: Arc<DashMap<Uuid, CancellationToken>>,
}

impl CancelMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner.insert(job_id, token.clone());
        token
    }

    pub fn unregister(&self, job_id: Uuid) {
        self.inner.remove(&job_id);
    }

    /// Fires the token for `job_id`, if the job is still running. A cancel
    /// for a job that already finished (and was unregistered) is a no-op,
    /// matching the idempotent/best-effort contract in §4.2.4.
    pub fn fire(&self, job_id: Uuid) {
        if let Some(token) = self.inner.get(&job_id) {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_on_unknown_job_is_a_no_op() {
        let map = CancelMap::new();
        map.fire(Uuid::new_v4());
    }

    #[test]
    fn fire_cancels_the_registered_token() {
        let map = CancelMap::new();
        let id = Uuid::new_v4();
        let token = map.register(id);
        assert!(!token.is_cancelled());
        map.fire(id);
        assert!(token.is_cancelled());
    }

    #[test]
    fn fire_after_unregister_is_a_no_op() {
        let map = CancelMap::new();
        let id = Uuid::new_v4();
        let token = map.register(id);
        map.unregister(id);
        map.fire(id);
        assert!(!token.is_cancelled());
    }
}
