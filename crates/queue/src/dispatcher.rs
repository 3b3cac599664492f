//! The in-memory priority heap plus the waiter FIFO that backs `Pop` (§4.1).
//!
//! Mutations to the heap and the waiter list happen under one lock and
//! never span an `.await`, so the lock is never held across I/O.

use std::collections::{BinaryHeap, VecDeque};

use fleetq_core::JobDescriptor;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    key: fleetq_core::descriptor::DispatchKey,
    descriptor: JobDescriptorWithSeq,
}

// `DispatchKey` doesn't carry the job id, so the heap entry pairs it with
// the full descriptor for retrieval on pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JobDescriptorWithSeq(JobDescriptor);

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<HeapEntry>,
    waiters: VecDeque<oneshot::Sender<JobDescriptor>>,
    next_sequence: u64,
    capacity: usize,
}

/// The priority-ordered dispatch structure: a max-heap keyed by
/// `(priority desc, sequence asc)` with a FIFO of parked `Pop` waiters.
///
/// A `Push` that finds a waiter hands the descriptor directly to the
/// longest-waiting one and never touches the heap, which is what makes the
/// "at most one `Pop` observes a given descriptor" guarantee hold even when
/// poppers race pushers.
pub struct Dispatcher {
    inner: Mutex<Inner>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                waiters: VecDeque::new(),
                next_sequence: 0,
                capacity,
            }),
        }
    }

    /// Assigns the next sequence number and inserts the descriptor, or hands
    /// it directly to a parked waiter. Returns [`QueueError::Full`] if the
    /// heap is at capacity and no waiter is parked to receive it directly.
    pub fn push(&self, mut descriptor: JobDescriptor) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        descriptor.sequence = sequence;

        while let Some(waiter) = inner.waiters.pop_front() {
            match waiter.send(descriptor) {
                Ok(()) => return Ok(()),
                Err(_) => continue, // waiter's Pop caller already gave up
            }
        }

        if inner.heap.len() >= inner.capacity {
            return Err(QueueError::Full);
        }
        inner.heap.push(HeapEntry {
            key: descriptor.into(),
            descriptor: JobDescriptorWithSeq(descriptor),
        });
        Ok(())
    }

    /// Removes and returns the top of the heap, or `None` if empty.
    #[must_use]
    pub fn try_pop(&self) -> Option<JobDescriptor> {
        let mut inner = self.inner.lock();
        inner.heap.pop().map(|entry| entry.descriptor.0)
    }

    /// Parks a waiter at the back of the FIFO; resolves once a `Push` hands
    /// it a descriptor directly. The caller awaits the returned receiver
    /// outside any lock.
    pub fn park(&self) -> oneshot::Receiver<JobDescriptor> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().waiters.push_back(tx);
        rx
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prop_assert_eq;
    use uuid::Uuid;

    fn descriptor(priority: i32) -> JobDescriptor {
        JobDescriptor::new(Uuid::new_v4(), priority)
    }

    #[test]
    fn higher_priority_pops_first() {
        let dispatcher = Dispatcher::new(16);
        dispatcher.push(descriptor(1)).unwrap();
        dispatcher.push(descriptor(9)).unwrap();
        dispatcher.push(descriptor(5)).unwrap();

        assert_eq!(dispatcher.try_pop().unwrap().priority, 9);
        assert_eq!(dispatcher.try_pop().unwrap().priority, 5);
        assert_eq!(dispatcher.try_pop().unwrap().priority, 1);
        assert!(dispatcher.try_pop().is_none());
    }

    #[test]
    fn equal_priority_pops_in_push_order() {
        let dispatcher = Dispatcher::new(16);
        let first = descriptor(5);
        let second = descriptor(5);
        dispatcher.push(first).unwrap();
        dispatcher.push(second).unwrap();

        assert_eq!(dispatcher.try_pop().unwrap().id, first.id);
        assert_eq!(dispatcher.try_pop().unwrap().id, second.id);
    }

    #[test]
    fn push_over_capacity_errors_full() {
        let dispatcher = Dispatcher::new(1);
        dispatcher.push(descriptor(5)).unwrap();
        assert!(matches!(dispatcher.push(descriptor(5)), Err(QueueError::Full)));
    }

    #[tokio::test]
    async fn push_hands_off_directly_to_a_parked_waiter() {
        let dispatcher = Dispatcher::new(1);
        let rx = dispatcher.park();
        assert_eq!(dispatcher.len(), 0);

        let d = descriptor(7);
        dispatcher.push(d).unwrap();

        // Handed off directly: never touched the heap.
        assert_eq!(dispatcher.len(), 0);
        let received = rx.await.unwrap();
        assert_eq!(received.id, d.id);
    }

    proptest::proptest! {
        /// Whatever order a batch of priorities is pushed in, popping to
        /// exhaustion yields a sequence sorted by priority descending, and
        /// never places a later-pushed equal-priority descriptor ahead of
        /// an earlier one (§3's tiebreak rule), for any priority sequence.
        #[test]
        fn pop_order_always_respects_priority_then_push_order(priorities in proptest::collection::vec(1i32..=10, 0..64)) {
            let dispatcher = Dispatcher::new(priorities.len().max(1));
            let pushed: Vec<JobDescriptor> = priorities.iter().map(|p| descriptor(*p)).collect();
            for d in &pushed {
                dispatcher.push(*d).unwrap();
            }

            let mut popped = Vec::new();
            while let Some(d) = dispatcher.try_pop() {
                popped.push(d);
            }

            // `sort_by` is stable, so ties preserve `pushed`'s original
            // (push) order, matching the FIFO tiebreak exactly.
            let mut expected = pushed.clone();
            expected.sort_by(|a, b| b.priority.cmp(&a.priority));

            let popped_ids: Vec<_> = popped.iter().map(|d| d.id).collect();
            let expected_ids: Vec<_> = expected.iter().map(|d| d.id).collect();
            prop_assert_eq!(popped_ids, expected_ids);
        }
    }
}
