use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The compact message carried through the queue wire (§3): just enough for
/// the worker to look up the authoritative row in S. `sequence` is assigned
/// by the queue service itself at `Push` time, never by the caller, and
/// exists only to break priority ties in FIFO order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: Uuid,
    pub priority: i32,
    #[serde(default)]
    pub sequence: u64,
}

impl JobDescriptor {
    /// Builds a descriptor for submission; `sequence` is a placeholder that
    /// the queue service overwrites on `Push`.
    #[must_use]
    pub fn new(id: Uuid, priority: i32) -> Self {
        Self {
            id,
            priority,
            sequence: 0,
        }
    }
}

/// Ordering key used by the queue's heap: higher priority first, and among
/// equal priorities the lower (earlier) sequence number first.
///
/// `std::collections::BinaryHeap` is a max-heap over `Ord`, so this type's
/// `Ord` impl is written so that "greater" means "pop me sooner".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchKey {
    pub priority: i32,
    pub sequence: u64,
}

impl From<JobDescriptor> for DispatchKey {
    fn from(d: JobDescriptor) -> Self {
        Self {
            priority: d.priority,
            sequence: d.sequence,
        }
    }
}

impl Ord for DispatchKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for DispatchKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_sorts_greater() {
        let high = DispatchKey {
            priority: 9,
            sequence: 100,
        };
        let low = DispatchKey {
            priority: 1,
            sequence: 1,
        };
        assert!(high > low);
    }

    #[test]
    fn equal_priority_breaks_tie_by_earlier_sequence() {
        let earlier = DispatchKey {
            priority: 5,
            sequence: 1,
        };
        let later = DispatchKey {
            priority: 5,
            sequence: 2,
        };
        assert!(earlier > later, "earlier sequence should pop first");
    }
}
