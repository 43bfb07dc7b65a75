//! Time-ordered job queue.
//!
//! A min-heap keyed by `(due, seq)`. `seq` grows with every push, so entries
//! with the same due time come out in submission order. Cancelled jobs stay in
//! the heap until they reach the front, where they are discarded.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::time::Instant;

use crate::scheduler::job::JobState;

pub(crate) struct Entry {
    pub(crate) due: Instant,
    seq: u64,
    /// Wall-clock occurrence for calendar jobs.
    pub(crate) wall: Option<OffsetDateTime>,
    pub(crate) job: Arc<JobState>,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Default)]
pub(crate) struct JobQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl JobQueue {
    pub(crate) fn push(&mut self, due: Instant, wall: Option<OffsetDateTime>, job: Arc<JobState>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry {
            due,
            seq,
            wall,
            job,
        }));
    }

    fn pop_cancelled(&mut self) {
        while self
            .heap
            .peek()
            .is_some_and(|Reverse(entry)| entry.job.is_cancelled())
        {
            self.heap.pop();
        }
    }

    /// Earliest live entry.
    pub(crate) fn peek(&mut self) -> Option<&Entry> {
        self.pop_cancelled();
        self.heap.peek().map(|Reverse(entry)| entry)
    }

    /// Due time of the earliest live entry.
    pub(crate) fn next_due(&mut self) -> Option<Instant> {
        self.peek().map(|entry| entry.due)
    }

    /// Removes and returns the earliest live entry if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Entry> {
        self.pop_cancelled();
        if self.heap.peek()?.0.due > now {
            return None;
        }
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    /// Number of entries whose job is not cancelled.
    pub(crate) fn live_len(&self) -> usize {
        self.heap
            .iter()
            .filter(|Reverse(entry)| !entry.job.is_cancelled())
            .count()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::{JobCallback, JobHandle, JobId, Recurrence};
    use std::sync::Weak;
    use std::time::Duration;

    fn job(id: u64) -> Arc<JobState> {
        let callback: Box<dyn JobCallback> = Box::new(|_job: JobHandle| async {});
        Arc::new(JobState::new(
            JobId(id),
            format!("job {id}"),
            Recurrence::Once,
            callback,
            Weak::new(),
        ))
    }

    #[test]
    fn test_earliest_first_then_fifo() {
        let now = Instant::now();
        let mut queue = JobQueue::default();
        queue.push(now + Duration::from_secs(2), None, job(1));
        queue.push(now + Duration::from_secs(1), None, job(2));
        queue.push(now + Duration::from_secs(1), None, job(3));

        let later = now + Duration::from_secs(5);
        let order: Vec<u64> = std::iter::from_fn(|| queue.pop_due(later))
            .map(|entry| entry.job.id.0)
            .collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_not_due_yet() {
        let now = Instant::now();
        let mut queue = JobQueue::default();
        queue.push(now + Duration::from_secs(1), None, job(1));

        assert!(queue.pop_due(now).is_none());
        assert_eq!(queue.next_due(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_cancelled_entries_are_discarded() {
        let now = Instant::now();
        let mut queue = JobQueue::default();
        let cancelled = job(1);
        queue.push(now, None, cancelled.clone());
        queue.push(now + Duration::from_secs(1), None, job(2));
        cancelled.cancel();

        assert_eq!(queue.live_len(), 1);
        assert_eq!(queue.next_due(), Some(now + Duration::from_secs(1)));
        assert_eq!(queue.pop_due(now + Duration::from_secs(1)).unwrap().job.id.0, 2);
        assert!(queue.next_due().is_none());
    }
}
