//! Array-backed max-heap ordered by task score.
//!
//! Scores depend on the clock, so each push/pop evaluates them at a single
//! `now` while sifting. Entries the operation does not touch keep the
//! position they were given earlier: aging is re-applied only where the
//! heap is disturbed. The ordering is therefore approximate across time,
//! not a strict global ordering by current score.

use std::time::Instant;

use crate::task::Task;

pub(crate) struct ScoreHeap<C> {
    items: Vec<Task<C>>,
}

impl<C> ScoreHeap<C> {
    pub(crate) fn new() -> Self {
        Self { items: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn push(&mut self, task: Task<C>, now: Instant) {
        self.items.push(task);
        self.sift_up(self.items.len() - 1, now);
    }

    /// Remove the root (highest score as of the last disturbance).
    pub(crate) fn pop(&mut self, now: Instant) -> Option<Task<C>> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let top = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0, now);
        }
        top
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Task<C>> {
        self.items.iter()
    }

    fn sift_up(&mut self, mut idx: usize, now: Instant) {
        let score = self.items[idx].score(now);
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.items[parent].score(now) >= score {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize, now: Instant) {
        let len = self.items.len();
        let score = self.items[idx].score(now);
        loop {
            let left = 2 * idx + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut child = left;
            let mut child_score = self.items[left].score(now);
            if right < len {
                let right_score = self.items[right].score(now);
                if right_score > child_score {
                    child = right;
                    child_score = right_score;
                }
            }
            if score >= child_score {
                break;
            }
            self.items.swap(idx, child);
            idx = child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    fn task(priority: Priority) -> Task<()> {
        Task::new(priority, |_| Ok(()))
    }

    #[test]
    fn pops_by_priority() {
        let now = Instant::now();
        let mut heap = ScoreHeap::new();
        for p in [
            Priority::Low,
            Priority::Critical,
            Priority::Normal,
            Priority::High,
            Priority::Low,
        ] {
            heap.push(task(p), now);
        }
        let order: Vec<Priority> = std::iter::from_fn(|| heap.pop(now))
            .map(|t| t.priority())
            .collect();
        assert_eq!(
            order,
            vec![
                Priority::Critical,
                Priority::High,
                Priority::Normal,
                Priority::Low,
                Priority::Low
            ]
        );
        assert!(heap.is_empty());
    }

    #[test]
    fn popped_score_dominates_remaining() {
        let now = Instant::now();
        let mut heap = ScoreHeap::new();
        for i in 0..64 {
            heap.push(task(Priority::ALL[i % 4]), now);
        }
        while let Some(top) = heap.pop(now) {
            let top_score = top.score(now);
            assert!(heap.iter().all(|t| t.score(now) <= top_score));
        }
    }

    #[test]
    fn aged_low_task_overtakes_fresh_low() {
        let now = Instant::now();
        let mut heap = ScoreHeap::new();
        let fresh = task(Priority::Low);
        let aged = task(Priority::Low).backdate(std::time::Duration::from_secs(5));
        let aged_id = aged.id();
        heap.push(fresh, now);
        heap.push(aged, now);
        assert_eq!(heap.pop(now).map(|t| t.id()), Some(aged_id));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn pop_empty() {
        let mut heap: ScoreHeap<()> = ScoreHeap::new();
        assert!(heap.pop(Instant::now()).is_none());
    }
}
