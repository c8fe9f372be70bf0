//! Bounded three-tier priority queue — spec §4.1.4/§4.1.5.
//!
//! URGENT, NORMAL and BACKGROUND each get their own FIFO lane; `pop_next`
//! always drains URGENT before NORMAL before BACKGROUND (P3). The queue has
//! a single shared capacity (default 50, P9) across all three lanes; once
//! full, admission evicts the oldest BACKGROUND task to make room, and only
//! rejects outright if there is no BACKGROUND task left to evict.

use std::collections::VecDeque;

use crate::types::{Priority, RouterSnapshot, Task};

pub const DEFAULT_CAPACITY: usize = 50;

/// Outcome of [`TaskQueue::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    Enqueued { position: usize },
    EnqueuedWithEviction { position: usize, evicted_id: String },
    Rejected,
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    urgent: VecDeque<Task>,
    normal: VecDeque<Task>,
    background: VecDeque<Task>,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self { urgent: VecDeque::new(), normal: VecDeque::new(), background: VecDeque::new(), capacity }
    }

    fn lane(&self, priority: Priority) -> &VecDeque<Task> {
        match priority {
            Priority::Urgent => &self.urgent,
            Priority::Normal => &self.normal,
            Priority::Background => &self.background,
        }
    }

    fn lane_mut(&mut self, priority: Priority) -> &mut VecDeque<Task> {
        match priority {
            Priority::Urgent => &mut self.urgent,
            Priority::Normal => &mut self.normal,
            Priority::Background => &mut self.background,
        }
    }

    pub fn len(&self) -> usize {
        self.urgent.len() + self.normal.len() + self.background.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position a just-admitted task would occupy within its own lane's FIFO
    /// order (0-based), for `TaskEvent::Queued { position, .. }`.
    fn lane_position(&self, priority: Priority) -> usize {
        self.lane(priority).len()
    }

    /// Admit `task` into its priority lane, evicting the oldest BACKGROUND
    /// task if the queue is at capacity and no BACKGROUND victim exists only
    /// when `task` itself would be the sole BACKGROUND occupant rejected.
    pub fn admit(&mut self, task: Task) -> AdmitOutcome {
        if self.len() < self.capacity {
            let position = self.lane_position(task.priority);
            self.lane_mut(task.priority).push_back(task);
            return AdmitOutcome::Enqueued { position };
        }

        if let Some(victim) = self.background.pop_front() {
            let position = self.lane_position(task.priority);
            self.lane_mut(task.priority).push_back(task);
            return AdmitOutcome::EnqueuedWithEviction { position, evicted_id: victim.id };
        }

        AdmitOutcome::Rejected
    }

    /// Re-insert a preempted task at the front of its original priority's
    /// lane, bypassing capacity checks — preemption never drops the task it
    /// displaces (P8).
    pub fn requeue_front(&mut self, task: Task) {
        self.lane_mut(task.priority).push_front(task);
    }

    /// Pop the next task to run: URGENT, then NORMAL, then BACKGROUND, FIFO
    /// within each lane (P3).
    pub fn pop_next(&mut self) -> Option<Task> {
        self.urgent.pop_front().or_else(|| self.normal.pop_front()).or_else(|| self.background.pop_front())
    }

    /// Remove a queued task by id (e.g. cancel-while-queued). Returns the
    /// removed task, if found.
    pub fn remove(&mut self, id: &str) -> Option<Task> {
        for lane in [&mut self.urgent, &mut self.normal, &mut self.background] {
            if let Some(pos) = lane.iter().position(|t| t.id == id) {
                return lane.remove(pos);
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.urgent.clear();
        self.normal.clear();
        self.background.clear();
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (self.urgent.len(), self.normal.len(), self.background.len())
    }

    pub fn snapshot(&self, current: Option<String>) -> RouterSnapshot {
        let (urgent_count, normal_count, background_count) = self.counts();
        RouterSnapshot { queue_len: self.len(), current, urgent_count, normal_count, background_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Route;

    fn task(priority: Priority) -> Task {
        let mut t = Task::new("c", "u", "m");
        t.priority = priority;
        t.route = Route::Local;
        t
    }

    #[test]
    fn pop_order_is_urgent_then_normal_then_background_p3() {
        let mut q = TaskQueue::new(DEFAULT_CAPACITY);
        q.admit(task(Priority::Background));
        q.admit(task(Priority::Normal));
        q.admit(task(Priority::Urgent));

        assert_eq!(q.pop_next().unwrap().priority, Priority::Urgent);
        assert_eq!(q.pop_next().unwrap().priority, Priority::Normal);
        assert_eq!(q.pop_next().unwrap().priority, Priority::Background);
        assert!(q.pop_next().is_none());
    }

    #[test]
    fn fifo_within_a_lane() {
        let mut q = TaskQueue::new(DEFAULT_CAPACITY);
        let first = task(Priority::Normal);
        let first_id = first.id.clone();
        q.admit(first);
        q.admit(task(Priority::Normal));

        assert_eq!(q.pop_next().unwrap().id, first_id);
    }

    #[test]
    fn overflow_evicts_oldest_background_p9() {
        let mut q = TaskQueue::new(2);
        let oldest = task(Priority::Background);
        let oldest_id = oldest.id.clone();
        q.admit(oldest);
        q.admit(task(Priority::Background));

        let outcome = q.admit(task(Priority::Normal));
        match outcome {
            AdmitOutcome::EnqueuedWithEviction { evicted_id, .. } => assert_eq!(evicted_id, oldest_id),
            other => panic!("expected eviction, got {other:?}"),
        }
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn overflow_rejects_when_no_background_victim_exists() {
        let mut q = TaskQueue::new(1);
        q.admit(task(Priority::Urgent));
        let outcome = q.admit(task(Priority::Urgent));
        assert_eq!(outcome, AdmitOutcome::Rejected);
    }

    #[test]
    fn requeue_front_bypasses_capacity_and_keeps_priority() {
        let mut q = TaskQueue::new(1);
        q.admit(task(Priority::Normal));
        let preempted = task(Priority::Urgent);
        let preempted_id = preempted.id.clone();
        q.requeue_front(preempted);

        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_next().unwrap().id, preempted_id);
    }

    #[test]
    fn remove_deletes_a_queued_task_by_id() {
        let mut q = TaskQueue::new(DEFAULT_CAPACITY);
        let t = task(Priority::Normal);
        let id = t.id.clone();
        q.admit(t);
        let removed = q.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(q.is_empty());
    }
}
