use crate::task::{Task, TaskId};
use ahash::AHashMap;
use serde::Serialize;
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// Load ceiling. Slightly above 1.0 to absorb floating-point drift.
pub const MAX_LOAD: f64 = 1.001;

/// A waiter that has not polled for this long is considered abandoned.
pub const MAX_WAIT_TIME: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy)]
struct Waiter {
    id: TaskId,
    load: f64,
    last_poll: Instant,
}

/// Point-in-time view of the gate, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadSnapshot {
    pub current_load: f64,
    pub running: usize,
    pub waiting: usize,
}

/// Core admission logic for heavyweight tasks (no IO, no locks).
///
/// Invariants:
/// - `current_load` is the sum of loads in `running`;
/// - a task id is never both running and waiting.
pub struct LoadGate {
    max_load: f64,
    max_wait: Duration,
    current_load: f64,
    running: AHashMap<TaskId, f64>,
    waiting: VecDeque<Waiter>,
}

impl Default for LoadGate {
    fn default() -> Self {
        Self::new(MAX_LOAD, MAX_WAIT_TIME)
    }
}

impl LoadGate {
    pub fn new(max_load: f64, max_wait: Duration) -> Self {
        Self {
            max_load,
            max_wait,
            current_load: 0.0,
            running: AHashMap::new(),
            waiting: VecDeque::new(),
        }
    }

    /// Asks whether `task` may start now. Meant to be polled until it returns `true`.
    ///
    /// Every call refreshes the task's poll time, which is what keeps a waiting
    /// task from being evicted as abandoned. A task that fits may still be held
    /// back when a waiter ahead of it in the queue would fit as well.
    pub fn can_start(&mut self, task: &Task, now: Instant) -> bool {
        if task.is_untracked() || self.running.contains_key(&task.id()) {
            return true;
        }

        let mut pos = self.position(task.id());
        if let Some(index) = pos {
            self.waiting[index].last_poll = now;
        }

        let mut granted = false;
        if self.fits(task.load()) {
            granted = true;

            // A task not yet queued is compared against the whole queue.
            let mut limit = pos.unwrap_or(self.waiting.len());
            let mut index = 0;
            while index < limit {
                let waiter = self.waiting[index];
                if now.saturating_duration_since(waiter.last_poll) > self.max_wait {
                    self.waiting.remove(index);
                    limit -= 1;
                    pos = pos.map(|p| p - 1);
                    continue;
                }
                if self.fits(waiter.load) {
                    granted = false;
                    break;
                }
                index += 1;
            }
        }

        if granted {
            if let Some(index) = pos {
                self.waiting.remove(index);
            }
            self.current_load += task.load();
            self.running.insert(task.id(), task.load());
            return true;
        }

        if pos.is_none() {
            self.waiting.push_back(Waiter {
                id: task.id(),
                load: task.load(),
                last_poll: now,
            });
        }
        false
    }

    /// Moves a waiting (or not yet queued) task to the front of the queue.
    ///
    /// Does not start the task; the caller must poll `can_start` afterwards.
    pub fn bump(&mut self, task: &Task, now: Instant) {
        if task.is_untracked() || self.running.contains_key(&task.id()) {
            return;
        }
        if let Some(index) = self.position(task.id()) {
            self.waiting.remove(index);
        }
        self.waiting.push_front(Waiter {
            id: task.id(),
            load: task.load(),
            last_poll: now,
        });
    }

    /// Removes every trace of `task`, returning its load to the budget if it was running.
    ///
    /// Must be called exactly once per task that ever polled, whatever the outcome.
    pub fn complete(&mut self, task: &Task) {
        self.waiting.retain(|waiter| waiter.id != task.id());

        if let Some(load) = self.running.remove(&task.id()) {
            self.current_load -= load;
            if self.running.is_empty() {
                self.current_load = 0.0;
            }
        }
    }

    /// Advisory check; the answer may be stale as soon as it is returned.
    pub fn is_resource_available(&self, load: f64) -> bool {
        self.fits(load)
    }

    pub fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot {
            current_load: self.current_load,
            running: self.running.len(),
            waiting: self.waiting.len(),
        }
    }

    pub fn current_load(&self) -> f64 {
        self.current_load
    }

    pub fn is_running(&self, id: TaskId) -> bool {
        self.running.contains_key(&id)
    }

    pub fn is_waiting(&self, id: TaskId) -> bool {
        self.position(id).is_some()
    }

    fn fits(&self, load: f64) -> bool {
        self.current_load + load <= self.max_load
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.waiting.iter().position(|waiter| waiter.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn ceiling_holds_until_completion() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let a = Task::new(0.5);
        let b = Task::new(0.5);
        let c = Task::new(0.3);

        assert!(gate.can_start(&a, now));
        assert!(gate.can_start(&b, now));
        assert!(!gate.can_start(&c, now));
        assert!(gate.is_waiting(c.id()));

        gate.complete(&a);
        assert!(gate.can_start(&c, now + ms(10)));
        assert!(!gate.is_waiting(c.id()));
        assert!((gate.current_load() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn zero_load_is_never_tracked() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let full = Task::new(1.0);
        let free = Task::new(0.0);

        assert!(gate.can_start(&full, now));
        assert!(gate.can_start(&free, now));
        assert_eq!(
            gate.snapshot(),
            LoadSnapshot {
                current_load: 1.0,
                running: 1,
                waiting: 0
            }
        );

        gate.complete(&free);
        assert_eq!(gate.snapshot().running, 1);
    }

    #[test]
    fn running_task_short_circuits() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let a = Task::new(0.6);

        assert!(gate.can_start(&a, now));
        assert!(gate.can_start(&a, now));
        assert!((gate.current_load() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn earlier_waiter_that_fits_blocks_later_requester() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let big = Task::new(0.95);
        let waiter = Task::new(0.9);
        let small = Task::new(0.05);

        assert!(gate.can_start(&big, now));
        assert!(!gate.can_start(&waiter, now));

        // Room opens up for both; the earlier waiter keeps its place.
        gate.complete(&big);
        assert!(!gate.can_start(&small, now + ms(100)));
        assert!(gate.can_start(&waiter, now + ms(200)));
        assert!(gate.can_start(&small, now + ms(300)));
    }

    #[test]
    fn stale_waiter_is_evicted_by_another_poll() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let big = Task::new(0.95);
        let waiter = Task::new(0.9);
        let small = Task::new(0.05);

        assert!(gate.can_start(&big, now));
        assert!(!gate.can_start(&waiter, now));
        gate.complete(&big);

        assert!(!gate.can_start(&small, now + ms(1500)));

        // The waiter stopped polling; the next scan drops it.
        let later = now + MAX_WAIT_TIME + ms(1);
        assert!(gate.can_start(&small, later));
        assert!(!gate.is_waiting(waiter.id()));
        assert_eq!(gate.snapshot().waiting, 0);
    }

    #[test]
    fn waiter_that_cannot_fit_is_skipped_over() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let half = Task::new(0.5);
        let large = Task::new(0.9);
        let small = Task::new(0.05);

        assert!(gate.can_start(&half, now));
        assert!(!gate.can_start(&large, now));
        assert!(gate.can_start(&small, now + ms(10)));
        assert!(gate.is_waiting(large.id()));
    }

    #[test]
    fn bump_moves_waiter_to_front() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let full = Task::new(1.0);
        let first = Task::new(0.4);
        let urgent = Task::new(0.4);

        assert!(gate.can_start(&full, now));
        assert!(!gate.can_start(&first, now));
        assert!(!gate.can_start(&urgent, now));

        gate.bump(&urgent, now + ms(5));
        gate.complete(&full);

        assert!(!gate.can_start(&first, now + ms(10)));
        assert!(gate.can_start(&urgent, now + ms(10)));
        assert!(gate.can_start(&first, now + ms(20)));
    }

    #[test]
    fn bump_ignores_running_and_untracked() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let running = Task::new(0.5);
        let free = Task::new(0.0);

        assert!(gate.can_start(&running, now));
        gate.bump(&running, now);
        gate.bump(&free, now);
        assert_eq!(gate.snapshot().waiting, 0);
    }

    #[test]
    fn denied_task_is_queued_once() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let full = Task::new(1.0);
        let other = Task::new(0.3);

        assert!(gate.can_start(&full, now));
        for step in 0..5 {
            assert!(!gate.can_start(&other, now + ms(step)));
        }
        assert_eq!(gate.snapshot().waiting, 1);
    }

    #[test]
    fn complete_of_waiting_task_clears_queue() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let full = Task::new(1.0);
        let other = Task::new(0.3);

        assert!(gate.can_start(&full, now));
        assert!(!gate.can_start(&other, now));
        gate.complete(&other);
        assert!(!gate.is_waiting(other.id()));
        assert!((gate.current_load() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn load_resets_to_zero_when_nothing_runs() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let tasks: Vec<Task> = (0..10).map(|_| Task::new(0.1)).collect();

        for task in &tasks {
            assert!(gate.can_start(task, now));
        }
        for task in &tasks {
            gate.complete(task);
        }
        assert_eq!(gate.current_load(), 0.0);
        assert!(gate.is_resource_available(1.0));
    }

    #[test]
    fn resource_check_does_not_mutate() {
        let mut gate = LoadGate::default();
        let now = Instant::now();
        let a = Task::new(0.7);

        assert!(gate.can_start(&a, now));
        assert!(!gate.is_resource_available(0.5));
        assert!(gate.is_resource_available(0.3));
        assert_eq!(gate.snapshot().waiting, 0);
    }
}
