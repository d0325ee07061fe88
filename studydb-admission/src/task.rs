use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

pub type TaskId = u64;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of heavyweight work that asks the gate for permission to run.
///
/// `load` is the fraction of the shared budget the task occupies while running.
/// A load of zero means the task always runs and is never tracked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    load: f64,
}

impl Task {
    /// Creates a task with a process-unique id. The load is clamped to `[0.0, 1.0]`.
    pub fn new(load: f64) -> Self {
        let load = if load.is_nan() {
            0.0
        } else {
            load.clamp(0.0, 1.0)
        };
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            load,
        }
    }

    #[inline(always)]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[inline(always)]
    pub fn load(&self) -> f64 {
        self.load
    }

    /// Zero-load tasks bypass the gate entirely.
    #[inline(always)]
    pub fn is_untracked(&self) -> bool {
        self.load <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = Task::new(0.5);
        let b = Task::new(0.5);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn load_is_clamped() {
        assert_eq!(Task::new(1.7).load(), 1.0);
        assert_eq!(Task::new(-0.2).load(), 0.0);
        assert!(Task::new(f64::NAN).is_untracked());
    }
}
