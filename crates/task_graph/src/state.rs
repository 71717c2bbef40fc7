use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotScheduled = 0,
    Scheduled = 1,
    Running = 2,
    Completed = 3,
    Cancelled = 4,
}

impl TaskState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => TaskState::NotScheduled,
            1 => TaskState::Scheduled,
            2 => TaskState::Running,
            3 => TaskState::Completed,
            4 => TaskState::Cancelled,
            other => panic!("invalid task state discriminant {other}"),
        }
    }
}

#[derive(Debug)]
pub struct AtomicTaskState(AtomicU8);

impl AtomicTaskState {
    pub fn new() -> Self {
        Self(AtomicU8::new(TaskState::NotScheduled as u8))
    }

    pub fn load(&self) -> TaskState {
        TaskState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Moves `from -> to`. On failure returns the state actually observed.
    pub fn transition(&self, from: TaskState, to: TaskState) -> Result<(), TaskState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(TaskState::from_raw)
    }

    pub(crate) fn expect_transition(&self, from: TaskState, to: TaskState) {
        if let Err(actual) = self.transition(from, to) {
            panic!("task state transition {from:?} -> {to:?} rejected: task is {actual:?}");
        }
    }
}

impl Default for AtomicTaskState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_compare_and_swap() {
        let state = AtomicTaskState::new();
        assert_eq!(state.load(), TaskState::NotScheduled);
        assert_eq!(
            state.transition(TaskState::NotScheduled, TaskState::Scheduled),
            Ok(())
        );
        assert_eq!(
            state.transition(TaskState::NotScheduled, TaskState::Scheduled),
            Err(TaskState::Scheduled)
        );
        state.expect_transition(TaskState::Scheduled, TaskState::Running);
        assert_eq!(state.load(), TaskState::Running);
    }

    #[test]
    #[should_panic(expected = "rejected: task is Running")]
    fn running_twice_panics() {
        let state = AtomicTaskState::new();
        state.expect_transition(TaskState::NotScheduled, TaskState::Scheduled);
        state.expect_transition(TaskState::Scheduled, TaskState::Running);
        state.expect_transition(TaskState::Scheduled, TaskState::Running);
    }
}
