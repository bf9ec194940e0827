//! Event loop configuration.

/// How an [`EventLoop`](crate::EventLoop) measures time for delayed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    /// Wall clock. Waiting for a timer sleeps the current thread.
    #[default]
    Real,
    /// Deterministic clock that jumps straight to the next timer deadline.
    Virtual,
}

/// Settings for an [`EventLoop`](crate::EventLoop).
///
/// # Examples
///
/// ```
/// use deferred_result::{ClockMode, LoopConfig};
///
/// let config = LoopConfig::virtual_time().with_task_budget(1_000);
/// assert_eq!(config.clock, ClockMode::Virtual);
/// assert_eq!(config.task_budget, Some(1_000));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopConfig {
    pub clock: ClockMode,
    /// Upper bound on the total number of tasks the loop will run.
    pub task_budget: Option<usize>,
}

impl LoopConfig {
    pub fn virtual_time() -> Self {
        Self {
            clock: ClockMode::Virtual,
            ..Self::default()
        }
    }

    pub fn with_task_budget(mut self, budget: usize) -> Self {
        self.task_budget = Some(budget);
        self
    }
}
