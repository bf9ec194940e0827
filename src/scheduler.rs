//! Task scheduling for deferred results.
//!
//! A [`DeferredResult`](crate::DeferredResult) never runs a callback inline.
//! Every callback goes through a [`Schedule`] implementation reached via a
//! [`Handle`]. The crate ships [`EventLoop`], a single-threaded queue with a
//! timer heap, but any scheduler honouring the FIFO contract can be injected.
use std::{
    cell::{Cell, RefCell},
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    fmt,
    future::{Future, IntoFuture},
    rc::Rc,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use crate::{config::ClockMode, Error, LoopConfig};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + 'static>;

/// The "run this later" capability deferred results are built on.
pub trait Schedule {
    /// Queues `task` to run after the current call stack unwinds, behind every
    /// task queued before it.
    fn schedule(&self, task: Task);

    /// Queues `task` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, task: Task);
}

/// Shared reference to a scheduler.
#[derive(Clone)]
pub struct Handle {
    scheduler: Rc<dyn Schedule>,
}

impl Handle {
    pub(crate) fn schedule(&self, task: Task) {
        self.scheduler.schedule(task);
    }

    pub(crate) fn schedule_after(&self, delay: Duration, task: Task) {
        self.scheduler.schedule_after(delay, task);
    }
}

impl<S: Schedule + 'static> From<Rc<S>> for Handle {
    fn from(scheduler: Rc<S>) -> Self {
        Handle { scheduler }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

/// Single-threaded task queue with timers.
///
/// # Examples
///
/// ```
/// use deferred_result::{DeferredResult, EventLoop, LoopConfig, Resolution};
/// use std::time::Duration;
///
/// let event_loop = EventLoop::with_config(LoopConfig::virtual_time());
/// let late = DeferredResult::<&str, ()>::resolve_delay(
///     &event_loop.handle(),
///     Resolution::Value("late"),
///     Duration::from_millis(25),
/// );
/// assert_eq!(event_loop.block_on(late), Ok(Ok("late")));
/// assert_eq!(event_loop.elapsed(), Duration::from_millis(25));
/// ```
#[derive(Debug, Default)]
pub struct EventLoop {
    shared: Rc<Shared>,
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LoopConfig) -> Self {
        EventLoop {
            shared: Rc::new(Shared::new(config)),
        }
    }

    pub fn handle(&self) -> Handle {
        Handle::from(self.shared.clone())
    }

    /// Time on the loop clock since the loop was created.
    pub fn elapsed(&self) -> Duration {
        self.shared.clock.now()
    }

    /// Number of tasks currently queued, not counting timers.
    pub fn queued(&self) -> usize {
        self.shared.queue.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.shared.timers.borrow().len()
    }

    /// Runs queued tasks until the queue is empty, including tasks queued
    /// along the way. Timers are left alone.
    ///
    /// A panicking task unwinds out of this call, and the remaining waiters
    /// of its settlement batch are dropped without running.
    pub fn run_until_stalled(&self) -> Result<usize, Error> {
        let mut ran = 0;
        loop {
            let next = self.shared.queue.borrow_mut().pop_front();
            let Some(task) = next else {
                return Ok(ran);
            };
            self.shared.charge()?;
            task();
            ran += 1;
        }
    }

    /// Waits for the earliest timer and queues its task.
    ///
    /// Returns `false` when there are no timers left.
    pub fn advance(&self) -> bool {
        let next = self.shared.timers.borrow_mut().pop();
        let Some(timer) = next else {
            return false;
        };
        self.shared.clock.wait_until(timer.deadline);
        tracing::trace!(deadline = ?timer.deadline, seq = timer.seq, "timer fired");
        self.shared.queue.borrow_mut().push_back(timer.task);
        true
    }

    /// Runs until neither tasks nor timers remain.
    pub fn run(&self) -> Result<usize, Error> {
        let mut ran = 0;
        loop {
            ran += self.run_until_stalled()?;
            if !self.advance() {
                return Ok(ran);
            }
        }
    }

    /// Drives the loop until `future` completes.
    ///
    /// Fails with [`Error::Stalled`] if the loop runs out of work first.
    pub fn block_on<F: IntoFuture>(&self, future: F) -> Result<F::Output, Error> {
        let mut future = std::pin::pin!(future.into_future());
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Ok(output);
            }
            if self.run_until_stalled()? > 0 {
                continue;
            }
            if !self.advance() {
                tracing::debug!("event loop ran dry before the future completed");
                return Err(Error::Stalled);
            }
        }
    }
}

impl Drop for EventLoop {
    // Queued tasks hold handles back to the loop; release them so the loop can go.
    fn drop(&mut self) {
        loop {
            let tasks = std::mem::take(&mut *self.shared.queue.borrow_mut());
            let timers = std::mem::take(&mut *self.shared.timers.borrow_mut());
            if tasks.is_empty() && timers.is_empty() {
                return;
            }
            tracing::trace!(
                tasks = tasks.len(),
                timers = timers.len(),
                "dropping unfinished work"
            );
            drop(tasks);
            drop(timers);
        }
    }
}

struct Shared {
    queue: RefCell<VecDeque<Task>>,
    timers: RefCell<BinaryHeap<TimerEntry>>,
    clock: Clock,
    next_seq: Cell<u64>,
    tasks_run: Cell<usize>,
    task_budget: Option<usize>,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("queued", &self.queue.borrow().len())
            .field("timers", &self.timers.borrow().len())
            .field("clock", &self.clock)
            .field("tasks_run", &self.tasks_run.get())
            .field("task_budget", &self.task_budget)
            .finish()
    }
}

impl Default for Shared {
    fn default() -> Self {
        Shared::new(LoopConfig::default())
    }
}

impl Shared {
    fn new(config: LoopConfig) -> Self {
        Shared {
            queue: RefCell::new(VecDeque::new()),
            timers: RefCell::new(BinaryHeap::with_capacity(16)),
            clock: Clock::new(config.clock),
            next_seq: Cell::new(0),
            tasks_run: Cell::new(0),
            task_budget: config.task_budget,
        }
    }

    fn charge(&self) -> Result<(), Error> {
        let used = self.tasks_run.get() + 1;
        self.tasks_run.set(used);
        match self.task_budget {
            Some(budget) if used > budget => {
                tracing::debug!(budget, "task budget exhausted");
                Err(Error::BudgetExhausted(budget))
            }
            _ => Ok(()),
        }
    }
}

impl Schedule for Shared {
    fn schedule(&self, task: Task) {
        let mut queue = self.queue.borrow_mut();
        queue.push_back(task);
        tracing::trace!(queued = queue.len(), "task scheduled");
    }

    fn schedule_after(&self, delay: Duration, task: Task) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let deadline = self.clock.now().saturating_add(delay);
        tracing::trace!(?deadline, seq, "timer scheduled");
        self.timers.borrow_mut().push(TimerEntry {
            deadline,
            seq,
            task,
        });
    }
}

#[derive(Debug)]
enum Clock {
    Real { origin: Instant },
    Virtual { now: Cell<Duration> },
}

impl Clock {
    fn new(mode: ClockMode) -> Self {
        match mode {
            ClockMode::Real => Clock::Real {
                origin: Instant::now(),
            },
            ClockMode::Virtual => Clock::Virtual {
                now: Cell::new(Duration::ZERO),
            },
        }
    }

    fn now(&self) -> Duration {
        match self {
            Clock::Real { origin } => origin.elapsed(),
            Clock::Virtual { now } => now.get(),
        }
    }

    fn wait_until(&self, deadline: Duration) {
        match self {
            Clock::Real { origin } => {
                let now = origin.elapsed();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                }
            }
            Clock::Virtual { now } => {
                if deadline > now.get() {
                    now.set(deadline);
                }
            }
        }
    }
}

struct TimerEntry {
    deadline: Duration,
    seq: u64,
    task: Task,
}

impl fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerEntry")
            .field("deadline", &self.deadline)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the earliest deadline first.
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}
