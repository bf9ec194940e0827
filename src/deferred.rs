//! The settle-once container and its `then` chaining.
use std::{
    cell::RefCell,
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use crate::scheduler::Handle;

/// What a handler returns on success: a plain value, or another container
/// whose eventual outcome should be adopted.
pub enum Resolution<T, E> {
    Value(T),
    Deferred(DeferredResult<T, E>),
}

impl<T, E> From<DeferredResult<T, E>> for Resolution<T, E> {
    fn from(deferred: DeferredResult<T, E>) -> Self {
        Resolution::Deferred(deferred)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Deferred(deferred) => f.debug_tuple("Deferred").field(deferred).finish(),
        }
    }
}

/// Return type of `then` handlers. `Err` rejects the chained container.
pub type HandlerResult<T, E> = Result<Resolution<T, E>, E>;

/// Lifecycle of a [`DeferredResult`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    Pending,
    Fulfilled,
    Rejected,
}

enum State<T, E> {
    Pending(Vec<Waiter<T, E>>),
    Fulfilled(T),
    Rejected(E),
}

struct Waiter<T, E> {
    on_fulfilled: Box<dyn FnOnce(T)>,
    on_rejected: Box<dyn FnOnce(E)>,
}

impl<T, E> Waiter<T, E> {
    fn dispatch(self, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => (self.on_fulfilled)(value),
            Err(reason) => (self.on_rejected)(reason),
        }
    }
}

/// The eventual result of an operation that completes exactly once.
///
/// Clones share the same settlement. Callbacks attached through
/// [`then`](Self::then) always run on the scheduler, never inline, whether
/// they were attached before or after settlement.
///
/// # Examples
///
/// ```
/// use deferred_result::{DeferredResult, EventLoop, LoopConfig, Resolution};
///
/// let event_loop = EventLoop::with_config(LoopConfig::virtual_time());
/// let handle = event_loop.handle();
/// let inner = handle.clone();
/// let chained = DeferredResult::<i32, String>::resolved(&handle, Resolution::Value(1))
///     .and_then(move |v| {
///         let next = DeferredResult::resolved(&inner, Resolution::Value(v + 1));
///         Ok(Resolution::Deferred(next))
///     });
/// assert_eq!(event_loop.block_on(chained), Ok(Ok(2)));
/// ```
pub struct DeferredResult<T, E> {
    state: Rc<RefCell<State<T, E>>>,
    handle: Handle,
}

/// The settle capabilities handed to an initializer.
///
/// Only the first call to [`fulfill`](Self::fulfill), [`reject`](Self::reject)
/// or [`resolve`](Self::resolve) has any effect.
pub struct Resolver<T, E> {
    state: Rc<RefCell<State<T, E>>>,
    handle: Handle,
}

impl<T, E> Clone for DeferredResult<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Resolver<T, E> {
    pub fn fulfill(&self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(&self, reason: E) {
        self.settle(Err(reason));
    }

    /// Fulfills with a plain value, or follows a container until it settles.
    pub fn resolve(&self, resolution: Resolution<T, E>) {
        match resolution {
            Resolution::Value(value) => self.fulfill(value),
            Resolution::Deferred(deferred) => deferred.forward_to(self.clone()),
        }
    }

    // Waiters run as one task; a panic in one skips the rest of the batch.
    fn settle(&self, outcome: Result<T, E>) {
        let mut state = self.state.borrow_mut();
        let State::Pending(waiters) = &mut *state else {
            tracing::trace!("already settled, ignoring");
            return;
        };
        let waiters = std::mem::take(waiters);
        *state = match &outcome {
            Ok(value) => State::Fulfilled(value.clone()),
            Err(reason) => State::Rejected(reason.clone()),
        };
        drop(state);

        tracing::trace!(
            fulfilled = outcome.is_ok(),
            waiters = waiters.len(),
            "settled"
        );
        if waiters.is_empty() {
            return;
        }
        self.handle.schedule(Box::new(move || {
            for waiter in waiters {
                waiter.dispatch(outcome.clone());
            }
        }));
    }

    fn complete_with<P, H>(&self, handler: H, payload: P)
    where
        H: FnOnce(P) -> HandlerResult<T, E>,
    {
        match handler(payload) {
            Ok(resolution) => self.resolve(resolution),
            Err(reason) => self.reject(reason),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> DeferredResult<T, E> {
    /// Creates a container and runs `initializer` on it synchronously.
    ///
    /// An `Err` from the initializer rejects the container.
    pub fn new<F>(handle: &Handle, initializer: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let deferred = DeferredResult {
            state: Rc::new(RefCell::new(State::Pending(Vec::new()))),
            handle: handle.clone(),
        };
        let resolver = Resolver {
            state: deferred.state.clone(),
            handle: handle.clone(),
        };
        if let Err(reason) = initializer(resolver.clone()) {
            tracing::debug!("initializer failed, rejecting");
            resolver.reject(reason);
        }
        deferred
    }

    /// Chains handlers for both outcomes and returns the container that
    /// settles with whatever the invoked handler produces.
    ///
    /// A handler returning [`Resolution::Deferred`] makes the returned
    /// container follow that inner container, so results never nest.
    pub fn then<U, E2, F, R>(&self, on_fulfilled: F, on_rejected: R) -> DeferredResult<U, E2>
    where
        U: Clone + 'static,
        E2: Clone + 'static,
        F: FnOnce(T) -> HandlerResult<U, E2> + 'static,
        R: FnOnce(E) -> HandlerResult<U, E2> + 'static,
    {
        DeferredResult::new(&self.handle, |resolver| {
            let rejecting = resolver.clone();
            self.react(Waiter {
                on_fulfilled: Box::new(move |value| resolver.complete_with(on_fulfilled, value)),
                on_rejected: Box::new(move |reason| rejecting.complete_with(on_rejected, reason)),
            });
            Ok(())
        })
    }

    /// [`then`](Self::then) with a rejection handler that passes the reason on.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> DeferredResult<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> HandlerResult<U, E> + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// [`then`](Self::then) with a fulfillment handler that passes the value on.
    pub fn catch<R>(&self, on_rejected: R) -> DeferredResult<T, E>
    where
        R: FnOnce(E) -> HandlerResult<T, E> + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    pub fn map<U, F>(&self, f: F) -> DeferredResult<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.and_then(|value| Ok(Resolution::Value(f(value))))
    }

    pub fn state(&self) -> DeferredState {
        match &*self.state.borrow() {
            State::Pending(_) => DeferredState::Pending,
            State::Fulfilled(_) => DeferredState::Fulfilled,
            State::Rejected(_) => DeferredState::Rejected,
        }
    }

    /// Returns a copy of the outcome if the container has settled.
    pub fn peek(&self) -> Option<Result<T, E>> {
        match &*self.state.borrow() {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Settles `resolver` the same way this container settles.
    pub(crate) fn forward_to(&self, resolver: Resolver<T, E>) {
        let rejecting = resolver.clone();
        self.react(Waiter {
            on_fulfilled: Box::new(move |value| resolver.fulfill(value)),
            on_rejected: Box::new(move |reason| rejecting.reject(reason)),
        });
    }

    /// Queues `waiter` while pending, otherwise schedules it right away.
    fn react(&self, waiter: Waiter<T, E>) {
        let mut state = self.state.borrow_mut();
        let outcome = match &mut *state {
            State::Pending(waiters) => {
                waiters.push(waiter);
                return;
            }
            State::Fulfilled(value) => Ok(value.clone()),
            State::Rejected(reason) => Err(reason.clone()),
        };
        drop(state);
        self.handle.schedule(Box::new(move || waiter.dispatch(outcome)));
    }

    pub(crate) fn on_settled(
        &self,
        on_fulfilled: Box<dyn FnOnce(T)>,
        on_rejected: Box<dyn FnOnce(E)>,
    ) {
        self.react(Waiter {
            on_fulfilled,
            on_rejected,
        });
    }
}

impl<T, E> fmt::Debug for DeferredResult<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.borrow() {
            State::Pending(waiters) => format!("pending ({} waiters)", waiters.len()),
            State::Fulfilled(_) => "fulfilled".to_owned(),
            State::Rejected(_) => "rejected".to_owned(),
        };
        f.debug_struct("DeferredResult")
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

/// Future returned by awaiting a [`DeferredResult`].
#[derive(Debug)]
pub struct Settlement<T, E> {
    deferred: DeferredResult<T, E>,
    waker: Option<Rc<RefCell<Waker>>>,
}

impl<T: Clone + 'static, E: Clone + 'static> Future for Settlement<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.deferred.peek() {
            return Poll::Ready(outcome);
        }
        match &this.waker {
            Some(slot) => {
                *slot.borrow_mut() = cx.waker().clone();
            }
            None => {
                let slot = Rc::new(RefCell::new(cx.waker().clone()));
                let (on_fulfilled, on_rejected) = (slot.clone(), slot.clone());
                this.deferred.on_settled(
                    Box::new(move |_| on_fulfilled.borrow().wake_by_ref()),
                    Box::new(move |_| on_rejected.borrow().wake_by_ref()),
                );
                this.waker = Some(slot);
            }
        }
        Poll::Pending
    }
}

impl<T: Clone + 'static, E: Clone + 'static> IntoFuture for DeferredResult<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Settlement<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        Settlement {
            deferred: self,
            waker: None,
        }
    }
}
