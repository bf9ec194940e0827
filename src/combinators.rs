//! Ready-made constructors and the `all` / `race` aggregates.
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use crate::{DeferredResult, Handle, Resolution};

impl<T: Clone + 'static, E: Clone + 'static> DeferredResult<T, E> {
    /// A container for `resolution`: already fulfilled for a plain value,
    /// following the inner container otherwise.
    pub fn resolved(handle: &Handle, resolution: impl Into<Resolution<T, E>>) -> Self {
        let resolution = resolution.into();
        DeferredResult::new(handle, |resolver| {
            resolver.resolve(resolution);
            Ok(())
        })
    }

    /// An already rejected container. The reason is never unwrapped.
    pub fn rejected(handle: &Handle, reason: E) -> Self {
        DeferredResult::new(handle, |resolver| {
            resolver.reject(reason);
            Ok(())
        })
    }

    /// Like [`resolved`](Self::resolved), but settles once `delay` elapses.
    pub fn resolve_delay(
        handle: &Handle,
        resolution: impl Into<Resolution<T, E>>,
        delay: Duration,
    ) -> Self {
        let resolution = resolution.into();
        DeferredResult::new(handle, |resolver| {
            handle.schedule_after(delay, Box::new(move || resolver.resolve(resolution)));
            Ok(())
        })
    }

    pub fn reject_delay(handle: &Handle, reason: E, delay: Duration) -> Self {
        DeferredResult::new(handle, |resolver| {
            handle.schedule_after(delay, Box::new(move || resolver.reject(reason)));
            Ok(())
        })
    }

    /// Fulfills with every input's value, in input order, or rejects with the
    /// first rejection. An empty input fulfills with an empty `Vec`.
    ///
    /// # Examples
    ///
    /// ```
    /// use deferred_result::{DeferredResult, EventLoop, LoopConfig, Resolution};
    /// use std::time::Duration;
    ///
    /// let event_loop = EventLoop::with_config(LoopConfig::virtual_time());
    /// let handle = event_loop.handle();
    /// let slow = DeferredResult::<i32, String>::resolve_delay(
    ///     &handle,
    ///     Resolution::Value(1),
    ///     Duration::from_millis(30),
    /// );
    /// let inputs = vec![Resolution::Deferred(slow), Resolution::Value(2)];
    /// let all = DeferredResult::all(&handle, inputs);
    /// assert_eq!(event_loop.block_on(all), Ok(Ok(vec![1, 2])));
    /// ```
    pub fn all<I>(handle: &Handle, inputs: I) -> DeferredResult<Vec<T>, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        let inputs: Vec<_> = inputs
            .into_iter()
            .map(|input| Self::resolved(handle, input))
            .collect();
        DeferredResult::new(handle, |resolver| {
            let total = inputs.len();
            if total == 0 {
                resolver.fulfill(Vec::new());
                return Ok(());
            }
            let values: Rc<RefCell<Vec<Option<T>>>> =
                Rc::new(RefCell::new((0..total).map(|_| None).collect()));
            let completed = Rc::new(Cell::new(0));
            for (index, input) in inputs.iter().enumerate() {
                let (values, completed) = (values.clone(), completed.clone());
                let (fulfilling, rejecting) = (resolver.clone(), resolver.clone());
                input.on_settled(
                    Box::new(move |value| {
                        values.borrow_mut()[index] = Some(value);
                        completed.set(completed.get() + 1);
                        if completed.get() == total {
                            let values = values.take().into_iter().flatten().collect();
                            fulfilling.fulfill(values);
                        }
                    }),
                    Box::new(move |reason| rejecting.reject(reason)),
                );
            }
            Ok(())
        })
    }

    /// Settles like whichever input settles first.
    ///
    /// An empty input never settles.
    pub fn race<I>(handle: &Handle, inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        let inputs: Vec<_> = inputs
            .into_iter()
            .map(|input| Self::resolved(handle, input))
            .collect();
        DeferredResult::new(handle, |resolver| {
            if inputs.is_empty() {
                tracing::debug!("race over no inputs will stay pending");
            }
            for input in &inputs {
                input.forward_to(resolver.clone());
            }
            Ok(())
        })
    }
}
