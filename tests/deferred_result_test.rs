#[cfg(test)]
mod tests {
    use deferred_result::{
        DeferredResult, DeferredState, EventLoop, HandlerResult, LoopConfig, Resolution, Resolver,
    };
    use std::{cell::RefCell, rc::Rc, time::Duration};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn virtual_loop() -> EventLoop {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        EventLoop::with_config(LoopConfig::virtual_time())
    }

    fn pending<T: Clone + 'static, E: Clone + 'static>(
        event_loop: &EventLoop,
    ) -> (DeferredResult<T, E>, Resolver<T, E>) {
        let mut slot = None;
        let deferred = DeferredResult::new(&event_loop.handle(), |resolver| {
            slot = Some(resolver);
            Ok(())
        });
        (deferred, slot.expect("initializer runs synchronously"))
    }

    #[test]
    fn settled_containers_ignore_later_settlement() {
        let event_loop = virtual_loop();
        let (deferred, resolver) = pending::<&str, &str>(&event_loop);
        resolver.reject("first");
        resolver.fulfill("second");
        resolver.reject("third");
        event_loop.run().unwrap();
        assert_eq!(deferred.state(), DeferredState::Rejected);
        assert_eq!(deferred.peek(), Some(Err("first")));
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let event_loop = virtual_loop();
        let (deferred, resolver) = pending::<u8, ()>(&event_loop);
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["h1", "h2", "h3"] {
            let log = log.clone();
            deferred.map(move |_| log.borrow_mut().push(name));
        }
        resolver.fulfill(0);
        assert!(log.borrow().is_empty(), "handlers must not run inline");
        event_loop.run().unwrap();
        assert_eq!(*log.borrow(), ["h1", "h2", "h3"]);
    }

    #[test]
    fn returned_containers_are_flattened() {
        let event_loop = virtual_loop();
        let handle = event_loop.handle();
        let inner = handle.clone();
        let chained = DeferredResult::<i32, ()>::resolved(&handle, Resolution::Value(1))
            .and_then(move |v| {
                let next = DeferredResult::resolved(&inner, Resolution::Value(v + 1));
                Ok(Resolution::Deferred(next))
            });
        assert_eq!(event_loop.block_on(chained), Ok(Ok(2)));
    }

    #[test]
    fn failures_pass_through_until_caught() {
        let event_loop = virtual_loop();
        let handle = event_loop.handle();
        let caught = DeferredResult::<&str, &str>::resolved(&handle, Resolution::Value("1"))
            .and_then(|_| -> HandlerResult<&str, &str> { Err("x") })
            .map(|v| v)
            .catch(|reason| Ok(Resolution::Value(reason)));
        assert_eq!(event_loop.block_on(caught), Ok(Ok("x")));
    }

    #[test]
    fn all_reports_values_in_input_order() {
        let event_loop = virtual_loop();
        let handle = event_loop.handle();
        let all = DeferredResult::<i32, ()>::all(
            &handle,
            [
                DeferredResult::resolve_delay(&handle, Resolution::Value(1), ms(30)),
                DeferredResult::resolved(&handle, Resolution::Value(2)),
                DeferredResult::resolve_delay(&handle, Resolution::Value(3), ms(10)),
            ],
        );
        assert_eq!(event_loop.block_on(all), Ok(Ok(vec![1, 2, 3])));
    }

    #[test]
    fn all_short_circuits_on_rejection() {
        let event_loop = virtual_loop();
        let handle = event_loop.handle();
        let all = DeferredResult::<i32, &str>::all(
            &handle,
            [
                DeferredResult::resolved(&handle, Resolution::Value(1)),
                DeferredResult::rejected(&handle, "boom"),
                DeferredResult::resolve_delay(&handle, Resolution::Value(3), ms(50)),
            ],
        );
        assert_eq!(event_loop.block_on(all), Ok(Err("boom")));
        assert!(event_loop.elapsed() < ms(50));
        assert_eq!(event_loop.pending_timers(), 1);
    }

    #[test]
    fn race_is_won_by_the_earliest_settlement() {
        let event_loop = virtual_loop();
        let handle = event_loop.handle();
        let race = DeferredResult::<i32, ()>::race(
            &handle,
            [
                DeferredResult::resolve_delay(&handle, Resolution::Value(1), ms(50)),
                DeferredResult::resolve_delay(&handle, Resolution::Value(2), ms(10)),
            ],
        );
        assert_eq!(event_loop.block_on(race), Ok(Ok(2)));
    }

    #[test]
    fn all_of_nothing_is_an_empty_vec() {
        let event_loop = virtual_loop();
        let nothing = Vec::<DeferredResult<i32, ()>>::new();
        let all = DeferredResult::<i32, ()>::all(&event_loop.handle(), nothing);
        assert_eq!(event_loop.block_on(all), Ok(Ok(vec![])));
    }

    #[test]
    fn chains_can_be_awaited_inside_async_blocks() {
        let event_loop = virtual_loop();
        let handle = event_loop.handle();
        let first =
            DeferredResult::<u32, String>::resolve_delay(&handle, Resolution::Value(4), ms(8));
        let second = DeferredResult::<u32, String>::reject_delay(&handle, "no".to_owned(), ms(4));
        let total = event_loop
            .block_on(async move {
                let a = first.await?;
                let b = second.catch(|_| Ok(Resolution::Value(6))).await?;
                Ok::<_, String>(a + b)
            })
            .unwrap();
        assert_eq!(total, Ok(10));
    }

    #[test]
    fn real_clock_delays_settlement() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let late =
            DeferredResult::<&str, ()>::resolve_delay(&handle, Resolution::Value("done"), ms(10));
        assert_eq!(event_loop.block_on(late), Ok(Ok("done")));
        assert!(event_loop.elapsed() >= ms(10));
    }
}
