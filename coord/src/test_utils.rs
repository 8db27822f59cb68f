use crate::{
    lease::{LeaseConfig, LeaseCoordinator},
    storage::InMemoryStorage,
    time::ManualClock,
    watcher::NotifyWatcher,
    worker::NotifyHandler,
    Error, Result,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Upper bound for anything a test waits on; only reached when it fails.
pub const WORST_CASE: Duration = Duration::from_secs(5);

/// Coordinator over in-memory storage with a clock the test controls.
pub fn manual_coordinator(max_duration: Duration) -> (Arc<LeaseCoordinator>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_at(Duration::from_secs(1_000_000)));
    let coordinator = LeaseCoordinator::new(
        LeaseConfig { max_duration },
        clock.clone(),
        Arc::new(InMemoryStorage::new()),
    );
    (Arc::new(coordinator), clock)
}

/// Polls `condition` until it holds, panicking after [`WORST_CASE`].
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + WORST_CASE;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Debug, Default)]
pub struct HandlerCalls {
    set_up: AtomicUsize,
    handle: AtomicUsize,
    ticks: AtomicUsize,
    tear_down: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl HandlerCalls {
    pub fn set_up(&self) -> usize {
        self.set_up.load(Ordering::SeqCst)
    }

    pub fn handle(&self) -> usize {
        self.handle.load(Ordering::SeqCst)
    }

    /// Timer-driven calls; each also counts as a `handle`.
    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn tear_down(&self) -> usize {
        self.tear_down.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Handler whose behaviour is fixed up front and whose calls are counted.
pub struct ScriptedHandler {
    calls: Arc<HandlerCalls>,
    watcher: Option<NotifyWatcher>,
    set_up_error: Option<Error>,
    tear_down_error: Option<Error>,
    results: VecDeque<Result<()>>,
    handle_delay: Duration,
    tick: Option<Duration>,
}

impl ScriptedHandler {
    pub fn new(watcher: NotifyWatcher) -> Self {
        Self {
            calls: Arc::new(HandlerCalls::default()),
            watcher: Some(watcher),
            set_up_error: None,
            tear_down_error: None,
            results: VecDeque::new(),
            handle_delay: Duration::ZERO,
            tick: None,
        }
    }

    pub fn calls(&self) -> Arc<HandlerCalls> {
        self.calls.clone()
    }

    pub fn failing_set_up(mut self, err: Error) -> Self {
        self.set_up_error = Some(err);
        self
    }

    pub fn failing_tear_down(mut self, err: Error) -> Self {
        self.tear_down_error = Some(err);
        self
    }

    /// Results of successive `handle` calls; once used up, calls succeed.
    pub fn with_results(mut self, results: Vec<Result<()>>) -> Self {
        self.results = results.into();
        self
    }

    pub fn with_handle_delay(mut self, delay: Duration) -> Self {
        self.handle_delay = delay;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = Some(tick);
        self
    }
}

#[async_trait]
impl NotifyHandler for ScriptedHandler {
    async fn set_up(&mut self) -> Result<NotifyWatcher> {
        self.calls.set_up.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.set_up_error.take() {
            return Err(err);
        }
        Ok(self.watcher.take().unwrap_or_else(NotifyWatcher::pending))
    }

    async fn handle(&mut self) -> Result<()> {
        let in_flight = self.calls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        self.calls.handle.fetch_add(1, Ordering::SeqCst);
        if !self.handle_delay.is_zero() {
            sleep(self.handle_delay).await;
        }
        self.calls.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.results.pop_front().unwrap_or(Ok(()))
    }

    async fn tick(&mut self) -> Result<()> {
        self.calls.ticks.fetch_add(1, Ordering::SeqCst);
        self.handle().await
    }

    async fn tear_down(&mut self) -> Result<()> {
        self.calls.tear_down.fetch_add(1, Ordering::SeqCst);
        match self.tear_down_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_tick(&self) -> Option<Duration> {
        self.tick
    }
}
