//! Worker execution engine.
//!
//! Every long-lived agent task runs as a [`Worker`] wrapping a
//! [`NotifyHandler`]: set up a watch, react to each change, tear down once.
//! Transient failures end the worker with the handler's error and leave
//! restart policy to whoever owns the worker. [`Error::Terminate`] ends it
//! for good.

use crate::{watcher::NotifyWatcher, Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Stopping,
    Stopped(Result<()>),
}

impl WorkerState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, WorkerState::Stopped(_))
    }
}

/// The reactive part of a worker.
///
/// `handle` runs once right after a successful `set_up`, then once per
/// wake-up of the watcher. `tick` runs whenever the timer fires. Calls never
/// overlap.
/// `tear_down` runs exactly once whatever the exit path, including a failed
/// `set_up`.
#[async_trait]
pub trait NotifyHandler: Send + 'static {
    async fn set_up(&mut self) -> Result<NotifyWatcher>;

    async fn handle(&mut self) -> Result<()>;

    async fn tear_down(&mut self) -> Result<()>;

    /// Timer wake-up; runs `handle` unless overridden.
    async fn tick(&mut self) -> Result<()> {
        self.handle().await
    }

    /// Timer period, asked after every call. The deadline moves only when
    /// the timer has just fired or the period changed, so notifications
    /// cannot starve it. `None` disables the timer.
    fn next_tick(&self) -> Option<Duration> {
        None
    }
}

/// Handle to a running worker. Dropping it asks the worker to stop.
#[derive(Debug)]
pub struct Worker {
    id: WorkerId,
    name: String,
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<WorkerState>,
}

impl Worker {
    /// Spawns the worker on the current tokio runtime and returns at once;
    /// `set_up` runs on the spawned task.
    pub fn start<H: NotifyHandler>(name: impl Into<String>, handler: H) -> Self {
        let id = WorkerId::new();
        let name = name.into();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(WorkerState::Starting);

        tokio::spawn(run(handler, name.clone(), stop_rx, state_tx));
        debug!(worker = %name, id = %id, "worker starting");

        Self {
            id,
            name,
            stop_tx,
            state_rx,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.state_rx.borrow().clone()
    }

    /// Asks the worker to stop without waiting for it.
    pub fn kill(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Waits for the worker to stop on its own and returns its final result.
    pub async fn wait(&self) -> Result<()> {
        let mut state_rx = self.state_rx.clone();
        loop {
            let current = state_rx.borrow_and_update().clone();
            if let WorkerState::Stopped(result) = current {
                return result;
            }
            if state_rx.changed().await.is_err() {
                let last = state_rx.borrow().clone();
                return match last {
                    WorkerState::Stopped(result) => result,
                    _ => Err(Error::Other(format!("worker {} exited without a result", self.name))),
                };
            }
        }
    }

    /// Asks the worker to stop and waits for its final result. Safe to call
    /// any number of times; every call returns the same result.
    pub async fn stop(&self) -> Result<()> {
        self.kill();
        self.wait().await
    }
}

async fn run<H: NotifyHandler>(
    mut handler: H,
    name: String,
    mut stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<WorkerState>,
) {
    let outcome = match handler.set_up().await {
        Ok(mut watcher) => {
            state_tx.send_replace(WorkerState::Running);
            info!(worker = %name, "worker running");
            let outcome = react(&mut handler, &mut watcher, &mut stop_rx).await;
            if let Err(err) = watcher.stop() {
                debug!(worker = %name, error = %err, "watcher ended with error");
            }
            outcome
        }
        Err(err) => Err(err),
    };

    state_tx.send_replace(WorkerState::Stopping);
    let torn_down = handler.tear_down().await;
    let result = match (outcome, torn_down) {
        (Err(err), _) | (Ok(()), Err(err)) => Err(err),
        (Ok(()), Ok(())) => Ok(()),
    };

    match &result {
        Ok(()) => info!(worker = %name, "worker stopped"),
        Err(err) if err.is_terminate() => warn!(worker = %name, error = %err, "worker terminated permanently"),
        Err(err) => error!(worker = %name, error = %err, "worker failed"),
    }
    state_tx.send_replace(WorkerState::Stopped(result));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    Idle,
    // The synthetic change every worker gets at start.
    Start,
    Change,
    Tick,
}

async fn react<H: NotifyHandler>(
    handler: &mut H,
    watcher: &mut NotifyWatcher,
    stop_rx: &mut watch::Receiver<bool>,
) -> Result<()> {
    let timer = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(timer);
    let mut armed: Option<Duration> = None;
    let mut wake = Wake::Start;
    loop {
        if *stop_rx.borrow_and_update() {
            return Ok(());
        }
        match wake {
            Wake::Idle => {}
            Wake::Start | Wake::Change => handler.handle().await?,
            Wake::Tick => handler.tick().await?,
        }
        if wake != Wake::Idle {
            let period = handler.next_tick();
            if matches!(wake, Wake::Start | Wake::Tick) || period != armed {
                if let Some(period) = period {
                    timer.as_mut().reset(Instant::now() + period);
                }
                armed = period;
            }
        }

        wake = Wake::Idle;
        tokio::select! {
            biased;
            stop = stop_rx.changed() => {
                if stop.is_err() {
                    return Ok(());
                }
            }
            () = &mut timer, if armed.is_some() => {
                wake = Wake::Tick;
            }
            changed = watcher.changed() => {
                if !changed {
                    return Err(watcher.terminal_error());
                }
                wake = Wake::Change;
            }
        }
    }
}
