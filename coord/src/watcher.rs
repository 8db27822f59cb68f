//! Change notification primitive.
//!
//! A [`Notifier`] signals "something changed" without carrying the change
//! itself. Each [`NotifyWatcher`] sees at most one pending notification at a
//! time: any number of `notify()` calls made while the watcher is busy
//! collapse into a single wake-up.

use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
struct Feed {
    seq: u64,
    done: bool,
    err: Option<Error>,
}

/// Sending half. Cheap to clone; all clones feed the same watchers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Arc<watch::Sender<Feed>>,
}

/// Receiving half handed to a worker by its set-up step.
#[derive(Debug)]
pub struct NotifyWatcher {
    rx: watch::Receiver<Feed>,
    keepalive: Option<Arc<watch::Sender<Feed>>>,
    stopped: bool,
}

pub fn channel() -> (Notifier, NotifyWatcher) {
    let notifier = Notifier::new();
    let watcher = notifier.subscribe();
    (notifier, watcher)
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Feed::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> NotifyWatcher {
        NotifyWatcher {
            rx: self.tx.subscribe(),
            keepalive: None,
            stopped: false,
        }
    }

    pub fn notify(&self) {
        self.tx.send_modify(|feed| {
            if !feed.done {
                feed.seq = feed.seq.wrapping_add(1);
            }
        });
    }

    /// Ends the feed for every watcher. `err` becomes the terminal error they
    /// report; `None` means a clean end.
    pub fn kill(&self, err: Option<Error>) {
        self.tx.send_modify(|feed| {
            if !feed.done {
                feed.done = true;
                feed.err = err;
            }
        });
    }

    pub fn watcher_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyWatcher {
    /// A watcher that never fires. Used by workers driven only by a timer.
    pub fn pending() -> Self {
        let notifier = Notifier::new();
        let mut watcher = notifier.subscribe();
        watcher.keepalive = Some(notifier.tx);
        watcher
    }

    /// Waits for the next change. Returns `false` once the feed has ended or
    /// the watcher was stopped; the reason is available from [`Self::err`].
    pub async fn changed(&mut self) -> bool {
        if self.stopped || self.rx.borrow().done {
            return false;
        }
        match self.rx.changed().await {
            Ok(()) => !self.rx.borrow_and_update().done,
            Err(_) => false,
        }
    }

    /// Terminal error of the feed, if it ended with one.
    pub fn err(&self) -> Result<()> {
        match &self.rx.borrow().err {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// The error a worker should stop with after [`Self::changed`] returned
    /// `false` without being asked to.
    pub fn terminal_error(&self) -> Error {
        self.err().err().unwrap_or(Error::WatcherClosed)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        self.keepalive = None;
        self.err()
    }
}
