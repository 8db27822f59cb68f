use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Point in time, measured from the Unix epoch. Only ever produced by a
/// [`Clock`], so comparisons between readings of one clock are monotonic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub fn from_unix(since_epoch: Duration) -> Self {
        Self(since_epoch)
    }

    pub fn as_unix(&self) -> Duration {
        self.0
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration))
    }

    /// Time left until `self`, zero if `self` is not after `now`.
    pub fn saturating_duration_since(self, now: Timestamp) -> Duration {
        self.0.saturating_sub(now.0)
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.0.as_secs()).ok()?;
        DateTime::<Utc>::from_timestamp(secs, self.0.subsec_nanos())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{:?}", self.0),
        }
    }
}

/// Source of time for lease expiry decisions. Must never go backwards.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Wall clock with a high-water mark so that readings never decrease, even
/// when the system clock is stepped back.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_nanos: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall_nanos = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|nanos| u64::try_from(nanos).ok())
            .unwrap_or(0);
        let previous = self.last_nanos.fetch_max(wall_nanos, Ordering::SeqCst);
        Timestamp(Duration::from_nanos(previous.max(wall_nanos)))
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(u64::try_from(start.as_nanos()).unwrap_or(u64::MAX)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_add(by)))
            .ok();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(Duration::from_nanos(self.nanos.load(Ordering::SeqCst)))
    }
}
