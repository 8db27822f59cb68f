#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

//! Coordination core shared by every agent: leadership leases, the worker
//! execution engine, and the facade plumbing between them.

pub mod api;
pub mod client;
pub mod error;
pub mod leader;
pub mod lease;
pub mod rpc;
pub mod storage;
pub mod time;
pub mod watcher;
pub mod worker;

pub mod test_utils;

pub use error::{Error, Result};
pub use leader::{start_leadership_worker, Claimer, LeadershipStatus, LeadershipWorkerConfig};
pub use lease::{LeaseConfig, LeaseCoordinator};
pub use watcher::{Notifier, NotifyWatcher};
pub use worker::{NotifyHandler, Worker, WorkerState};
