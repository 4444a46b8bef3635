//! # Tally Runtime
//!
//! The async host around [`tally_engine`]: wall clock, platform key-value
//! storage, the remote gateway, platform signals, and the background
//! scheduler that drives the engine's pure state machines.
//!
//! The entry point is [`SyncService`], one per signed-in owner. The app
//! submits local mutations through it, wires platform connectivity and
//! lifecycle callbacks into a [`SignalHub`], and calls
//! [`SyncService::attach_signals`] once; everything after that happens on
//! the scheduler's runs.

pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod scheduler;
pub mod service;
pub mod signals;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, SyncConfig, DEFAULT_MIN_RUN_INTERVAL_MS};
pub use error::{Result, StoreError, SyncError};
pub use gateway::{MemoryGateway, RemoteGateway};
pub use scheduler::{RunOutcome, RunStatus, Scheduler, SyncTrigger};
pub use service::SyncService;
pub use signals::{LifecycleEvent, SignalBinding, SignalHub};
pub use store::{MemoryStore, OwnerStore, StateStore};

pub use tally_engine as engine;
