//! Event automation: a bounded queue of match and standings events handled
//! by a single worker.
//!
//! Producers (scorers, the admin desk, imports) submit [`AutomationEvent`]s
//! through an [`EventQueue`]. Submitting waits while the queue is full. The
//! [`AutomationWorker`] applies events one at a time in arrival order, commits
//! each through the store and then publishes [`Notification`]s.
//!
//! ## Example
//!
//! ```no_run
//! use courtside::automation::{AutomationConfig, AutomationWorker, LogBroadcaster, ShutdownMode};
//! use courtside::db::MemoryStore;
//! use courtside::round::{RoundController, ScheduleConfig};
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rounds = RoundController::new(Arc::new(MemoryStore::new()), ScheduleConfig::default());
//!     let (worker, queue) =
//!         AutomationWorker::new(rounds, Arc::new(LogBroadcaster), &AutomationConfig::default());
//!     let handle = worker.spawn();
//!
//!     queue.match_start(Uuid::new_v4(), "court-1").await?;
//!     queue.shutdown(ShutdownMode::Drain);
//!     let report = handle.await?;
//!     println!("{} events processed", report.processed);
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod errors;
pub mod events;
pub mod palette;
pub mod queue;
pub mod worker;

pub use broadcast::{
    Broadcaster, ChannelBroadcaster, LogBroadcaster, Notification, next_notification,
};
pub use config::AutomationConfig;
pub use errors::{AutomationError, AutomationResult};
pub use events::AutomationEvent;
pub use palette::GroupPalette;
pub use queue::{EventQueue, ShutdownMode};
pub use worker::{AutomationWorker, WorkerReport};
