//! # Courtside
//!
//! Round progression and live match automation for multi-division tournaments.
//!
//! A tournament runs several divisions side by side. Each division moves
//! through a chain of rounds: teams are seeded into groups, matches are
//! scheduled across courts, results are ranked, and the best teams advance
//! into the next round or a playoff.
//!
//! ## Round lifecycle
//!
//! - **Created**: the round exists, linked to its predecessor
//! - **TeamsAssigned**: advancing teams are seeded and grouped
//! - **MatchesGenerated**: the schedule is written
//! - **Finished**: standings are final and rolled up into the division
//! - **Locked**: no further edits until unlocked
//!
//! ## Core Modules
//!
//! - [`engine`]: pure grouping, scheduling and ranking algorithms
//! - [`round`]: the round controller state machine
//! - [`automation`]: the bounded event queue and its single worker
//! - [`db`]: the store abstraction with in-memory and PostgreSQL backends
//! - [`tournament`]: shared entities and tournament management
//!
//! ## Example
//!
//! ```
//! use courtside::engine::{Participant, allocate_groups};
//! use courtside::tournament::GroupSizing;
//! use uuid::Uuid;
//!
//! let teams: Vec<_> = (1..=6).map(|seed| Participant::new(Uuid::new_v4(), seed)).collect();
//! let grouped = allocate_groups(&teams, GroupSizing::GroupCount(2)).unwrap();
//! assert_eq!(grouped[0].group, "A");
//! assert_eq!(grouped[1].group, "B");
//! ```

/// Event queue, worker and notifications.
pub mod automation;
pub use automation::{AutomationConfig, AutomationEvent, AutomationWorker, EventQueue};

/// Persistence backends.
pub mod db;
pub use db::{ChangeSet, MemoryStore, PgStore, Store, StoreError};

/// Grouping, scheduling and ranking.
pub mod engine;

/// Round progression.
pub mod round;
pub use round::{RoundController, RoundError, RoundSettings};

pub mod telemetry;

/// Tournament entities and management.
pub mod tournament;
pub use tournament::TournamentManager;
