//! Round progression: creating rounds, seeding teams, scheduling matches and
//! finishing rounds with standings.
//!
//! ## Example
//!
//! ```no_run
//! use courtside::db::MemoryStore;
//! use courtside::round::{RoundController, RoundSettings, ScheduleConfig};
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = RoundController::new(Arc::new(MemoryStore::new()), ScheduleConfig::default());
//!     let (tournament_id, division_id) = (Uuid::new_v4(), Uuid::new_v4());
//!
//!     let round = controller
//!         .create_first_round(tournament_id, division_id, RoundSettings::default(), "admin")
//!         .await?;
//!     controller.select_teams(round.id, "admin").await?;
//!     controller.generate_matches(round.id, "admin").await?;
//!     Ok(())
//! }
//! ```

pub mod advancement;
pub mod controller;
pub mod errors;
pub mod settings;
pub mod state;

pub use advancement::{advancing_ids, advancing_teams, standings_from_round_teams};
pub use controller::RoundController;
pub use errors::{RoundError, RoundResult};
pub use settings::{RoundSettings, ScheduleConfig};
pub use state::RoundState;
