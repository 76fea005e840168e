//! Tournament data model and tournament-level management.
//!
//! This module provides:
//! - The entities shared by every subsystem (tournaments, divisions, teams,
//!   rounds, matches, sets, match updates, announcements)
//! - Tournament creation and the single-active-tournament rule
//!
//! ## Example
//!
//! ```no_run
//! use courtside::db::MemoryStore;
//! use courtside::tournament::TournamentManager;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TournamentManager::new(Arc::new(MemoryStore::new()));
//!     let tournament = manager.create_tournament("Harbour Cup").await?;
//!     manager.activate_tournament(tournament.id, "admin").await?;
//!     Ok(())
//! }
//! ```

pub mod manager;
pub mod models;

pub use manager::{TournamentError, TournamentManager, TournamentResult};
pub use models::{
    Advancement, Announcement, AnnouncementKind, CourtPlan, Division, DivisionId, GroupSizing,
    Match, MatchId, MatchSet, MatchStrategy, MatchUpdate, MatchUpdateKind, RoundId,
    RoundTemplate, SelectionStrategy, Side, Team, TeamId, TeamStats, Tournament, TournamentId,
    TournamentRound, TournamentRoundTeam, TournamentTeamDivision,
};
