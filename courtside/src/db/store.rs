//! Store trait and change sets for atomic, typed persistence.
//!
//! Reads go straight to the store; writes are collected into a [`ChangeSet`]
//! and committed in one unit. A commit either applies every write or none.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::tournament::models::{
    Announcement, Division, DivisionId, Match, MatchId, MatchSet, MatchUpdate, RoundId,
    RoundTemplate, Team, TeamId, Tournament, TournamentId, TournamentRound, TournamentRoundTeam,
    TournamentTeamDivision,
};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Stale version or duplicate unique key; the caller may reload and retry
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Writes committed together.
///
/// Upserts of rounds and matches are checked against the version they were
/// read at; the store bumps the version on success.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub tournaments: Vec<Tournament>,
    pub rounds: Vec<TournamentRound>,
    /// Replace the full team list of each listed round
    pub replace_round_teams: Vec<(RoundId, Vec<TournamentRoundTeam>)>,
    /// Update individual round team rows in place
    pub round_teams: Vec<TournamentRoundTeam>,
    pub division_teams: Vec<TournamentTeamDivision>,
    pub matches: Vec<Match>,
    pub match_sets: Vec<MatchSet>,
    pub deleted_match_sets: Vec<(MatchId, u32)>,
    pub match_updates: Vec<MatchUpdate>,
    pub announcements: Vec<Announcement>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tournaments.is_empty()
            && self.rounds.is_empty()
            && self.replace_round_teams.is_empty()
            && self.round_teams.is_empty()
            && self.division_teams.is_empty()
            && self.matches.is_empty()
            && self.match_sets.is_empty()
            && self.deleted_match_sets.is_empty()
            && self.match_updates.is_empty()
            && self.announcements.is_empty()
    }
}

/// Typed persistence operations needed by the round controller and automation worker.
#[async_trait]
pub trait Store: Send + Sync {
    async fn tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>>;

    async fn tournaments(&self) -> StoreResult<Vec<Tournament>>;

    async fn division(&self, id: DivisionId) -> StoreResult<Option<Division>>;

    /// Whether the division is part of the tournament
    async fn runs_division(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<bool>;

    async fn team(&self, id: TeamId) -> StoreResult<Option<Team>>;

    /// Division roster ordered by seed
    async fn division_teams(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<Vec<TournamentTeamDivision>>;

    async fn round_template(&self, sequence: u32) -> StoreResult<Option<RoundTemplate>>;

    async fn round(&self, id: RoundId) -> StoreResult<Option<TournamentRound>>;

    /// Rounds of a division ordered by round number, playoffs after their source
    async fn rounds(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<Vec<TournamentRound>>;

    /// Round teams ordered by seed
    async fn round_teams(&self, round_id: RoundId) -> StoreResult<Vec<TournamentRoundTeam>>;

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>>;

    /// Round matches ordered by match number
    async fn round_matches(&self, round_id: RoundId) -> StoreResult<Vec<Match>>;

    /// Highest match number used in the tournament, 0 when none
    async fn max_match_number(&self, tournament_id: TournamentId) -> StoreResult<u32>;

    /// Sets of a match ordered by set number
    async fn match_sets(&self, match_id: MatchId) -> StoreResult<Vec<MatchSet>>;

    /// Sets of every match in a round
    async fn round_match_sets(&self, round_id: RoundId) -> StoreResult<Vec<MatchSet>>;

    /// Match feed, oldest first
    async fn match_updates(&self, match_id: MatchId) -> StoreResult<Vec<MatchUpdate>>;

    /// Announcements of a tournament, oldest first
    async fn announcements(&self, tournament_id: TournamentId) -> StoreResult<Vec<Announcement>>;

    /// Apply every write atomically
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()>;
}
