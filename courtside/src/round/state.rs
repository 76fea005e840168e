use crate::tournament::models::TournamentRound;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a round, derived from its flags and contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    /// No teams yet
    Created,
    TeamsAssigned,
    MatchesGenerated,
    Finished,
    Locked,
}

impl RoundState {
    pub fn of(round: &TournamentRound, team_count: usize, match_count: usize) -> Self {
        if round.is_locked {
            RoundState::Locked
        } else if round.is_finished {
            RoundState::Finished
        } else if match_count > 0 {
            RoundState::MatchesGenerated
        } else if team_count > 0 {
            RoundState::TeamsAssigned
        } else {
            RoundState::Created
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundState::Created => "created",
            RoundState::TeamsAssigned => "teams_assigned",
            RoundState::MatchesGenerated => "matches_generated",
            RoundState::Finished => "finished",
            RoundState::Locked => "locked",
        };
        f.write_str(s)
    }
}
