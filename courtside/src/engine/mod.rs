//! Pure round engine: group allocation, match scheduling and ranking.
//!
//! Nothing in here touches the store. The round controller loads entities,
//! hands plain participant lists and match results to these functions and
//! persists what comes back.

use crate::tournament::models::{MatchStrategy, TeamId};
use thiserror::Error;

pub mod grouping;
pub mod ranking;
pub mod schedule;

pub use grouping::{allocate_groups, group_label};
pub use ranking::{DivisionStanding, Standing, compute_round_stats, rank_division, rank_round};
pub use schedule::{
    RoundRobin, ScheduleMatches, ScheduledMatch, Scheduler, SeededBracket, generate_schedule,
};

/// Engine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Group size must be greater than zero")]
    InvalidGroupSize,

    #[error("At least two teams are required, have {0}")]
    NotEnoughTeams(usize),

    #[error("Match strategy '{0}' is not supported by this operation")]
    Unsupported(MatchStrategy),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A team taking part in a round, as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Participant {
    pub team_id: TeamId,
    pub seed: u32,
    pub group: String,
}

impl Participant {
    pub fn new(team_id: TeamId, seed: u32) -> Self {
        Self {
            team_id,
            seed,
            group: String::new(),
        }
    }
}

/// Sort key shared by every seed-ordered view: seed, then id for stability
pub(crate) fn seed_order(participants: &[Participant]) -> Vec<&Participant> {
    let mut ordered: Vec<&Participant> = participants.iter().collect();
    ordered.sort_by_key(|p| (p.seed, p.team_id));
    ordered
}
