//! Domain events accepted by the automation queue.

use crate::tournament::models::{DivisionId, MatchId, Side, TournamentId};
use serde::{Deserialize, Serialize};

/// Events processed by the automation worker, one at a time in arrival order.
///
/// `source` names the actor or subsystem that raised the event and is
/// recorded on the resulting match updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AutomationEvent {
    /// Call a match's teams to their court
    CallToCourt { match_id: MatchId, source: String },

    MatchStart { match_id: MatchId, source: String },

    /// Open the next set
    MatchSetStart { match_id: MatchId, source: String },

    /// Close the set in play and credit its winner
    MatchSetEnd { match_id: MatchId, source: String },

    /// Adjust one side's score in the set in play. Scores never drop below zero.
    SetScoreDelta {
        match_id: MatchId,
        side: Side,
        delta: i32,
        source: String,
    },

    /// Discard the set in play and reopen the one before it
    RevertToPreviousSet { match_id: MatchId, source: String },

    MatchEnd { match_id: MatchId, source: String },

    MatchDisputed {
        match_id: MatchId,
        reason: String,
        source: String,
    },

    /// Roll finished rounds up into division standings and publish a bulletin
    DivisionRankRefresh {
        tournament_id: TournamentId,
        division_id: DivisionId,
        source: String,
    },
}

impl AutomationEvent {
    /// Metric and log label
    pub fn kind(&self) -> &'static str {
        match self {
            AutomationEvent::CallToCourt { .. } => "call_to_court",
            AutomationEvent::MatchStart { .. } => "match_start",
            AutomationEvent::MatchSetStart { .. } => "match_set_start",
            AutomationEvent::MatchSetEnd { .. } => "match_set_end",
            AutomationEvent::SetScoreDelta { .. } => "set_score_delta",
            AutomationEvent::RevertToPreviousSet { .. } => "revert_to_previous_set",
            AutomationEvent::MatchEnd { .. } => "match_end",
            AutomationEvent::MatchDisputed { .. } => "match_disputed",
            AutomationEvent::DivisionRankRefresh { .. } => "division_rank_refresh",
        }
    }

    pub fn source(&self) -> &str {
        match self {
            AutomationEvent::CallToCourt { source, .. }
            | AutomationEvent::MatchStart { source, .. }
            | AutomationEvent::MatchSetStart { source, .. }
            | AutomationEvent::MatchSetEnd { source, .. }
            | AutomationEvent::SetScoreDelta { source, .. }
            | AutomationEvent::RevertToPreviousSet { source, .. }
            | AutomationEvent::MatchEnd { source, .. }
            | AutomationEvent::MatchDisputed { source, .. }
            | AutomationEvent::DivisionRankRefresh { source, .. } => source,
        }
    }

    /// The match concerned, if the event targets one
    pub fn match_id(&self) -> Option<MatchId> {
        match self {
            AutomationEvent::CallToCourt { match_id, .. }
            | AutomationEvent::MatchStart { match_id, .. }
            | AutomationEvent::MatchSetStart { match_id, .. }
            | AutomationEvent::MatchSetEnd { match_id, .. }
            | AutomationEvent::SetScoreDelta { match_id, .. }
            | AutomationEvent::RevertToPreviousSet { match_id, .. }
            | AutomationEvent::MatchEnd { match_id, .. }
            | AutomationEvent::MatchDisputed { match_id, .. } => Some(*match_id),
            AutomationEvent::DivisionRankRefresh { .. } => None,
        }
    }
}
