//! Tournament data models: tournaments, divisions, rounds, matches and their audit trail.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tournament ID type
pub type TournamentId = Uuid;

/// Division ID type
pub type DivisionId = Uuid;

/// Team ID type
pub type TeamId = Uuid;

/// Round ID type
pub type RoundId = Uuid;

/// Match ID type
pub type MatchId = Uuid;

/// Round template ID type
pub type RoundTemplateId = Uuid;

/// A tournament. At most one tournament is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_active: false,
            created_at: Utc::now(),
        }
    }
}

/// A competition bracket scope such as an age or skill group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Division {
    pub id: DivisionId,
    pub name: String,
}

impl Division {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// A team, independent of any tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// Abbreviation used on scoreboards
    pub short_name: Option<String>,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            short_name: None,
        }
    }
}

/// Link between a tournament and a division it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TournamentDivision {
    pub tournament_id: TournamentId,
    pub division_id: DivisionId,
}

/// Win/draw/loss, set and score tallies shared by round and division standings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamStats {
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub sets_for: u32,
    pub sets_against: u32,
    pub score_for: u32,
    pub score_against: u32,
    pub points: u32,
}

impl TeamStats {
    pub const WIN_POINTS: u32 = 3;
    pub const DRAW_POINTS: u32 = 1;

    /// Score differential (score for minus score against)
    pub fn score_diff(&self) -> i64 {
        i64::from(self.score_for) - i64::from(self.score_against)
    }

    /// Fold another tally into this one
    pub fn accumulate(&mut self, other: &TeamStats) {
        self.played = self.played.saturating_add(other.played);
        self.won = self.won.saturating_add(other.won);
        self.drawn = self.drawn.saturating_add(other.drawn);
        self.lost = self.lost.saturating_add(other.lost);
        self.sets_for = self.sets_for.saturating_add(other.sets_for);
        self.sets_against = self.sets_against.saturating_add(other.sets_against);
        self.score_for = self.score_for.saturating_add(other.score_for);
        self.score_against = self.score_against.saturating_add(other.score_against);
        self.points = self.points.saturating_add(other.points);
    }
}

/// A team's membership in a tournament division, with cumulative division standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentTeamDivision {
    pub tournament_id: TournamentId,
    pub division_id: DivisionId,
    pub team_id: TeamId,
    pub seed: u32,
    pub group: String,
    pub stats: TeamStats,
    /// Sum of ranking points over completed rounds
    pub ranking_points: u32,
    pub rank: Option<u32>,
}

impl TournamentTeamDivision {
    pub fn new(
        tournament_id: TournamentId,
        division_id: DivisionId,
        team_id: TeamId,
        seed: u32,
    ) -> Self {
        Self {
            tournament_id,
            division_id,
            team_id,
            seed,
            group: String::new(),
            stats: TeamStats::default(),
            ranking_points: 0,
            rank: None,
        }
    }
}

/// How teams leave a round for the next sequential round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Teams that won their matches and lost none
    WinnersOnly,
    /// The better half of the standings
    TopSeedHalf,
    /// The best `n` teams by standings
    TopByPoints,
    /// The winner of every group, then the best of the rest overall
    TopOfEachGroupPlusNextBest,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionStrategy::WinnersOnly => write!(f, "winners_only"),
            SelectionStrategy::TopSeedHalf => write!(f, "top_seed_half"),
            SelectionStrategy::TopByPoints => write!(f, "top_by_points"),
            SelectionStrategy::TopOfEachGroupPlusNextBest => {
                write!(f, "top_of_each_group_plus_next_best")
            }
        }
    }
}

/// How matches are produced for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    RoundRobin,
    SeededBracket,
    /// Scheduled by hand outside this crate
    Manual,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::RoundRobin => write!(f, "round_robin"),
            MatchStrategy::SeededBracket => write!(f, "seeded_bracket"),
            MatchStrategy::Manual => write!(f, "manual"),
        }
    }
}

/// Group sizing policy. The variants are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy", content = "size")]
pub enum GroupSizing {
    NoGrouping,
    GroupCount(u32),
    TeamsPerGroup(u32),
}

/// Where and when a round's matches are played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtPlan {
    pub first_court: u32,
    pub court_count: u32,
    pub start_time: DateTime<Utc>,
    pub slot_minutes: u32,
}

impl CourtPlan {
    pub fn slot(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_minutes))
    }
}

/// Advancement rule attached to a round: who moves on once it is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advancement {
    /// Maximum number of advancing teams (None = strategy decides)
    pub team_count: Option<u32>,
    pub strategy: SelectionStrategy,
}

/// Reusable round definition, read when rounds are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTemplate {
    pub id: RoundTemplateId,
    pub sequence: u32,
    pub name: String,
    pub advancement: Advancement,
    pub match_strategy: MatchStrategy,
    pub grouping: GroupSizing,
}

/// One concrete round of a (tournament, division).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentRound {
    pub id: RoundId,
    pub tournament_id: TournamentId,
    pub division_id: DivisionId,
    pub round_number: u32,
    pub name: String,
    pub previous_round_id: Option<RoundId>,
    pub next_round_id: Option<RoundId>,
    /// Set on playoff rounds: the round whose non-advancing teams feed it
    pub playoff_source_round_id: Option<RoundId>,
    pub is_playoff: bool,
    pub advancement: Advancement,
    pub match_strategy: MatchStrategy,
    pub grouping: GroupSizing,
    pub court_plan: CourtPlan,
    pub is_finished: bool,
    pub is_locked: bool,
    /// Optimistic concurrency stamp, bumped by the store on every write
    pub version: i64,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

/// A team's participation in one round, with round-scoped standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentRoundTeam {
    pub round_id: RoundId,
    pub team_id: TeamId,
    pub seed: u32,
    pub group: String,
    pub stats: TeamStats,
    pub rank: Option<u32>,
    pub ranking_points: u32,
}

impl TournamentRoundTeam {
    pub fn new(round_id: RoundId, team_id: TeamId, seed: u32) -> Self {
        Self {
            round_id,
            team_id,
            seed,
            group: String::new(),
            stats: TeamStats::default(),
            rank: None,
            ranking_points: 0,
        }
    }
}

/// Which side of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Team1,
    Team2,
}

/// A scheduled match between two teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub division_id: DivisionId,
    pub round_id: RoundId,
    /// Tournament-scoped, monotonically increasing
    pub match_number: u32,
    pub team1_id: TeamId,
    pub team2_id: TeamId,
    pub group: String,
    pub court: u32,
    pub scheduled_at: DateTime<Utc>,
    pub team1_sets: u32,
    pub team2_sets: u32,
    /// 1-based pointer to the set in play, 0 before the first set
    pub current_set: u32,
    pub is_started: bool,
    pub is_finished: bool,
    pub is_disputed: bool,
    pub is_locked: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Match {
    pub fn team(&self, side: Side) -> TeamId {
        match side {
            Side::Team1 => self.team1_id,
            Side::Team2 => self.team2_id,
        }
    }

    pub fn involves(&self, team_id: TeamId) -> bool {
        self.team1_id == team_id || self.team2_id == team_id
    }

    /// Winning side by sets, None for a draw
    pub fn winner(&self) -> Option<Side> {
        match self.team1_sets.cmp(&self.team2_sets) {
            std::cmp::Ordering::Greater => Some(Side::Team1),
            std::cmp::Ordering::Less => Some(Side::Team2),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// One set within a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSet {
    pub match_id: MatchId,
    pub set_number: u32,
    pub team1_score: u32,
    pub team2_score: u32,
    pub is_finished: bool,
    pub is_locked: bool,
}

impl MatchSet {
    /// Highest score either side can hold in one set
    pub const MAX_SCORE: u32 = 9_999;

    pub fn new(match_id: MatchId, set_number: u32) -> Self {
        Self {
            match_id,
            set_number,
            team1_score: 0,
            team2_score: 0,
            is_finished: false,
            is_locked: false,
        }
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Team1 => self.team1_score,
            Side::Team2 => self.team2_score,
        }
    }

    pub fn winner(&self) -> Option<Side> {
        match self.team1_score.cmp(&self.team2_score) {
            std::cmp::Ordering::Greater => Some(Side::Team1),
            std::cmp::Ordering::Less => Some(Side::Team2),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Kind of change recorded in a match's feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchUpdateKind {
    CalledToCourt,
    Started,
    SetStarted,
    SetEnded,
    ScoreChanged,
    SetReverted,
    Ended,
    Disputed,
}

impl fmt::Display for MatchUpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchUpdateKind::CalledToCourt => "called_to_court",
            MatchUpdateKind::Started => "started",
            MatchUpdateKind::SetStarted => "set_started",
            MatchUpdateKind::SetEnded => "set_ended",
            MatchUpdateKind::ScoreChanged => "score_changed",
            MatchUpdateKind::SetReverted => "set_reverted",
            MatchUpdateKind::Ended => "ended",
            MatchUpdateKind::Disputed => "disputed",
        };
        f.write_str(s)
    }
}

/// Append-only audit entry describing a change to a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchUpdate {
    pub id: Uuid,
    pub match_id: MatchId,
    pub kind: MatchUpdateKind,
    pub description: String,
    pub performed_by: String,
    pub created_at: DateTime<Utc>,
}

impl MatchUpdate {
    pub fn new(
        match_id: MatchId,
        kind: MatchUpdateKind,
        description: impl Into<String>,
        performed_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            match_id,
            kind,
            description: description.into(),
            performed_by: performed_by.into(),
            created_at: Utc::now(),
        }
    }
}

/// Kind of public announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementKind {
    CallToCourt,
    Result,
    Dispute,
    StandingsBulletin,
}

impl fmt::Display for AnnouncementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnnouncementKind::CallToCourt => "call_to_court",
            AnnouncementKind::Result => "result",
            AnnouncementKind::Dispute => "dispute",
            AnnouncementKind::StandingsBulletin => "standings_bulletin",
        };
        f.write_str(s)
    }
}

/// A synthesized public announcement or bulletin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: Uuid,
    pub tournament_id: TournamentId,
    pub match_id: Option<MatchId>,
    pub kind: AnnouncementKind,
    pub text: String,
    /// Display colour of the group concerned, if any
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}
