//! Round and division standings.
//!
//! Round scope: tallies are rebuilt from the round's finished matches.
//! Sets come from the match-level set counts and scores from the individual
//! sets. Order is points, score differential, score for, then the lower seed.
//!
//! Division scope: round tallies and ranking points summed over the rounds
//! finished so far, ordered by ranking points first and then the same chain.
//!
//! Both are pure and yield the same order for the same input.

use super::Participant;
use crate::tournament::models::{Match, MatchId, MatchSet, Side, TeamId, TeamStats};
use serde::Serialize;
use std::{cmp::Ordering, collections::HashMap};

/// A ranked team in one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub team_id: TeamId,
    pub seed: u32,
    pub group: String,
    pub stats: TeamStats,
    /// 1-based position
    pub rank: u32,
    /// `team_count - position + 1`
    pub ranking_points: u32,
}

/// A ranked team across the rounds of a division
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivisionStanding {
    pub team_id: TeamId,
    pub seed: u32,
    pub stats: TeamStats,
    pub ranking_points: u32,
    pub rank: u32,
}

/// Tally every participant's results over the finished matches between participants.
///
/// Matches involving a team outside `participants` are ignored. A match with
/// equal set counts is a draw.
pub fn compute_round_stats(
    participants: &[Participant],
    matches: &[Match],
    sets: &[MatchSet],
) -> HashMap<TeamId, TeamStats> {
    let mut stats: HashMap<TeamId, TeamStats> = participants
        .iter()
        .map(|p| (p.team_id, TeamStats::default()))
        .collect();

    let mut scores: HashMap<MatchId, (u32, u32)> = HashMap::new();
    for set in sets {
        let entry = scores.entry(set.match_id).or_default();
        entry.0 = entry.0.saturating_add(set.team1_score);
        entry.1 = entry.1.saturating_add(set.team2_score);
    }

    for m in matches.iter().filter(|m| m.is_finished) {
        if !stats.contains_key(&m.team1_id) || !stats.contains_key(&m.team2_id) {
            continue;
        }
        let (score1, score2) = scores.get(&m.id).copied().unwrap_or_default();
        let winner = m.winner();

        for side in [Side::Team1, Side::Team2] {
            let (sets_for, sets_against, score_for, score_against) = match side {
                Side::Team1 => (m.team1_sets, m.team2_sets, score1, score2),
                Side::Team2 => (m.team2_sets, m.team1_sets, score2, score1),
            };
            let Some(tally) = stats.get_mut(&m.team(side)) else {
                continue;
            };
            let mut result = TeamStats {
                played: 1,
                sets_for,
                sets_against,
                score_for,
                score_against,
                ..TeamStats::default()
            };
            match winner {
                Some(w) if w == side => {
                    result.won = 1;
                    result.points = TeamStats::WIN_POINTS;
                }
                Some(_) => result.lost = 1,
                None => {
                    result.drawn = 1;
                    result.points = TeamStats::DRAW_POINTS;
                }
            }
            tally.accumulate(&result);
        }
    }

    stats
}

fn compare_stats(a: &TeamStats, b: &TeamStats) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.score_diff().cmp(&a.score_diff()))
        .then_with(|| b.score_for.cmp(&a.score_for))
}

/// Rank a round's participants from its matches and sets
pub fn rank_round(
    participants: &[Participant],
    matches: &[Match],
    sets: &[MatchSet],
) -> Vec<Standing> {
    let mut stats = compute_round_stats(participants, matches, sets);

    let mut standings: Vec<Standing> = participants
        .iter()
        .map(|p| Standing {
            team_id: p.team_id,
            seed: p.seed,
            group: p.group.clone(),
            stats: stats.remove(&p.team_id).unwrap_or_default(),
            rank: 0,
            ranking_points: 0,
        })
        .collect();

    standings.sort_by(|a, b| {
        compare_stats(&a.stats, &b.stats)
            .then_with(|| a.seed.cmp(&b.seed))
            .then_with(|| a.team_id.cmp(&b.team_id))
    });

    let count = standings.len() as u32;
    for (position, standing) in standings.iter_mut().enumerate() {
        let position = position as u32 + 1;
        standing.rank = position;
        standing.ranking_points = count - position + 1;
    }
    standings
}

/// Roll round standings up into division standings.
///
/// `roster` lists every division team with its seed; `rounds` holds the
/// standings of each finished round, playoffs included.
pub fn rank_division(roster: &[(TeamId, u32)], rounds: &[Vec<Standing>]) -> Vec<DivisionStanding> {
    let mut totals: HashMap<TeamId, (TeamStats, u32)> = roster
        .iter()
        .map(|(team_id, _)| (*team_id, (TeamStats::default(), 0)))
        .collect();

    for standing in rounds.iter().flatten() {
        if let Some((stats, points)) = totals.get_mut(&standing.team_id) {
            stats.accumulate(&standing.stats);
            *points = points.saturating_add(standing.ranking_points);
        }
    }

    let mut standings: Vec<DivisionStanding> = roster
        .iter()
        .map(|(team_id, seed)| {
            let (stats, ranking_points) = totals.remove(team_id).unwrap_or_default();
            DivisionStanding {
                team_id: *team_id,
                seed: *seed,
                stats,
                ranking_points,
                rank: 0,
            }
        })
        .collect();

    standings.sort_by(|a, b| {
        b.ranking_points
            .cmp(&a.ranking_points)
            .then_with(|| compare_stats(&a.stats, &b.stats))
            .then_with(|| a.seed.cmp(&b.seed))
            .then_with(|| a.team_id.cmp(&b.team_id))
    });

    for (position, standing) in standings.iter_mut().enumerate() {
        standing.rank = position as u32 + 1;
    }
    standings
}
