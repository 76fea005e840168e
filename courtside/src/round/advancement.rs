//! Which teams leave a round for the next one.
//!
//! [`advancing_teams`] is the single rule used both when seeding the next
//! sequential round and when working out who is left for a playoff branch.

use crate::engine::Standing;
use crate::tournament::models::{Advancement, SelectionStrategy, TeamId, TournamentRoundTeam};
use std::collections::HashSet;

/// Round teams as standings in rank order. Unranked teams go last, by seed.
pub fn standings_from_round_teams(teams: &[TournamentRoundTeam]) -> Vec<Standing> {
    let mut standings: Vec<Standing> = teams
        .iter()
        .map(|t| Standing {
            team_id: t.team_id,
            seed: t.seed,
            group: t.group.clone(),
            stats: t.stats,
            rank: t.rank.unwrap_or(u32::MAX),
            ranking_points: t.ranking_points,
        })
        .collect();
    standings.sort_by_key(|s| (s.rank, s.seed, s.team_id));
    standings
}

/// Teams that advance under `advancement`, in rank order.
///
/// - `WinnersOnly`: teams with no loss and either a win or no match at all,
///   so a bracket bye goes through.
/// - `TopSeedHalf`: the upper half (rounded up).
/// - `TopByPoints`: the first `team_count` teams, everyone when unset.
/// - `TopOfEachGroupPlusNextBest`: the best team of every group, then the best
///   remaining teams overall up to `team_count`.
///
/// `team_count` caps every strategy.
pub fn advancing_teams(standings: &[Standing], advancement: &Advancement) -> Vec<Standing> {
    let mut ranked: Vec<&Standing> = standings.iter().collect();
    ranked.sort_by_key(|s| (s.rank, s.seed, s.team_id));
    let cap = advancement.team_count.map(|c| c as usize);

    let selected: Vec<&Standing> = match advancement.strategy {
        SelectionStrategy::WinnersOnly => ranked
            .into_iter()
            .filter(|s| s.stats.lost == 0 && (s.stats.won > 0 || s.stats.played == 0))
            .take(cap.unwrap_or(usize::MAX))
            .collect(),
        SelectionStrategy::TopSeedHalf => {
            let half = ranked.len().div_ceil(2);
            ranked.into_iter().take(cap.map_or(half, |c| c.min(half))).collect()
        }
        SelectionStrategy::TopByPoints => ranked
            .into_iter()
            .take(cap.unwrap_or(usize::MAX))
            .collect(),
        SelectionStrategy::TopOfEachGroupPlusNextBest => {
            let mut seen_groups = HashSet::new();
            let mut chosen: HashSet<TeamId> = HashSet::new();
            for s in &ranked {
                if seen_groups.insert(s.group.as_str()) {
                    chosen.insert(s.team_id);
                }
            }
            let target = cap.unwrap_or(chosen.len());
            if chosen.len() > target {
                // More groups than places: keep the best group winners
                let keep: HashSet<TeamId> = ranked
                    .iter()
                    .filter(|s| chosen.contains(&s.team_id))
                    .take(target)
                    .map(|s| s.team_id)
                    .collect();
                chosen = keep;
            }
            for s in &ranked {
                if chosen.len() >= target {
                    break;
                }
                chosen.insert(s.team_id);
            }
            ranked
                .into_iter()
                .filter(|s| chosen.contains(&s.team_id))
                .collect()
        }
    };

    selected.into_iter().cloned().collect()
}

/// Ids of the teams that advance, for set exclusion
pub fn advancing_ids(standings: &[Standing], advancement: &Advancement) -> HashSet<TeamId> {
    advancing_teams(standings, advancement)
        .into_iter()
        .map(|s| s.team_id)
        .collect()
}
