//! Match scheduling strategies.
//!
//! Each strategy turns a participant list into pairings with a court and a
//! start time. Courts keep independent clocks: a match on one court never
//! delays a match on another.

use super::{EngineError, EngineResult, Participant, seed_order};
use crate::tournament::models::{CourtPlan, MatchStrategy, TeamId};
use chrono::{DateTime, Utc};
use enum_dispatch::enum_dispatch;
use std::collections::HashMap;

/// A pairing placed on a court and a time slot, before it gets a match number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledMatch {
    pub team1_id: TeamId,
    pub team2_id: TeamId,
    pub group: String,
    pub court: u32,
    pub scheduled_at: DateTime<Utc>,
}

/// Per-court clocks advancing by one slot per scheduled match
struct CourtClock {
    plan: CourtPlan,
    next_free: HashMap<u32, DateTime<Utc>>,
}

impl CourtClock {
    fn new(plan: &CourtPlan) -> Self {
        Self {
            plan: *plan,
            next_free: HashMap::new(),
        }
    }

    /// Court for the `index`-th unit (group or pair), cycling through the plan
    fn court(&self, index: usize) -> u32 {
        let count = self.plan.court_count.max(1);
        self.plan.first_court + (index as u32 % count)
    }

    /// Take the next slot on `court`
    fn take(&mut self, court: u32) -> DateTime<Utc> {
        let slot = self.plan.slot();
        let start = self.plan.start_time;
        let at = self.next_free.entry(court).or_insert(start);
        let scheduled = *at;
        *at = scheduled + slot;
        scheduled
    }
}

/// Trait implemented by every automatic scheduling strategy
#[enum_dispatch]
pub trait ScheduleMatches {
    /// Produce the pairings for a round. `participants` may be in any order.
    fn schedule(&self, participants: &[Participant], plan: &CourtPlan) -> Vec<ScheduledMatch>;
}

/// Every pair within each group plays once; group `i` uses court `first + i mod count`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl ScheduleMatches for RoundRobin {
    fn schedule(&self, participants: &[Participant], plan: &CourtPlan) -> Vec<ScheduledMatch> {
        // Groups in order of their best seed, members in seed order
        let mut groups: Vec<(&str, Vec<&Participant>)> = Vec::new();
        for p in seed_order(participants) {
            match groups.iter_mut().find(|(label, _)| *label == p.group) {
                Some((_, members)) => members.push(p),
                None => groups.push((p.group.as_str(), vec![p])),
            }
        }

        let mut clock = CourtClock::new(plan);
        let mut matches = Vec::new();
        for (index, (label, members)) in groups.iter().enumerate() {
            let court = clock.court(index);
            for (i, home) in members.iter().enumerate() {
                for away in &members[i + 1..] {
                    matches.push(ScheduledMatch {
                        team1_id: home.team_id,
                        team2_id: away.team_id,
                        group: (*label).to_string(),
                        court,
                        scheduled_at: clock.take(court),
                    });
                }
            }
        }
        matches
    }
}

/// Seed `k` plays seed `n + 1 - k`. With an odd count the middle seed sits out.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeededBracket;

impl ScheduleMatches for SeededBracket {
    fn schedule(&self, participants: &[Participant], plan: &CourtPlan) -> Vec<ScheduledMatch> {
        let ordered = seed_order(participants);
        let n = ordered.len();
        let mut clock = CourtClock::new(plan);

        (0..n / 2)
            .map(|k| {
                let court = clock.court(k);
                ScheduledMatch {
                    team1_id: ordered[k].team_id,
                    team2_id: ordered[n - 1 - k].team_id,
                    group: String::new(),
                    court,
                    scheduled_at: clock.take(court),
                }
            })
            .collect()
    }
}

/// Automatic scheduler selected from a round's match strategy
#[enum_dispatch(ScheduleMatches)]
#[derive(Debug, Clone, Copy)]
pub enum Scheduler {
    RoundRobin,
    SeededBracket,
}

impl Scheduler {
    /// Manual scheduling happens outside this crate and is rejected
    pub fn for_strategy(strategy: MatchStrategy) -> EngineResult<Self> {
        match strategy {
            MatchStrategy::RoundRobin => Ok(RoundRobin.into()),
            MatchStrategy::SeededBracket => Ok(SeededBracket.into()),
            MatchStrategy::Manual => Err(EngineError::Unsupported(strategy)),
        }
    }
}

/// Schedule a round with the given strategy.
///
/// Fails with [`EngineError::NotEnoughTeams`] below two participants and
/// with [`EngineError::Unsupported`] for manual scheduling.
pub fn generate_schedule(
    participants: &[Participant],
    strategy: MatchStrategy,
    plan: &CourtPlan,
) -> EngineResult<Vec<ScheduledMatch>> {
    let scheduler = Scheduler::for_strategy(strategy)?;
    if participants.len() < 2 {
        return Err(EngineError::NotEnoughTeams(participants.len()));
    }
    Ok(scheduler.schedule(participants, plan))
}
