//! Round settings: template defaults, caller overrides and court scheduling defaults.

use super::errors::{RoundError, RoundResult};
use crate::tournament::models::{
    Advancement, CourtPlan, GroupSizing, MatchStrategy, RoundTemplate, SelectionStrategy,
    TournamentRound,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default court usage applied to rounds that do not say otherwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub slot_minutes: u32,
    pub court_count: u32,
    pub first_court: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slot_minutes: 30,
            court_count: 1,
            first_court: 1,
        }
    }
}

impl ScheduleConfig {
    /// Court plan starting at `start_time`
    pub fn court_plan(&self, start_time: DateTime<Utc>) -> CourtPlan {
        CourtPlan {
            first_court: self.first_court,
            court_count: self.court_count,
            start_time,
            slot_minutes: self.slot_minutes,
        }
    }
}

/// Caller overrides for a new round. Unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSettings {
    pub name: Option<String>,
    pub advancing_team_count: Option<u32>,
    pub selection_strategy: Option<SelectionStrategy>,
    pub match_strategy: Option<MatchStrategy>,
    pub grouping: Option<GroupSizing>,
    pub first_court: Option<u32>,
    pub court_count: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub slot_minutes: Option<u32>,
}

/// Resolved configuration of a round about to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RoundBlueprint {
    pub name: String,
    pub advancement: Advancement,
    pub match_strategy: MatchStrategy,
    pub grouping: GroupSizing,
    pub court_plan: CourtPlan,
}

impl RoundBlueprint {
    pub fn from_template(template: &RoundTemplate, schedule: &ScheduleConfig) -> Self {
        Self {
            name: template.name.clone(),
            advancement: template.advancement,
            match_strategy: template.match_strategy,
            grouping: template.grouping,
            court_plan: schedule.court_plan(Utc::now()),
        }
    }

    /// Carry a round's settings over to a new round starting now
    pub fn from_round(round: &TournamentRound, name: String) -> Self {
        Self {
            name,
            advancement: round.advancement,
            match_strategy: round.match_strategy,
            grouping: round.grouping,
            court_plan: CourtPlan {
                start_time: Utc::now(),
                ..round.court_plan
            },
        }
    }
}

impl RoundSettings {
    /// Apply the overrides to `base` and check the result
    pub(crate) fn apply(&self, mut base: RoundBlueprint) -> RoundResult<RoundBlueprint> {
        if let Some(name) = &self.name {
            base.name = name.clone();
        }
        if let Some(count) = self.advancing_team_count {
            base.advancement.team_count = Some(count);
        }
        if let Some(strategy) = self.selection_strategy {
            base.advancement.strategy = strategy;
        }
        if let Some(strategy) = self.match_strategy {
            base.match_strategy = strategy;
        }
        if let Some(grouping) = self.grouping {
            base.grouping = grouping;
        }
        if let Some(court) = self.first_court {
            base.court_plan.first_court = court;
        }
        if let Some(count) = self.court_count {
            base.court_plan.court_count = count;
        }
        if let Some(start) = self.start_time {
            base.court_plan.start_time = start;
        }
        if let Some(minutes) = self.slot_minutes {
            base.court_plan.slot_minutes = minutes;
        }

        if base.name.trim().is_empty() {
            return Err(RoundError::Configuration("round name must not be empty".into()));
        }
        if base.advancement.team_count == Some(0) {
            return Err(RoundError::Configuration(
                "advancing team count must be greater than zero".into(),
            ));
        }
        if matches!(
            base.grouping,
            GroupSizing::GroupCount(0) | GroupSizing::TeamsPerGroup(0)
        ) {
            return Err(RoundError::Configuration(
                "group size must be greater than zero".into(),
            ));
        }
        if base.court_plan.court_count == 0 {
            return Err(RoundError::Configuration("court count must be greater than zero".into()));
        }
        if base.court_plan.slot_minutes == 0 {
            return Err(RoundError::Configuration("slot length must be greater than zero".into()));
        }
        Ok(base)
    }
}
