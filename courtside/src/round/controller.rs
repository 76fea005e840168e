//! Round progression controller.
//!
//! Owns the round lifecycle: `Created -> TeamsAssigned -> MatchesGenerated ->
//! Finished -> Locked`. Every mutating operation reads what it needs, computes
//! the new state and commits it as one [`ChangeSet`]. A commit that loses a
//! race is retried once from a fresh read.

use super::{
    advancement::{advancing_ids, advancing_teams, standings_from_round_teams},
    errors::{RoundError, RoundResult},
    settings::{RoundBlueprint, RoundSettings, ScheduleConfig},
    state::RoundState,
};
use crate::{
    db::{ChangeSet, Store},
    engine::{
        DivisionStanding, Participant, Standing, allocate_groups, generate_schedule,
        rank_division, rank_round,
    },
    telemetry,
    tournament::models::{
        DivisionId, GroupSizing, Match, RoundId, TeamId, TournamentId, TournamentRound,
        TournamentRoundTeam, TournamentTeamDivision,
    },
};
use chrono::Utc;
use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
};
use uuid::Uuid;

/// Round progression controller
#[derive(Clone)]
pub struct RoundController {
    store: Arc<dyn Store>,
    schedule: ScheduleConfig,
}

impl RoundController {
    /// Create a new round controller
    pub fn new(store: Arc<dyn Store>, schedule: ScheduleConfig) -> Self {
        Self { store, schedule }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run `op`, and run it once more from scratch if its commit hit a conflict
    async fn with_retry<T, F, Fut>(&self, name: &str, mut op: F) -> RoundResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RoundResult<T>>,
    {
        match op().await {
            Err(err) if err.is_conflict() => {
                log::warn!("{}: concurrent modification, retrying once ({})", name, err);
                op().await
            }
            result => result,
        }
    }

    // ------------------------------------------------------------------------
    // Round creation
    // ------------------------------------------------------------------------

    /// Create round 1 of a division from the template at sequence 1
    pub async fn create_first_round(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
        settings: RoundSettings,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        let settings = &settings;
        self.with_retry("create_first_round", move || {
            self.create_first_round_once(tournament_id, division_id, settings, performed_by)
        })
        .await
    }

    async fn create_first_round_once(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
        settings: &RoundSettings,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        self.ensure_division(tournament_id, division_id).await?;

        let existing = self.store.rounds(tournament_id, division_id).await?;
        if existing.iter().any(|r| !r.is_playoff && r.round_number > 1) {
            return Err(RoundError::invalid(
                "the division has already progressed past round 1",
            ));
        }
        if existing.iter().any(|r| !r.is_playoff && r.round_number == 1) {
            return Err(RoundError::invalid("round 1 already exists for this division"));
        }

        let template = self.store.round_template(1).await?.ok_or_else(|| {
            RoundError::Configuration("no round template at sequence 1".to_string())
        })?;
        let blueprint =
            settings.apply(RoundBlueprint::from_template(&template, &self.schedule))?;

        let round = new_round(tournament_id, division_id, 1, blueprint, performed_by);
        let round_id = round.id;
        self.store
            .commit(ChangeSet {
                rounds: vec![round],
                ..Default::default()
            })
            .await?;

        log::info!(
            "Created round 1 ({}) for division {} by {}",
            round_id,
            division_id,
            performed_by
        );
        self.round(round_id).await
    }

    /// Create the round following a finished round
    pub async fn create_next_round(
        &self,
        previous_round_id: RoundId,
        settings: RoundSettings,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        let settings = &settings;
        self.with_retry("create_next_round", move || {
            self.create_next_round_once(previous_round_id, settings, performed_by)
        })
        .await
    }

    async fn create_next_round_once(
        &self,
        previous_round_id: RoundId,
        settings: &RoundSettings,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        let mut previous = self.round(previous_round_id).await?;
        if previous.is_playoff {
            return Err(RoundError::invalid("playoff rounds have no successor"));
        }
        if !previous.is_finished {
            return Err(RoundError::invalid(format!(
                "round {} must be finished before the next round is created",
                previous.round_number
            )));
        }
        if let Some(next) = previous.next_round_id {
            return Err(RoundError::invalid(format!(
                "round {} already has a successor ({})",
                previous.round_number, next
            )));
        }

        let number = previous.round_number + 1;
        let existing = self
            .store
            .rounds(previous.tournament_id, previous.division_id)
            .await?;
        if existing
            .iter()
            .any(|r| !r.is_playoff && r.round_number == number)
        {
            return Err(RoundError::invalid(format!("round {number} already exists")));
        }

        let base = match self.store.round_template(number).await? {
            Some(template) => RoundBlueprint::from_template(&template, &self.schedule),
            None => RoundBlueprint::from_round(&previous, format!("Round {number}")),
        };
        let blueprint = settings.apply(base)?;

        let mut round = new_round(
            previous.tournament_id,
            previous.division_id,
            number,
            blueprint,
            performed_by,
        );
        round.previous_round_id = Some(previous.id);
        previous.next_round_id = Some(round.id);
        touch(&mut previous, performed_by);

        let round_id = round.id;
        self.store
            .commit(ChangeSet {
                rounds: vec![previous, round],
                ..Default::default()
            })
            .await?;

        log::info!(
            "Created round {} ({}) after {} by {}",
            number,
            round_id,
            previous_round_id,
            performed_by
        );
        self.round(round_id).await
    }

    /// Create a playoff branch off a finished sequential round
    pub async fn create_playoff_round(
        &self,
        source_round_id: RoundId,
        settings: RoundSettings,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        let settings = &settings;
        self.with_retry("create_playoff_round", move || {
            self.create_playoff_round_once(source_round_id, settings, performed_by)
        })
        .await
    }

    async fn create_playoff_round_once(
        &self,
        source_round_id: RoundId,
        settings: &RoundSettings,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        let source = self.round(source_round_id).await?;
        if source.is_playoff {
            return Err(RoundError::invalid("a playoff cannot branch off another playoff"));
        }
        if !source.is_finished {
            return Err(RoundError::invalid(format!(
                "round {} must be finished before a playoff can branch off it",
                source.round_number
            )));
        }

        let blueprint = settings.apply(RoundBlueprint::from_round(
            &source,
            format!("{} playoff", source.name),
        ))?;
        let mut round = new_round(
            source.tournament_id,
            source.division_id,
            source.round_number,
            blueprint,
            performed_by,
        );
        round.is_playoff = true;
        round.playoff_source_round_id = Some(source.id);

        let round_id = round.id;
        self.store
            .commit(ChangeSet {
                rounds: vec![round],
                ..Default::default()
            })
            .await?;

        log::info!(
            "Created playoff round {} off round {} by {}",
            round_id,
            source_round_id,
            performed_by
        );
        self.round(round_id).await
    }

    // ------------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------------

    /// Fill a sequential round with teams.
    ///
    /// Round 1 takes the division roster in seed order. Later rounds take the
    /// teams advancing from the predecessor, re-seeded 1..N by finish rank,
    /// and lock the predecessor.
    pub async fn select_teams(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<Vec<TournamentRoundTeam>> {
        self.with_retry("select_teams", move || {
            self.select_teams_once(round_id, performed_by)
        })
        .await
    }

    async fn select_teams_once(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<Vec<TournamentRoundTeam>> {
        let mut round = self.round(round_id).await?;
        if round.is_playoff {
            return Err(RoundError::invalid(
                "playoff rounds take administrator-selected teams",
            ));
        }
        self.ensure_teams_editable(&round).await?;

        let mut changes = ChangeSet::new();
        let participants: Vec<Participant> = match round.previous_round_id {
            None => {
                let roster = self
                    .store
                    .division_teams(round.tournament_id, round.division_id)
                    .await?;
                roster
                    .iter()
                    .map(|r| Participant::new(r.team_id, r.seed))
                    .collect()
            }
            Some(previous_id) => {
                let mut previous = self.round(previous_id).await?;
                if !previous.is_finished {
                    return Err(RoundError::invalid(format!(
                        "round {} is not finished",
                        previous.round_number
                    )));
                }
                let standings =
                    standings_from_round_teams(&self.store.round_teams(previous.id).await?);
                let advancing = advancing_teams(&standings, &previous.advancement);
                if !previous.is_locked {
                    previous.is_locked = true;
                    touch(&mut previous, performed_by);
                    changes.rounds.push(previous);
                }
                advancing
                    .iter()
                    .zip(1..)
                    .map(|(s, seed)| Participant::new(s.team_id, seed))
                    .collect()
            }
        };

        if participants.is_empty() {
            return Err(RoundError::invalid("no teams qualify for this round"));
        }

        let grouped = allocate_groups(&participants, round.grouping)?;
        self.stage_round_teams(&mut changes, &mut round, &grouped, performed_by)
            .await?;
        self.store.commit(changes).await?;

        log::info!(
            "Selected {} teams for round {} ({}) by {}",
            grouped.len(),
            round.round_number,
            round_id,
            performed_by
        );
        Ok(self.store.round_teams(round_id).await?)
    }

    /// Teams that may join a playoff round: the source round's standings minus
    /// the teams that advanced or would advance under its rule.
    pub async fn playoff_candidates(&self, playoff_round_id: RoundId) -> RoundResult<Vec<Standing>> {
        let round = self.round(playoff_round_id).await?;
        let source_id = round
            .playoff_source_round_id
            .filter(|_| round.is_playoff)
            .ok_or_else(|| RoundError::invalid("round is not a playoff round"))?;
        let source = self.round(source_id).await?;

        let standings = standings_from_round_teams(&self.store.round_teams(source.id).await?);
        let mut excluded = advancing_ids(&standings, &source.advancement);
        if let Some(next_id) = source.next_round_id {
            excluded.extend(
                self.store
                    .round_teams(next_id)
                    .await?
                    .into_iter()
                    .map(|t| t.team_id),
            );
        }

        Ok(standings
            .into_iter()
            .filter(|s| !excluded.contains(&s.team_id))
            .collect())
    }

    /// Put administrator-selected candidates into a playoff round, seeded by finish rank
    pub async fn assign_playoff_teams(
        &self,
        round_id: RoundId,
        team_ids: &[TeamId],
        performed_by: &str,
    ) -> RoundResult<Vec<TournamentRoundTeam>> {
        self.with_retry("assign_playoff_teams", move || {
            self.assign_playoff_teams_once(round_id, team_ids, performed_by)
        })
        .await
    }

    async fn assign_playoff_teams_once(
        &self,
        round_id: RoundId,
        team_ids: &[TeamId],
        performed_by: &str,
    ) -> RoundResult<Vec<TournamentRoundTeam>> {
        let mut round = self.round(round_id).await?;
        if !round.is_playoff {
            return Err(RoundError::invalid(
                "only playoff rounds take administrator-selected teams",
            ));
        }
        self.ensure_teams_editable(&round).await?;

        let requested: HashSet<TeamId> = team_ids.iter().copied().collect();
        if requested.len() != team_ids.len() {
            return Err(RoundError::invalid("a team was listed more than once"));
        }
        if requested.is_empty() {
            return Err(RoundError::invalid("no teams selected"));
        }

        let candidates = self.playoff_candidates(round_id).await?;
        let candidate_ids: HashSet<TeamId> = candidates.iter().map(|s| s.team_id).collect();
        if let Some(outsider) = team_ids.iter().find(|id| !candidate_ids.contains(*id)) {
            return Err(RoundError::invalid(format!(
                "team {outsider} is not a playoff candidate"
            )));
        }

        let participants: Vec<Participant> = candidates
            .iter()
            .filter(|s| requested.contains(&s.team_id))
            .zip(1..)
            .map(|(s, seed)| Participant::new(s.team_id, seed))
            .collect();

        let grouped = allocate_groups(&participants, round.grouping)?;
        let mut changes = ChangeSet::new();
        self.stage_round_teams(&mut changes, &mut round, &grouped, performed_by)
            .await?;
        self.store.commit(changes).await?;

        log::info!(
            "Assigned {} playoff teams to round {} by {}",
            grouped.len(),
            round_id,
            performed_by
        );
        Ok(self.store.round_teams(round_id).await?)
    }

    /// Re-run group allocation on a round's current teams
    pub async fn regroup_round(
        &self,
        round_id: RoundId,
        grouping: GroupSizing,
        performed_by: &str,
    ) -> RoundResult<Vec<TournamentRoundTeam>> {
        self.with_retry("regroup_round", move || {
            self.regroup_round_once(round_id, grouping, performed_by)
        })
        .await
    }

    async fn regroup_round_once(
        &self,
        round_id: RoundId,
        grouping: GroupSizing,
        performed_by: &str,
    ) -> RoundResult<Vec<TournamentRoundTeam>> {
        let mut round = self.round(round_id).await?;
        self.ensure_teams_editable(&round).await?;

        let teams = self.store.round_teams(round_id).await?;
        if teams.is_empty() {
            return Err(RoundError::invalid("no teams assigned to this round"));
        }
        let participants: Vec<Participant> = teams
            .iter()
            .map(|t| Participant::new(t.team_id, t.seed))
            .collect();
        let grouped = allocate_groups(&participants, grouping)?;

        round.grouping = grouping;
        let mut changes = ChangeSet::new();
        self.stage_round_teams(&mut changes, &mut round, &grouped, performed_by)
            .await?;
        self.store.commit(changes).await?;

        log::info!("Regrouped round {} by {}", round_id, performed_by);
        Ok(self.store.round_teams(round_id).await?)
    }

    /// Replace a round's teams and mirror their group labels on the division
    /// roster. The round itself is written too so the commit is version-checked.
    async fn stage_round_teams(
        &self,
        changes: &mut ChangeSet,
        round: &mut TournamentRound,
        grouped: &[Participant],
        performed_by: &str,
    ) -> RoundResult<()> {
        let teams: Vec<TournamentRoundTeam> = grouped
            .iter()
            .map(|p| TournamentRoundTeam {
                group: p.group.clone(),
                ..TournamentRoundTeam::new(round.id, p.team_id, p.seed)
            })
            .collect();

        if !round.is_playoff {
            let groups: HashMap<TeamId, &str> = grouped
                .iter()
                .map(|p| (p.team_id, p.group.as_str()))
                .collect();
            let roster = self
                .store
                .division_teams(round.tournament_id, round.division_id)
                .await?;
            for mut record in roster {
                if let Some(group) = groups.get(&record.team_id)
                    && record.group != *group
                {
                    record.group = (*group).to_string();
                    changes.division_teams.push(record);
                }
            }
        }

        touch(round, performed_by);
        changes.rounds.push(round.clone());
        changes.replace_round_teams.push((round.id, teams));
        Ok(())
    }

    /// Teams may change only while no match exists and the round is open
    async fn ensure_teams_editable(&self, round: &TournamentRound) -> RoundResult<()> {
        if round.is_finished || round.is_locked {
            return Err(RoundError::invalid("round is already finished"));
        }
        if !self.store.round_matches(round.id).await?.is_empty() {
            return Err(RoundError::invalid(
                "teams cannot change once matches exist for the round",
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------------

    /// Schedule a round's matches with its match strategy and court plan
    pub async fn generate_matches(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<Vec<Match>> {
        self.with_retry("generate_matches", move || {
            self.generate_matches_once(round_id, performed_by)
        })
        .await
    }

    async fn generate_matches_once(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<Vec<Match>> {
        let mut round = self.round(round_id).await?;
        if round.is_finished || round.is_locked {
            return Err(RoundError::invalid("round is already finished"));
        }
        if !self.store.round_matches(round_id).await?.is_empty() {
            return Err(RoundError::invalid("matches already exist for this round"));
        }

        let teams = self.store.round_teams(round_id).await?;
        let participants: Vec<Participant> = teams
            .iter()
            .map(|t| Participant {
                team_id: t.team_id,
                seed: t.seed,
                group: t.group.clone(),
            })
            .collect();
        let scheduled = generate_schedule(&participants, round.match_strategy, &round.court_plan)?;

        // Numbers continue from the persisted maximum; the store rejects reuse
        let first_number = self.store.max_match_number(round.tournament_id).await? + 1;
        let matches: Vec<Match> = scheduled
            .into_iter()
            .zip(first_number..)
            .map(|(s, match_number)| Match {
                id: Uuid::new_v4(),
                tournament_id: round.tournament_id,
                division_id: round.division_id,
                round_id,
                match_number,
                team1_id: s.team1_id,
                team2_id: s.team2_id,
                group: s.group,
                court: s.court,
                scheduled_at: s.scheduled_at,
                team1_sets: 0,
                team2_sets: 0,
                current_set: 0,
                is_started: false,
                is_finished: false,
                is_disputed: false,
                is_locked: false,
                started_at: None,
                finished_at: None,
                version: 0,
            })
            .collect();
        let count = matches.len();

        touch(&mut round, performed_by);
        self.store
            .commit(ChangeSet {
                rounds: vec![round],
                matches,
                ..Default::default()
            })
            .await?;

        telemetry::matches_generated(count);
        log::info!(
            "Generated {} matches for round {} by {}",
            count,
            round_id,
            performed_by
        );
        Ok(self.store.round_matches(round_id).await?)
    }

    // ------------------------------------------------------------------------
    // Finishing
    // ------------------------------------------------------------------------

    /// Rank a round whose matches are all finished and mark it finished.
    ///
    /// Division standings are rolled up in the same commit. The round is not
    /// locked; see [`RoundController::lock_round`].
    pub async fn finalize_round(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        self.with_retry("finalize_round", move || {
            self.finalize_round_once(round_id, performed_by)
        })
        .await
    }

    async fn finalize_round_once(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        let mut round = self.round(round_id).await?;
        if round.is_finished {
            return Err(RoundError::invalid("round is already finished"));
        }
        let matches = self.store.round_matches(round_id).await?;
        if matches.is_empty() {
            return Err(RoundError::invalid("round has no matches"));
        }
        let unfinished = matches.iter().filter(|m| !m.is_finished).count();
        if unfinished > 0 {
            return Err(RoundError::invalid(format!(
                "{} of {} matches are not finished",
                unfinished,
                matches.len()
            )));
        }

        let mut changes = ChangeSet::new();
        let teams = self.rank_round_teams(&round).await?;
        let standings = standings_from_round_teams(&teams);
        changes.round_teams = teams;

        changes.division_teams = self
            .division_rollup(round.tournament_id, round.division_id, Some((round.id, standings)))
            .await?;

        round.is_finished = true;
        touch(&mut round, performed_by);
        changes.rounds.push(round);
        self.store.commit(changes).await?;

        telemetry::rounds_finalized();
        log::info!("Finalized round {} by {}", round_id, performed_by);
        self.round(round_id).await
    }

    /// Reopen a finished round for corrections. Clears both finished and locked.
    pub async fn unfinalize_round(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        self.with_retry("unfinalize_round", move || {
            self.set_flags_once(round_id, performed_by, |round| {
                if !round.is_finished {
                    return Err(RoundError::invalid("round is not finished"));
                }
                round.is_finished = false;
                round.is_locked = false;
                Ok(())
            })
        })
        .await
    }

    /// Seal a finished round's standings
    pub async fn lock_round(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        self.with_retry("lock_round", move || {
            self.set_flags_once(round_id, performed_by, |round| {
                if !round.is_finished {
                    return Err(RoundError::invalid("only finished rounds can be locked"));
                }
                round.is_locked = true;
                Ok(())
            })
        })
        .await
    }

    /// Lift the lock; the round stays finished
    pub async fn unlock_round(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<TournamentRound> {
        self.with_retry("unlock_round", move || {
            self.set_flags_once(round_id, performed_by, |round| {
                round.is_locked = false;
                Ok(())
            })
        })
        .await
    }

    async fn set_flags_once(
        &self,
        round_id: RoundId,
        performed_by: &str,
        change: impl FnOnce(&mut TournamentRound) -> RoundResult<()>,
    ) -> RoundResult<TournamentRound> {
        let mut round = self.round(round_id).await?;
        let before = (round.is_finished, round.is_locked);
        change(&mut round)?;
        if before == (round.is_finished, round.is_locked) {
            return Ok(round);
        }

        touch(&mut round, performed_by);
        self.store
            .commit(ChangeSet {
                rounds: vec![round],
                ..Default::default()
            })
            .await?;

        let round = self.round(round_id).await?;
        log::info!(
            "Round {} is now {} (by {})",
            round_id,
            if round.is_locked {
                "locked"
            } else if round.is_finished {
                "finished"
            } else {
                "open"
            },
            performed_by
        );
        Ok(round)
    }

    // ------------------------------------------------------------------------
    // Standings
    // ------------------------------------------------------------------------

    /// Recompute and store a round's standings from its finished matches.
    ///
    /// Rejected on locked rounds.
    pub async fn refresh_round_standings(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<Vec<TournamentRoundTeam>> {
        self.with_retry("refresh_round_standings", move || {
            self.refresh_round_standings_once(round_id, performed_by)
        })
        .await
    }

    async fn refresh_round_standings_once(
        &self,
        round_id: RoundId,
        performed_by: &str,
    ) -> RoundResult<Vec<TournamentRoundTeam>> {
        let mut round = self.round(round_id).await?;
        if round.is_locked {
            return Err(RoundError::invalid("round standings are locked"));
        }
        let teams = self.rank_round_teams(&round).await?;
        touch(&mut round, performed_by);
        self.store
            .commit(ChangeSet {
                rounds: vec![round],
                round_teams: teams,
                ..Default::default()
            })
            .await?;
        log::debug!("Refreshed standings of round {}", round_id);
        Ok(self.store.round_teams(round_id).await?)
    }

    /// Roll finished rounds up into the division roster and store the result
    pub async fn refresh_division_standings(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
        performed_by: &str,
    ) -> RoundResult<Vec<TournamentTeamDivision>> {
        self.ensure_division(tournament_id, division_id).await?;
        let records = self
            .division_rollup(tournament_id, division_id, None)
            .await?;
        self.store
            .commit(ChangeSet {
                division_teams: records,
                ..Default::default()
            })
            .await?;

        log::info!(
            "Refreshed division {} standings by {}",
            division_id,
            performed_by
        );
        let mut roster = self
            .store
            .division_teams(tournament_id, division_id)
            .await?;
        roster.sort_by_key(|r| (r.rank.unwrap_or(u32::MAX), r.seed));
        Ok(roster)
    }

    /// Round teams with fresh stats, rank and ranking points
    async fn rank_round_teams(
        &self,
        round: &TournamentRound,
    ) -> RoundResult<Vec<TournamentRoundTeam>> {
        let mut teams = self.store.round_teams(round.id).await?;
        let standings = self.compute_round_standings(round.id, &teams).await?;
        let by_team: HashMap<TeamId, &Standing> =
            standings.iter().map(|s| (s.team_id, s)).collect();
        for team in &mut teams {
            if let Some(s) = by_team.get(&team.team_id) {
                team.stats = s.stats;
                team.rank = Some(s.rank);
                team.ranking_points = s.ranking_points;
            }
        }
        Ok(teams)
    }

    async fn compute_round_standings(
        &self,
        round_id: RoundId,
        teams: &[TournamentRoundTeam],
    ) -> RoundResult<Vec<Standing>> {
        let participants: Vec<Participant> = teams
            .iter()
            .map(|t| Participant {
                team_id: t.team_id,
                seed: t.seed,
                group: t.group.clone(),
            })
            .collect();
        let matches = self.store.round_matches(round_id).await?;
        let sets = self.store.round_match_sets(round_id).await?;
        Ok(rank_round(&participants, &matches, &sets))
    }

    /// Division roster records updated from every finished round.
    ///
    /// `pending` supplies standings for a round being finished in the same
    /// commit, which the store does not yet report as finished.
    async fn division_rollup(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
        pending: Option<(RoundId, Vec<Standing>)>,
    ) -> RoundResult<Vec<TournamentTeamDivision>> {
        let standings = self
            .division_standings_with(tournament_id, division_id, pending)
            .await?;
        let by_team: HashMap<TeamId, DivisionStanding> =
            standings.into_iter().map(|s| (s.team_id, s)).collect();

        let mut roster = self
            .store
            .division_teams(tournament_id, division_id)
            .await?;
        for record in &mut roster {
            if let Some(s) = by_team.get(&record.team_id) {
                record.stats = s.stats;
                record.ranking_points = s.ranking_points;
                record.rank = Some(s.rank);
            }
        }
        Ok(roster)
    }

    async fn division_standings_with(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
        pending: Option<(RoundId, Vec<Standing>)>,
    ) -> RoundResult<Vec<DivisionStanding>> {
        let roster: Vec<(TeamId, u32)> = self
            .store
            .division_teams(tournament_id, division_id)
            .await?
            .iter()
            .map(|r| (r.team_id, r.seed))
            .collect();

        let pending_id = pending.as_ref().map(|(id, _)| *id);
        let mut rounds = Vec::new();
        for round in self.store.rounds(tournament_id, division_id).await? {
            if round.is_finished && Some(round.id) != pending_id {
                rounds.push(standings_from_round_teams(
                    &self.store.round_teams(round.id).await?,
                ));
            }
        }
        if let Some((_, standings)) = pending {
            rounds.push(standings);
        }

        Ok(rank_division(&roster, &rounds))
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Rounds of a division, sequential rounds in order with playoffs after their source number
    pub async fn rounds(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> RoundResult<Vec<TournamentRound>> {
        self.ensure_division(tournament_id, division_id).await?;
        Ok(self.store.rounds(tournament_id, division_id).await?)
    }

    pub async fn round(&self, round_id: RoundId) -> RoundResult<TournamentRound> {
        self.store
            .round(round_id)
            .await?
            .ok_or_else(|| RoundError::not_found("Round", round_id))
    }

    pub async fn round_teams(&self, round_id: RoundId) -> RoundResult<Vec<TournamentRoundTeam>> {
        self.round(round_id).await?;
        Ok(self.store.round_teams(round_id).await?)
    }

    pub async fn round_matches(&self, round_id: RoundId) -> RoundResult<Vec<Match>> {
        self.round(round_id).await?;
        Ok(self.store.round_matches(round_id).await?)
    }

    /// Live round standings computed from the matches finished so far
    pub async fn round_standings(&self, round_id: RoundId) -> RoundResult<Vec<Standing>> {
        self.round(round_id).await?;
        let teams = self.store.round_teams(round_id).await?;
        self.compute_round_standings(round_id, &teams).await
    }

    /// Division standings over the rounds finished so far
    pub async fn division_standings(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> RoundResult<Vec<DivisionStanding>> {
        self.ensure_division(tournament_id, division_id).await?;
        self.division_standings_with(tournament_id, division_id, None)
            .await
    }

    pub async fn round_state(&self, round_id: RoundId) -> RoundResult<RoundState> {
        let round = self.round(round_id).await?;
        let teams = self.store.round_teams(round_id).await?.len();
        let matches = self.store.round_matches(round_id).await?.len();
        Ok(RoundState::of(&round, teams, matches))
    }

    async fn ensure_division(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> RoundResult<()> {
        if self.store.tournament(tournament_id).await?.is_none() {
            return Err(RoundError::not_found("Tournament", tournament_id));
        }
        if self.store.division(division_id).await?.is_none()
            || !self.store.runs_division(tournament_id, division_id).await?
        {
            return Err(RoundError::not_found("Division", division_id));
        }
        Ok(())
    }
}

fn new_round(
    tournament_id: TournamentId,
    division_id: DivisionId,
    round_number: u32,
    blueprint: RoundBlueprint,
    performed_by: &str,
) -> TournamentRound {
    TournamentRound {
        id: Uuid::new_v4(),
        tournament_id,
        division_id,
        round_number,
        name: blueprint.name,
        previous_round_id: None,
        next_round_id: None,
        playoff_source_round_id: None,
        is_playoff: false,
        advancement: blueprint.advancement,
        match_strategy: blueprint.match_strategy,
        grouping: blueprint.grouping,
        court_plan: blueprint.court_plan,
        is_finished: false,
        is_locked: false,
        version: 0,
        updated_by: performed_by.to_string(),
        updated_at: Utc::now(),
    }
}

fn touch(round: &mut TournamentRound, performed_by: &str) {
    round.updated_by = performed_by.to_string();
    round.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::db::testing::FaultyStore;
    use crate::tournament::models::{
        Advancement, Division, MatchStrategy, RoundTemplate, SelectionStrategy, Team, Tournament,
    };

    struct Fixture {
        store: Arc<MemoryStore>,
        controller: RoundController,
        tournament_id: TournamentId,
        division_id: DivisionId,
    }

    async fn fixture(team_count: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let tournament = Tournament::new("Spring Open");
        let division = Division::new("U16");
        let (tournament_id, division_id) = (tournament.id, division.id);
        store.insert_tournament(tournament).await;
        store.insert_division(tournament_id, division).await;
        for seed in 1..=team_count {
            let team = Team::new(format!("Team {seed}"));
            let team_id = team.id;
            store.insert_team(team).await;
            store
                .enroll_team(tournament_id, division_id, team_id, seed)
                .await;
        }
        store
            .insert_round_template(RoundTemplate {
                id: Uuid::new_v4(),
                sequence: 1,
                name: "Pool play".to_string(),
                advancement: Advancement {
                    team_count: Some(2),
                    strategy: SelectionStrategy::TopByPoints,
                },
                match_strategy: MatchStrategy::RoundRobin,
                grouping: GroupSizing::NoGrouping,
            })
            .await;

        let controller = RoundController::new(store.clone(), ScheduleConfig::default());
        Fixture {
            store,
            controller,
            tournament_id,
            division_id,
        }
    }

    #[tokio::test]
    async fn test_first_round_requires_template() {
        let fx = fixture(4).await;
        let empty = Arc::new(MemoryStore::new());
        let tournament = Tournament::new("No templates");
        let division = Division::new("Open");
        let (t, d) = (tournament.id, division.id);
        empty.insert_tournament(tournament).await;
        empty.insert_division(t, division).await;
        let controller = RoundController::new(empty, ScheduleConfig::default());

        let result = controller
            .create_first_round(t, d, RoundSettings::default(), "admin")
            .await;
        assert!(matches!(result, Err(RoundError::Configuration(_))));

        let round = fx
            .controller
            .create_first_round(fx.tournament_id, fx.division_id, RoundSettings::default(), "admin")
            .await
            .unwrap();
        assert_eq!(round.name, "Pool play");
        assert_eq!(round.version, 1);
    }

    #[tokio::test]
    async fn test_commit_conflict_is_retried_once() {
        let fx = fixture(4).await;
        let store = Arc::new(FaultyStore::new(fx.store.clone()));
        let controller = RoundController::new(store.clone(), ScheduleConfig::default());

        store.fail_commits(1);
        let round = controller
            .create_first_round(fx.tournament_id, fx.division_id, RoundSettings::default(), "admin")
            .await
            .unwrap();
        assert_eq!(store.rejected_commits(), 1);
        assert_eq!(round.round_number, 1);

        // A second conflict surfaces and leaves nothing behind
        store.fail_commits(2);
        let err = controller.select_teams(round.id, "admin").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.rejected_commits(), 3);
        assert!(controller.round_teams(round.id).await.unwrap().is_empty());

        let teams = controller.select_teams(round.id, "admin").await.unwrap();
        assert_eq!(teams.len(), 4);
    }

    #[tokio::test]
    async fn test_unknown_division_is_not_found() {
        let fx = fixture(2).await;
        let result = fx
            .controller
            .create_first_round(fx.tournament_id, Uuid::new_v4(), RoundSettings::default(), "admin")
            .await;
        assert!(matches!(
            result,
            Err(RoundError::NotFound {
                entity: "Division",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_state_progression() {
        let fx = fixture(3).await;
        let c = &fx.controller;
        let round = c
            .create_first_round(fx.tournament_id, fx.division_id, RoundSettings::default(), "admin")
            .await
            .unwrap();
        assert_eq!(c.round_state(round.id).await.unwrap(), RoundState::Created);

        c.select_teams(round.id, "admin").await.unwrap();
        assert_eq!(c.round_state(round.id).await.unwrap(), RoundState::TeamsAssigned);

        let matches = c.generate_matches(round.id, "admin").await.unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(
            c.round_state(round.id).await.unwrap(),
            RoundState::MatchesGenerated
        );

        let result = c.regroup_round(round.id, GroupSizing::GroupCount(2), "admin").await;
        assert!(matches!(result, Err(RoundError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_generate_requires_two_teams() {
        let fx = fixture(1).await;
        let c = &fx.controller;
        let round = c
            .create_first_round(fx.tournament_id, fx.division_id, RoundSettings::default(), "admin")
            .await
            .unwrap();
        c.select_teams(round.id, "admin").await.unwrap();
        let result = c.generate_matches(round.id, "admin").await;
        assert!(matches!(result, Err(RoundError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_manual_strategy_is_unsupported() {
        let fx = fixture(4).await;
        let c = &fx.controller;
        let settings = RoundSettings {
            match_strategy: Some(MatchStrategy::Manual),
            ..Default::default()
        };
        let round = c
            .create_first_round(fx.tournament_id, fx.division_id, settings, "admin")
            .await
            .unwrap();
        c.select_teams(round.id, "admin").await.unwrap();
        let result = c.generate_matches(round.id, "admin").await;
        assert!(matches!(result, Err(RoundError::Unsupported(_))));
        assert!(fx.store.round_matches(round.id).await.unwrap().is_empty());
    }
}
