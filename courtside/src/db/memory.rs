//! In-memory [`Store`] used for tests, demos and single-process deployments.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

use super::store::{ChangeSet, Store, StoreError, StoreResult};
use crate::tournament::models::{
    Announcement, Division, DivisionId, Match, MatchId, MatchSet, MatchUpdate, RoundId,
    RoundTemplate, Team, TeamId, Tournament, TournamentDivision, TournamentId, TournamentRound,
    TournamentRoundTeam, TournamentTeamDivision,
};

#[derive(Default)]
struct Tables {
    tournaments: HashMap<TournamentId, Tournament>,
    divisions: HashMap<DivisionId, Division>,
    tournament_divisions: HashSet<TournamentDivision>,
    teams: HashMap<TeamId, Team>,
    division_teams: HashMap<(TournamentId, DivisionId, TeamId), TournamentTeamDivision>,
    templates: BTreeMap<u32, RoundTemplate>,
    rounds: HashMap<RoundId, TournamentRound>,
    round_teams: HashMap<RoundId, Vec<TournamentRoundTeam>>,
    matches: HashMap<MatchId, Match>,
    match_sets: BTreeMap<(MatchId, u32), MatchSet>,
    match_updates: Vec<MatchUpdate>,
    announcements: Vec<Announcement>,
}

impl Tables {
    /// Reject the whole change set if any versioned row is stale or a unique key collides.
    fn validate(&self, changes: &ChangeSet) -> StoreResult<()> {
        for round in &changes.rounds {
            if let Some(stored) = self.rounds.get(&round.id)
                && stored.version != round.version
            {
                return Err(StoreError::Conflict(format!(
                    "round {} changed (version {} != {})",
                    round.id, stored.version, round.version
                )));
            }
            if round.is_playoff {
                continue;
            }
            let clash = self
                .rounds
                .values()
                .chain(changes.rounds.iter())
                .any(|other| {
                    other.id != round.id
                        && !other.is_playoff
                        && other.tournament_id == round.tournament_id
                        && other.division_id == round.division_id
                        && other.round_number == round.round_number
                });
            if clash {
                return Err(StoreError::Conflict(format!(
                    "round number {} already exists in division {}",
                    round.round_number, round.division_id
                )));
            }
        }

        if changes.tournaments.iter().any(|t| t.is_active) {
            let mut active = self
                .tournaments
                .values()
                .filter(|t| !changes.tournaments.iter().any(|c| c.id == t.id))
                .chain(changes.tournaments.iter())
                .filter(|t| t.is_active);
            if let (Some(first), Some(second)) = (active.next(), active.next()) {
                return Err(StoreError::Conflict(format!(
                    "tournaments {} and {} would both be active",
                    first.id, second.id
                )));
            }
        }

        let mut numbers = HashSet::new();
        for m in &changes.matches {
            if let Some(stored) = self.matches.get(&m.id)
                && stored.version != m.version
            {
                return Err(StoreError::Conflict(format!(
                    "match {} changed (version {} != {})",
                    m.id, stored.version, m.version
                )));
            }
            let taken = self.matches.values().any(|other| {
                other.id != m.id
                    && other.tournament_id == m.tournament_id
                    && other.match_number == m.match_number
            });
            if taken || !numbers.insert((m.tournament_id, m.match_number)) {
                return Err(StoreError::Conflict(format!(
                    "match number {} already used in tournament {}",
                    m.match_number, m.tournament_id
                )));
            }
        }

        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) {
        for tournament in changes.tournaments {
            self.tournaments.insert(tournament.id, tournament);
        }
        for mut round in changes.rounds {
            round.version += 1;
            self.rounds.insert(round.id, round);
        }
        for (round_id, teams) in changes.replace_round_teams {
            self.round_teams.insert(round_id, teams);
        }
        for team in changes.round_teams {
            let rows = self.round_teams.entry(team.round_id).or_default();
            match rows.iter_mut().find(|t| t.team_id == team.team_id) {
                Some(row) => *row = team,
                None => rows.push(team),
            }
        }
        for record in changes.division_teams {
            self.division_teams.insert(
                (record.tournament_id, record.division_id, record.team_id),
                record,
            );
        }
        for mut m in changes.matches {
            m.version += 1;
            self.matches.insert(m.id, m);
        }
        for key in changes.deleted_match_sets {
            self.match_sets.remove(&key);
        }
        for set in changes.match_sets {
            self.match_sets.insert((set.match_id, set.set_number), set);
        }
        self.match_updates.extend(changes.match_updates);
        self.announcements.extend(changes.announcements);
    }
}

/// Thread-safe in-memory store. A commit holds the write lock for its whole duration.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_tournament(&self, tournament: Tournament) {
        self.tables
            .write()
            .await
            .tournaments
            .insert(tournament.id, tournament);
    }

    /// Register a division and attach it to a tournament
    pub async fn insert_division(&self, tournament_id: TournamentId, division: Division) {
        let mut tables = self.tables.write().await;
        tables.tournament_divisions.insert(TournamentDivision {
            tournament_id,
            division_id: division.id,
        });
        tables.divisions.insert(division.id, division);
    }

    pub async fn insert_team(&self, team: Team) {
        self.tables.write().await.teams.insert(team.id, team);
    }

    /// Add a team to a division roster with the given seed
    pub async fn enroll_team(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
        team_id: TeamId,
        seed: u32,
    ) {
        let record = TournamentTeamDivision::new(tournament_id, division_id, team_id, seed);
        self.tables
            .write()
            .await
            .division_teams
            .insert((tournament_id, division_id, team_id), record);
    }

    pub async fn insert_round_template(&self, template: RoundTemplate) {
        self.tables
            .write()
            .await
            .templates
            .insert(template.sequence, template);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        Ok(self.tables.read().await.tournaments.get(&id).cloned())
    }

    async fn tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let mut list: Vec<_> = self.tables.read().await.tournaments.values().cloned().collect();
        list.sort_by_key(|t| t.created_at);
        Ok(list)
    }

    async fn division(&self, id: DivisionId) -> StoreResult<Option<Division>> {
        Ok(self.tables.read().await.divisions.get(&id).cloned())
    }

    async fn runs_division(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .await
            .tournament_divisions
            .contains(&TournamentDivision {
                tournament_id,
                division_id,
            }))
    }

    async fn team(&self, id: TeamId) -> StoreResult<Option<Team>> {
        Ok(self.tables.read().await.teams.get(&id).cloned())
    }

    async fn division_teams(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<Vec<TournamentTeamDivision>> {
        let tables = self.tables.read().await;
        let mut roster: Vec<_> = tables
            .division_teams
            .values()
            .filter(|r| r.tournament_id == tournament_id && r.division_id == division_id)
            .cloned()
            .collect();
        roster.sort_by_key(|r| (r.seed, r.team_id));
        Ok(roster)
    }

    async fn round_template(&self, sequence: u32) -> StoreResult<Option<RoundTemplate>> {
        Ok(self.tables.read().await.templates.get(&sequence).cloned())
    }

    async fn round(&self, id: RoundId) -> StoreResult<Option<TournamentRound>> {
        Ok(self.tables.read().await.rounds.get(&id).cloned())
    }

    async fn rounds(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<Vec<TournamentRound>> {
        let tables = self.tables.read().await;
        let mut rounds: Vec<_> = tables
            .rounds
            .values()
            .filter(|r| r.tournament_id == tournament_id && r.division_id == division_id)
            .cloned()
            .collect();
        rounds.sort_by_key(|r| (r.round_number, r.is_playoff, r.updated_at));
        Ok(rounds)
    }

    async fn round_teams(&self, round_id: RoundId) -> StoreResult<Vec<TournamentRoundTeam>> {
        let tables = self.tables.read().await;
        let mut teams = tables.round_teams.get(&round_id).cloned().unwrap_or_default();
        teams.sort_by_key(|t| (t.seed, t.team_id));
        Ok(teams)
    }

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>> {
        Ok(self.tables.read().await.matches.get(&id).cloned())
    }

    async fn round_matches(&self, round_id: RoundId) -> StoreResult<Vec<Match>> {
        let tables = self.tables.read().await;
        let mut matches: Vec<_> = tables
            .matches
            .values()
            .filter(|m| m.round_id == round_id)
            .cloned()
            .collect();
        matches.sort_by_key(|m| m.match_number);
        Ok(matches)
    }

    async fn max_match_number(&self, tournament_id: TournamentId) -> StoreResult<u32> {
        Ok(self
            .tables
            .read()
            .await
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .map(|m| m.match_number)
            .max()
            .unwrap_or(0))
    }

    async fn match_sets(&self, match_id: MatchId) -> StoreResult<Vec<MatchSet>> {
        Ok(self
            .tables
            .read()
            .await
            .match_sets
            .range((match_id, 0)..=(match_id, u32::MAX))
            .map(|(_, set)| set.clone())
            .collect())
    }

    async fn round_match_sets(&self, round_id: RoundId) -> StoreResult<Vec<MatchSet>> {
        let tables = self.tables.read().await;
        let match_ids: HashSet<MatchId> = tables
            .matches
            .values()
            .filter(|m| m.round_id == round_id)
            .map(|m| m.id)
            .collect();
        Ok(tables
            .match_sets
            .values()
            .filter(|s| match_ids.contains(&s.match_id))
            .cloned()
            .collect())
    }

    async fn match_updates(&self, match_id: MatchId) -> StoreResult<Vec<MatchUpdate>> {
        Ok(self
            .tables
            .read()
            .await
            .match_updates
            .iter()
            .filter(|u| u.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn announcements(&self, tournament_id: TournamentId) -> StoreResult<Vec<Announcement>> {
        Ok(self
            .tables
            .read()
            .await
            .announcements
            .iter()
            .filter(|a| a.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut tables = self.tables.write().await;
        tables.validate(&changes)?;
        tables.apply(changes);
        Ok(())
    }
}
