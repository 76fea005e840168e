//! PostgreSQL implementation of [`Store`].
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::sync::Arc;

use super::{
    store::{ChangeSet, Store, StoreError, StoreResult},
    timeouts::{DEFAULT_TRANSACTION_TIMEOUT, with_default_timeout},
};
use crate::tournament::models::{
    Announcement, Division, DivisionId, Match, MatchId, MatchSet, MatchUpdate, RoundId,
    RoundTemplate, Team, TeamId, Tournament, TournamentId, TournamentRound, TournamentRoundTeam,
    TournamentTeamDivision,
};

const ROUND_COLUMNS: &str = "id, tournament_id, division_id, round_number, name, previous_round_id, \
     next_round_id, playoff_source_round_id, is_playoff, advancement, match_strategy, grouping, \
     court_plan, is_finished, is_locked, version, updated_by, updated_at";

const MATCH_COLUMNS: &str = "id, tournament_id, division_id, round_id, match_number, team1_id, \
     team2_id, group_label, court, scheduled_at, team1_sets, team2_sets, current_set, is_started, \
     is_finished, is_disputed, is_locked, started_at, finished_at, version";

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(self.pool.as_ref()).await
    }

    async fn apply(&self, changes: ChangeSet) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Deactivations first so the single-active index never sees two rows
        let (active, inactive): (Vec<_>, Vec<_>) =
            changes.tournaments.iter().partition(|t| t.is_active);
        for tournament in inactive.into_iter().chain(active) {
            sqlx::query(
                r#"
                INSERT INTO tournaments (id, name, is_active, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, is_active = EXCLUDED.is_active
                "#,
            )
            .bind(tournament.id)
            .bind(&tournament.name)
            .bind(tournament.is_active)
            .bind(tournament.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;
        }

        for round in &changes.rounds {
            upsert_round(&mut tx, round).await?;
        }

        for (round_id, teams) in &changes.replace_round_teams {
            sqlx::query("DELETE FROM tournament_round_teams WHERE round_id = $1")
                .bind(round_id)
                .execute(&mut *tx)
                .await?;
            for team in teams {
                upsert_round_team(&mut tx, team).await?;
            }
        }

        for team in &changes.round_teams {
            upsert_round_team(&mut tx, team).await?;
        }

        for record in &changes.division_teams {
            sqlx::query(
                r#"
                UPDATE tournament_team_divisions
                SET seed = $4, group_label = $5, stats = $6, ranking_points = $7, rank = $8
                WHERE tournament_id = $1 AND division_id = $2 AND team_id = $3
                "#,
            )
            .bind(record.tournament_id)
            .bind(record.division_id)
            .bind(record.team_id)
            .bind(record.seed as i32)
            .bind(&record.group)
            .bind(serde_json::to_value(record.stats)?)
            .bind(record.ranking_points as i32)
            .bind(record.rank.map(|r| r as i32))
            .execute(&mut *tx)
            .await?;
        }

        for m in &changes.matches {
            upsert_match(&mut tx, m).await?;
        }

        for (match_id, set_number) in &changes.deleted_match_sets {
            sqlx::query("DELETE FROM match_sets WHERE match_id = $1 AND set_number = $2")
                .bind(match_id)
                .bind(*set_number as i32)
                .execute(&mut *tx)
                .await?;
        }

        for set in &changes.match_sets {
            sqlx::query(
                r#"
                INSERT INTO match_sets (match_id, set_number, team1_score, team2_score, is_finished, is_locked)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (match_id, set_number) DO UPDATE SET
                    team1_score = EXCLUDED.team1_score,
                    team2_score = EXCLUDED.team2_score,
                    is_finished = EXCLUDED.is_finished,
                    is_locked = EXCLUDED.is_locked
                "#,
            )
            .bind(set.match_id)
            .bind(set.set_number as i32)
            .bind(set.team1_score as i32)
            .bind(set.team2_score as i32)
            .bind(set.is_finished)
            .bind(set.is_locked)
            .execute(&mut *tx)
            .await?;
        }

        for update in &changes.match_updates {
            sqlx::query(
                r#"
                INSERT INTO match_updates (id, match_id, kind, description, performed_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(update.id)
            .bind(update.match_id)
            .bind(update.kind.to_string())
            .bind(&update.description)
            .bind(&update.performed_by)
            .bind(update.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for announcement in &changes.announcements {
            sqlx::query(
                r#"
                INSERT INTO announcements (id, tournament_id, match_id, kind, text, color, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(announcement.id)
            .bind(announcement.tournament_id)
            .bind(announcement.match_id)
            .bind(announcement.kind.to_string())
            .bind(&announcement.text)
            .bind(&announcement.color)
            .bind(announcement.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Update at the expected version, or insert when the row does not exist yet.
async fn upsert_round(tx: &mut Transaction<'_, Postgres>, round: &TournamentRound) -> StoreResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE tournament_rounds SET
            round_number = $3, name = $4, previous_round_id = $5, next_round_id = $6,
            playoff_source_round_id = $7, is_playoff = $8, advancement = $9, match_strategy = $10,
            grouping = $11, court_plan = $12, is_finished = $13, is_locked = $14,
            version = version + 1, updated_by = $15, updated_at = $16
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(round.id)
    .bind(round.version)
    .bind(round.round_number as i32)
    .bind(&round.name)
    .bind(round.previous_round_id)
    .bind(round.next_round_id)
    .bind(round.playoff_source_round_id)
    .bind(round.is_playoff)
    .bind(serde_json::to_value(round.advancement)?)
    .bind(serde_json::to_value(round.match_strategy)?)
    .bind(serde_json::to_value(round.grouping)?)
    .bind(serde_json::to_value(round.court_plan)?)
    .bind(round.is_finished)
    .bind(round.is_locked)
    .bind(&round.updated_by)
    .bind(round.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(map_write_error)?;

    if updated.rows_affected() == 1 {
        return Ok(());
    }

    let inserted = sqlx::query(&format!(
        "INSERT INTO tournament_rounds ({ROUND_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18) \
         ON CONFLICT (id) DO NOTHING"
    ))
    .bind(round.id)
    .bind(round.tournament_id)
    .bind(round.division_id)
    .bind(round.round_number as i32)
    .bind(&round.name)
    .bind(round.previous_round_id)
    .bind(round.next_round_id)
    .bind(round.playoff_source_round_id)
    .bind(round.is_playoff)
    .bind(serde_json::to_value(round.advancement)?)
    .bind(serde_json::to_value(round.match_strategy)?)
    .bind(serde_json::to_value(round.grouping)?)
    .bind(serde_json::to_value(round.court_plan)?)
    .bind(round.is_finished)
    .bind(round.is_locked)
    .bind(round.version + 1)
    .bind(&round.updated_by)
    .bind(round.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(map_write_error)?;

    if inserted.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "round {} changed (expected version {})",
            round.id, round.version
        )));
    }
    Ok(())
}

async fn upsert_round_team(
    tx: &mut Transaction<'_, Postgres>,
    team: &TournamentRoundTeam,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO tournament_round_teams (round_id, team_id, seed, group_label, stats, rank, ranking_points)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (round_id, team_id) DO UPDATE SET
            seed = EXCLUDED.seed,
            group_label = EXCLUDED.group_label,
            stats = EXCLUDED.stats,
            rank = EXCLUDED.rank,
            ranking_points = EXCLUDED.ranking_points
        "#,
    )
    .bind(team.round_id)
    .bind(team.team_id)
    .bind(team.seed as i32)
    .bind(&team.group)
    .bind(serde_json::to_value(team.stats)?)
    .bind(team.rank.map(|r| r as i32))
    .bind(team.ranking_points as i32)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_match(tx: &mut Transaction<'_, Postgres>, m: &Match) -> StoreResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE matches SET
            match_number = $3, team1_id = $4, team2_id = $5, group_label = $6, court = $7,
            scheduled_at = $8, team1_sets = $9, team2_sets = $10, current_set = $11,
            is_started = $12, is_finished = $13, is_disputed = $14, is_locked = $15,
            started_at = $16, finished_at = $17, version = version + 1
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(m.id)
    .bind(m.version)
    .bind(m.match_number as i32)
    .bind(m.team1_id)
    .bind(m.team2_id)
    .bind(&m.group)
    .bind(m.court as i32)
    .bind(m.scheduled_at)
    .bind(m.team1_sets as i32)
    .bind(m.team2_sets as i32)
    .bind(m.current_set as i32)
    .bind(m.is_started)
    .bind(m.is_finished)
    .bind(m.is_disputed)
    .bind(m.is_locked)
    .bind(m.started_at)
    .bind(m.finished_at)
    .execute(&mut **tx)
    .await
    .map_err(map_write_error)?;

    if updated.rows_affected() == 1 {
        return Ok(());
    }

    let inserted = sqlx::query(&format!(
        "INSERT INTO matches ({MATCH_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20) \
         ON CONFLICT (id) DO NOTHING"
    ))
    .bind(m.id)
    .bind(m.tournament_id)
    .bind(m.division_id)
    .bind(m.round_id)
    .bind(m.match_number as i32)
    .bind(m.team1_id)
    .bind(m.team2_id)
    .bind(&m.group)
    .bind(m.court as i32)
    .bind(m.scheduled_at)
    .bind(m.team1_sets as i32)
    .bind(m.team2_sets as i32)
    .bind(m.current_set as i32)
    .bind(m.is_started)
    .bind(m.is_finished)
    .bind(m.is_disputed)
    .bind(m.is_locked)
    .bind(m.started_at)
    .bind(m.finished_at)
    .bind(m.version + 1)
    .execute(&mut **tx)
    .await
    .map_err(map_write_error)?;

    if inserted.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "match {} changed (expected version {})",
            m.id, m.version
        )));
    }
    Ok(())
}

/// Unique violations become conflicts so callers can reload and retry.
fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err
        && db.code().as_deref() == Some("23505")
    {
        return StoreError::Conflict(db.message().to_string());
    }
    StoreError::Database(err)
}

fn json_column<T: DeserializeOwned>(row: &PgRow, column: &str) -> StoreResult<T> {
    let value: serde_json::Value = row.try_get(column)?;
    Ok(serde_json::from_value(value)?)
}

fn text_enum<T: DeserializeOwned>(row: &PgRow, column: &str) -> StoreResult<T> {
    let value: String = row.try_get(column)?;
    Ok(serde_json::from_value(serde_json::Value::String(value))?)
}

fn u32_column(row: &PgRow, column: &str) -> StoreResult<u32> {
    Ok(row.try_get::<i32, _>(column)? as u32)
}

fn tournament_from_row(row: &PgRow) -> StoreResult<Tournament> {
    Ok(Tournament {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn division_team_from_row(row: &PgRow) -> StoreResult<TournamentTeamDivision> {
    Ok(TournamentTeamDivision {
        tournament_id: row.try_get("tournament_id")?,
        division_id: row.try_get("division_id")?,
        team_id: row.try_get("team_id")?,
        seed: u32_column(row, "seed")?,
        group: row.try_get("group_label")?,
        stats: json_column(row, "stats")?,
        ranking_points: u32_column(row, "ranking_points")?,
        rank: row.try_get::<Option<i32>, _>("rank")?.map(|r| r as u32),
    })
}

fn round_from_row(row: &PgRow) -> StoreResult<TournamentRound> {
    Ok(TournamentRound {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        division_id: row.try_get("division_id")?,
        round_number: u32_column(row, "round_number")?,
        name: row.try_get("name")?,
        previous_round_id: row.try_get("previous_round_id")?,
        next_round_id: row.try_get("next_round_id")?,
        playoff_source_round_id: row.try_get("playoff_source_round_id")?,
        is_playoff: row.try_get("is_playoff")?,
        advancement: json_column(row, "advancement")?,
        match_strategy: json_column(row, "match_strategy")?,
        grouping: json_column(row, "grouping")?,
        court_plan: json_column(row, "court_plan")?,
        is_finished: row.try_get("is_finished")?,
        is_locked: row.try_get("is_locked")?,
        version: row.try_get("version")?,
        updated_by: row.try_get("updated_by")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn round_team_from_row(row: &PgRow) -> StoreResult<TournamentRoundTeam> {
    Ok(TournamentRoundTeam {
        round_id: row.try_get("round_id")?,
        team_id: row.try_get("team_id")?,
        seed: u32_column(row, "seed")?,
        group: row.try_get("group_label")?,
        stats: json_column(row, "stats")?,
        rank: row.try_get::<Option<i32>, _>("rank")?.map(|r| r as u32),
        ranking_points: u32_column(row, "ranking_points")?,
    })
}

fn match_from_row(row: &PgRow) -> StoreResult<Match> {
    Ok(Match {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        division_id: row.try_get("division_id")?,
        round_id: row.try_get("round_id")?,
        match_number: u32_column(row, "match_number")?,
        team1_id: row.try_get("team1_id")?,
        team2_id: row.try_get("team2_id")?,
        group: row.try_get("group_label")?,
        court: u32_column(row, "court")?,
        scheduled_at: row.try_get("scheduled_at")?,
        team1_sets: u32_column(row, "team1_sets")?,
        team2_sets: u32_column(row, "team2_sets")?,
        current_set: u32_column(row, "current_set")?,
        is_started: row.try_get("is_started")?,
        is_finished: row.try_get("is_finished")?,
        is_disputed: row.try_get("is_disputed")?,
        is_locked: row.try_get("is_locked")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        version: row.try_get("version")?,
    })
}

fn set_from_row(row: &PgRow) -> StoreResult<MatchSet> {
    Ok(MatchSet {
        match_id: row.try_get("match_id")?,
        set_number: u32_column(row, "set_number")?,
        team1_score: u32_column(row, "team1_score")?,
        team2_score: u32_column(row, "team2_score")?,
        is_finished: row.try_get("is_finished")?,
        is_locked: row.try_get("is_locked")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        let row = with_default_timeout(
            sqlx::query("SELECT id, name, is_active, created_at FROM tournaments WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.as_ref().map(tournament_from_row).transpose()
    }

    async fn tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let rows = with_default_timeout(
            sqlx::query("SELECT id, name, is_active, created_at FROM tournaments ORDER BY created_at")
                .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(tournament_from_row).collect()
    }

    async fn division(&self, id: DivisionId) -> StoreResult<Option<Division>> {
        let row = with_default_timeout(
            sqlx::query("SELECT id, name FROM divisions WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.map(|r| -> StoreResult<Division> {
            Ok(Division {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
            })
        })
        .transpose()
    }

    async fn runs_division(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<bool> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT 1 FROM tournament_divisions WHERE tournament_id = $1 AND division_id = $2",
            )
            .bind(tournament_id)
            .bind(division_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        Ok(row.is_some())
    }

    async fn team(&self, id: TeamId) -> StoreResult<Option<Team>> {
        let row = with_default_timeout(
            sqlx::query("SELECT id, name, short_name FROM teams WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.map(|r| -> StoreResult<Team> {
            Ok(Team {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                short_name: r.try_get("short_name")?,
            })
        })
        .transpose()
    }

    async fn division_teams(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<Vec<TournamentTeamDivision>> {
        let rows = with_default_timeout(
            sqlx::query(
                r#"
                SELECT tournament_id, division_id, team_id, seed, group_label, stats, ranking_points, rank
                FROM tournament_team_divisions
                WHERE tournament_id = $1 AND division_id = $2
                ORDER BY seed, team_id
                "#,
            )
            .bind(tournament_id)
            .bind(division_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(division_team_from_row).collect()
    }

    async fn round_template(&self, sequence: u32) -> StoreResult<Option<RoundTemplate>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT id, sequence, name, advancement, match_strategy, grouping FROM round_templates WHERE sequence = $1",
            )
            .bind(sequence as i32)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.map(|r| -> StoreResult<RoundTemplate> {
            Ok(RoundTemplate {
                id: r.try_get("id")?,
                sequence: u32_column(&r, "sequence")?,
                name: r.try_get("name")?,
                advancement: json_column(&r, "advancement")?,
                match_strategy: json_column(&r, "match_strategy")?,
                grouping: json_column(&r, "grouping")?,
            })
        })
        .transpose()
    }

    async fn round(&self, id: RoundId) -> StoreResult<Option<TournamentRound>> {
        let row = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {ROUND_COLUMNS} FROM tournament_rounds WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.as_ref().map(round_from_row).transpose()
    }

    async fn rounds(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<Vec<TournamentRound>> {
        let rows = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {ROUND_COLUMNS} FROM tournament_rounds \
                 WHERE tournament_id = $1 AND division_id = $2 \
                 ORDER BY round_number, is_playoff, updated_at"
            ))
            .bind(tournament_id)
            .bind(division_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(round_from_row).collect()
    }

    async fn round_teams(&self, round_id: RoundId) -> StoreResult<Vec<TournamentRoundTeam>> {
        let rows = with_default_timeout(
            sqlx::query(
                r#"
                SELECT round_id, team_id, seed, group_label, stats, rank, ranking_points
                FROM tournament_round_teams
                WHERE round_id = $1
                ORDER BY seed, team_id
                "#,
            )
            .bind(round_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(round_team_from_row).collect()
    }

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>> {
        let row = with_default_timeout(
            sqlx::query(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool.as_ref()),
        )
        .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn round_matches(&self, round_id: RoundId) -> StoreResult<Vec<Match>> {
        let rows = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches WHERE round_id = $1 ORDER BY match_number"
            ))
            .bind(round_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn max_match_number(&self, tournament_id: TournamentId) -> StoreResult<u32> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT COALESCE(MAX(match_number), 0) AS max_number FROM matches WHERE tournament_id = $1",
            )
            .bind(tournament_id)
            .fetch_one(self.pool.as_ref()),
        )
        .await?;
        u32_column(&row, "max_number")
    }

    async fn match_sets(&self, match_id: MatchId) -> StoreResult<Vec<MatchSet>> {
        let rows = with_default_timeout(
            sqlx::query(
                r#"
                SELECT match_id, set_number, team1_score, team2_score, is_finished, is_locked
                FROM match_sets WHERE match_id = $1 ORDER BY set_number
                "#,
            )
            .bind(match_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(set_from_row).collect()
    }

    async fn round_match_sets(&self, round_id: RoundId) -> StoreResult<Vec<MatchSet>> {
        let rows = with_default_timeout(
            sqlx::query(
                r#"
                SELECT s.match_id, s.set_number, s.team1_score, s.team2_score, s.is_finished, s.is_locked
                FROM match_sets s
                JOIN matches m ON m.id = s.match_id
                WHERE m.round_id = $1
                ORDER BY s.match_id, s.set_number
                "#,
            )
            .bind(round_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter().map(set_from_row).collect()
    }

    async fn match_updates(&self, match_id: MatchId) -> StoreResult<Vec<MatchUpdate>> {
        let rows = with_default_timeout(
            sqlx::query(
                r#"
                SELECT id, match_id, kind, description, performed_by, created_at
                FROM match_updates WHERE match_id = $1 ORDER BY created_at
                "#,
            )
            .bind(match_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter()
            .map(|r| -> StoreResult<MatchUpdate> {
                Ok(MatchUpdate {
                    id: r.try_get("id")?,
                    match_id: r.try_get("match_id")?,
                    kind: text_enum(r, "kind")?,
                    description: r.try_get("description")?,
                    performed_by: r.try_get("performed_by")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn announcements(&self, tournament_id: TournamentId) -> StoreResult<Vec<Announcement>> {
        let rows = with_default_timeout(
            sqlx::query(
                r#"
                SELECT id, tournament_id, match_id, kind, text, color, created_at
                FROM announcements WHERE tournament_id = $1 ORDER BY created_at
                "#,
            )
            .bind(tournament_id)
            .fetch_all(self.pool.as_ref()),
        )
        .await?;
        rows.iter()
            .map(|r| -> StoreResult<Announcement> {
                Ok(Announcement {
                    id: r.try_get("id")?,
                    tournament_id: r.try_get("tournament_id")?,
                    match_id: r.try_get("match_id")?,
                    kind: text_enum(r, "kind")?,
                    text: r.try_get("text")?,
                    color: r.try_get("color")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        match tokio::time::timeout(DEFAULT_TRANSACTION_TIMEOUT, self.apply(changes)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(DEFAULT_TRANSACTION_TIMEOUT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, DatabaseConfig};

    #[tokio::test]
    #[ignore = "requires a PostgreSQL database at DATABASE_URL"]
    async fn test_migrate_and_read_back_tournament() {
        let config = DatabaseConfig::from_env();
        let db = Database::connect(&config)
            .await
            .expect("Failed to connect to database");
        let store = db.store();
        store.migrate().await.expect("Migrations failed");

        let tournament = Tournament::new("Harbour Cup");
        let id = tournament.id;
        store
            .commit(ChangeSet {
                tournaments: vec![tournament],
                ..Default::default()
            })
            .await
            .unwrap();

        let loaded = store.tournament(id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Harbour Cup");
        assert_eq!(store.max_match_number(id).await.unwrap(), 0);
    }
}
