//! Console subcommands: parsing from the command line and execution.

use anyhow::{Context as _, anyhow, bail};
use chrono::{DateTime, Utc};
use courtside::{
    automation::{AutomationEvent, EventQueue},
    round::{RoundController, RoundError, RoundSettings},
    tournament::{
        DivisionId, GroupSizing, MatchId, MatchStrategy, RoundId, SelectionStrategy, Side, TeamId,
        TournamentId, TournamentManager,
    },
};
use pico_args::Arguments;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Everything a command needs to run
pub struct Context {
    pub tournaments: TournamentManager,
    pub rounds: RoundController,
    pub queue: EventQueue,
    pub performed_by: String,
}

/// A parsed console command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Tournaments,
    CreateTournament { name: String },
    Activate { tournament_id: TournamentId },
    Rounds { tournament_id: TournamentId, division_id: DivisionId },
    Round { round_id: RoundId },
    State { round_id: RoundId },
    Teams { round_id: RoundId },
    Matches { round_id: RoundId },
    Standings { round_id: RoundId },
    DivisionStandings { tournament_id: TournamentId, division_id: DivisionId },
    Candidates { round_id: RoundId },
    CreateFirstRound {
        tournament_id: TournamentId,
        division_id: DivisionId,
        settings: RoundSettings,
    },
    CreateNextRound { round_id: RoundId, settings: RoundSettings },
    CreatePlayoff { round_id: RoundId, settings: RoundSettings },
    SelectTeams { round_id: RoundId },
    AssignPlayoff { round_id: RoundId, team_ids: Vec<TeamId> },
    Regroup { round_id: RoundId, grouping: GroupSizing },
    Generate { round_id: RoundId },
    Finalize { round_id: RoundId },
    Unfinalize { round_id: RoundId },
    Lock { round_id: RoundId },
    Unlock { round_id: RoundId },
    RefreshStandings { round_id: RoundId },
    Event(AutomationEvent),
    Replay { path: PathBuf },
}

impl Command {
    /// Parse the subcommand `name` and its arguments.
    ///
    /// `source` is recorded on automation events.
    pub fn parse(name: &str, args: &mut Arguments, source: &str) -> anyhow::Result<Self> {
        let command = match name {
            "tournaments" => Command::Tournaments,
            "create-tournament" => Command::CreateTournament {
                name: args.free_from_str().context("missing tournament name")?,
            },
            "activate" => Command::Activate {
                tournament_id: args.free_from_str()?,
            },
            "rounds" => Command::Rounds {
                tournament_id: args.free_from_str()?,
                division_id: args.free_from_str()?,
            },
            "round" => Command::Round {
                round_id: args.free_from_str()?,
            },
            "state" => Command::State {
                round_id: args.free_from_str()?,
            },
            "teams" => Command::Teams {
                round_id: args.free_from_str()?,
            },
            "matches" => Command::Matches {
                round_id: args.free_from_str()?,
            },
            "standings" => Command::Standings {
                round_id: args.free_from_str()?,
            },
            "division-standings" => Command::DivisionStandings {
                tournament_id: args.free_from_str()?,
                division_id: args.free_from_str()?,
            },
            "candidates" => Command::Candidates {
                round_id: args.free_from_str()?,
            },
            "create-first-round" => {
                let settings = parse_settings(args)?;
                Command::CreateFirstRound {
                    tournament_id: args.free_from_str()?,
                    division_id: args.free_from_str()?,
                    settings,
                }
            }
            "create-next-round" => {
                let settings = parse_settings(args)?;
                Command::CreateNextRound {
                    round_id: args.free_from_str()?,
                    settings,
                }
            }
            "create-playoff" => {
                let settings = parse_settings(args)?;
                Command::CreatePlayoff {
                    round_id: args.free_from_str()?,
                    settings,
                }
            }
            "select-teams" => Command::SelectTeams {
                round_id: args.free_from_str()?,
            },
            "assign-playoff" => {
                let round_id = args.free_from_str()?;
                let mut team_ids = Vec::new();
                while let Some(team_id) = args.opt_free_from_str()? {
                    team_ids.push(team_id);
                }
                if team_ids.is_empty() {
                    bail!("assign-playoff needs at least one team id");
                }
                Command::AssignPlayoff { round_id, team_ids }
            }
            "regroup" => {
                let grouping = parse_grouping(args)?
                    .ok_or_else(|| anyhow!("regroup needs --groups, --per-group or --no-grouping"))?;
                Command::Regroup {
                    round_id: args.free_from_str()?,
                    grouping,
                }
            }
            "generate" => Command::Generate {
                round_id: args.free_from_str()?,
            },
            "finalize" => Command::Finalize {
                round_id: args.free_from_str()?,
            },
            "unfinalize" => Command::Unfinalize {
                round_id: args.free_from_str()?,
            },
            "lock" => Command::Lock {
                round_id: args.free_from_str()?,
            },
            "unlock" => Command::Unlock {
                round_id: args.free_from_str()?,
            },
            "refresh-standings" => Command::RefreshStandings {
                round_id: args.free_from_str()?,
            },
            "event" => {
                let kind: String = args.free_from_str().context("missing event kind")?;
                Command::Event(parse_event(&kind, args, source)?)
            }
            "replay" => Command::Replay {
                path: args.value_from_str("--file")?,
            },
            other => bail!("unknown command '{other}', see --help"),
        };
        Ok(command)
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Tournaments => "tournaments",
            Command::CreateTournament { .. } => "create_tournament",
            Command::Activate { .. } => "activate",
            Command::Rounds { .. } => "rounds",
            Command::Round { .. } => "round",
            Command::State { .. } => "state",
            Command::Teams { .. } => "teams",
            Command::Matches { .. } => "matches",
            Command::Standings { .. } => "standings",
            Command::DivisionStandings { .. } => "division_standings",
            Command::Candidates { .. } => "candidates",
            Command::CreateFirstRound { .. } => "create_first_round",
            Command::CreateNextRound { .. } => "create_next_round",
            Command::CreatePlayoff { .. } => "create_playoff",
            Command::SelectTeams { .. } => "select_teams",
            Command::AssignPlayoff { .. } => "assign_playoff",
            Command::Regroup { .. } => "regroup",
            Command::Generate { .. } => "generate",
            Command::Finalize { .. } => "finalize",
            Command::Unfinalize { .. } => "unfinalize",
            Command::Lock { .. } => "lock",
            Command::Unlock { .. } => "unlock",
            Command::RefreshStandings { .. } => "refresh_standings",
            Command::Event(event) => event.kind(),
            Command::Replay { .. } => "replay",
        }
    }

    /// Whether the command only reads
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Command::Tournaments
                | Command::Rounds { .. }
                | Command::Round { .. }
                | Command::State { .. }
                | Command::Teams { .. }
                | Command::Matches { .. }
                | Command::Standings { .. }
                | Command::DivisionStandings { .. }
                | Command::Candidates { .. }
        )
    }
}

fn parse_settings(args: &mut Arguments) -> anyhow::Result<RoundSettings> {
    Ok(RoundSettings {
        name: args.opt_value_from_str("--name")?,
        advancing_team_count: args.opt_value_from_str("--advance")?,
        selection_strategy: args.opt_value_from_fn("--select", parse_selection)?,
        match_strategy: args.opt_value_from_fn("--matches", parse_match_strategy)?,
        grouping: parse_grouping(args)?,
        first_court: args.opt_value_from_str("--first-court")?,
        court_count: args.opt_value_from_str("--courts")?,
        start_time: args.opt_value_from_str::<_, DateTime<Utc>>("--start")?,
        slot_minutes: args.opt_value_from_str("--slot")?,
    })
}

fn parse_grouping(args: &mut Arguments) -> anyhow::Result<Option<GroupSizing>> {
    let none = args.contains("--no-grouping");
    let groups: Option<u32> = args.opt_value_from_str("--groups")?;
    let per_group: Option<u32> = args.opt_value_from_str("--per-group")?;

    match (none, groups, per_group) {
        (false, None, None) => Ok(None),
        (true, None, None) => Ok(Some(GroupSizing::NoGrouping)),
        (false, Some(n), None) => Ok(Some(GroupSizing::GroupCount(n))),
        (false, None, Some(n)) => Ok(Some(GroupSizing::TeamsPerGroup(n))),
        _ => bail!("--groups, --per-group and --no-grouping are mutually exclusive"),
    }
}

fn parse_selection(s: &str) -> Result<SelectionStrategy, String> {
    match s {
        "winners-only" | "winners_only" => Ok(SelectionStrategy::WinnersOnly),
        "top-seed-half" | "top_seed_half" => Ok(SelectionStrategy::TopSeedHalf),
        "top-by-points" | "top_by_points" => Ok(SelectionStrategy::TopByPoints),
        "group-winners" | "top_of_each_group_plus_next_best" => {
            Ok(SelectionStrategy::TopOfEachGroupPlusNextBest)
        }
        other => Err(format!("unknown selection strategy '{other}'")),
    }
}

fn parse_match_strategy(s: &str) -> Result<MatchStrategy, String> {
    match s {
        "round-robin" | "round_robin" => Ok(MatchStrategy::RoundRobin),
        "bracket" | "seeded_bracket" => Ok(MatchStrategy::SeededBracket),
        "manual" => Ok(MatchStrategy::Manual),
        other => Err(format!("unknown match strategy '{other}'")),
    }
}

fn parse_side(s: &str) -> Result<Side, String> {
    match s {
        "1" | "team1" => Ok(Side::Team1),
        "2" | "team2" => Ok(Side::Team2),
        other => Err(format!("unknown side '{other}', expected team1 or team2")),
    }
}

fn parse_event(kind: &str, args: &mut Arguments, source: &str) -> anyhow::Result<AutomationEvent> {
    let source = source.to_string();
    let event = match kind {
        "call-to-court" => AutomationEvent::CallToCourt {
            match_id: args.free_from_str()?,
            source,
        },
        "match-start" => AutomationEvent::MatchStart {
            match_id: args.free_from_str()?,
            source,
        },
        "set-start" => AutomationEvent::MatchSetStart {
            match_id: args.free_from_str()?,
            source,
        },
        "set-end" => AutomationEvent::MatchSetEnd {
            match_id: args.free_from_str()?,
            source,
        },
        "score" => {
            let match_id: MatchId = args.free_from_str()?;
            let side = args.free_from_fn(parse_side)?;
            let delta: i32 = args.free_from_str()?;
            AutomationEvent::SetScoreDelta {
                match_id,
                side,
                delta,
                source,
            }
        }
        "revert-set" => AutomationEvent::RevertToPreviousSet {
            match_id: args.free_from_str()?,
            source,
        },
        "match-end" => AutomationEvent::MatchEnd {
            match_id: args.free_from_str()?,
            source,
        },
        "dispute" => AutomationEvent::MatchDisputed {
            match_id: args.free_from_str()?,
            reason: args.free_from_str().context("missing dispute reason")?,
            source,
        },
        "rank-refresh" => AutomationEvent::DivisionRankRefresh {
            tournament_id: args.free_from_str()?,
            division_id: args.free_from_str()?,
            source,
        },
        other => bail!("unknown event kind '{other}'"),
    };
    Ok(event)
}

/// Run a command, printing its result as JSON
pub async fn execute(command: Command, ctx: &Context) -> anyhow::Result<()> {
    let by = ctx.performed_by.as_str();
    let rounds = &ctx.rounds;

    match command {
        Command::Tournaments => print_json(&ctx.tournaments.list_tournaments().await?),
        Command::CreateTournament { name } => {
            print_json(&ctx.tournaments.create_tournament(&name).await?)
        }
        Command::Activate { tournament_id } => print_json(
            &ctx.tournaments
                .activate_tournament(tournament_id, by)
                .await?,
        ),
        Command::Rounds {
            tournament_id,
            division_id,
        } => print_json(&rounds.rounds(tournament_id, division_id).await.map_err(rejected)?),
        Command::Round { round_id } => print_json(&rounds.round(round_id).await.map_err(rejected)?),
        Command::State { round_id } => {
            print_json(&rounds.round_state(round_id).await.map_err(rejected)?)
        }
        Command::Teams { round_id } => {
            print_json(&rounds.round_teams(round_id).await.map_err(rejected)?)
        }
        Command::Matches { round_id } => {
            print_json(&rounds.round_matches(round_id).await.map_err(rejected)?)
        }
        Command::Standings { round_id } => {
            print_json(&rounds.round_standings(round_id).await.map_err(rejected)?)
        }
        Command::DivisionStandings {
            tournament_id,
            division_id,
        } => print_json(
            &rounds
                .division_standings(tournament_id, division_id)
                .await
                .map_err(rejected)?,
        ),
        Command::Candidates { round_id } => {
            print_json(&rounds.playoff_candidates(round_id).await.map_err(rejected)?)
        }
        Command::CreateFirstRound {
            tournament_id,
            division_id,
            settings,
        } => print_json(
            &rounds
                .create_first_round(tournament_id, division_id, settings, by)
                .await
                .map_err(rejected)?,
        ),
        Command::CreateNextRound { round_id, settings } => print_json(
            &rounds
                .create_next_round(round_id, settings, by)
                .await
                .map_err(rejected)?,
        ),
        Command::CreatePlayoff { round_id, settings } => print_json(
            &rounds
                .create_playoff_round(round_id, settings, by)
                .await
                .map_err(rejected)?,
        ),
        Command::SelectTeams { round_id } => {
            print_json(&rounds.select_teams(round_id, by).await.map_err(rejected)?)
        }
        Command::AssignPlayoff { round_id, team_ids } => print_json(
            &rounds
                .assign_playoff_teams(round_id, &team_ids, by)
                .await
                .map_err(rejected)?,
        ),
        Command::Regroup { round_id, grouping } => print_json(
            &rounds
                .regroup_round(round_id, grouping, by)
                .await
                .map_err(rejected)?,
        ),
        Command::Generate { round_id } => {
            print_json(&rounds.generate_matches(round_id, by).await.map_err(rejected)?)
        }
        Command::Finalize { round_id } => {
            print_json(&rounds.finalize_round(round_id, by).await.map_err(rejected)?)
        }
        Command::Unfinalize { round_id } => {
            print_json(&rounds.unfinalize_round(round_id, by).await.map_err(rejected)?)
        }
        Command::Lock { round_id } => {
            print_json(&rounds.lock_round(round_id, by).await.map_err(rejected)?)
        }
        Command::Unlock { round_id } => {
            print_json(&rounds.unlock_round(round_id, by).await.map_err(rejected)?)
        }
        Command::RefreshStandings { round_id } => print_json(
            &rounds
                .refresh_round_standings(round_id, by)
                .await
                .map_err(rejected)?,
        ),
        Command::Event(event) => {
            let kind = event.kind();
            ctx.queue.submit(event).await?;
            log::info!("Queued {} event", kind);
            Ok(())
        }
        Command::Replay { path } => replay(&path, &ctx.queue).await,
    }
}

/// Submit every event of a JSON-lines file in order.
///
/// Blank lines and lines starting with `#` are skipped. A line that does not
/// parse is reported and skipped.
async fn replay(path: &Path, queue: &EventQueue) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let (submitted, skipped) = submit_lines(&content, queue).await?;
    log::info!(
        "Replayed {} events from {} ({} skipped)",
        submitted,
        path.display(),
        skipped
    );
    Ok(())
}

pub async fn submit_lines(content: &str, queue: &EventQueue) -> anyhow::Result<(usize, usize)> {
    let mut submitted = 0;
    let mut skipped = 0;
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<AutomationEvent>(line) {
            Ok(event) => {
                queue.submit(event).await?;
                submitted += 1;
            }
            Err(e) => {
                log::warn!("Line {}: not an automation event ({})", number + 1, e);
                skipped += 1;
            }
        }
    }
    Ok((submitted, skipped))
}

/// Round errors carry a caller-safe message; the full error goes to the log
fn rejected(err: RoundError) -> anyhow::Error {
    log::debug!("Round operation failed: {:?}", err);
    anyhow!(err.client_message())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use uuid::Uuid;

    fn args(list: &[&str]) -> Arguments {
        Arguments::from_vec(list.iter().map(OsString::from).collect())
    }

    #[test]
    fn test_parse_round_command() {
        let id = Uuid::new_v4();
        let mut a = args(&[&id.to_string()]);
        let command = Command::parse("finalize", &mut a, "desk").unwrap();
        assert_eq!(command, Command::Finalize { round_id: id });
        assert!(!command.is_query());
    }

    #[test]
    fn test_parse_settings() {
        let (t, d) = (Uuid::new_v4(), Uuid::new_v4());
        let mut a = args(&[
            "--groups",
            "3",
            "--matches",
            "bracket",
            "--courts",
            "2",
            &t.to_string(),
            &d.to_string(),
        ]);
        let command = Command::parse("create-first-round", &mut a, "desk").unwrap();
        let Command::CreateFirstRound { settings, .. } = command else {
            panic!("wrong command");
        };
        assert_eq!(settings.grouping, Some(GroupSizing::GroupCount(3)));
        assert_eq!(settings.match_strategy, Some(MatchStrategy::SeededBracket));
        assert_eq!(settings.court_count, Some(2));
        assert_eq!(settings.name, None);
    }

    #[test]
    fn test_conflicting_grouping_is_rejected() {
        let mut a = args(&["--groups", "2", "--no-grouping", &Uuid::new_v4().to_string()]);
        assert!(Command::parse("regroup", &mut a, "desk").is_err());
    }

    #[test]
    fn test_parse_score_event() {
        let id = Uuid::new_v4();
        let mut a = args(&["score", &id.to_string(), "team2", "3"]);
        let command = Command::parse("event", &mut a, "court-4").unwrap();
        assert_eq!(
            command,
            Command::Event(AutomationEvent::SetScoreDelta {
                match_id: id,
                side: Side::Team2,
                delta: 3,
                source: "court-4".to_string(),
            })
        );
        assert_eq!(command.name(), "set_score_delta");
    }

    async fn context() -> (
        Context,
        tokio::task::JoinHandle<courtside::automation::WorkerReport>,
        Vec<Uuid>,
    ) {
        use courtside::automation::{AutomationConfig, AutomationWorker, LogBroadcaster};
        use courtside::db::MemoryStore;
        use courtside::round::ScheduleConfig;
        use courtside::tournament::{Advancement, Division, RoundTemplate, Team, Tournament};
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let tournament = Tournament::new("Harbour Cup");
        let division = Division::new("Open");
        let ids = vec![tournament.id, division.id];
        store.insert_tournament(tournament).await;
        store.insert_division(ids[0], division).await;
        for seed in 1..=4 {
            let team = Team::new(format!("Team {seed}"));
            let team_id = team.id;
            store.insert_team(team).await;
            store.enroll_team(ids[0], ids[1], team_id, seed).await;
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

        let rounds = RoundController::new(store.clone(), ScheduleConfig::default());
        let (worker, queue) = AutomationWorker::new(
            rounds.clone(),
            Arc::new(LogBroadcaster),
            &AutomationConfig::default(),
        );
        let ctx = Context {
            tournaments: TournamentManager::new(store),
            rounds,
            queue,
            performed_by: "desk".to_string(),
        };
        (ctx, worker.spawn(), ids)
    }

    #[tokio::test]
    async fn test_execute_round_commands() {
        let (ctx, worker, ids) = context().await;

        let command = Command::CreateFirstRound {
            tournament_id: ids[0],
            division_id: ids[1],
            settings: RoundSettings::default(),
        };
        execute(command, &ctx).await.unwrap();

        let round = ctx.rounds.rounds(ids[0], ids[1]).await.unwrap().remove(0);
        execute(Command::SelectTeams { round_id: round.id }, &ctx)
            .await
            .unwrap();
        execute(Command::Generate { round_id: round.id }, &ctx)
            .await
            .unwrap();
        assert_eq!(ctx.rounds.round_matches(round.id).await.unwrap().len(), 6);

        // Matches are unplayed, so the round cannot be finalized yet
        let err = execute(Command::Finalize { round_id: round.id }, &ctx)
            .await
            .unwrap_err();
        assert!(!err.to_string().is_empty());

        ctx.queue.shutdown(courtside::automation::ShutdownMode::Drain);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_replay_lines() {
        let (ctx, worker, ids) = context().await;
        let round = ctx
            .rounds
            .create_first_round(ids[0], ids[1], RoundSettings::default(), "desk")
            .await
            .unwrap();
        ctx.rounds.select_teams(round.id, "desk").await.unwrap();
        let first = ctx.rounds.generate_matches(round.id, "desk").await.unwrap()[0].id;

        let content = format!(
            "# court 1\n\n\
             {{\"kind\":\"match_start\",\"match_id\":\"{first}\",\"source\":\"court-1\"}}\n\
             not json\n\
             {{\"kind\":\"set_score_delta\",\"match_id\":\"{first}\",\"side\":\"team1\",\"delta\":2,\"source\":\"court-1\"}}\n"
        );
        let (submitted, skipped) = submit_lines(&content, &ctx.queue).await.unwrap();
        assert_eq!((submitted, skipped), (2, 1));

        ctx.queue.shutdown(courtside::automation::ShutdownMode::Drain);
        let report = worker.await.unwrap();
        assert_eq!(report.processed, 2);

        let m = ctx.rounds.round_matches(round.id).await.unwrap();
        let started = m.iter().find(|m| m.id == first).unwrap();
        assert!(started.is_started);
    }

    #[test]
    fn test_unknown_command() {
        let mut a = args(&[]);
        assert!(Command::parse("launch", &mut a, "desk").is_err());
    }
}
