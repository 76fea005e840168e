//! Operator console for courtside tournaments.
//!
//! Each invocation runs one command against the tournament database. Match
//! events are handed to an automation worker that runs for the lifetime of
//! the command and drains its queue before exit.

mod commands;
mod config;
mod logging;
mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Error;
use commands::{Command, Context};
use config::{AdminConfig, Overrides};
use courtside::{
    automation::{AutomationWorker, LogBroadcaster, ShutdownMode},
    db::{Database, Store},
    round::RoundController,
    tournament::TournamentManager,
};
use log::info;
use pico_args::Arguments;

const HELP: &str = "\
Operate courtside tournament rounds and match automation

USAGE:
  cs_admin [OPTIONS] <COMMAND> [ARGS]

OPTIONS:
  --db-url          URL       Database connection string  [default: env DATABASE_URL]
  --queue-capacity  N         Automation queue capacity   [default: env QUEUE_CAPACITY or 1000]
  --metrics-bind    IP:PORT   Serve Prometheus metrics    [default: env METRICS_BIND, disabled]
  --by              NAME      Actor recorded on changes   [default: env ADMIN_USER or cs_admin]
  --migrate                   Apply database migrations before running the command

FLAGS:
  -h, --help                  Print help information

TOURNAMENTS:
  tournaments
  create-tournament <NAME>
  activate <TOURNAMENT>

ROUNDS:
  rounds <TOURNAMENT> <DIVISION>
  round | state | teams | matches | standings | candidates <ROUND>
  division-standings <TOURNAMENT> <DIVISION>
  create-first-round [SETTINGS] <TOURNAMENT> <DIVISION>
  create-next-round [SETTINGS] <ROUND>
  create-playoff [SETTINGS] <ROUND>
  select-teams <ROUND>
  assign-playoff <ROUND> <TEAM>...
  regroup (--groups N | --per-group N | --no-grouping) <ROUND>
  generate | finalize | unfinalize | lock | unlock | refresh-standings <ROUND>

SETTINGS:
  --name TEXT  --advance N  --select STRATEGY  --matches round-robin|bracket|manual
  --groups N | --per-group N | --no-grouping
  --courts N  --first-court N  --slot MINUTES  --start RFC3339
  STRATEGY is winners-only, top-seed-half, top-by-points or group-winners

AUTOMATION:
  event call-to-court | match-start | set-start | set-end | revert-set | match-end <MATCH>
  event score <MATCH> team1|team2 <DELTA>
  event dispute <MATCH> <REASON>
  event rank-refresh <TOURNAMENT> <DIVISION>
  replay --file <PATH>        Submit a file of JSON events, one per line

ENVIRONMENT:
  DATABASE_URL                PostgreSQL connection string
  DRAIN_ON_SHUTDOWN           Finish queued events before exit [default: true]
  SLOT_MINUTES, COURT_COUNT, FIRST_COURT  Scheduling defaults for new rounds
  (See .env file for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = Overrides {
        database_url: pargs.opt_value_from_str("--db-url")?,
        queue_capacity: pargs.opt_value_from_str("--queue-capacity")?,
        metrics_bind: pargs.opt_value_from_str::<_, SocketAddr>("--metrics-bind")?,
        performed_by: pargs.opt_value_from_str("--by")?,
    };
    let migrate = pargs.contains("--migrate");

    logging::init();

    let config = AdminConfig::from_env(overrides)?;
    config.validate()?;

    let Some(name) = pargs.opt_free_from_str::<String>()? else {
        print!("{HELP}");
        std::process::exit(2);
    };
    let command = Command::parse(&name, &mut pargs, &config.performed_by)?;

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        anyhow::bail!("unexpected arguments: {:?}", remaining);
    }

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Metrics exported at http://{}/metrics", addr);
    }

    let db = Database::connect(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    info!("Database connected successfully");

    let pg = db.store();
    if migrate {
        pg.migrate().await?;
        info!("Database migrations applied");
    }
    let store: Arc<dyn Store> = Arc::new(pg);

    let rounds = RoundController::new(store.clone(), config.schedule);
    let (worker, queue) =
        AutomationWorker::new(rounds.clone(), Arc::new(LogBroadcaster), &config.automation);
    let worker = worker.spawn();

    let ctx = Context {
        tournaments: TournamentManager::new(store),
        rounds,
        queue: queue.clone(),
        performed_by: config.performed_by.clone(),
    };

    let operation = command.name();
    let is_query = command.is_query();
    let target = target_of(&command);
    let start = Instant::now();

    let mut shutdown = config.automation.shutdown_mode();
    let result = tokio::select! {
        result = commands::execute(command, &ctx) => result,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, abandoning queued events");
            shutdown = ShutdownMode::Abandon;
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    let record = logging::CommandRecord {
        command: operation,
        target: &target,
        performed_by: &config.performed_by,
        elapsed: start.elapsed(),
        mutating: !is_query,
    };
    record.log(result.is_ok());
    metrics::command_duration(operation, result.is_ok(), record.elapsed);

    drop(ctx);
    queue.shutdown(shutdown);
    match worker.await {
        Ok(report) => info!(
            "Automation worker stopped: {} processed, {} failed, {} discarded",
            report.processed, report.failed, report.discarded
        ),
        Err(e) => log::error!("Automation worker panicked: {}", e),
    }

    db.close().await;
    result
}

/// Entity a command acts on, for the operation log
fn target_of(command: &Command) -> String {
    match command {
        Command::Activate { tournament_id } => tournament_id.to_string(),
        Command::Rounds { division_id, .. }
        | Command::DivisionStandings { division_id, .. }
        | Command::CreateFirstRound { division_id, .. } => division_id.to_string(),
        Command::Round { round_id }
        | Command::State { round_id }
        | Command::Teams { round_id }
        | Command::Matches { round_id }
        | Command::Standings { round_id }
        | Command::Candidates { round_id }
        | Command::CreateNextRound { round_id, .. }
        | Command::CreatePlayoff { round_id, .. }
        | Command::SelectTeams { round_id }
        | Command::AssignPlayoff { round_id, .. }
        | Command::Regroup { round_id, .. }
        | Command::Generate { round_id }
        | Command::Finalize { round_id }
        | Command::Unfinalize { round_id }
        | Command::Lock { round_id }
        | Command::Unlock { round_id }
        | Command::RefreshStandings { round_id } => round_id.to_string(),
        Command::Event(event) => event
            .match_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "division".to_string()),
        Command::Replay { path } => path.display().to_string(),
        Command::Tournaments | Command::CreateTournament { .. } => "tournaments".to_string(),
    }
}
