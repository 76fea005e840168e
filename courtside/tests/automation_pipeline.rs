//! Integration tests for the event automation pipeline.
//!
//! Tests queue ordering, backpressure, shutdown modes, the match lifecycle
//! handled by the worker, and the notifications it publishes.

use courtside::automation::{
    AutomationConfig, AutomationError, AutomationWorker, ChannelBroadcaster, EventQueue,
    Notification, ShutdownMode, WorkerReport, palette::DEFAULT_COLORS,
};
use courtside::db::{MemoryStore, Store};
use courtside::round::{RoundController, RoundSettings, ScheduleConfig};
use courtside::tournament::{
    Advancement, AnnouncementKind, Division, DivisionId, GroupSizing, Match, MatchSet,
    MatchStrategy, MatchUpdateKind, RoundId, RoundTemplate, SelectionStrategy, Side, Team, TeamId,
    Tournament, TournamentId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use uuid::Uuid;

struct Pipeline {
    store: Arc<MemoryStore>,
    rounds: RoundController,
    broadcaster: ChannelBroadcaster,
    tournament_id: TournamentId,
    division_id: DivisionId,
    round_id: RoundId,
    teams: Vec<TeamId>,
    matches: Vec<Match>,
}

/// Helper to build a four-team division in two groups with its matches generated
async fn setup_pipeline() -> Pipeline {
    let store = Arc::new(MemoryStore::new());
    let tournament = Tournament::new("Harbour Cup");
    let division = Division::new("Mixed");
    let (tournament_id, division_id) = (tournament.id, division.id);
    store.insert_tournament(tournament).await;
    store.insert_division(tournament_id, division).await;

    let mut teams = Vec::new();
    for seed in 1..=4 {
        let team = Team::new(format!("Team {seed}"));
        let team_id = team.id;
        store.insert_team(team).await;
        store
            .enroll_team(tournament_id, division_id, team_id, seed)
            .await;
        teams.push(team_id);
    }
    store
        .insert_round_template(RoundTemplate {
            id: Uuid::new_v4(),
            sequence: 1,
            name: "Pools".to_string(),
            advancement: Advancement {
                team_count: Some(2),
                strategy: SelectionStrategy::TopOfEachGroupPlusNextBest,
            },
            match_strategy: MatchStrategy::RoundRobin,
            grouping: GroupSizing::GroupCount(2),
        })
        .await;

    let rounds = RoundController::new(store.clone(), ScheduleConfig::default());
    let round = rounds
        .create_first_round(tournament_id, division_id, RoundSettings::default(), "desk")
        .await
        .unwrap();
    rounds.select_teams(round.id, "desk").await.unwrap();
    let matches = rounds.generate_matches(round.id, "desk").await.unwrap();

    Pipeline {
        store,
        rounds,
        broadcaster: ChannelBroadcaster::new(256),
        tournament_id,
        division_id,
        round_id: round.id,
        teams,
        matches,
    }
}

fn new_worker(p: &Pipeline, capacity: usize) -> (AutomationWorker, EventQueue) {
    let config = AutomationConfig {
        queue_capacity: capacity,
        ..Default::default()
    };
    AutomationWorker::new(p.rounds.clone(), Arc::new(p.broadcaster.clone()), &config)
}

async fn drain(queue: &EventQueue, handle: tokio::task::JoinHandle<WorkerReport>) -> WorkerReport {
    queue.shutdown(ShutdownMode::Drain);
    handle.await.unwrap()
}

fn received(rx: &mut Receiver<Notification>) -> Vec<Notification> {
    let mut notifications = Vec::new();
    while let Ok(n) = rx.try_recv() {
        notifications.push(n);
    }
    notifications
}

#[tokio::test]
async fn test_match_lifecycle_updates_standings() {
    let p = setup_pipeline().await;
    let mut rx = p.broadcaster.subscribe();
    let (worker, queue) = new_worker(&p, 16);
    let handle = worker.spawn();

    let m = &p.matches[0];
    assert_eq!(m.group, "A");
    queue.call_to_court(m.id, "desk").await.unwrap();
    queue.match_start(m.id, "court-1").await.unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, 21, "court-1")
        .await
        .unwrap();
    queue
        .set_score_delta(m.id, Side::Team2, 15, "court-1")
        .await
        .unwrap();
    queue.match_set_end(m.id, "court-1").await.unwrap();
    queue.match_end(m.id, "court-1").await.unwrap();

    let report = drain(&queue, handle).await;
    assert_eq!(report.processed, 6);
    assert_eq!(report.failed, 0);

    let stored = p.store.get_match(m.id).await.unwrap().unwrap();
    assert!(stored.is_finished);
    assert!(stored.finished_at.is_some());
    assert_eq!((stored.team1_sets, stored.team2_sets), (1, 0));

    let kinds: Vec<MatchUpdateKind> = p
        .store
        .match_updates(m.id)
        .await
        .unwrap()
        .iter()
        .map(|u| u.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            MatchUpdateKind::CalledToCourt,
            MatchUpdateKind::Started,
            MatchUpdateKind::ScoreChanged,
            MatchUpdateKind::ScoreChanged,
            MatchUpdateKind::SetEnded,
            MatchUpdateKind::Ended,
        ]
    );

    let announcements = p.store.announcements(p.tournament_id).await.unwrap();
    assert_eq!(announcements.len(), 2);
    assert_eq!(announcements[0].kind, AnnouncementKind::CallToCourt);
    assert_eq!(announcements[0].color.as_deref(), Some(DEFAULT_COLORS[0]));
    assert_eq!(announcements[1].kind, AnnouncementKind::Result);
    assert!(announcements[1].text.contains("Team 1 beat Team 3"));

    // Live standings after a single result
    let teams = p.rounds.round_teams(p.round_id).await.unwrap();
    let rank_of = |team_id: TeamId| teams.iter().find(|t| t.team_id == team_id).unwrap().rank;
    assert_eq!(rank_of(p.teams[0]), Some(1));
    assert_eq!(rank_of(p.teams[2]), Some(4));

    let notifications = received(&mut rx);
    assert!(notifications.contains(&Notification::StandingsChanged {
        tournament_id: p.tournament_id,
        division_id: p.division_id,
        round_id: Some(p.round_id),
    }));
    let match_updates = notifications
        .iter()
        .filter(|n| matches!(n, Notification::MatchUpdated { .. }))
        .count();
    assert_eq!(match_updates, 6);
}

#[tokio::test]
async fn test_failed_event_does_not_stop_the_worker() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 16);
    let handle = worker.spawn();

    let m = &p.matches[0];
    // Not started yet
    queue.match_set_start(m.id, "court-1").await.unwrap();
    queue.match_start(Uuid::new_v4(), "court-1").await.unwrap();
    queue.match_start(m.id, "court-1").await.unwrap();
    queue
        .set_score_delta(m.id, Side::Team2, 4, "court-1")
        .await
        .unwrap();

    let report = drain(&queue, handle).await;
    assert_eq!(report.failed, 2);
    assert_eq!(report.processed, 2);

    let sets = p.store.match_sets(m.id).await.unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].team2_score, 4);
}

#[tokio::test]
async fn test_score_is_clamped_at_zero() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 16);
    let handle = worker.spawn();

    let m = &p.matches[1];
    queue.match_start(m.id, "court-2").await.unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, -5, "court-2")
        .await
        .unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, 3, "court-2")
        .await
        .unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, -10, "court-2")
        .await
        .unwrap();

    let report = drain(&queue, handle).await;
    assert_eq!(report.failed, 0);

    let sets = p.store.match_sets(m.id).await.unwrap();
    assert_eq!(sets[0].team1_score, 0);
    // The first correction changed nothing and left no feed entry
    assert_eq!(p.store.match_updates(m.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_oversized_score_is_rejected_and_worker_continues() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 16);
    let handle = worker.spawn();

    let m = &p.matches[0];
    let max = MatchSet::MAX_SCORE as i32;
    queue.match_start(m.id, "court-1").await.unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, i32::MAX, "court-1")
        .await
        .unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, 21, "court-1")
        .await
        .unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, max - 21, "court-1")
        .await
        .unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, 1, "court-1")
        .await
        .unwrap();
    queue.match_set_end(m.id, "court-1").await.unwrap();
    queue.match_end(m.id, "court-1").await.unwrap();
    queue.call_to_court(p.matches[1].id, "desk").await.unwrap();

    let report = drain(&queue, handle).await;
    assert_eq!(report.failed, 2);
    assert_eq!(report.processed, 6);

    let sets = p.store.match_sets(m.id).await.unwrap();
    assert_eq!(sets[0].team1_score, MatchSet::MAX_SCORE);

    let kinds: Vec<AnnouncementKind> = p
        .store
        .announcements(p.tournament_id)
        .await
        .unwrap()
        .iter()
        .map(|a| a.kind)
        .collect();
    assert_eq!(kinds, vec![AnnouncementKind::Result, AnnouncementKind::CallToCourt]);
}

#[tokio::test]
async fn test_revert_reopens_previous_set() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 16);
    let handle = worker.spawn();

    let m = &p.matches[0];
    queue.match_start(m.id, "court-1").await.unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, 21, "court-1")
        .await
        .unwrap();
    queue.match_set_end(m.id, "court-1").await.unwrap();
    queue.match_set_start(m.id, "court-1").await.unwrap();
    queue
        .set_score_delta(m.id, Side::Team2, 5, "court-1")
        .await
        .unwrap();
    queue.revert_to_previous_set(m.id, "court-1").await.unwrap();

    let report = drain(&queue, handle).await;
    assert_eq!(report.failed, 0);

    let stored = p.store.get_match(m.id).await.unwrap().unwrap();
    assert_eq!(stored.current_set, 1);
    assert_eq!((stored.team1_sets, stored.team2_sets), (0, 0));

    let sets = p.store.match_sets(m.id).await.unwrap();
    assert_eq!(sets.len(), 1);
    assert!(!sets[0].is_finished);
    assert_eq!(sets[0].team1_score, 21);
}

#[tokio::test]
async fn test_tied_set_cannot_end() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 16);
    let handle = worker.spawn();

    let m = &p.matches[0];
    queue.match_start(m.id, "court-1").await.unwrap();
    queue.match_set_end(m.id, "court-1").await.unwrap();

    let report = drain(&queue, handle).await;
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_backpressure_and_fifo_order() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 2);
    let m = &p.matches[0];

    queue.match_start(m.id, "court-1").await.unwrap();
    queue
        .set_score_delta(m.id, Side::Team1, 21, "court-1")
        .await
        .unwrap();
    assert_eq!(queue.len(), 2);

    // The queue is full and nobody is consuming
    let blocked = tokio::time::timeout(
        Duration::from_millis(50),
        queue.match_set_end(m.id, "court-1"),
    )
    .await;
    assert!(blocked.is_err());

    let producer = {
        let queue = queue.clone();
        let match_id = m.id;
        tokio::spawn(async move {
            queue.match_set_end(match_id, "court-1").await.unwrap();
            queue.match_set_start(match_id, "court-1").await.unwrap();
            queue.match_end(match_id, "court-1").await.unwrap();
        })
    };
    let handle = worker.spawn();
    producer.await.unwrap();

    // Every event depends on the one before it, so any reordering fails one
    let report = drain(&queue, handle).await;
    assert_eq!(report.processed, 5);
    assert_eq!(report.failed, 0);

    let stored = p.store.get_match(m.id).await.unwrap().unwrap();
    assert!(stored.is_finished);
    assert_eq!(stored.current_set, 2);
}

#[tokio::test]
async fn test_drain_processes_queued_events() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 16);
    for m in &p.matches {
        queue.call_to_court(m.id, "desk").await.unwrap();
    }
    queue.shutdown(ShutdownMode::Drain);

    let report = worker.run().await;
    assert_eq!(report.processed, p.matches.len() as u64);
    assert_eq!(report.discarded, 0);

    let rejected = queue.match_start(p.matches[0].id, "desk").await;
    assert!(matches!(rejected, Err(AutomationError::QueueClosed)));
}

#[tokio::test]
async fn test_abandon_discards_queued_events() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 16);
    for m in &p.matches {
        queue.call_to_court(m.id, "desk").await.unwrap();
    }
    queue.shutdown(ShutdownMode::Abandon);

    let report = worker.run().await;
    assert_eq!(report.processed, 0);
    assert_eq!(report.discarded, p.matches.len() as u64);
    assert!(p.store.announcements(p.tournament_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_worker_stops_when_producers_are_gone() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 16);
    queue.match_start(p.matches[0].id, "court-1").await.unwrap();
    drop(queue);

    let report = worker.run().await;
    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn test_dispute_and_replayed_end_on_locked_round() {
    let p = setup_pipeline().await;
    let (worker, queue) = new_worker(&p, 32);
    let handle = worker.spawn();

    for m in &p.matches {
        queue.match_start(m.id, "desk").await.unwrap();
        queue
            .set_score_delta(m.id, Side::Team1, 21, "desk")
            .await
            .unwrap();
        queue.match_end(m.id, "desk").await.unwrap();
    }
    let report = drain(&queue, handle).await;
    assert_eq!(report.failed, 0);

    p.rounds.finalize_round(p.round_id, "desk").await.unwrap();
    p.rounds.lock_round(p.round_id, "desk").await.unwrap();
    let locked_teams = p.rounds.round_teams(p.round_id).await.unwrap();

    let (worker, queue) = new_worker(&p, 8);
    let handle = worker.spawn();
    let m = &p.matches[0];
    queue.match_end(m.id, "desk").await.unwrap();
    queue.match_disputed(m.id, "wrong score", "captain").await.unwrap();
    queue.match_disputed(m.id, "wrong score", "captain").await.unwrap();
    queue.match_start(m.id, "desk").await.unwrap();
    let report = drain(&queue, handle).await;

    // Replayed end and repeated dispute are accepted, a restart is not
    assert_eq!(report.processed, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(p.rounds.round_teams(p.round_id).await.unwrap(), locked_teams);

    let stored = p.store.get_match(m.id).await.unwrap().unwrap();
    assert!(stored.is_disputed);
    let disputes = p
        .store
        .announcements(p.tournament_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.kind == AnnouncementKind::Dispute)
        .count();
    assert_eq!(disputes, 1);
}

#[tokio::test]
async fn test_division_rank_refresh_posts_bulletin() {
    let p = setup_pipeline().await;
    let mut rx = p.broadcaster.subscribe();
    let (worker, queue) = new_worker(&p, 32);
    let handle = worker.spawn();

    for m in &p.matches {
        queue.match_start(m.id, "desk").await.unwrap();
        queue
            .set_score_delta(m.id, Side::Team1, 21, "desk")
            .await
            .unwrap();
        queue.match_end(m.id, "desk").await.unwrap();
    }
    let report = drain(&queue, handle).await;
    assert_eq!(report.failed, 0);
    p.rounds.finalize_round(p.round_id, "desk").await.unwrap();
    received(&mut rx);

    let (worker, queue) = new_worker(&p, 8);
    let handle = worker.spawn();
    queue
        .division_rank_refresh(p.tournament_id, p.division_id, "desk")
        .await
        .unwrap();
    let report = drain(&queue, handle).await;
    assert_eq!(report.processed, 1);

    let bulletin = p
        .store
        .announcements(p.tournament_id)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.kind == AnnouncementKind::StandingsBulletin)
        .unwrap();
    assert!(bulletin.text.starts_with("Mixed standings: 1. Team 1"));
    assert_eq!(bulletin.match_id, None);

    let notifications = received(&mut rx);
    assert!(notifications.contains(&Notification::StandingsChanged {
        tournament_id: p.tournament_id,
        division_id: p.division_id,
        round_id: None,
    }));
}
