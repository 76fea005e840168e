//! Automation worker: the single consumer of the event queue.

use super::{
    broadcast::{Broadcaster, Notification},
    config::AutomationConfig,
    errors::{AutomationError, AutomationResult},
    events::AutomationEvent,
    palette::GroupPalette,
    queue::{EventQueue, QueueReceiver, ShutdownMode},
};
use crate::{
    db::{ChangeSet, Store},
    round::RoundController,
    telemetry,
    tournament::models::{
        Announcement, AnnouncementKind, DivisionId, Match, MatchId, MatchSet, MatchUpdate,
        MatchUpdateKind, Side, TournamentId,
    },
};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Counts reported when the worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub processed: u64,
    pub failed: u64,
    /// Events still queued when the worker was told to abandon
    pub discarded: u64,
}

/// Writes produced by one event, committed together
struct MatchChange {
    m: Match,
    sets: Vec<MatchSet>,
    deleted_sets: Vec<u32>,
    update: MatchUpdate,
    announcement: Option<Announcement>,
}

/// Automation worker.
///
/// Takes events off the queue one at a time. Each event reads fresh state,
/// commits its own change set and then notifies the broadcaster. A failed
/// event is logged and dropped.
pub struct AutomationWorker {
    store: Arc<dyn Store>,
    rounds: RoundController,
    broadcaster: Arc<dyn Broadcaster>,
    palette: GroupPalette,
    inbox: QueueReceiver,
    report: WorkerReport,
}

impl AutomationWorker {
    /// Create a worker and the queue feeding it
    pub fn new(
        rounds: RoundController,
        broadcaster: Arc<dyn Broadcaster>,
        config: &AutomationConfig,
    ) -> (Self, EventQueue) {
        let (queue, inbox) = EventQueue::channel(config.queue_capacity);
        let worker = Self {
            store: rounds.store().clone(),
            rounds,
            broadcaster,
            palette: GroupPalette::new(),
            inbox,
            report: WorkerReport::default(),
        };
        (worker, queue)
    }

    /// Replace the default group palette
    pub fn with_palette(mut self, palette: GroupPalette) -> Self {
        self.palette = palette;
        self
    }

    /// Run the worker on its own task
    pub fn spawn(self) -> JoinHandle<WorkerReport> {
        tokio::spawn(self.run())
    }

    /// Process events until shut down or until every queue handle is dropped
    pub async fn run(mut self) -> WorkerReport {
        log::info!("Automation worker starting");
        let mut watching = true;

        loop {
            tokio::select! {
                biased;

                changed = self.inbox.shutdown.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                        continue;
                    }
                    let mode = *self.inbox.shutdown.borrow_and_update();
                    if let Some(mode) = mode {
                        self.stop(mode).await;
                        break;
                    }
                }

                event = self.inbox.events.recv() => match event {
                    Some(event) => self.process(event).await,
                    None => break,
                }
            }
        }

        log::info!(
            "Automation worker stopped: {} processed, {} failed, {} discarded",
            self.report.processed,
            self.report.failed,
            self.report.discarded
        );
        self.report
    }

    async fn stop(&mut self, mode: ShutdownMode) {
        self.inbox.events.close();
        match mode {
            ShutdownMode::Drain => {
                while let Some(event) = self.inbox.events.recv().await {
                    self.process(event).await;
                }
            }
            ShutdownMode::Abandon => {
                while self.inbox.events.try_recv().is_ok() {
                    self.report.discarded += 1;
                }
                if self.report.discarded > 0 {
                    log::warn!(
                        "Abandoned {} queued automation events",
                        self.report.discarded
                    );
                }
            }
        }
        telemetry::automation_queue_depth(0);
    }

    async fn process(&mut self, event: AutomationEvent) {
        let kind = event.kind();
        log::debug!("Processing {} from {}", kind, event.source());

        let mut result = self.handle(&event).await;
        let conflicted = matches!(&result, Err(err) if err.is_conflict());
        if conflicted {
            log::warn!("{}: concurrent modification, retrying once", kind);
            result = self.handle(&event).await;
        }

        match result {
            Ok(()) => {
                self.report.processed += 1;
                telemetry::automation_events_processed(kind);
            }
            Err(err) => {
                self.report.failed += 1;
                telemetry::automation_events_failed(kind);
                log::error!(
                    "Automation event {} from {} failed: {}",
                    kind,
                    event.source(),
                    err
                );
            }
        }
        telemetry::automation_queue_depth(self.inbox.events.len());
    }

    async fn handle(&mut self, event: &AutomationEvent) -> AutomationResult<()> {
        match event {
            AutomationEvent::CallToCourt { match_id, source } => {
                self.call_to_court(*match_id, source).await
            }
            AutomationEvent::MatchStart { match_id, source } => {
                self.start_match(*match_id, source).await
            }
            AutomationEvent::MatchSetStart { match_id, source } => {
                self.start_set(*match_id, source).await
            }
            AutomationEvent::MatchSetEnd { match_id, source } => {
                self.end_set(*match_id, source).await
            }
            AutomationEvent::SetScoreDelta {
                match_id,
                side,
                delta,
                source,
            } => self.apply_score_delta(*match_id, *side, *delta, source).await,
            AutomationEvent::RevertToPreviousSet { match_id, source } => {
                self.revert_set(*match_id, source).await
            }
            AutomationEvent::MatchEnd { match_id, source } => {
                self.end_match(*match_id, source).await
            }
            AutomationEvent::MatchDisputed {
                match_id,
                reason,
                source,
            } => self.dispute_match(*match_id, reason, source).await,
            AutomationEvent::DivisionRankRefresh {
                tournament_id,
                division_id,
                source,
            } => {
                self.refresh_division(*tournament_id, *division_id, source)
                    .await
            }
        }
    }

    // ------------------------------------------------------------------------
    // Match lifecycle
    // ------------------------------------------------------------------------

    async fn call_to_court(&mut self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        let m = self.load_match(match_id).await?;
        ensure_open(&m)?;
        let (team1, team2) = self.team_names(&m).await?;

        let text = format!(
            "Match {}: {} vs {}, please report to court {}",
            m.match_number, team1, team2, m.court
        );
        let update = MatchUpdate::new(m.id, MatchUpdateKind::CalledToCourt, text.clone(), source);
        let announcement = self.announcement(&m, AnnouncementKind::CallToCourt, text);

        self.commit(ChangeSet {
            match_updates: vec![update.clone()],
            announcements: vec![announcement.clone()],
            ..Default::default()
        })
        .await?;
        self.notify_match(&m, &update);
        self.broadcaster
            .publish(Notification::Announcement(announcement));
        Ok(())
    }

    async fn start_match(&mut self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        let mut m = self.load_match(match_id).await?;
        ensure_open(&m)?;
        if m.is_started {
            log::debug!("Match {} already started", m.match_number);
            return Ok(());
        }

        m.is_started = true;
        m.started_at = Some(Utc::now());
        m.current_set = 1;
        let update = MatchUpdate::new(
            m.id,
            MatchUpdateKind::Started,
            format!("Match {} started", m.match_number),
            source,
        );
        let first_set = MatchSet::new(m.id, 1);
        self.commit_match(MatchChange {
            m,
            sets: vec![first_set],
            deleted_sets: Vec::new(),
            update,
            announcement: None,
        })
        .await
    }

    async fn start_set(&mut self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        let mut m = self.load_match(match_id).await?;
        ensure_in_play(&m)?;
        let sets = self.store.match_sets(match_id).await?;
        if let Some(current) = sets.iter().find(|s| s.set_number == m.current_set)
            && !current.is_finished
        {
            return Err(AutomationError::invalid(format!(
                "set {} of match {} is still in play",
                current.set_number, m.match_number
            )));
        }

        m.current_set += 1;
        let update = MatchUpdate::new(
            m.id,
            MatchUpdateKind::SetStarted,
            format!("Set {} started", m.current_set),
            source,
        );
        let set = MatchSet::new(m.id, m.current_set);
        self.commit_match(MatchChange {
            m,
            sets: vec![set],
            deleted_sets: Vec::new(),
            update,
            announcement: None,
        })
        .await
    }

    async fn end_set(&mut self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        let mut m = self.load_match(match_id).await?;
        ensure_in_play(&m)?;
        let mut set = self.open_set(&m).await?;

        match set.winner() {
            Some(Side::Team1) => m.team1_sets += 1,
            Some(Side::Team2) => m.team2_sets += 1,
            None => {
                return Err(AutomationError::invalid(format!(
                    "set {} is tied at {}-{}",
                    set.set_number, set.team1_score, set.team2_score
                )));
            }
        }
        set.is_finished = true;

        let update = MatchUpdate::new(
            m.id,
            MatchUpdateKind::SetEnded,
            format!(
                "Set {} ended {}-{} (sets {}-{})",
                set.set_number, set.team1_score, set.team2_score, m.team1_sets, m.team2_sets
            ),
            source,
        );
        self.commit_match(MatchChange {
            m,
            sets: vec![set],
            deleted_sets: Vec::new(),
            update,
            announcement: None,
        })
        .await
    }

    async fn apply_score_delta(
        &mut self,
        match_id: MatchId,
        side: Side,
        delta: i32,
        source: &str,
    ) -> AutomationResult<()> {
        let m = self.load_match(match_id).await?;
        ensure_in_play(&m)?;
        let mut set = self.open_set(&m).await?;
        if set.is_locked {
            return Err(AutomationError::invalid(format!(
                "set {} of match {} is locked",
                set.set_number, m.match_number
            )));
        }

        let score = match side {
            Side::Team1 => &mut set.team1_score,
            Side::Team2 => &mut set.team2_score,
        };
        let updated = (i64::from(*score) + i64::from(delta)).max(0);
        if updated > i64::from(MatchSet::MAX_SCORE) {
            return Err(AutomationError::invalid(format!(
                "set {} of match {} cannot exceed {} points",
                set.set_number,
                m.match_number,
                MatchSet::MAX_SCORE
            )));
        }
        let updated = updated as u32;
        if updated == *score {
            return Ok(());
        }
        *score = updated;

        let update = MatchUpdate::new(
            m.id,
            MatchUpdateKind::ScoreChanged,
            format!(
                "Set {}: {}-{}",
                set.set_number, set.team1_score, set.team2_score
            ),
            source,
        );
        self.commit_match(MatchChange {
            m,
            sets: vec![set],
            deleted_sets: Vec::new(),
            update,
            announcement: None,
        })
        .await
    }

    async fn revert_set(&mut self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        let mut m = self.load_match(match_id).await?;
        ensure_in_play(&m)?;
        if m.current_set < 2 {
            return Err(AutomationError::invalid(format!(
                "match {} has no previous set",
                m.match_number
            )));
        }

        let sets = self.store.match_sets(match_id).await?;
        let discarded = m.current_set;
        let mut previous = sets
            .iter()
            .find(|s| s.set_number == discarded - 1)
            .cloned()
            .ok_or_else(|| AutomationError::invalid("previous set is missing"))?;
        if previous.is_locked {
            return Err(AutomationError::invalid(format!(
                "set {} is locked",
                previous.set_number
            )));
        }
        previous.is_finished = false;
        m.current_set = previous.set_number;

        // Set tally over the sets that remain finished
        m.team1_sets = 0;
        m.team2_sets = 0;
        for s in sets
            .iter()
            .filter(|s| s.is_finished && s.set_number < previous.set_number)
        {
            match s.winner() {
                Some(Side::Team1) => m.team1_sets += 1,
                Some(Side::Team2) => m.team2_sets += 1,
                None => {}
            }
        }

        let update = MatchUpdate::new(
            m.id,
            MatchUpdateKind::SetReverted,
            format!(
                "Set {} discarded, set {} reopened",
                discarded, previous.set_number
            ),
            source,
        );
        self.commit_match(MatchChange {
            m,
            sets: vec![previous],
            deleted_sets: vec![discarded],
            update,
            announcement: None,
        })
        .await
    }

    async fn end_match(&mut self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        let mut m = self.load_match(match_id).await?;
        if m.is_finished {
            log::debug!("Match {} already finished", m.match_number);
        } else {
            ensure_open(&m)?;
            if !m.is_started {
                return Err(AutomationError::invalid(format!(
                    "match {} has not started",
                    m.match_number
                )));
            }

            // A set still in play is closed as it stands
            let mut sets = Vec::new();
            let open = self
                .store
                .match_sets(match_id)
                .await?
                .into_iter()
                .find(|s| s.set_number == m.current_set && !s.is_finished);
            if let Some(mut set) = open {
                match set.winner() {
                    Some(Side::Team1) => m.team1_sets += 1,
                    Some(Side::Team2) => m.team2_sets += 1,
                    None => {}
                }
                set.is_finished = true;
                sets.push(set);
            }

            m.is_finished = true;
            m.finished_at = Some(Utc::now());

            let (team1, team2) = self.team_names(&m).await?;
            let text = match m.winner() {
                Some(Side::Team1) => format!(
                    "Match {}: {} beat {} {}-{}",
                    m.match_number, team1, team2, m.team1_sets, m.team2_sets
                ),
                Some(Side::Team2) => format!(
                    "Match {}: {} beat {} {}-{}",
                    m.match_number, team2, team1, m.team2_sets, m.team1_sets
                ),
                None => format!(
                    "Match {}: {} and {} drew {}-{}",
                    m.match_number, team1, team2, m.team1_sets, m.team2_sets
                ),
            };
            let update = MatchUpdate::new(m.id, MatchUpdateKind::Ended, text.clone(), source);
            let announcement = self.announcement(&m, AnnouncementKind::Result, text);

            self.commit_match(MatchChange {
                m: m.clone(),
                sets,
                deleted_sets: Vec::new(),
                update,
                announcement: Some(announcement),
            })
            .await?;
        }

        // Live standings, also on a replayed end so a retry still refreshes them
        let round = self.rounds.round(m.round_id).await?;
        if round.is_locked {
            log::debug!("Round {} is locked, standings left as they are", round.id);
            return Ok(());
        }
        self.rounds.refresh_round_standings(round.id, source).await?;
        self.broadcaster.publish(Notification::StandingsChanged {
            tournament_id: round.tournament_id,
            division_id: round.division_id,
            round_id: Some(round.id),
        });
        Ok(())
    }

    async fn dispute_match(
        &mut self,
        match_id: MatchId,
        reason: &str,
        source: &str,
    ) -> AutomationResult<()> {
        let mut m = self.load_match(match_id).await?;
        if m.is_locked {
            return Err(AutomationError::invalid(format!(
                "match {} is locked",
                m.match_number
            )));
        }
        if m.is_disputed {
            log::debug!("Match {} already disputed", m.match_number);
            return Ok(());
        }

        m.is_disputed = true;
        let text = format!("Match {} result disputed: {}", m.match_number, reason);
        let update = MatchUpdate::new(m.id, MatchUpdateKind::Disputed, text.clone(), source);
        let announcement = self.announcement(&m, AnnouncementKind::Dispute, text);
        self.commit_match(MatchChange {
            m,
            sets: Vec::new(),
            deleted_sets: Vec::new(),
            update,
            announcement: Some(announcement),
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Standings
    // ------------------------------------------------------------------------

    async fn refresh_division(
        &mut self,
        tournament_id: TournamentId,
        division_id: DivisionId,
        source: &str,
    ) -> AutomationResult<()> {
        let roster = self
            .rounds
            .refresh_division_standings(tournament_id, division_id, source)
            .await?;
        let division = self
            .store
            .division(division_id)
            .await?
            .ok_or(AutomationError::NotFound {
                entity: "Division",
                id: division_id,
            })?;

        let mut ranked: Vec<_> = roster.iter().filter(|r| r.rank.is_some()).collect();
        ranked.sort_by_key(|r| r.rank);
        let mut lines = Vec::new();
        for record in ranked.into_iter().take(5) {
            let name = match self.store.team(record.team_id).await? {
                Some(team) => team.name,
                None => record.team_id.to_string(),
            };
            lines.push(format!(
                "{}. {} ({} pts)",
                record.rank.unwrap_or_default(),
                name,
                record.ranking_points
            ));
        }
        let text = if lines.is_empty() {
            format!("{} standings: no completed rounds yet", division.name)
        } else {
            format!("{} standings: {}", division.name, lines.join(", "))
        };

        let announcement = Announcement {
            id: Uuid::new_v4(),
            tournament_id,
            match_id: None,
            kind: AnnouncementKind::StandingsBulletin,
            text,
            color: None,
            created_at: Utc::now(),
        };
        self.commit(ChangeSet {
            announcements: vec![announcement.clone()],
            ..Default::default()
        })
        .await?;

        self.broadcaster.publish(Notification::StandingsChanged {
            tournament_id,
            division_id,
            round_id: None,
        });
        self.broadcaster
            .publish(Notification::Announcement(announcement));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn load_match(&self, match_id: MatchId) -> AutomationResult<Match> {
        self.store
            .get_match(match_id)
            .await?
            .ok_or(AutomationError::NotFound {
                entity: "Match",
                id: match_id,
            })
    }

    /// The set in play, which must exist and be unfinished
    async fn open_set(&self, m: &Match) -> AutomationResult<MatchSet> {
        self.store
            .match_sets(m.id)
            .await?
            .into_iter()
            .find(|s| s.set_number == m.current_set && !s.is_finished)
            .ok_or_else(|| {
                AutomationError::invalid(format!("match {} has no set in play", m.match_number))
            })
    }

    async fn team_names(&self, m: &Match) -> AutomationResult<(String, String)> {
        let mut names = Vec::with_capacity(2);
        for team_id in [m.team1_id, m.team2_id] {
            let team = self
                .store
                .team(team_id)
                .await?
                .ok_or(AutomationError::NotFound {
                    entity: "Team",
                    id: team_id,
                })?;
            names.push(team.short_name.unwrap_or(team.name));
        }
        let team2 = names.pop().unwrap_or_default();
        let team1 = names.pop().unwrap_or_default();
        Ok((team1, team2))
    }

    fn announcement(&mut self, m: &Match, kind: AnnouncementKind, text: String) -> Announcement {
        Announcement {
            id: Uuid::new_v4(),
            tournament_id: m.tournament_id,
            match_id: Some(m.id),
            kind,
            text,
            color: self.palette.color_for(&m.group),
            created_at: Utc::now(),
        }
    }

    async fn commit(&self, changes: ChangeSet) -> AutomationResult<()> {
        self.store.commit(changes).await?;
        Ok(())
    }

    async fn commit_match(&self, change: MatchChange) -> AutomationResult<()> {
        let MatchChange {
            m,
            sets,
            deleted_sets,
            update,
            announcement,
        } = change;

        self.commit(ChangeSet {
            matches: vec![m.clone()],
            match_sets: sets,
            deleted_match_sets: deleted_sets.iter().map(|n| (m.id, *n)).collect(),
            match_updates: vec![update.clone()],
            announcements: announcement.iter().cloned().collect(),
            ..Default::default()
        })
        .await?;

        self.notify_match(&m, &update);
        if let Some(announcement) = announcement {
            self.broadcaster
                .publish(Notification::Announcement(announcement));
        }
        Ok(())
    }

    fn notify_match(&self, m: &Match, update: &MatchUpdate) {
        self.broadcaster.publish(Notification::MatchUpdated {
            tournament_id: m.tournament_id,
            match_id: m.id,
            kind: update.kind,
            description: update.description.clone(),
        });
    }
}

/// Locked and finished matches take no further changes
fn ensure_open(m: &Match) -> AutomationResult<()> {
    if m.is_locked {
        return Err(AutomationError::invalid(format!(
            "match {} is locked",
            m.match_number
        )));
    }
    if m.is_finished {
        return Err(AutomationError::invalid(format!(
            "match {} is finished",
            m.match_number
        )));
    }
    Ok(())
}

fn ensure_in_play(m: &Match) -> AutomationResult<()> {
    ensure_open(m)?;
    if !m.is_started {
        return Err(AutomationError::invalid(format!(
            "match {} has not started",
            m.match_number
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::broadcast::LogBroadcaster;
    use crate::db::MemoryStore;
    use crate::db::testing::FaultyStore;
    use crate::round::{RoundSettings, ScheduleConfig};
    use crate::tournament::models::{
        Advancement, Division, GroupSizing, MatchStrategy, RoundTemplate, SelectionStrategy, Team,
        Tournament,
    };

    async fn court_with_matches() -> (Arc<FaultyStore>, RoundController, Vec<Match>) {
        let memory = Arc::new(MemoryStore::new());
        let tournament = Tournament::new("Autumn Classic");
        let division = Division::new("Open");
        let (tournament_id, division_id) = (tournament.id, division.id);
        memory.insert_tournament(tournament).await;
        memory.insert_division(tournament_id, division).await;
        for seed in 1..=2 {
            let team = Team::new(format!("Team {seed}"));
            let team_id = team.id;
            memory.insert_team(team).await;
            memory
                .enroll_team(tournament_id, division_id, team_id, seed)
                .await;
        }
        memory
            .insert_round_template(RoundTemplate {
                id: Uuid::new_v4(),
                sequence: 1,
                name: "Final".to_string(),
                advancement: Advancement {
                    team_count: None,
                    strategy: SelectionStrategy::WinnersOnly,
                },
                match_strategy: MatchStrategy::RoundRobin,
                grouping: GroupSizing::NoGrouping,
            })
            .await;

        let store = Arc::new(FaultyStore::new(memory));
        let rounds = RoundController::new(store.clone(), ScheduleConfig::default());
        let round = rounds
            .create_first_round(tournament_id, division_id, RoundSettings::default(), "desk")
            .await
            .unwrap();
        rounds.select_teams(round.id, "desk").await.unwrap();
        let matches = rounds.generate_matches(round.id, "desk").await.unwrap();
        (store, rounds, matches)
    }

    #[tokio::test]
    async fn test_event_retried_once_after_conflict() {
        let (store, rounds, matches) = court_with_matches().await;
        let m = &matches[0];

        let (worker, queue) = AutomationWorker::new(
            rounds.clone(),
            Arc::new(LogBroadcaster),
            &AutomationConfig::default(),
        );
        store.fail_commits(1);
        queue.match_start(m.id, "court-1").await.unwrap();
        queue.shutdown(ShutdownMode::Drain);
        let report = worker.run().await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.rejected_commits(), 1);
        assert!(store.get_match(m.id).await.unwrap().unwrap().is_started);

        // Two conflicts in a row drop the event
        let (worker, queue) =
            AutomationWorker::new(rounds, Arc::new(LogBroadcaster), &AutomationConfig::default());
        store.fail_commits(2);
        queue.call_to_court(m.id, "desk").await.unwrap();
        queue.shutdown(ShutdownMode::Drain);
        let report = worker.run().await;
        assert_eq!(report.processed, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(store.rejected_commits(), 3);
        assert!(store.announcements(m.tournament_id).await.unwrap().is_empty());
    }
}
