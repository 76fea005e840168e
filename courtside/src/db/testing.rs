//! A [`MemoryStore`] wrapper that injects commit conflicts and lines up
//! concurrent readers, for exercising retry paths.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::sync::Barrier;

use super::{ChangeSet, MemoryStore, Store, StoreError, StoreResult};
use crate::tournament::models::{
    Announcement, Division, DivisionId, Match, MatchId, MatchSet, MatchUpdate, RoundId,
    RoundTemplate, Team, TeamId, Tournament, TournamentId, TournamentRound, TournamentRoundTeam,
    TournamentTeamDivision,
};

pub(crate) struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    /// Commits left to reject before delegating
    conflicts: AtomicU32,
    rejected: AtomicU32,
    /// `tournaments()` calls left that wait on `barrier`
    gated_reads: AtomicUsize,
    barrier: Option<Arc<Barrier>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
            gated_reads: AtomicUsize::new(0),
            barrier: None,
        }
    }

    /// Reject the next `count` commits with a conflict
    pub fn fail_commits(&self, count: u32) {
        self.conflicts.store(count, Ordering::SeqCst);
    }

    /// Hold the first `parties` tournament listings until all of them have read
    pub fn gate_tournament_reads(mut self, parties: usize) -> Self {
        self.gated_reads = AtomicUsize::new(parties);
        self.barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn rejected_commits(&self) -> u32 {
        self.rejected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for FaultyStore {
    async fn tournament(&self, id: TournamentId) -> StoreResult<Option<Tournament>> {
        self.inner.tournament(id).await
    }

    async fn tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let list = self.inner.tournaments().await?;
        let gated = self
            .gated_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if let (true, Some(barrier)) = (gated, &self.barrier) {
            barrier.wait().await;
        }
        Ok(list)
    }

    async fn division(&self, id: DivisionId) -> StoreResult<Option<Division>> {
        self.inner.division(id).await
    }

    async fn runs_division(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<bool> {
        self.inner.runs_division(tournament_id, division_id).await
    }

    async fn team(&self, id: TeamId) -> StoreResult<Option<Team>> {
        self.inner.team(id).await
    }

    async fn division_teams(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<Vec<TournamentTeamDivision>> {
        self.inner.division_teams(tournament_id, division_id).await
    }

    async fn round_template(&self, sequence: u32) -> StoreResult<Option<RoundTemplate>> {
        self.inner.round_template(sequence).await
    }

    async fn round(&self, id: RoundId) -> StoreResult<Option<TournamentRound>> {
        self.inner.round(id).await
    }

    async fn rounds(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
    ) -> StoreResult<Vec<TournamentRound>> {
        self.inner.rounds(tournament_id, division_id).await
    }

    async fn round_teams(&self, round_id: RoundId) -> StoreResult<Vec<TournamentRoundTeam>> {
        self.inner.round_teams(round_id).await
    }

    async fn get_match(&self, id: MatchId) -> StoreResult<Option<Match>> {
        self.inner.get_match(id).await
    }

    async fn round_matches(&self, round_id: RoundId) -> StoreResult<Vec<Match>> {
        self.inner.round_matches(round_id).await
    }

    async fn max_match_number(&self, tournament_id: TournamentId) -> StoreResult<u32> {
        self.inner.max_match_number(tournament_id).await
    }

    async fn match_sets(&self, match_id: MatchId) -> StoreResult<Vec<MatchSet>> {
        self.inner.match_sets(match_id).await
    }

    async fn round_match_sets(&self, round_id: RoundId) -> StoreResult<Vec<MatchSet>> {
        self.inner.round_match_sets(round_id).await
    }

    async fn match_updates(&self, match_id: MatchId) -> StoreResult<Vec<MatchUpdate>> {
        self.inner.match_updates(match_id).await
    }

    async fn announcements(&self, tournament_id: TournamentId) -> StoreResult<Vec<Announcement>> {
        self.inner.announcements(tournament_id).await
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        let reject = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if reject {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Conflict("injected".to_string()));
        }
        self.inner.commit(changes).await
    }
}
