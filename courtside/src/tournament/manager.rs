//! Tournament manager: creation, listing and the single active tournament.

use super::models::{Tournament, TournamentId};
use crate::db::{ChangeSet, Store, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Tournament errors
#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("Tournament not found: {0}")]
    NotFound(TournamentId),

    #[error("Tournament name must not be empty")]
    EmptyName,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl TournamentError {
    /// Whether the error is a concurrent modification that a retry may resolve
    pub fn is_conflict(&self) -> bool {
        matches!(self, TournamentError::Store(StoreError::Conflict(_)))
    }
}

pub type TournamentResult<T> = Result<T, TournamentError>;

/// Tournament manager
#[derive(Clone)]
pub struct TournamentManager {
    store: Arc<dyn Store>,
}

impl TournamentManager {
    /// Create a new tournament manager
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a new, inactive tournament
    pub async fn create_tournament(&self, name: &str) -> TournamentResult<Tournament> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TournamentError::EmptyName);
        }

        let tournament = Tournament::new(name);
        self.store
            .commit(ChangeSet {
                tournaments: vec![tournament.clone()],
                ..Default::default()
            })
            .await?;

        log::info!("Created tournament {} '{}'", tournament.id, tournament.name);
        Ok(tournament)
    }

    /// Get a tournament by id
    pub async fn get_tournament(&self, id: TournamentId) -> TournamentResult<Tournament> {
        self.store
            .tournament(id)
            .await?
            .ok_or(TournamentError::NotFound(id))
    }

    /// List all tournaments, oldest first
    pub async fn list_tournaments(&self) -> TournamentResult<Vec<Tournament>> {
        Ok(self.store.tournaments().await?)
    }

    /// The currently active tournament, if any
    pub async fn active_tournament(&self) -> TournamentResult<Option<Tournament>> {
        Ok(self
            .store
            .tournaments()
            .await?
            .into_iter()
            .find(|t| t.is_active))
    }

    /// Make `id` the only active tournament.
    ///
    /// The flag is cleared on every other tournament in the same commit. The
    /// store refuses a commit that would leave two tournaments active, so a
    /// concurrent activation conflicts and is retried once from a fresh read.
    pub async fn activate_tournament(
        &self,
        id: TournamentId,
        performed_by: &str,
    ) -> TournamentResult<Tournament> {
        let activated = match self.try_activate(id).await {
            Err(err) if err.is_conflict() => {
                log::warn!(
                    "activate_tournament: concurrent modification, retrying once ({})",
                    err
                );
                self.try_activate(id).await?
            }
            result => result?,
        };
        log::info!("Tournament {} activated by {}", id, performed_by);
        Ok(activated)
    }

    async fn try_activate(&self, id: TournamentId) -> TournamentResult<Tournament> {
        let tournaments = self.store.tournaments().await?;

        let mut changes = ChangeSet::new();
        let mut activated = None;
        for mut tournament in tournaments {
            let should_be_active = tournament.id == id;
            if tournament.is_active != should_be_active {
                tournament.is_active = should_be_active;
                changes.tournaments.push(tournament.clone());
            }
            if should_be_active {
                activated = Some(tournament);
            }
        }
        let activated = activated.ok_or(TournamentError::NotFound(id))?;

        self.store.commit(changes).await?;
        Ok(activated)
    }
}
