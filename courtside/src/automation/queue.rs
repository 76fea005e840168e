//! Bounded event queue: many producers, one automation worker.

use super::{
    errors::{AutomationError, AutomationResult},
    events::AutomationEvent,
};
use crate::telemetry;
use crate::tournament::models::{DivisionId, MatchId, Side, TournamentId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// What the worker does with queued events when it is told to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Process everything already queued, then stop
    Drain,
    /// Finish the event in hand and discard the rest
    Abandon,
}

/// Worker side of the queue
pub(crate) struct QueueReceiver {
    pub events: mpsc::Receiver<AutomationEvent>,
    pub shutdown: watch::Receiver<Option<ShutdownMode>>,
}

/// Producer handle for the automation queue.
///
/// Submitting waits while the queue is full and returns once the event is
/// queued, not once it is processed. Clones share the same queue.
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::Sender<AutomationEvent>,
    shutdown: Arc<watch::Sender<Option<ShutdownMode>>>,
}

impl EventQueue {
    pub(crate) fn channel(capacity: usize) -> (Self, QueueReceiver) {
        let (sender, events) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown) = watch::channel(None);
        let queue = Self {
            sender,
            shutdown: Arc::new(shutdown_tx),
        };
        (queue, QueueReceiver { events, shutdown })
    }

    /// Queue an event, waiting for space when the queue is full
    pub async fn submit(&self, event: AutomationEvent) -> AutomationResult<()> {
        if self.is_shut_down() {
            return Err(AutomationError::QueueClosed);
        }
        let kind = event.kind();
        self.sender
            .send(event)
            .await
            .map_err(|_| AutomationError::QueueClosed)?;

        telemetry::automation_events_enqueued(kind);
        telemetry::automation_queue_depth(self.len());
        Ok(())
    }

    /// Events waiting to be processed
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Tell the worker to stop. Later submissions fail with `QueueClosed`.
    pub fn shutdown(&self, mode: ShutdownMode) {
        log::info!("Automation queue shutting down ({:?})", mode);
        self.shutdown.send_replace(Some(mode));
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.borrow().is_some() || self.sender.is_closed()
    }

    pub async fn call_to_court(&self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        self.submit(AutomationEvent::CallToCourt {
            match_id,
            source: source.to_string(),
        })
        .await
    }

    pub async fn match_start(&self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        self.submit(AutomationEvent::MatchStart {
            match_id,
            source: source.to_string(),
        })
        .await
    }

    pub async fn match_set_start(&self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        self.submit(AutomationEvent::MatchSetStart {
            match_id,
            source: source.to_string(),
        })
        .await
    }

    pub async fn match_set_end(&self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        self.submit(AutomationEvent::MatchSetEnd {
            match_id,
            source: source.to_string(),
        })
        .await
    }

    pub async fn set_score_delta(
        &self,
        match_id: MatchId,
        side: Side,
        delta: i32,
        source: &str,
    ) -> AutomationResult<()> {
        self.submit(AutomationEvent::SetScoreDelta {
            match_id,
            side,
            delta,
            source: source.to_string(),
        })
        .await
    }

    pub async fn revert_to_previous_set(
        &self,
        match_id: MatchId,
        source: &str,
    ) -> AutomationResult<()> {
        self.submit(AutomationEvent::RevertToPreviousSet {
            match_id,
            source: source.to_string(),
        })
        .await
    }

    pub async fn match_end(&self, match_id: MatchId, source: &str) -> AutomationResult<()> {
        self.submit(AutomationEvent::MatchEnd {
            match_id,
            source: source.to_string(),
        })
        .await
    }

    pub async fn match_disputed(
        &self,
        match_id: MatchId,
        reason: &str,
        source: &str,
    ) -> AutomationResult<()> {
        self.submit(AutomationEvent::MatchDisputed {
            match_id,
            reason: reason.to_string(),
            source: source.to_string(),
        })
        .await
    }

    pub async fn division_rank_refresh(
        &self,
        tournament_id: TournamentId,
        division_id: DivisionId,
        source: &str,
    ) -> AutomationResult<()> {
        self.submit(AutomationEvent::DivisionRankRefresh {
            tournament_id,
            division_id,
            source: source.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_submit_blocks_when_full() {
        let (queue, mut receiver) = EventQueue::channel(1);
        queue.match_start(Uuid::new_v4(), "scorer").await.unwrap();
        assert_eq!(queue.len(), 1);

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            queue.match_end(Uuid::new_v4(), "scorer"),
        )
        .await;
        assert!(blocked.is_err(), "second submit should wait for space");

        let first = receiver.events.recv().await.unwrap();
        assert_eq!(first.kind(), "match_start");
        queue.match_end(Uuid::new_v4(), "scorer").await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let (queue, _receiver) = EventQueue::channel(4);
        queue.shutdown(ShutdownMode::Drain);
        let result = queue.call_to_court(Uuid::new_v4(), "desk").await;
        assert!(matches!(result, Err(AutomationError::QueueClosed)));
    }
}
