//! Outbound notifications pushed by the automation worker.
//!
//! Delivery is fire-and-forget: a sink that cannot deliver drops the
//! notification and the worker carries on.

use crate::tournament::models::{
    Announcement, DivisionId, MatchId, MatchUpdateKind, RoundId, TournamentId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A change worth telling live clients about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    MatchUpdated {
        tournament_id: TournamentId,
        match_id: MatchId,
        kind: MatchUpdateKind,
        description: String,
    },
    Announcement(Announcement),
    StandingsChanged {
        tournament_id: TournamentId,
        division_id: DivisionId,
        /// None for division standings
        round_id: Option<RoundId>,
    },
}

/// Sink for notifications
pub trait Broadcaster: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Broadcaster backed by a `tokio::sync::broadcast` channel.
///
/// Subscribers that fall behind by more than the channel capacity miss the
/// oldest notifications.
#[derive(Clone)]
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<Notification>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            log::debug!("No subscribers, notification dropped");
        }
    }
}

/// Receive the next notification, skipping over any missed ones.
///
/// Returns None once the broadcaster is gone.
pub async fn next_notification(
    receiver: &mut broadcast::Receiver<Notification>,
) -> Option<Notification> {
    loop {
        match receiver.recv().await {
            Ok(notification) => return Some(notification),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!("Notification subscriber lagged, {} notifications missed", missed);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Broadcaster that only writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBroadcaster;

impl Broadcaster for LogBroadcaster {
    fn publish(&self, notification: Notification) {
        match &notification {
            Notification::MatchUpdated {
                match_id,
                kind,
                description,
                ..
            } => log::info!("Match {} {}: {}", match_id, kind, description),
            Notification::Announcement(announcement) => {
                log::info!("Announcement [{}]: {}", announcement.kind, announcement.text)
            }
            Notification::StandingsChanged {
                division_id,
                round_id,
                ..
            } => match round_id {
                Some(round_id) => log::info!("Standings changed in round {}", round_id),
                None => log::info!("Standings changed in division {}", division_id),
            },
        }
    }
}
