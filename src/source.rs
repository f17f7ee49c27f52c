//! # Event source adapter.
//!
//! Business code (flag submission, competition control) reports what happened
//! through [`ScoreNotifier`]; [`Broadcaster`] turns each occurrence into a
//! [`Message`] and hands it to the hub.
//!
//! Notifying never fails the caller. If the hub is saturated, stopped or slow
//! to confirm, the broadcast is dropped with a `tracing` warning (and a
//! `BroadcastDropped` event from the hub). A flag submission must not be
//! rolled back because viewers could not be told about it.
//!
//! ```rust,no_run
//! use ctfhub::{Broadcaster, Hub, HubConfig, ScoreNotifier};
//!
//! # async fn demo() {
//! let hub = Hub::builder(HubConfig::default()).build();
//! let notifier = Broadcaster::new(hub.clone());
//! notifier.notify_solve("team-1", "baby-rsa", 100, true).await;
//! hub.shutdown().await;
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::Hub;
use crate::message::{
    CompetitionStatus, Frame, Message, NoticeLevel, Notification, ScoreboardUpdate, UpdateKind,
};

/// Sink for application-level occurrences that viewers should learn about.
#[async_trait]
pub trait ScoreNotifier: Send + Sync + 'static {
    /// An accepted flag. `first_blood` adds a second, `first_blood` update.
    async fn notify_solve(&self, team_id: &str, challenge: &str, points: i64, first_blood: bool);

    /// An organizer announcement.
    async fn notify_notification(&self, message: &str, level: NoticeLevel);

    /// The competition was started, paused, frozen or ended.
    async fn notify_competition_status(&self, status: CompetitionStatus);
}

/// [`ScoreNotifier`] backed by a [`Hub`].
///
/// Each notification waits at most `enqueue_timeout` to reach the hub queue
/// and at most `delivery_timeout` for fan-out.
#[derive(Clone)]
pub struct Broadcaster {
    hub: Arc<Hub>,
}

impl Broadcaster {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Broadcasts a frame that was serialized elsewhere. The hub never
    /// inspects it.
    pub async fn notify_raw(&self, frame: impl Into<Frame>) {
        self.deliver("raw", frame.into()).await;
    }

    async fn send(&self, message: Message) {
        let label = message.kind.as_label();
        match message.encode() {
            Ok(frame) => self.deliver(label, frame).await,
            Err(err) => warn!(kind = label, error = %err, "dropping unencodable message"),
        }
    }

    async fn deliver(&self, kind: &'static str, frame: Frame) {
        match self.hub.broadcast_confirmed(frame).await {
            Ok(reached) => debug!(kind, reached, "broadcast delivered"),
            Err(err) => warn!(kind, error = %err, label = err.as_label(), "broadcast dropped"),
        }
    }
}

#[async_trait]
impl ScoreNotifier for Broadcaster {
    async fn notify_solve(&self, team_id: &str, challenge: &str, points: i64, first_blood: bool) {
        let solve = ScoreboardUpdate::new(UpdateKind::Solve, team_id, challenge, points);
        self.send(Message::scoreboard(solve)).await;

        if first_blood {
            let blood = ScoreboardUpdate::new(UpdateKind::FirstBlood, team_id, challenge, points);
            self.send(Message::scoreboard(blood)).await;
        }
    }

    async fn notify_notification(&self, message: &str, level: NoticeLevel) {
        self.send(Message::notification(Notification::new(message, level)))
            .await;
    }

    async fn notify_competition_status(&self, status: CompetitionStatus) {
        self.send(Message::competition_status(status)).await;
    }
}
