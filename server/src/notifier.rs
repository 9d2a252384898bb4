//! Registry of WebSocket subscribers and interest-filtered dispatch.
//!
//! Each subscriber owns an unbounded outbound channel drained by its socket
//! task, so delivery to one client never blocks another. A failed send means
//! the socket task is gone and the subscriber is silently dropped.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::frames::{EvaluationData, GameData, PositionData, WsFrame};

pub type SubscriberId = u64;

#[derive(Debug)]
struct Subscription {
    tx: mpsc::UnboundedSender<String>,
    game_id: Option<i64>,
    ply: Option<i64>,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    subscriptions: HashMap<SubscriberId, Subscription>,
}

#[derive(Default)]
pub struct Notifier {
    registry: Mutex<Registry>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> SubscriberId {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscriptions.insert(
            id,
            Subscription {
                tx,
                game_id: None,
                ply: None,
            },
        );
        tracing::debug!(subscriber = id, "Subscriber registered");
        id
    }

    pub fn unregister(&self, id: SubscriberId) {
        if self.lock().subscriptions.remove(&id).is_some() {
            tracing::debug!(subscriber = id, "Subscriber unregistered");
        }
    }

    pub fn num_subscribers(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Update a subscriber's interest. Returns true iff the game changed,
    /// which is the caller's cue to resend the positions snapshot.
    pub fn set_game_and_ply(
        &self,
        id: SubscriberId,
        game_id: i64,
        ply: Option<i64>,
    ) -> bool {
        let mut registry = self.lock();
        match registry.subscriptions.get_mut(&id) {
            Some(subscription) => {
                let game_changed = subscription.game_id != Some(game_id);
                subscription.game_id = Some(game_id);
                subscription.ply = ply;
                game_changed
            }
            None => false,
        }
    }

    /// Send a frame to one subscriber only.
    pub fn send_to(&self, id: SubscriberId, frame: &WsFrame) {
        let Some(payload) = encode(frame) else { return };
        let failed = {
            let registry = self.lock();
            match registry.subscriptions.get(&id) {
                Some(subscription) => subscription.tx.send(payload).is_err(),
                None => false,
            }
        };
        if failed {
            self.unregister(id);
        }
    }

    /// Broadcast a single game's card to all subscribers.
    pub fn send_game_entry_update(&self, game: GameData) {
        let frame = WsFrame {
            games: Some(vec![game]),
            ..WsFrame::default()
        };
        self.notify(&frame, None, None);
    }

    /// Broadcast incremental per-game state. When the frame carries an
    /// evaluation section it is targeted at the ply it belongs to.
    pub fn send_game_update(
        &self,
        game_id: i64,
        positions: Option<Vec<PositionData>>,
        evaluations: Option<(i64, Vec<EvaluationData>)>,
    ) {
        let mut frame = WsFrame {
            positions,
            ..WsFrame::default()
        };
        let mut ply = None;
        if let Some((eval_ply, evaluations)) = evaluations {
            frame.evaluations = Some(evaluations);
            ply = Some(eval_ply);
        }
        self.notify(&frame, Some(game_id), ply);
    }

    /// Lowest-level dispatch. A frame keyed by `game_id` goes only to
    /// subscribers on that game; keyed additionally by `ply`, only to those
    /// on that ply. An unkeyed frame goes to everyone.
    pub fn notify(&self, frame: &WsFrame, game_id: Option<i64>, ply: Option<i64>) {
        let Some(payload) = encode(frame) else { return };

        // Snapshot receivers under the lock, send outside it.
        let targets: Vec<(SubscriberId, mpsc::UnboundedSender<String>)> = {
            let registry = self.lock();
            registry
                .subscriptions
                .iter()
                .filter(|(_, sub)| {
                    if let Some(game_id) = game_id {
                        if sub.game_id != Some(game_id) {
                            return false;
                        }
                        if let Some(ply) = ply {
                            if sub.ply != Some(ply) {
                                return false;
                            }
                        }
                    }
                    true
                })
                .map(|(id, sub)| (*id, sub.tx.clone()))
                .collect()
        };

        for (id, tx) in targets {
            if tx.send(payload.clone()).is_err() {
                tracing::info!(subscriber = id, "Dropping dead subscriber");
                self.unregister(id);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn encode(frame: &WsFrame) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::error!("Failed to encode frame: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{PlayerData, StatusData};

    fn status_frame() -> WsFrame {
        WsFrame {
            status: Some(StatusData {
                message: None,
                num_viewers: 1,
                js_hash: None,
            }),
            ..WsFrame::default()
        }
    }

    fn game_card(game_id: i64) -> GameData {
        GameData {
            game_id,
            name: "A - B (R1) --- Open".to_string(),
            is_finished: false,
            is_being_analyzed: true,
            player1: PlayerData {
                name: "A".to_string(),
                rating: None,
                fide_id: None,
                fed: None,
            },
            player2: PlayerData {
                name: "B".to_string(),
                rating: None,
                fide_id: None,
                fed: None,
            },
            feed_url: "https://example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_and_count() {
        let notifier = Notifier::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = notifier.register(tx.clone());
        let _b = notifier.register(tx);
        assert_eq!(notifier.num_subscribers(), 2);
        notifier.unregister(a);
        assert_eq!(notifier.num_subscribers(), 1);
        // Unregistering twice is harmless.
        notifier.unregister(a);
        assert_eq!(notifier.num_subscribers(), 1);
    }

    #[tokio::test]
    async fn test_unkeyed_frame_reaches_everyone() {
        let notifier = Notifier::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        notifier.register(tx1);
        notifier.register(tx2);

        notifier.notify(&status_frame(), None, None);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_game_filter() {
        let notifier = Notifier::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_idle, mut rx_idle) = mpsc::unbounded_channel();
        let a = notifier.register(tx_a);
        let b = notifier.register(tx_b);
        notifier.register(tx_idle);

        assert!(notifier.set_game_and_ply(a, 1, None));
        assert!(notifier.set_game_and_ply(b, 2, None));

        notifier.send_game_update(1, Some(vec![]), None);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
        assert!(rx_idle.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ply_filter_applies_to_evaluation_frames() {
        let notifier = Notifier::new();
        let (tx_right, mut rx_right) = mpsc::unbounded_channel();
        let (tx_wrong, mut rx_wrong) = mpsc::unbounded_channel();
        let right = notifier.register(tx_right);
        let wrong = notifier.register(tx_wrong);
        notifier.set_game_and_ply(right, 1, Some(4));
        notifier.set_game_and_ply(wrong, 1, Some(9));

        notifier.send_game_update(1, None, Some((4, vec![])));
        assert!(rx_right.try_recv().is_ok());
        assert!(rx_wrong.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_game_change_detection() {
        let notifier = Notifier::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = notifier.register(tx);
        assert!(notifier.set_game_and_ply(id, 1, None));
        assert!(!notifier.set_game_and_ply(id, 1, Some(3)));
        assert!(notifier.set_game_and_ply(id, 2, Some(3)));
    }

    #[tokio::test]
    async fn test_dead_subscriber_is_dropped_on_send() {
        let notifier = Notifier::new();
        let (tx, rx) = mpsc::unbounded_channel();
        notifier.register(tx);
        drop(rx);
        assert_eq!(notifier.num_subscribers(), 1);

        notifier.send_game_entry_update(game_card(1));
        assert_eq!(notifier.num_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_send_to_targets_one_subscriber() {
        let notifier = Notifier::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let one = notifier.register(tx1);
        notifier.register(tx2);

        notifier.send_to(one, &status_frame());
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
    }
}
