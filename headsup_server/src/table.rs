use crate::game::{GameStatus, HeadsUpGame};
use headsup_protocol::{ClientMessage, GameResult, ProtocolError, SessionId};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Inputs a table reacts to. Connection tasks only ever talk to the table
/// through these.
#[derive(Debug, Clone, PartialEq)]
pub enum TableEvent {
    Join { session_id: SessionId },
    Message { session_id: SessionId, message: ClientMessage },
    Malformed { session_id: SessionId, reason: String },
    Disconnect { session_id: SessionId },
    EndGame,
}

/// Cloneable sending side of a running table.
#[derive(Debug, Clone)]
pub struct TableHandle {
    tx: mpsc::Sender<TableEvent>,
}

impl TableHandle {
    /// Queues an event; `false` once the table has stopped.
    pub async fn send(&self, event: TableEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the table task has stopped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Owns one [`HeadsUpGame`] and applies events and turn deadlines to it one
/// at a time.
pub struct Table {
    game: HeadsUpGame,
    connected: HashSet<SessionId>,
    rx: mpsc::Receiver<TableEvent>,
}

impl Table {
    pub fn new(game: HeadsUpGame, queue_capacity: usize) -> (Self, TableHandle) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let table = Self {
            game,
            connected: HashSet::new(),
            rx,
        };
        (table, TableHandle { tx })
    }

    pub fn spawn(game: HeadsUpGame, queue_capacity: usize) -> (TableHandle, JoinHandle<()>) {
        let (table, handle) = Self::new(game, queue_capacity);
        (handle, tokio::spawn(table.run()))
    }

    pub async fn run(mut self) {
        info!("Table open");
        loop {
            let deadline = self.game.turn_deadline();
            tokio::select! {
                biased;
                event = self.rx.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("All handles dropped, closing table");
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let result = self.game.fire_turn(Instant::now());
                    self.handle_result(None, result);
                }
            }
            if !self.settle() {
                break;
            }
        }
        info!("Table closed after {} hands", self.game.hand_number());
    }

    fn handle_event(&mut self, event: TableEvent) {
        match event {
            TableEvent::Join { session_id } => match self.game.seat(&session_id) {
                Ok(_) => {
                    self.connected.insert(session_id);
                    if self.game.is_full() && self.game.status() == GameStatus::Waiting {
                        let result = self.game.start_hand();
                        self.handle_result(None, result);
                    }
                }
                Err(e) => {
                    warn!("Session {} not seated: {}", session_id, e);
                    self.game.reject(&session_id, &e.to_string());
                }
            },
            TableEvent::Message {
                session_id,
                message,
            } => {
                let result = self.game.on_player_message(&session_id, &message);
                self.handle_result(Some(&session_id), result);
            }
            TableEvent::Malformed { session_id, reason } => {
                debug!("Malformed message from {}: {}", session_id, reason);
                self.game
                    .reject(&session_id, &ProtocolError::MalformedPayload(reason).to_string());
            }
            TableEvent::Disconnect { session_id } => {
                if self.connected.remove(&session_id) {
                    info!("Session {} disconnected", session_id);
                }
            }
            TableEvent::EndGame => self.game.end_match(None, "ended by host"),
        }
    }

    fn handle_result<T>(&mut self, sender: Option<&str>, result: GameResult<T>) {
        let Err(err) = result else {
            return;
        };
        if err.is_unrecoverable() {
            self.game.halt(&err.to_string());
        } else if err.is_fatal() {
            error!("Hand {} cannot continue: {}", self.game.hand_number(), err);
            self.game.abort_hand(&err.to_string());
        } else if let Some(session_id) = sender {
            debug!("Rejected input from {}: {}", session_id, err);
            self.game.reject(session_id, &err.to_string());
        }
    }

    /// Moves the table on once the last event has been applied. Returns
    /// `false` when the table should stop.
    fn settle(&mut self) -> bool {
        match self.game.status() {
            GameStatus::Halted | GameStatus::MatchOver => return false,
            GameStatus::Waiting => {
                let seated = self.game.players().len();
                return seated == 0 || !self.connected.is_empty();
            }
            GameStatus::InHand => {
                if self.connected.is_empty() {
                    self.game.end_match(None, "both players left");
                    return false;
                }
                return true;
            }
            GameStatus::HandComplete => {}
        }

        let remaining: Vec<usize> = self
            .game
            .players()
            .iter()
            .enumerate()
            .filter(|(_, p)| self.connected.contains(&p.session_id))
            .map(|(seat, _)| seat)
            .collect();
        match remaining.as_slice() {
            [_, _] => {}
            [seat] => {
                self.game.end_match(Some(*seat), "opponent disconnected");
                return false;
            }
            _ => {
                self.game.end_match(None, "both players left");
                return false;
            }
        }

        if let Err(err) = self.game.reset_for_next_hand() {
            self.game.halt(&format!("could not start the next hand: {}", err));
            return false;
        }
        !matches!(
            self.game.status(),
            GameStatus::MatchOver | GameStatus::Halted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::deck::{DeckProvider, ShortDeck, StackedDeck};
    use crate::evaluator::StandardEvaluator;
    use crate::gateway::RecordingGateway;
    use headsup_protocol::{
        ActionAppliedUpdate, MatchEndedUpdate, PlayerAction, RejectedUpdate, ServerMessage,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn new_game(deck: Box<dyn DeckProvider>) -> (HeadsUpGame, Arc<RecordingGateway>) {
        let gateway = RecordingGateway::new();
        let game = HeadsUpGame::new(
            TableConfig::default(),
            deck,
            Box::new(StandardEvaluator),
            gateway.clone(),
        );
        (game, gateway)
    }

    fn open_table_with(
        deck: Box<dyn DeckProvider>,
    ) -> (TableHandle, JoinHandle<()>, Arc<RecordingGateway>) {
        let (game, gateway) = new_game(deck);
        let (handle, task) = Table::spawn(game, 16);
        (handle, task, gateway)
    }

    fn open_table() -> (TableHandle, JoinHandle<()>, Arc<RecordingGateway>) {
        open_table_with(Box::new(StackedDeck::default()))
    }

    async fn let_table_catch_up() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn join_both(handle: &TableHandle) {
        for id in ["p0", "p1"] {
            assert!(
                handle
                    .send(TableEvent::Join {
                        session_id: id.to_string()
                    })
                    .await
            );
        }
        let_table_catch_up().await;
    }

    async fn act(handle: &TableHandle, who: &str, action: PlayerAction, generation: u64) {
        handle
            .send(TableEvent::Message {
                session_id: who.to_string(),
                message: ClientMessage::new(action, generation),
            })
            .await;
    }

    fn hands_started(gateway: &RecordingGateway) -> Vec<u32> {
        gateway
            .broadcasts()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::HandStarted(update) => Some(update.hand_number),
                _ => None,
            })
            .collect()
    }

    fn halted(gateway: &RecordingGateway) -> bool {
        gateway
            .broadcasts()
            .iter()
            .any(|m| matches!(m, ServerMessage::TableHalted(_)))
    }

    fn applied(gateway: &RecordingGateway) -> Vec<ActionAppliedUpdate> {
        gateway
            .broadcasts()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::ActionApplied(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_turn_checks_for_player() {
        let (handle, _task, gateway) = open_table();
        join_both(&handle).await;

        tokio::time::sleep(Duration::from_millis(15_001)).await;

        let actions = applied(&gateway);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].session_id, "p0");
        assert_eq!(actions[0].action, PlayerAction::Check);
        assert!(actions[0].timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_beats_deadline_and_stale_retry_is_rejected() {
        let (handle, _task, gateway) = open_table();
        join_both(&handle).await;

        act(&handle, "p0", PlayerAction::Bet(100), 0).await;
        tokio::time::sleep(Duration::from_millis(15_001)).await;

        let actions = applied(&gateway);
        assert_eq!(actions.len(), 2);
        assert!(!actions[0].timed_out);
        assert_eq!(actions[1].session_id, "p1");
        assert_eq!(actions[1].action, PlayerAction::Fold);
        assert!(actions[1].timed_out);

        gateway.clear();
        act(&handle, "p0", PlayerAction::Check, 0).await;
        let_table_catch_up().await;
        assert!(gateway
            .received_by("p0")
            .iter()
            .any(|m| matches!(m, ServerMessage::Rejected(RejectedUpdate { .. }))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_message_is_rejected() {
        let (handle, _task, gateway) = open_table();
        join_both(&handle).await;

        handle
            .send(TableEvent::Malformed {
                session_id: "p1".to_string(),
                reason: "expected value".to_string(),
            })
            .await;
        let_table_catch_up().await;

        let rejected = gateway
            .received_by("p1")
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::Rejected(update) => Some(update),
                _ => None,
            })
            .unwrap();
        assert!(rejected.reason.contains("expected value"));
        assert_eq!(rejected.turn_generation, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_ends_match_after_hand() {
        let (handle, task, gateway) = open_table();
        join_both(&handle).await;

        handle
            .send(TableEvent::Disconnect {
                session_id: "p1".to_string(),
            })
            .await;
        act(&handle, "p0", PlayerAction::Bet(100), 0).await;

        tokio::time::timeout(Duration::from_secs(60), task)
            .await
            .unwrap()
            .unwrap();

        assert!(applied(&gateway).iter().any(|a| a.session_id == "p1" && a.timed_out));
        assert!(gateway.broadcasts().contains(&ServerMessage::MatchEnded(
            MatchEndedUpdate {
                winner: Some("p0".to_string()),
                reason: "opponent disconnected".to_string(),
            }
        )));
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_players_leaving_closes_table() {
        let (handle, task, gateway) = open_table();
        join_both(&handle).await;

        for id in ["p0", "p1"] {
            handle
                .send(TableEvent::Disconnect {
                    session_id: id.to_string(),
                })
                .await;
        }
        task.await.unwrap();

        assert!(gateway.broadcasts().iter().any(|m| matches!(
            m,
            ServerMessage::MatchEnded(MatchEndedUpdate { winner: None, .. })
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_third_session_is_turned_away() {
        let (handle, _task, gateway) = open_table();
        join_both(&handle).await;

        handle
            .send(TableEvent::Join {
                session_id: "p2".to_string(),
            })
            .await;
        let_table_catch_up().await;

        assert!(gateway
            .received_by("p2")
            .iter()
            .any(|m| matches!(m, ServerMessage::Rejected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_game_stops_table() {
        let (handle, task, gateway) = open_table();
        join_both(&handle).await;
        handle.send(TableEvent::EndGame).await;
        task.await.unwrap();

        assert!(gateway
            .broadcasts()
            .iter()
            .any(|m| matches!(m, ServerMessage::MatchEnded(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deck_running_dry_aborts_and_refunds_then_deals_again() {
        let (handle, task, gateway) = open_table_with(Box::new(ShortDeck::new(vec![4])));
        join_both(&handle).await;

        act(&handle, "p0", PlayerAction::Bet(100), 0).await;
        act(&handle, "p1", PlayerAction::Call, 1).await;
        let_table_catch_up().await;

        assert!(gateway
            .broadcasts()
            .iter()
            .any(|m| matches!(m, ServerMessage::HandAborted(_))));
        assert!(!halted(&gateway));
        assert_eq!(hands_started(&gateway), vec![1, 2]);
        let view = gateway
            .received_by("p0")
            .into_iter()
            .rev()
            .find_map(|m| match m {
                ServerMessage::TableView(view) => Some(view),
                _ => None,
            })
            .unwrap();
        assert_eq!((view.your_chips, view.opponent_chips), (1500, 1500));
        assert_eq!(view.pot, 0);
        assert!(view.board.is_empty());
        assert!(!task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_halts_when_fresh_deal_fails_after_abort() {
        let (handle, task, gateway) = open_table_with(Box::new(ShortDeck::new(vec![0, 0])));
        join_both(&handle).await;

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(gateway
            .broadcasts()
            .iter()
            .any(|m| matches!(m, ServerMessage::HandAborted(_))));
        assert!(halted(&gateway));
        assert!(hands_started(&gateway).is_empty());
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_chip_mismatch_halts_table_without_refunds() {
        let (mut game, gateway) = new_game(Box::new(StackedDeck::default()));
        game.seat("p0").unwrap();
        game.seat("p1").unwrap();
        game.start_hand().unwrap();
        game.player_mut(0).chips += 5;

        let (handle, task) = Table::spawn(game, 16);
        join_both(&handle).await;
        act(&handle, "p0", PlayerAction::Bet(100), 0).await;

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert!(halted(&gateway));
        assert!(!gateway
            .broadcasts()
            .iter()
            .any(|m| matches!(m, ServerMessage::HandAborted(_))));
        assert_eq!(hands_started(&gateway), vec![1]);
        assert!(!handle.send(TableEvent::EndGame).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_resolves_when_table_stops() {
        let (handle, task, _gateway) = open_table();
        join_both(&handle).await;

        let watcher = handle.clone();
        let waiting = tokio::spawn(async move { watcher.closed().await });
        let_table_catch_up().await;
        assert!(!waiting.is_finished());

        handle.send(TableEvent::EndGame).await;
        task.await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
    }
}
