use crate::config::TableConfig;
use crate::deck::ShuffledDeck;
use crate::evaluator::StandardEvaluator;
use crate::game::HeadsUpGame;
use crate::gateway::SessionGateway;
use crate::table::{Table, TableHandle};
use headsup_protocol::{ServerMessage, SessionId};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

pub const MAX_SEATS: usize = 2;

#[derive(Debug, Clone)]
pub struct ServerSession {
    pub connected: bool,
    pub ws_sender: Option<Sender<String>>,
}

/// Websocket senders of the sessions admitted to one table. A session
/// keeps its entry after disconnecting so its seat is never handed out
/// again.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, ServerSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_accept_session(&self) -> bool {
        self.sessions.lock().len() < MAX_SEATS
    }

    pub fn connect_player(&self, session_id: &str, ws_sender: Sender<String>) {
        self.sessions.lock().insert(
            session_id.to_string(),
            ServerSession {
                connected: true,
                ws_sender: Some(ws_sender),
            },
        );
    }

    pub fn disconnect_player(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().get_mut(session_id) {
            session.connected = false;
            session.ws_sender = None;
        }
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.lock().values().filter(|s| s.connected).count()
    }

    fn deliver(session_id: &str, sender: &Sender<String>, json: String) {
        match sender.try_send(json) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("Outbound queue full for {}, dropping message", session_id)
            }
            Err(TrySendError::Closed(_)) => debug!("Session {} already closed", session_id),
        }
    }
}

fn to_json(message: &ServerMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to serialize message: {}", e);
            None
        }
    }
}

impl SessionGateway for SessionRegistry {
    fn send_to_player(&self, session_id: &str, message: ServerMessage) {
        let Some(json) = to_json(&message) else {
            return;
        };
        let sessions = self.sessions.lock();
        if let Some(sender) = sessions.get(session_id).and_then(|s| s.ws_sender.as_ref()) {
            Self::deliver(session_id, sender, json);
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        let Some(json) = to_json(&message) else {
            return;
        };
        let sessions = self.sessions.lock();
        for (session_id, session) in sessions.iter().filter(|(_, s)| s.connected) {
            if let Some(sender) = session.ws_sender.as_ref() {
                Self::deliver(session_id, sender, json.clone());
            }
        }
    }
}

struct OpenTable {
    handle: TableHandle,
    registry: Arc<SessionRegistry>,
}

/// Hands incoming connections to the table that is filling up, opening a
/// new one once the previous match has finished or both seats are taken.
pub struct Lobby {
    config: TableConfig,
    queue_capacity: usize,
    current: Mutex<Option<OpenTable>>,
}

impl Lobby {
    pub fn new(config: TableConfig, queue_capacity: usize) -> Self {
        Self {
            config,
            queue_capacity,
            current: Mutex::new(None),
        }
    }

    /// Reserves a seat for `session_id` and returns the table it belongs to.
    pub fn admit(
        &self,
        session_id: &str,
        ws_sender: Sender<String>,
    ) -> (TableHandle, Arc<SessionRegistry>) {
        let mut current = self.current.lock();
        let table = match current.take() {
            Some(table) if !table.handle.is_closed() && table.registry.can_accept_session() => {
                table
            }
            _ => self.open_table(),
        };
        table.registry.connect_player(session_id, ws_sender);
        let admitted = (table.handle.clone(), table.registry.clone());
        *current = Some(table);
        admitted
    }

    fn open_table(&self) -> OpenTable {
        let registry = Arc::new(SessionRegistry::new());
        let game = HeadsUpGame::new(
            self.config,
            Box::new(ShuffledDeck::new()),
            Box::new(StandardEvaluator),
            registry.clone(),
        );
        let (handle, _task) = Table::spawn(game, self.queue_capacity);
        info!("Opened a new table");
        OpenTable { handle, registry }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headsup_protocol::{NoticeUpdate, SeatedUpdate};
    use tokio::sync::mpsc;

    fn seated(session_id: &str) -> ServerMessage {
        ServerMessage::Seated(SeatedUpdate {
            session_id: session_id.to_string(),
            seat: 0,
        })
    }

    #[test]
    fn test_send_to_player_targets_one_session() {
        let registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry.connect_player("a", tx_a);
        registry.connect_player("b", tx_b);

        registry.send_to_player("a", seated("a"));
        let json = rx_a.try_recv().unwrap();
        assert!(json.contains("\"type\":\"Seated\""));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_skips_disconnected() {
        let registry = SessionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry.connect_player("a", tx_a);
        registry.connect_player("b", tx_b);
        registry.disconnect_player("b");

        registry.broadcast(ServerMessage::TableHalted(NoticeUpdate {
            reason: "test".to_string(),
        }));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(registry.connected_count(), 1);
    }

    #[test]
    fn test_seats_stay_taken_after_disconnect() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.connect_player("a", tx.clone());
        registry.connect_player("b", tx);
        assert!(!registry.can_accept_session());
        registry.disconnect_player("b");
        assert!(!registry.can_accept_session());
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        registry.connect_player("a", tx);
        registry.send_to_player("a", seated("a"));
        registry.send_to_player("a", seated("a"));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lobby_opens_new_table_when_full() {
        let lobby = Lobby::new(TableConfig::default(), 8);
        let (tx, _rx) = mpsc::channel(8);
        let (_, first) = lobby.admit("a", tx.clone());
        let (_, second) = lobby.admit("b", tx.clone());
        let (_, third) = lobby.admit("c", tx);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
