use headsup_protocol::ServerMessage;

/// Outbound side of the transport. Delivery is fire-and-forget; a slow or
/// vanished client never blocks the table.
pub trait SessionGateway: Send + Sync {
    fn send_to_player(&self, session_id: &str, message: ServerMessage);
    fn broadcast(&self, message: ServerMessage);
}

/// Keeps every message it is asked to deliver, in order.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingGateway {
    sent: parking_lot::Mutex<Vec<(Option<String>, ServerMessage)>>,
}

#[cfg(test)]
impl RecordingGateway {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    /// Messages delivered to `session_id`, broadcasts included.
    pub fn received_by(&self, session_id: &str) -> Vec<ServerMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to.as_deref().map_or(true, |to| to == session_id))
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn broadcasts(&self) -> Vec<ServerMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to.is_none())
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[cfg(test)]
impl SessionGateway for RecordingGateway {
    fn send_to_player(&self, session_id: &str, message: ServerMessage) {
        self.sent.lock().push((Some(session_id.to_string()), message));
    }

    fn broadcast(&self, message: ServerMessage) {
        self.sent.lock().push((None, message));
    }
}
