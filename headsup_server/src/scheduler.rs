use headsup_protocol::SessionId;
use std::time::Duration;
use tokio::time::Instant;

/// A deadline that went off before the player acted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnExpiry {
    pub session_id: SessionId,
    pub generation: u64,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
struct ArmedTurn {
    session_id: SessionId,
    generation: u64,
    armed_at: Instant,
    deadline: Instant,
}

/// Holds at most one turn deadline. It never sleeps itself; the table loop
/// waits on [`TurnScheduler::deadline`] and calls [`TurnScheduler::fire`].
#[derive(Debug, Default)]
pub struct TurnScheduler {
    armed: Option<ArmedTurn>,
}

impl TurnScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the deadline for `generation`, replacing any earlier one.
    pub fn start_turn(&mut self, session_id: &str, generation: u64, deadline: Duration) {
        let now = Instant::now();
        self.armed = Some(ArmedTurn {
            session_id: session_id.to_string(),
            generation,
            armed_at: now,
            deadline: now + deadline,
        });
    }

    pub fn cancel_turn(&mut self) {
        self.armed = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|a| a.deadline)
    }

    #[cfg(test)]
    pub fn armed_generation(&self) -> Option<u64> {
        self.armed.as_ref().map(|a| a.generation)
    }

    /// Time left on the armed deadline, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .as_ref()
            .map(|a| a.deadline.saturating_duration_since(Instant::now()))
    }

    /// Disarms and reports the expiry if the deadline has passed at `now`.
    pub fn fire(&mut self, now: Instant) -> Option<TurnExpiry> {
        match &self.armed {
            Some(armed) if now >= armed.deadline => {}
            _ => return None,
        }
        self.armed.take().map(|armed| TurnExpiry {
            elapsed: now.saturating_duration_since(armed.armed_at),
            session_id: armed.session_id,
            generation: armed.generation,
        })
    }
}
