use crate::types::{Chips, Phase};
use thiserror::Error;

/// Inputs that never reach the betting rules: wrong sender, stale turn,
/// unreadable payload. Rejecting one leaves the table untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Stale turn generation {received}, current is {expected}")]
    StaleGeneration { expected: u64, received: u64 },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("No hand in progress")]
    NoHandInProgress,

    #[error("Table is full")]
    TableFull,
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::MalformedPayload(e.to_string())
    }
}

/// A well-formed action that the current betting state does not allow. The
/// player is prompted again for the same turn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IllegalActionError {
    #[error("Cannot check, must call")]
    CannotCheck,

    #[error("Nothing to call")]
    NothingToCall,

    #[error("Cannot bet, must call or raise")]
    CannotBet,

    #[error("Cannot raise, nothing to raise")]
    CannotRaise,

    #[error("Cannot raise an all-in player")]
    OpponentAllIn,

    #[error("Amount must be positive")]
    ZeroAmount,

    #[error("Minimum bet is {minimum}")]
    BetBelowMinimum { minimum: Chips },

    #[error("Bet amount {amount} exceeds your chips ({chips})")]
    BetExceedsChips { amount: Chips, chips: Chips },

    #[error("Minimum raise is {minimum}")]
    RaiseBelowMinimum { minimum: Chips },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Need exactly two seated players, have {0}")]
    InsufficientPlayers(usize),

    #[error("Cannot advance past {from}")]
    InvalidPhaseTransition { from: Phase },

    #[error("Deck exhausted")]
    DeckExhausted,

    #[error("Chip conservation violated: expected {expected}, found {actual}")]
    ChipConservation { expected: u64, actual: u64 },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    IllegalAction(#[from] IllegalActionError),
}

impl GameError {
    /// Contract violations that abort the current hand.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GameError::InsufficientPlayers(_)
                | GameError::InvalidPhaseTransition { .. }
                | GameError::DeckExhausted
                | GameError::ChipConservation { .. }
        )
    }

    /// Errors after which the table must not deal again.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, GameError::ChipConservation { .. })
    }
}
