use serde::{Deserialize, Serialize};
use std::fmt;

mod errors;
mod types;

pub use errors::{GameError, IllegalActionError, ProtocolError};
pub use types::{Card, Chips, HandRank, Phase, Rank, SessionId, Suit};
pub type GameResult<T> = std::result::Result<T, GameError>;

/// A betting decision. Matched exhaustively everywhere it is consumed.
///
/// `Bet` opens the betting with a total; `Raise` is the increment over the
/// opponent's current bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "amount", rename_all = "lowercase")]
pub enum PlayerAction {
    Check,
    Call,
    Bet(Chips),
    Raise(Chips),
    Fold,
}

impl PlayerAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            PlayerAction::Check => ActionKind::Check,
            PlayerAction::Call => ActionKind::Call,
            PlayerAction::Bet(_) => ActionKind::Bet,
            PlayerAction::Raise(_) => ActionKind::Raise,
            PlayerAction::Fold => ActionKind::Fold,
        }
    }
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlayerAction::Fold => write!(f, "Fold"),
            PlayerAction::Check => write!(f, "Check"),
            PlayerAction::Call => write!(f, "Call"),
            PlayerAction::Bet(amount) => write!(f, "Bet({})", amount),
            PlayerAction::Raise(amount) => write!(f, "Raise({})", amount),
        }
    }
}

/// Wire tag of an action, without its amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Check,
    Call,
    Bet,
    Raise,
    Fold,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ActionKind::Check => write!(f, "check"),
            ActionKind::Call => write!(f, "call"),
            ActionKind::Bet => write!(f, "bet"),
            ActionKind::Raise => write!(f, "raise"),
            ActionKind::Fold => write!(f, "fold"),
        }
    }
}

/// The only message a client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Chips>,
    pub turn_generation: u64,
}

impl ClientMessage {
    pub fn new(action: PlayerAction, turn_generation: u64) -> Self {
        let amount = match action {
            PlayerAction::Bet(amount) | PlayerAction::Raise(amount) => Some(amount),
            PlayerAction::Check | PlayerAction::Call | PlayerAction::Fold => None,
        };
        Self {
            action: action.kind(),
            amount,
            turn_generation,
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Pairs the tag with its amount, rejecting payloads where the two
    /// disagree.
    pub fn to_action(&self) -> Result<PlayerAction, ProtocolError> {
        match (self.action, self.amount) {
            (ActionKind::Bet, Some(amount)) => Ok(PlayerAction::Bet(amount)),
            (ActionKind::Raise, Some(amount)) => Ok(PlayerAction::Raise(amount)),
            (ActionKind::Bet | ActionKind::Raise, None) => Err(ProtocolError::MalformedPayload(
                format!("{} requires an amount", self.action),
            )),
            (ActionKind::Check, None) => Ok(PlayerAction::Check),
            (ActionKind::Call, None) => Ok(PlayerAction::Call),
            (ActionKind::Fold, None) => Ok(PlayerAction::Fold),
            (kind, Some(_)) => Err(ProtocolError::MalformedPayload(format!(
                "{} takes no amount",
                kind
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Seated(SeatedUpdate),
    HandStarted(HandStartedUpdate),
    TableView(TableView),
    ActionApplied(ActionAppliedUpdate),
    Rejected(RejectedUpdate),
    Showdown(ShowdownUpdate),
    HandEnded(HandEndedUpdate),
    HandAborted(NoticeUpdate),
    MatchEnded(MatchEndedUpdate),
    TableHalted(NoticeUpdate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatedUpdate {
    pub session_id: SessionId,
    pub seat: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandStartedUpdate {
    pub hand_number: u32,
    pub dealer: SessionId,
}

/// One player's view of the table. Hole cards are only ever the recipient's
/// own; available actions are empty unless it is the recipient's turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView {
    pub phase: Phase,
    pub board: Vec<Card>,
    pub pot: Chips,
    pub current_player: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub your_hole_cards: Option<Vec<Card>>,
    pub available_actions: Vec<ActionKind>,
    pub bet_range: (Chips, Chips),
    pub opponent_time_left_ms: u64,
    pub turn_generation: u64,
    pub your_chips: Chips,
    pub opponent_chips: Chips,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAppliedUpdate {
    pub session_id: SessionId,
    pub action: PlayerAction,
    pub pot: Chips,
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedUpdate {
    pub reason: String,
    pub turn_generation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedHand {
    pub session_id: SessionId,
    pub hole_cards: Vec<Card>,
    pub rank: HandRank,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowdownUpdate {
    pub board: Vec<Card>,
    pub hands: Vec<RevealedHand>,
    pub winners: Vec<SessionId>,
    pub payouts: Vec<(SessionId, Chips)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandEndedUpdate {
    pub hand_number: u32,
    pub winner: Option<SessionId>,
    pub pot: Chips,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEndedUpdate {
    pub winner: Option<SessionId>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeUpdate {
    pub reason: String,
}
