use clap::Parser;
use headsup_protocol::Chips;
use std::time::Duration;

const STARTING_CHIPS: Chips = 1500;
const TIME_BANK_MS: u64 = 15_000;
const TURN_TIMEOUT_MS: u64 = 20_000;
const MIN_TURN_MS: u64 = 1_000;
const MIN_BET: Chips = 20;
const MAX_MESSAGE_SIZE: usize = 4096;
const EVENT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Parser)]
#[command(name = "headsup_server", about = "Authoritative heads-up hold'em table")]
pub struct ServerConfig {
    /// Address the websocket listener binds to
    #[arg(long, env = "HEADSUP_BIND", default_value = "127.0.0.1:8080")]
    pub bind: String,

    #[arg(long, env = "HEADSUP_STARTING_CHIPS", default_value_t = STARTING_CHIPS)]
    pub starting_chips: Chips,

    /// Decision time each player starts the match with
    #[arg(long, env = "HEADSUP_TIME_BANK_MS", default_value_t = TIME_BANK_MS)]
    pub time_bank_ms: u64,

    /// Upper bound on a single turn's deadline
    #[arg(long, env = "HEADSUP_TURN_TIMEOUT_MS", default_value_t = TURN_TIMEOUT_MS)]
    pub turn_timeout_ms: u64,

    /// Lower bound on a single turn's deadline, even with an empty time bank
    #[arg(long, env = "HEADSUP_MIN_TURN_MS", default_value_t = MIN_TURN_MS)]
    pub min_turn_ms: u64,

    /// Smallest opening bet of a betting round
    #[arg(long, env = "HEADSUP_MIN_BET", default_value_t = MIN_BET)]
    pub min_bet: Chips,

    #[arg(long, env = "HEADSUP_MAX_MESSAGE_SIZE", default_value_t = MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,

    #[arg(long, env = "HEADSUP_EVENT_QUEUE", default_value_t = EVENT_QUEUE_CAPACITY)]
    pub event_queue_capacity: usize,
}

impl ServerConfig {
    pub fn table(&self) -> TableConfig {
        TableConfig {
            starting_chips: self.starting_chips,
            time_bank_ms: self.time_bank_ms,
            turn_timeout_ms: self.turn_timeout_ms,
            min_turn_ms: self.min_turn_ms.min(self.turn_timeout_ms),
            min_bet: self.min_bet.max(1),
        }
    }
}

/// Rules of a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableConfig {
    pub starting_chips: Chips,
    pub time_bank_ms: u64,
    pub turn_timeout_ms: u64,
    pub min_turn_ms: u64,
    pub min_bet: Chips,
}

impl TableConfig {
    /// Deadline for a turn given the actor's remaining time bank.
    pub fn turn_deadline(&self, time_bank_ms: u64) -> Duration {
        Duration::from_millis(time_bank_ms.clamp(self.min_turn_ms, self.turn_timeout_ms))
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            starting_chips: STARTING_CHIPS,
            time_bank_ms: TIME_BANK_MS,
            turn_timeout_ms: TURN_TIMEOUT_MS,
            min_turn_ms: MIN_TURN_MS,
            min_bet: MIN_BET,
        }
    }
}
