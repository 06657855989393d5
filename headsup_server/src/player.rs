use headsup_protocol::{Card, Chips, SessionId};

/// A seated player. The transport session lives in the gateway; the table
/// only keeps its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub session_id: SessionId,
    pub chips: Chips,
    /// Chips committed in the current betting round
    pub current_bet: Chips,
    /// Chips committed over the whole hand, refunded if the hand aborts
    pub committed: Chips,
    pub hole_cards: Vec<Card>,
    /// Whether the player has acted in the current betting round
    pub has_acted: bool,
    pub folded: bool,
    pub all_in: bool,
    pub time_bank_ms: u64,
}

impl Player {
    pub fn new(session_id: SessionId, chips: Chips, time_bank_ms: u64) -> Self {
        Self {
            session_id,
            chips,
            current_bet: 0,
            committed: 0,
            hole_cards: Vec::new(),
            has_acted: false,
            folded: false,
            all_in: false,
            time_bank_ms,
        }
    }

    /// Moves up to `amount` chips from the stack into the current bet and
    /// returns what actually moved. Emptying the stack puts the player
    /// all-in.
    pub fn commit(&mut self, amount: Chips) -> Chips {
        let moved = amount.min(self.chips);
        self.chips -= moved;
        self.current_bet += moved;
        self.committed += moved;
        if self.chips == 0 {
            self.all_in = true;
        }
        moved
    }

    /// Takes back part of this round's bet that nobody matched.
    pub fn refund(&mut self, amount: Chips) {
        let amount = amount.min(self.current_bet);
        self.current_bet -= amount;
        self.committed -= amount;
        self.chips += amount;
        if self.chips > 0 {
            self.all_in = false;
        }
    }

    /// Still contesting the pot and able to make decisions.
    pub fn can_act(&self) -> bool {
        !self.folded && !self.all_in
    }

    pub fn reset_round(&mut self) {
        self.current_bet = 0;
        self.has_acted = false;
    }

    pub fn reset_hand(&mut self) {
        self.reset_round();
        self.committed = 0;
        self.hole_cards.clear();
        self.folded = false;
        self.all_in = false;
    }

    pub fn charge_time(&mut self, elapsed_ms: u64) -> u64 {
        let charged = elapsed_ms.min(self.time_bank_ms);
        self.time_bank_ms -= charged;
        charged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_caps_at_stack() {
        let mut player = Player::new("p1".to_string(), 100, 15_000);
        assert_eq!(player.commit(40), 40);
        assert_eq!(player.chips, 60);
        assert!(!player.all_in);

        assert_eq!(player.commit(500), 60);
        assert_eq!(player.chips, 0);
        assert_eq!(player.current_bet, 100);
        assert_eq!(player.committed, 100);
        assert!(player.all_in);
        assert!(!player.can_act());
    }

    #[test]
    fn test_refund_restores_stack() {
        let mut player = Player::new("p1".to_string(), 100, 15_000);
        player.commit(100);
        player.refund(30);
        assert_eq!(player.chips, 30);
        assert_eq!(player.current_bet, 70);
        assert_eq!(player.committed, 70);
        assert!(!player.all_in);
    }

    #[test]
    fn test_charge_time_caps_at_bank() {
        let mut player = Player::new("p1".to_string(), 100, 5_000);
        assert_eq!(player.charge_time(3_000), 3_000);
        assert_eq!(player.charge_time(3_000), 2_000);
        assert_eq!(player.time_bank_ms, 0);
    }

    #[test]
    fn test_reset_hand_keeps_chips_and_bank() {
        let mut player = Player::new("p1".to_string(), 100, 5_000);
        player.commit(100);
        player.folded = true;
        player.reset_hand();
        assert_eq!(player.chips, 0);
        assert_eq!(player.time_bank_ms, 5_000);
        assert!(!player.folded);
        assert!(!player.all_in);
        assert_eq!(player.current_bet, 0);
    }
}
