use crate::player::Player;
use headsup_protocol::{ActionKind, Chips, IllegalActionError, PlayerAction};

/// What a legal action did to the hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Chips moved from the actor's stack into the pot
    pub moved: Chips,
    pub round_closed: bool,
    /// Only a fold ends a hand outright
    pub hand_over: bool,
}

/// Pot and raise sizing for the current hand. Per-player bets live on the
/// players themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BettingRound {
    pub pot: Chips,
    /// Smallest legal bet, or raise increment, in this round
    pub min_raise: Chips,
    /// Size of the last full bet or raise this round, 0 if none yet
    pub last_raise_amount: Chips,
    min_bet: Chips,
}

pub fn opponent(seat: usize) -> usize {
    1 - seat
}

/// Chips `seat` must add to match the opponent.
pub fn to_call(players: &[Player; 2], seat: usize) -> Chips {
    players[opponent(seat)]
        .current_bet
        .saturating_sub(players[seat].current_bet)
}

impl BettingRound {
    pub fn new(min_bet: Chips) -> Self {
        Self {
            pot: 0,
            min_raise: min_bet,
            last_raise_amount: 0,
            min_bet,
        }
    }

    /// Clears per-round bets; the pot carries over.
    pub fn start_round(&mut self, players: &mut [Player; 2]) {
        for player in players.iter_mut() {
            player.reset_round();
        }
        self.min_raise = self.min_bet;
        self.last_raise_amount = 0;
    }

    pub fn legal_actions(&self, players: &[Player; 2], seat: usize) -> Vec<ActionKind> {
        let player = &players[seat];
        if !player.can_act() {
            return Vec::new();
        }
        let owed = to_call(players, seat);
        let mut actions = Vec::with_capacity(3);
        if owed == 0 {
            actions.push(ActionKind::Check);
            if player.chips >= self.min_raise {
                actions.push(ActionKind::Bet);
            }
        } else {
            actions.push(ActionKind::Call);
            if !players[opponent(seat)].all_in && player.chips > owed {
                actions.push(ActionKind::Raise);
            }
        }
        actions.push(ActionKind::Fold);
        actions
    }

    /// Legal amounts for the bet or raise open to `seat`. Raises are
    /// expressed as the increment over the opponent's bet.
    pub fn bet_range(&self, players: &[Player; 2], seat: usize) -> (Chips, Chips) {
        let player = &players[seat];
        let owed = to_call(players, seat);
        if owed == 0 {
            if player.chips < self.min_raise {
                return (0, 0);
            }
            return (self.min_raise, player.chips);
        }
        if players[opponent(seat)].all_in || player.chips <= owed {
            return (0, 0);
        }
        let max = player.chips - owed;
        (self.min_raise.min(max), max)
    }

    /// Validates and applies one action for `seat`. On error nothing changes.
    pub fn apply(
        &mut self,
        players: &mut [Player; 2],
        seat: usize,
        action: PlayerAction,
    ) -> Result<ActionOutcome, IllegalActionError> {
        let opp = opponent(seat);
        let owed = to_call(players, seat);

        let moved = match action {
            PlayerAction::Fold => {
                players[seat].folded = true;
                players[seat].has_acted = true;
                return Ok(ActionOutcome {
                    moved: 0,
                    round_closed: true,
                    hand_over: true,
                });
            }
            PlayerAction::Check => {
                if owed > 0 {
                    return Err(IllegalActionError::CannotCheck);
                }
                0
            }
            PlayerAction::Call => {
                if owed == 0 {
                    return Err(IllegalActionError::NothingToCall);
                }
                players[seat].commit(owed)
            }
            PlayerAction::Bet(amount) => {
                let chips = players[seat].chips;
                if owed > 0 {
                    return Err(IllegalActionError::CannotBet);
                }
                if amount == 0 {
                    return Err(IllegalActionError::ZeroAmount);
                }
                if amount > chips {
                    return Err(IllegalActionError::BetExceedsChips { amount, chips });
                }
                if amount < self.min_raise {
                    return Err(IllegalActionError::BetBelowMinimum {
                        minimum: self.min_raise,
                    });
                }
                let moved = players[seat].commit(amount);
                self.record_raise(moved, &mut players[opp]);
                moved
            }
            PlayerAction::Raise(amount) => {
                let chips = players[seat].chips;
                if owed == 0 {
                    return Err(IllegalActionError::CannotRaise);
                }
                if players[opp].all_in {
                    return Err(IllegalActionError::OpponentAllIn);
                }
                if amount == 0 {
                    return Err(IllegalActionError::ZeroAmount);
                }
                if chips <= owed {
                    return Err(IllegalActionError::CannotRaise);
                }
                let required = owed.saturating_add(amount);
                if required < chips && amount < self.min_raise {
                    return Err(IllegalActionError::RaiseBelowMinimum {
                        minimum: self.min_raise,
                    });
                }
                let moved = players[seat].commit(required);
                self.record_raise(moved - owed, &mut players[opp]);
                moved
            }
        };

        players[seat].has_acted = true;
        self.pot += moved;

        Ok(ActionOutcome {
            moved,
            round_closed: Self::is_closed(players),
            hand_over: false,
        })
    }

    /// Full-size wagers set the next minimum and hand the action back to
    /// the opponent. Short all-ins do neither.
    fn record_raise(&mut self, increment: Chips, opponent: &mut Player) {
        if increment >= self.min_raise {
            self.min_raise = increment;
            self.last_raise_amount = increment;
            opponent.has_acted = false;
        }
    }

    /// Everyone who can still act has acted, and the bets match unless the
    /// shorter stack is all-in.
    pub fn is_closed(players: &[Player; 2]) -> bool {
        if players.iter().any(|p| p.folded) {
            return true;
        }
        let all_acted = players.iter().filter(|p| p.can_act()).all(|p| p.has_acted);
        let (low, high) = if players[0].current_bet <= players[1].current_bet {
            (&players[0], &players[1])
        } else {
            (&players[1], &players[0])
        };
        all_acted && (low.current_bet == high.current_bet || low.all_in)
    }

    /// Returns the part of a bet the all-in opponent could not match.
    pub fn return_uncalled(&mut self, players: &mut [Player; 2]) -> Option<(usize, Chips)> {
        let (high, low) = if players[0].current_bet > players[1].current_bet {
            (0, 1)
        } else {
            (1, 0)
        };
        let excess = players[high].current_bet - players[low].current_bet;
        if excess == 0 || !players[low].all_in {
            return None;
        }
        players[high].refund(excess);
        self.pot -= excess;
        Some((high, excess))
    }

    /// Moves `amount` from the pot to `player`.
    pub fn pay(&mut self, player: &mut Player, amount: Chips) -> Chips {
        let amount = amount.min(self.pot);
        self.pot -= amount;
        player.chips += amount;
        amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(chips: [Chips; 2]) -> ([Player; 2], BettingRound) {
        (
            [
                Player::new("p0".to_string(), chips[0], 15_000),
                Player::new("p1".to_string(), chips[1], 15_000),
            ],
            BettingRound::new(20),
        )
    }

    fn total(players: &[Player; 2], round: &BettingRound) -> Chips {
        players.iter().map(|p| p.chips).sum::<Chips>() + round.pot
    }

    #[test]
    fn test_bet_then_call_closes_round() {
        let (mut players, mut round) = table([1500, 1500]);
        let outcome = round.apply(&mut players, 0, PlayerAction::Bet(200)).unwrap();
        assert_eq!(outcome.moved, 200);
        assert!(!outcome.round_closed);
        assert_eq!(players[0].chips, 1300);
        assert_eq!(round.pot, 200);

        let outcome = round.apply(&mut players, 1, PlayerAction::Call).unwrap();
        assert!(outcome.round_closed);
        assert_eq!(players[1].chips, 1300);
        assert_eq!(round.pot, 400);
        assert_eq!(total(&players, &round), 3000);
    }

    #[test]
    fn test_single_check_does_not_close() {
        let (mut players, mut round) = table([1500, 1500]);
        let outcome = round.apply(&mut players, 0, PlayerAction::Check).unwrap();
        assert!(!outcome.round_closed);
        let outcome = round.apply(&mut players, 1, PlayerAction::Check).unwrap();
        assert!(outcome.round_closed);
    }

    #[test]
    fn test_check_facing_bet_is_illegal() {
        let (mut players, mut round) = table([1500, 1500]);
        round.apply(&mut players, 0, PlayerAction::Bet(100)).unwrap();
        let before = (players.clone(), round.clone());
        assert_eq!(
            round.apply(&mut players, 1, PlayerAction::Check),
            Err(IllegalActionError::CannotCheck)
        );
        assert_eq!(
            round.apply(&mut players, 1, PlayerAction::Bet(100)),
            Err(IllegalActionError::CannotBet)
        );
        assert_eq!((players, round), before);
    }

    #[test]
    fn test_call_and_raise_need_a_wager() {
        let (mut players, mut round) = table([1500, 1500]);
        assert_eq!(
            round.apply(&mut players, 0, PlayerAction::Call),
            Err(IllegalActionError::NothingToCall)
        );
        assert_eq!(
            round.apply(&mut players, 0, PlayerAction::Raise(100)),
            Err(IllegalActionError::CannotRaise)
        );
    }

    #[test]
    fn test_bet_bounds() {
        let (mut players, mut round) = table([1500, 1500]);
        assert_eq!(
            round.apply(&mut players, 0, PlayerAction::Bet(0)),
            Err(IllegalActionError::ZeroAmount)
        );
        assert_eq!(
            round.apply(&mut players, 0, PlayerAction::Bet(10)),
            Err(IllegalActionError::BetBelowMinimum { minimum: 20 })
        );
        assert_eq!(
            round.apply(&mut players, 0, PlayerAction::Bet(2000)),
            Err(IllegalActionError::BetExceedsChips {
                amount: 2000,
                chips: 1500
            })
        );
        assert_eq!(round.pot, 0);
    }

    #[test]
    fn test_short_stack_cannot_bet_below_minimum() {
        let (mut players, mut round) = table([15, 1500]);
        assert_eq!(
            round.apply(&mut players, 0, PlayerAction::Bet(15)),
            Err(IllegalActionError::BetBelowMinimum { minimum: 20 })
        );
        assert_eq!(players[0].chips, 15);
        assert!(!players[0].all_in);
        assert_eq!(round.pot, 0);
        assert_eq!(
            round.legal_actions(&players, 0),
            vec![ActionKind::Check, ActionKind::Fold]
        );
        assert_eq!(round.bet_range(&players, 0), (0, 0));
    }

    #[test]
    fn test_whole_stack_at_minimum_is_a_legal_bet() {
        let (mut players, mut round) = table([20, 1500]);
        let outcome = round.apply(&mut players, 0, PlayerAction::Bet(20)).unwrap();
        assert_eq!(outcome.moved, 20);
        assert!(players[0].all_in);
    }

    #[test]
    fn test_raise_sets_new_minimum_and_reopens() {
        let (mut players, mut round) = table([1500, 1500]);
        round.apply(&mut players, 0, PlayerAction::Bet(100)).unwrap();
        assert_eq!(
            round.apply(&mut players, 1, PlayerAction::Raise(50)),
            Err(IllegalActionError::RaiseBelowMinimum { minimum: 100 })
        );
        let outcome = round.apply(&mut players, 1, PlayerAction::Raise(150)).unwrap();
        assert_eq!(outcome.moved, 250);
        assert_eq!(players[1].current_bet, 250);
        assert_eq!(round.min_raise, 150);
        assert_eq!(round.last_raise_amount, 150);
        assert!(!players[0].has_acted);
        assert!(!outcome.round_closed);

        let outcome = round.apply(&mut players, 0, PlayerAction::Call).unwrap();
        assert!(outcome.round_closed);
        assert_eq!(round.pot, 500);
    }

    #[test]
    fn test_raise_over_stack_is_capped_all_in() {
        let (mut players, mut round) = table([1500, 400]);
        round.apply(&mut players, 0, PlayerAction::Bet(100)).unwrap();
        let outcome = round
            .apply(&mut players, 1, PlayerAction::Raise(10_000))
            .unwrap();
        assert_eq!(outcome.moved, 400);
        assert!(players[1].all_in);
        assert_eq!(round.min_raise, 300);
        assert_eq!(total(&players, &round), 1900);
    }

    #[test]
    fn test_short_all_in_raise_does_not_reopen() {
        let (mut players, mut round) = table([1500, 150]);
        round.apply(&mut players, 0, PlayerAction::Bet(100)).unwrap();
        let outcome = round.apply(&mut players, 1, PlayerAction::Raise(50)).unwrap();
        assert_eq!(outcome.moved, 150);
        assert!(players[1].all_in);
        assert_eq!(round.min_raise, 100);
        assert!(!outcome.round_closed);

        assert_eq!(
            round.legal_actions(&players, 0),
            vec![ActionKind::Call, ActionKind::Fold]
        );
        assert_eq!(
            round.apply(&mut players, 0, PlayerAction::Raise(200)),
            Err(IllegalActionError::OpponentAllIn)
        );
        let outcome = round.apply(&mut players, 0, PlayerAction::Call).unwrap();
        assert_eq!(outcome.moved, 50);
        assert!(outcome.round_closed);
    }

    #[test]
    fn test_short_call_goes_all_in_and_excess_returns() {
        let (mut players, mut round) = table([1500, 300]);
        round.apply(&mut players, 0, PlayerAction::Bet(500)).unwrap();
        let outcome = round.apply(&mut players, 1, PlayerAction::Call).unwrap();
        assert_eq!(outcome.moved, 300);
        assert!(players[1].all_in);
        assert!(outcome.round_closed);

        assert_eq!(round.return_uncalled(&mut players), Some((0, 200)));
        assert_eq!(players[0].chips, 1200);
        assert_eq!(players[0].current_bet, 300);
        assert_eq!(round.pot, 600);
        assert_eq!(total(&players, &round), 1800);
        assert_eq!(round.return_uncalled(&mut players), None);
    }

    #[test]
    fn test_all_in_bet_waits_for_opponent() {
        let (mut players, mut round) = table([300, 1500]);
        let outcome = round.apply(&mut players, 0, PlayerAction::Bet(300)).unwrap();
        assert!(!outcome.round_closed);
        assert_eq!(
            round.legal_actions(&players, 1),
            vec![ActionKind::Call, ActionKind::Fold]
        );
    }

    #[test]
    fn test_fold_ends_hand() {
        let (mut players, mut round) = table([1500, 1500]);
        round.apply(&mut players, 0, PlayerAction::Bet(100)).unwrap();
        let outcome = round.apply(&mut players, 1, PlayerAction::Fold).unwrap();
        assert!(outcome.hand_over);
        assert!(outcome.round_closed);
        assert!(players[1].folded);

        let pot = round.pot;
        let paid = round.pay(&mut players[0], pot);
        assert_eq!(paid, 100);
        assert_eq!(players[0].chips, 1500);
        assert_eq!(round.pot, 0);
    }

    #[test]
    fn test_legal_actions_and_ranges() {
        let (mut players, mut round) = table([1500, 1500]);
        assert_eq!(
            round.legal_actions(&players, 0),
            vec![ActionKind::Check, ActionKind::Bet, ActionKind::Fold]
        );
        assert_eq!(round.bet_range(&players, 0), (20, 1500));

        round.apply(&mut players, 0, PlayerAction::Bet(200)).unwrap();
        assert_eq!(
            round.legal_actions(&players, 1),
            vec![ActionKind::Call, ActionKind::Raise, ActionKind::Fold]
        );
        assert_eq!(round.bet_range(&players, 1), (200, 1300));
    }

    #[test]
    fn test_start_round_keeps_pot() {
        let (mut players, mut round) = table([1500, 1500]);
        round.apply(&mut players, 0, PlayerAction::Bet(200)).unwrap();
        round.apply(&mut players, 1, PlayerAction::Call).unwrap();
        round.start_round(&mut players);
        assert_eq!(round.pot, 400);
        assert_eq!(round.min_raise, 20);
        assert_eq!(round.last_raise_amount, 0);
        assert!(players.iter().all(|p| p.current_bet == 0 && !p.has_acted));
    }
}
