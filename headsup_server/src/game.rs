use crate::betting::{opponent, to_call, BettingRound};
use crate::config::TableConfig;
use crate::dealing::{deal_hole_cards, reveal_phase};
use crate::deck::DeckProvider;
use crate::evaluator::{HandEvaluation, HandEvaluator};
use crate::gateway::SessionGateway;
use crate::player::Player;
use crate::scheduler::{TurnExpiry, TurnScheduler};
use headsup_protocol::{
    ActionAppliedUpdate, Card, Chips, ClientMessage, GameError, GameResult, HandEndedUpdate,
    HandStartedUpdate, MatchEndedUpdate, NoticeUpdate, Phase, PlayerAction, ProtocolError,
    RejectedUpdate, RevealedHand, SeatedUpdate, ServerMessage, ShowdownUpdate, TableView,
};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::time::Instant;

/// Seat holding the button on the first hand, so the first seated player
/// opens the betting.
const FIRST_DEALER: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Waiting,
    InHand,
    HandComplete,
    MatchOver,
    Halted,
}

fn pair(players: &mut [Player]) -> GameResult<&mut [Player; 2]> {
    let seated = players.len();
    players
        .try_into()
        .map_err(|_| GameError::InsufficientPlayers(seated))
}

fn pair_ref(players: &[Player]) -> GameResult<&[Player; 2]> {
    let seated = players.len();
    players
        .try_into()
        .map_err(|_| GameError::InsufficientPlayers(seated))
}

/// Splits a tied pot; the odd chip goes to `odd_chip_seat`.
pub fn split_pot(pot: Chips, odd_chip_seat: usize) -> [Chips; 2] {
    let half = pot / 2;
    let mut shares = [half, half];
    shares[odd_chip_seat] += pot % 2;
    shares
}

/// Authoritative state of one heads-up table.
///
/// Every mutation goes through `&mut self`, and the table task is the only
/// owner, so inputs are applied strictly one at a time.
pub struct HeadsUpGame {
    config: TableConfig,
    players: Vec<Player>,
    board: Vec<Card>,
    betting: BettingRound,
    phase: Phase,
    phase_history: Vec<Phase>,
    dealer: usize,
    current_player: usize,
    turn_generation: u64,
    hand_number: u32,
    chips_in_play: u64,
    status: GameStatus,
    deck: Box<dyn DeckProvider>,
    evaluator: Box<dyn HandEvaluator>,
    gateway: Arc<dyn SessionGateway>,
    scheduler: TurnScheduler,
}

impl HeadsUpGame {
    /// Creates an empty table. Hands start once two sessions are seated.
    pub fn new(
        config: TableConfig,
        deck: Box<dyn DeckProvider>,
        evaluator: Box<dyn HandEvaluator>,
        gateway: Arc<dyn SessionGateway>,
    ) -> Self {
        Self {
            config,
            players: Vec::with_capacity(2),
            board: Vec::with_capacity(5),
            betting: BettingRound::new(config.min_bet),
            phase: Phase::Preflop,
            phase_history: Vec::new(),
            dealer: FIRST_DEALER,
            current_player: 0,
            turn_generation: 0,
            hand_number: 0,
            chips_in_play: 0,
            status: GameStatus::Waiting,
            deck,
            evaluator,
            gateway,
            scheduler: TurnScheduler::new(),
        }
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Phases this hand has visited, in order.
    pub fn phase_history(&self) -> &[Phase] {
        &self.phase_history
    }

    pub fn board(&self) -> &[Card] {
        &self.board
    }

    pub fn pot(&self) -> Chips {
        self.betting.pot
    }

    pub fn turn_generation(&self) -> u64 {
        self.turn_generation
    }

    pub fn dealer(&self) -> usize {
        self.dealer
    }

    pub fn hand_number(&self) -> u32 {
        self.hand_number
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn is_full(&self) -> bool {
        self.players.len() == 2
    }

    pub fn seat_of(&self, session_id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.session_id == session_id)
    }

    /// Session whose decision the table is waiting on.
    pub fn current_player(&self) -> Option<&str> {
        (self.status == GameStatus::InHand && self.scheduler.deadline().is_some())
            .then(|| self.players[self.current_player].session_id.as_str())
    }

    #[cfg(test)]
    pub fn player_mut(&mut self, seat: usize) -> &mut Player {
        &mut self.players[seat]
    }

    /// Instant the armed turn runs out, if one is armed.
    pub fn turn_deadline(&self) -> Option<Instant> {
        self.scheduler.deadline()
    }

    pub fn seat(&mut self, session_id: &str) -> Result<usize, ProtocolError> {
        if let Some(seat) = self.seat_of(session_id) {
            return Ok(seat);
        }
        if self.players.len() >= 2 {
            return Err(ProtocolError::TableFull);
        }
        self.players.push(Player::new(
            session_id.to_string(),
            self.config.starting_chips,
            self.config.time_bank_ms,
        ));
        let seat = self.players.len() - 1;
        info!("Session {} took seat {}", session_id, seat);
        self.gateway.send_to_player(
            session_id,
            ServerMessage::Seated(SeatedUpdate {
                session_id: session_id.to_string(),
                seat,
            }),
        );
        Ok(seat)
    }

    /// Shuffles, deals hole cards and puts the first actor on the clock.
    /// A player without chips ends the match instead.
    pub fn start_hand(&mut self) -> GameResult<()> {
        let players = pair(&mut self.players)?;
        if let Some(busted) = players.iter().position(|p| p.chips == 0) {
            self.end_match(Some(opponent(busted)), "player busted");
            return Ok(());
        }

        self.hand_number += 1;
        for player in players.iter_mut() {
            player.reset_hand();
        }
        self.board.clear();
        self.betting = BettingRound::new(self.config.min_bet);
        self.phase = Phase::Preflop;
        self.phase_history = vec![Phase::Preflop];

        self.deck.shuffle();
        deal_hole_cards(self.deck.as_mut(), players, self.dealer)?;

        self.chips_in_play = players.iter().map(|p| u64::from(p.chips)).sum();
        let dealer_id = players[self.dealer].session_id.clone();
        self.status = GameStatus::InHand;

        info!(
            "Hand {} started, dealer {}, {} chips in play",
            self.hand_number, dealer_id, self.chips_in_play
        );
        self.gateway
            .broadcast(ServerMessage::HandStarted(HandStartedUpdate {
                hand_number: self.hand_number,
                dealer: dealer_id,
            }));

        self.begin_turn(opponent(self.dealer));
        Ok(())
    }

    fn begin_turn(&mut self, seat: usize) {
        self.current_player = seat;
        let player = &self.players[seat];
        let deadline = self.config.turn_deadline(player.time_bank_ms);
        self.scheduler
            .start_turn(&player.session_id, self.turn_generation, deadline);
        debug!(
            "Turn {} to {} with {}ms on the clock",
            self.turn_generation,
            player.session_id,
            deadline.as_millis()
        );
        self.sync_views();
    }

    /// Entry point for a decoded client message.
    pub fn on_player_message(&mut self, session_id: &str, message: &ClientMessage) -> GameResult<()> {
        let seat = self
            .seat_of(session_id)
            .ok_or_else(|| ProtocolError::UnknownSession(session_id.to_string()))?;
        if self.status != GameStatus::InHand {
            return Err(ProtocolError::NoHandInProgress.into());
        }
        if seat != self.current_player {
            return Err(ProtocolError::NotYourTurn.into());
        }
        if message.turn_generation != self.turn_generation {
            return Err(ProtocolError::StaleGeneration {
                expected: self.turn_generation,
                received: message.turn_generation,
            }
            .into());
        }
        let action = message.to_action()?;
        self.act(seat, action, false)
    }

    /// Applies the default action for an expired turn. Expiries for a turn
    /// that has already been resolved are ignored.
    pub fn on_turn_expired(&mut self, expiry: TurnExpiry) -> GameResult<bool> {
        if self.status != GameStatus::InHand || expiry.generation != self.turn_generation {
            debug!(
                "Ignoring expiry for turn {} (current {})",
                expiry.generation, self.turn_generation
            );
            return Ok(false);
        }
        let seat = match self.seat_of(&expiry.session_id) {
            Some(seat) if seat == self.current_player => seat,
            _ => return Ok(false),
        };

        let players = pair_ref(&self.players)?;
        let action = if to_call(players, seat) > 0 {
            PlayerAction::Fold
        } else {
            PlayerAction::Check
        };
        let elapsed_ms = u64::try_from(expiry.elapsed.as_millis()).unwrap_or(u64::MAX);
        let charged = self.players[seat].charge_time(elapsed_ms);
        info!(
            "{} timed out after {}ms, applying {} ({}ms left in bank)",
            expiry.session_id, elapsed_ms, action, self.players[seat].time_bank_ms
        );
        debug!("Charged {}ms to {}", charged, expiry.session_id);

        self.act(seat, action, true)?;
        Ok(true)
    }

    /// Fires the armed deadline if it has passed at `now`.
    pub fn fire_turn(&mut self, now: Instant) -> GameResult<bool> {
        match self.scheduler.fire(now) {
            Some(expiry) => self.on_turn_expired(expiry),
            None => Ok(false),
        }
    }

    fn act(&mut self, seat: usize, action: PlayerAction, timed_out: bool) -> GameResult<()> {
        let players = pair(&mut self.players)?;
        let outcome = match self.betting.apply(players, seat, action) {
            Ok(outcome) => outcome,
            Err(illegal) => {
                debug!(
                    "Illegal {} from {}: {}",
                    action, self.players[seat].session_id, illegal
                );
                self.send_view(seat);
                return Err(illegal.into());
            }
        };

        self.scheduler.cancel_turn();
        self.turn_generation += 1;

        let session_id = self.players[seat].session_id.clone();
        info!(
            "Hand {}: {} {}{}, {} in, pot {}",
            self.hand_number,
            session_id,
            action,
            if timed_out { " (timed out)" } else { "" },
            outcome.moved,
            self.betting.pot
        );
        self.gateway
            .broadcast(ServerMessage::ActionApplied(ActionAppliedUpdate {
                session_id,
                action,
                pot: self.betting.pot,
                timed_out,
            }));
        self.verify_conservation()?;

        if outcome.hand_over {
            return self.finish_by_fold(seat);
        }
        if outcome.round_closed {
            return self.advance_phase();
        }
        self.begin_turn(opponent(seat));
        Ok(())
    }

    /// Moves to the next phase after a closed betting round. With a player
    /// all-in nobody can bet, so the remaining streets are revealed in turn
    /// until showdown.
    pub fn advance_phase(&mut self) -> GameResult<()> {
        loop {
            let next = self
                .phase
                .next()
                .ok_or(GameError::InvalidPhaseTransition { from: self.phase })?;
            if self.status != GameStatus::InHand {
                return Err(ProtocolError::NoHandInProgress.into());
            }

            let players = pair(&mut self.players)?;
            if let Some((seat, excess)) = self.betting.return_uncalled(players) {
                debug!(
                    "Returned {} uncalled chips to {}",
                    excess, players[seat].session_id
                );
            }
            let running_out = players.iter().any(|p| p.all_in);

            reveal_phase(self.deck.as_mut(), &mut self.board, next)?;
            self.betting.start_round(players);
            self.phase = next;
            self.phase_history.push(next);
            self.verify_conservation()?;

            if next == Phase::Showdown {
                return self.resolve_showdown();
            }

            info!(
                "Hand {}: {} [{}]",
                self.hand_number,
                next,
                self.board
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            );

            if running_out {
                self.sync_views();
                continue;
            }
            self.begin_turn(self.dealer);
            return Ok(());
        }
    }

    /// Evaluates both hands and pays the pot to the best one, splitting it
    /// on a tie.
    pub fn resolve_showdown(&mut self) -> GameResult<()> {
        if self.phase != Phase::Showdown || self.status != GameStatus::InHand {
            return Err(GameError::InvalidPhaseTransition { from: self.phase });
        }

        let players = pair_ref(&self.players)?;
        let evaluations: Vec<(usize, HandEvaluation)> = players
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.folded)
            .map(|(seat, p)| {
                let mut cards = p.hole_cards.clone();
                cards.extend_from_slice(&self.board);
                (seat, self.evaluator.evaluate(&cards))
            })
            .collect();

        let best = evaluations.iter().map(|(_, eval)| eval).max().cloned();
        let winners: Vec<usize> = evaluations
            .iter()
            .filter(|(_, eval)| Some(eval) == best.as_ref())
            .map(|(seat, _)| *seat)
            .collect();

        let pot = self.betting.pot;
        let shares = match winners.as_slice() {
            [only] => {
                let mut shares = [0, 0];
                shares[*only] = pot;
                shares
            }
            _ => split_pot(pot, opponent(self.dealer)),
        };

        let hands: Vec<RevealedHand> = evaluations
            .iter()
            .map(|(seat, eval)| RevealedHand {
                session_id: players[*seat].session_id.clone(),
                hole_cards: players[*seat].hole_cards.clone(),
                rank: eval.rank,
                description: eval.description.clone(),
            })
            .collect();
        let winner_ids: Vec<String> = winners
            .iter()
            .map(|seat| players[*seat].session_id.clone())
            .collect();

        let players = pair(&mut self.players)?;
        let mut payouts = Vec::with_capacity(2);
        for (seat, share) in shares.into_iter().enumerate() {
            if share > 0 {
                let paid = self.betting.pay(&mut players[seat], share);
                payouts.push((players[seat].session_id.clone(), paid));
            }
        }
        self.verify_conservation()?;

        info!(
            "Hand {} showdown: {} wins {} ({})",
            self.hand_number,
            winner_ids.join(" and "),
            pot,
            hands
                .iter()
                .map(|h| format!("{}: {}", h.session_id, h.description))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.gateway.broadcast(ServerMessage::Showdown(ShowdownUpdate {
            board: self.board.clone(),
            hands,
            winners: winner_ids,
            payouts,
        }));

        let winner = match winners.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        self.finish_hand(winner, pot);
        Ok(())
    }

    fn finish_by_fold(&mut self, folder: usize) -> GameResult<()> {
        let winner = opponent(folder);
        let players = pair(&mut self.players)?;
        let pot = self.betting.pot;
        self.betting.pay(&mut players[winner], pot);
        self.verify_conservation()?;
        info!(
            "Hand {}: {} folds, {} takes {}",
            self.hand_number, self.players[folder].session_id, self.players[winner].session_id, pot
        );
        self.finish_hand(Some(winner), pot);
        Ok(())
    }

    fn finish_hand(&mut self, winner: Option<usize>, pot: Chips) {
        self.status = GameStatus::HandComplete;
        self.scheduler.cancel_turn();
        debug!(
            "Hand {} visited {:?}",
            self.hand_number, self.phase_history
        );
        self.gateway.broadcast(ServerMessage::HandEnded(HandEndedUpdate {
            hand_number: self.hand_number,
            winner: winner.map(|seat| self.players[seat].session_id.clone()),
            pot,
        }));
        self.sync_views();
    }

    /// Clears the finished hand, moves the button and deals again.
    pub fn reset_for_next_hand(&mut self) -> GameResult<()> {
        if self.betting.pot != 0 {
            return Err(self.conservation_error());
        }
        let players = pair(&mut self.players)?;
        for player in players.iter_mut() {
            player.reset_hand();
        }
        self.board.clear();
        self.phase = Phase::Preflop;
        self.phase_history.clear();
        self.dealer = opponent(self.dealer);
        self.start_hand()
    }

    /// Returns every chip committed to the current hand and closes it.
    pub fn abort_hand(&mut self, reason: &str) {
        if self.status == GameStatus::InHand {
            self.refund_hand();
        }
        self.scheduler.cancel_turn();
        self.turn_generation += 1;
        self.board.clear();
        for player in self.players.iter_mut() {
            player.reset_hand();
        }
        self.betting = BettingRound::new(self.config.min_bet);
        self.status = GameStatus::HandComplete;
        warn!("Hand {} aborted: {}", self.hand_number, reason);
        self.gateway
            .broadcast(ServerMessage::HandAborted(NoticeUpdate {
                reason: reason.to_string(),
            }));
    }

    fn refund_hand(&mut self) {
        for player in self.players.iter_mut() {
            player.chips += player.committed;
            player.committed = 0;
            player.current_bet = 0;
            player.all_in = false;
        }
        self.betting.pot = 0;
    }

    pub fn end_match(&mut self, winner: Option<usize>, reason: &str) {
        if self.status == GameStatus::InHand {
            self.refund_hand();
        }
        self.status = GameStatus::MatchOver;
        self.scheduler.cancel_turn();
        let winner = winner
            .and_then(|seat| self.players.get(seat))
            .map(|p| p.session_id.clone());
        info!("Match over ({}), winner: {:?}", reason, winner);
        self.gateway
            .broadcast(ServerMessage::MatchEnded(MatchEndedUpdate {
                winner,
                reason: reason.to_string(),
            }));
    }

    /// Stops the table for good after an unrecoverable error.
    pub fn halt(&mut self, reason: &str) {
        self.status = GameStatus::Halted;
        self.scheduler.cancel_turn();
        error!("Table halted: {}", reason);
        self.gateway
            .broadcast(ServerMessage::TableHalted(NoticeUpdate {
                reason: reason.to_string(),
            }));
    }

    /// Tells one session its input was not applied.
    pub fn reject(&self, session_id: &str, reason: &str) {
        self.gateway.send_to_player(
            session_id,
            ServerMessage::Rejected(RejectedUpdate {
                reason: reason.to_string(),
                turn_generation: self.turn_generation,
            }),
        );
    }

    fn chips_on_table(&self) -> u64 {
        self.players.iter().map(|p| u64::from(p.chips)).sum::<u64>() + u64::from(self.betting.pot)
    }

    fn conservation_error(&self) -> GameError {
        GameError::ChipConservation {
            expected: self.chips_in_play,
            actual: self.chips_on_table(),
        }
    }

    fn verify_conservation(&self) -> GameResult<()> {
        if self.chips_on_table() != self.chips_in_play {
            return Err(self.conservation_error());
        }
        Ok(())
    }

    /// Builds what `seat` is allowed to see.
    pub fn view_for(&self, seat: usize) -> Option<TableView> {
        let players = pair_ref(&self.players).ok()?;
        let opp = opponent(seat);
        let on_clock = self.status == GameStatus::InHand && self.scheduler.deadline().is_some();
        let my_turn = on_clock && self.current_player == seat;

        let opponent_time_left_ms = if on_clock && self.current_player == opp {
            self.scheduler
                .remaining()
                .and_then(|d| u64::try_from(d.as_millis()).ok())
                .unwrap_or(players[opp].time_bank_ms)
        } else {
            players[opp].time_bank_ms
        };

        Some(TableView {
            phase: self.phase,
            board: self.board.clone(),
            pot: self.betting.pot,
            current_player: on_clock.then(|| players[self.current_player].session_id.clone()),
            your_hole_cards: (!players[seat].hole_cards.is_empty())
                .then(|| players[seat].hole_cards.clone()),
            available_actions: if my_turn {
                self.betting.legal_actions(players, seat)
            } else {
                Vec::new()
            },
            bet_range: if my_turn {
                self.betting.bet_range(players, seat)
            } else {
                (0, 0)
            },
            opponent_time_left_ms,
            turn_generation: self.turn_generation,
            your_chips: players[seat].chips,
            opponent_chips: players[opp].chips,
        })
    }

    fn send_view(&self, seat: usize) {
        if let Some(view) = self.view_for(seat) {
            self.gateway.send_to_player(
                &self.players[seat].session_id,
                ServerMessage::TableView(view),
            );
        }
    }

    fn sync_views(&self) {
        for seat in 0..self.players.len().min(2) {
            self.send_view(seat);
        }
    }
}
