use crate::deck::DeckProvider;
use crate::player::Player;
use headsup_protocol::{Card, GameError, GameResult, Phase};

const MAX_BOARD: usize = 5;

fn draw(deck: &mut dyn DeckProvider) -> GameResult<Card> {
    deck.draw().ok_or(GameError::DeckExhausted)
}

/// Deals two cards to each player one at a time, starting left of the
/// dealer.
pub fn deal_hole_cards(
    deck: &mut dyn DeckProvider,
    players: &mut [Player; 2],
    dealer: usize,
) -> GameResult<()> {
    for player in players.iter_mut() {
        player.hole_cards.clear();
    }
    for _ in 0..2 {
        for offset in 1..=2 {
            let seat = (dealer + offset) % 2;
            let card = draw(deck)?;
            players[seat].hole_cards.push(card);
        }
    }
    Ok(())
}

/// Appends the community cards that belong to `phase`. The board only ever
/// grows, and only up to the size the phase calls for.
pub fn reveal_phase(
    deck: &mut dyn DeckProvider,
    board: &mut Vec<Card>,
    phase: Phase,
) -> GameResult<usize> {
    let count = phase.cards_revealed();
    if board.len() + count != phase.board_size() || phase.board_size() > MAX_BOARD {
        return Err(GameError::InvalidPhaseTransition { from: phase });
    }
    for _ in 0..count {
        board.push(draw(deck)?);
    }
    Ok(count)
}
