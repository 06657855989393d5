use headsup_protocol::{Card, Rank, Suit};
use rand::seq::SliceRandom;
use rand::thread_rng;

/// Source of cards for one hand. `shuffle` is called once at the start of
/// every hand; `draw` never repeats a card between shuffles.
pub trait DeckProvider: Send {
    fn shuffle(&mut self);
    fn draw(&mut self) -> Option<Card>;
}

fn full_deck() -> Vec<Card> {
    Suit::ALL
        .iter()
        .flat_map(|&suit| Rank::ALL.iter().map(move |&rank| Card::new(suit, rank)))
        .collect()
}

/// Standard 52-card deck shuffled with the thread-local RNG.
#[derive(Debug, Default)]
pub struct ShuffledDeck {
    cards: Vec<Card>,
}

impl ShuffledDeck {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }
}

impl DeckProvider for ShuffledDeck {
    fn shuffle(&mut self) {
        self.cards = full_deck();
        let mut rng = thread_rng();
        self.cards.shuffle(&mut rng);
    }

    fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }
}

/// Deals a fixed sequence of hands, front to back, for deterministic tests.
/// Each `shuffle` moves on to the next stacked hand; once they run out it
/// falls back to an unshuffled deck.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct StackedDeck {
    hands: std::collections::VecDeque<Vec<Card>>,
    cards: std::collections::VecDeque<Card>,
}

#[cfg(test)]
impl StackedDeck {
    pub fn new(hands: Vec<Vec<Card>>) -> Self {
        Self {
            hands: hands.into(),
            cards: Default::default(),
        }
    }
}

#[cfg(test)]
impl DeckProvider for StackedDeck {
    fn shuffle(&mut self) {
        let mut cards = self.hands.pop_front().unwrap_or_default();
        for card in full_deck() {
            if !cards.contains(&card) {
                cards.push(card);
            }
        }
        self.cards = cards.into();
    }

    fn draw(&mut self) -> Option<Card> {
        self.cards.pop_front()
    }
}

/// Runs dry after a set number of cards. Each `shuffle` takes the next
/// limit; hands past the last limit get a full deck.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ShortDeck {
    limits: std::collections::VecDeque<usize>,
    cards: Vec<Card>,
}

#[cfg(test)]
impl ShortDeck {
    pub fn new(limits: Vec<usize>) -> Self {
        Self {
            limits: limits.into(),
            cards: Vec::new(),
        }
    }
}

#[cfg(test)]
impl DeckProvider for ShortDeck {
    fn shuffle(&mut self) {
        let mut cards = full_deck();
        if let Some(limit) = self.limits.pop_front() {
            cards.truncate(limit);
        }
        cards.reverse();
        self.cards = cards;
    }

    fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }
}
