use headsup_protocol::{Card, HandRank, Rank};
use std::cmp::Ordering;

/// Ranks the best five-card hand out of 5 to 7 cards.
pub trait HandEvaluator: Send {
    fn evaluate(&self, cards: &[Card]) -> HandEvaluation;
}

/// A graded hand. Ordering looks at the category, then the tiebreaker ranks
/// in significance order; the description is display only.
#[derive(Debug, Clone)]
pub struct HandEvaluation {
    pub rank: HandRank,
    pub tiebreakers: Vec<u8>,
    pub description: String,
}

impl Ord for HandEvaluation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| self.tiebreakers.cmp(&other.tiebreakers))
    }
}

impl PartialOrd for HandEvaluation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HandEvaluation {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HandEvaluation {}

#[derive(Debug, Default, Clone, Copy)]
pub struct StandardEvaluator;

impl HandEvaluator for StandardEvaluator {
    fn evaluate(&self, cards: &[Card]) -> HandEvaluation {
        if cards.len() <= 5 {
            return grade(cards);
        }
        let mut best: Option<HandEvaluation> = None;
        for combo in five_card_combinations(cards) {
            let eval = grade(&combo);
            if best.as_ref().map_or(true, |b| eval > *b) {
                best = Some(eval);
            }
        }
        best.unwrap_or_else(|| grade(cards))
    }
}

fn five_card_combinations(cards: &[Card]) -> Vec<[Card; 5]> {
    let n = cards.len();
    let mut combos = Vec::new();
    for a in 0..n {
        for b in a + 1..n {
            for c in b + 1..n {
                for d in c + 1..n {
                    for e in d + 1..n {
                        combos.push([cards[a], cards[b], cards[c], cards[d], cards[e]]);
                    }
                }
            }
        }
    }
    combos
}

fn rank_name(value: u8) -> String {
    Rank::from_u8(value)
        .map(|r| r.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// High card of a straight made of these distinct ranks, counting the wheel
/// as five-high.
fn straight_high(ranks_desc: &[u8]) -> Option<u8> {
    if ranks_desc.len() != 5 {
        return None;
    }
    let mut distinct = ranks_desc.to_vec();
    distinct.dedup();
    if distinct.len() != 5 {
        return None;
    }
    if distinct[0] - distinct[4] == 4 {
        return Some(distinct[0]);
    }
    if distinct == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}

/// Grades up to five cards. Straights and flushes need all five.
fn grade(cards: &[Card]) -> HandEvaluation {
    if cards.is_empty() {
        return HandEvaluation {
            rank: HandRank::HighCard,
            tiebreakers: vec![],
            description: "No cards".to_string(),
        };
    }

    let mut ranks: Vec<u8> = cards.iter().map(|c| c.rank.value()).collect();
    ranks.sort_unstable_by(|a, b| b.cmp(a));

    let is_flush = cards.len() == 5 && cards.iter().all(|c| c.suit == cards[0].suit);
    let straight = straight_high(&ranks);

    // (count, rank), biggest groups first, then higher ranks.
    let mut groups: Vec<(usize, u8)> = Vec::new();
    for &r in &ranks {
        match groups.iter_mut().find(|(_, g)| *g == r) {
            Some(group) => group.0 += 1,
            None => groups.push((1, r)),
        }
    }
    groups.sort_unstable_by(|a, b| b.cmp(a));
    let grouped: Vec<u8> = groups.iter().map(|&(_, r)| r).collect();
    let counts: Vec<usize> = groups.iter().map(|&(c, _)| c).collect();

    if let (Some(high), true) = (straight, is_flush) {
        return HandEvaluation {
            rank: HandRank::StraightFlush,
            tiebreakers: vec![high],
            description: if high == 5 {
                "Straight Flush, 5-4-3-2-A (Wheel)".to_string()
            } else {
                format!("Straight Flush, {}", rank_name(high))
            },
        };
    }

    let (rank, description) = match counts.as_slice() {
        [4, ..] => (
            HandRank::FourOfAKind,
            format!("Four of a Kind, {}", rank_name(grouped[0])),
        ),
        [3, 2, ..] => (
            HandRank::FullHouse,
            format!(
                "Full House, {} over {}",
                rank_name(grouped[0]),
                rank_name(grouped[1])
            ),
        ),
        _ if is_flush => (HandRank::Flush, format!("Flush, {}", rank_name(ranks[0]))),
        _ if straight.is_some() => {
            let high = straight.unwrap_or_default();
            let description = if high == 5 {
                "Straight, 5-4-3-2-A (Wheel)".to_string()
            } else {
                format!("Straight, {}", rank_name(high))
            };
            return HandEvaluation {
                rank: HandRank::Straight,
                tiebreakers: vec![high],
                description,
            };
        }
        [3, ..] => (
            HandRank::ThreeOfAKind,
            format!("Three of a Kind, {}", rank_name(grouped[0])),
        ),
        [2, 2, ..] => (
            HandRank::TwoPair,
            format!(
                "Two Pair, {} and {}",
                rank_name(grouped[0]),
                rank_name(grouped[1])
            ),
        ),
        [2, ..] => (HandRank::Pair, format!("Pair of {}", rank_name(grouped[0]))),
        _ => (
            HandRank::HighCard,
            format!("High Card, {}", rank_name(ranks[0])),
        ),
    };

    let tiebreakers = if rank == HandRank::Flush {
        ranks
    } else {
        grouped
    };

    HandEvaluation {
        rank,
        tiebreakers,
        description,
    }
}
