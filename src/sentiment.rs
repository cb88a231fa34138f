//! Maps an operator's raw effect to a report sentiment marker.

use crate::polarity::{Polarity, RankingSentimentPolicy};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn marker(&self) -> &'static str {
        match self {
            Sentiment::Positive => "🔴",
            Sentiment::Negative => "🟢",
            Sentiment::Neutral => "➖",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Polarity-aware reading of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Improving,
    Worsening,
}

impl Direction {
    /// Reading of a raw rise (`rising = true`) or fall for an indicator.
    pub fn of_movement(rising: bool, polarity: Polarity) -> Self {
        match (rising, polarity) {
            (true, Polarity::HigherIsBetter) | (false, Polarity::LowerIsBetter) => Direction::Improving,
            _ => Direction::Worsening,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Improving => "向好",
            Direction::Worsening => "转差",
        }
    }
}

/// What an operator observed, per operator family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    CurrentValue,
    /// `None` for flat or irregular sequences.
    Trend(Option<Direction>),
    /// Signed change against the prior period.
    Delta(f64),
    Rank { rank: usize, total: usize },
}

pub fn classify(signal: Signal, polarity: Polarity, policy: RankingSentimentPolicy) -> Sentiment {
    match signal {
        Signal::CurrentValue => Sentiment::Neutral,
        Signal::Trend(Some(Direction::Improving)) => Sentiment::Positive,
        Signal::Trend(Some(Direction::Worsening)) => Sentiment::Negative,
        Signal::Trend(None) => Sentiment::Neutral,
        Signal::Delta(delta) => {
            if delta == 0.0 || delta.is_nan() {
                Sentiment::Neutral
            } else if Direction::of_movement(delta > 0.0, polarity) == Direction::Improving {
                Sentiment::Positive
            } else {
                Sentiment::Negative
            }
        }
        Signal::Rank { rank, total } => {
            if total == 0 {
                return Sentiment::Neutral;
            }
            let pct = rank as f64 / total as f64;
            if pct < 1.0 / 3.0 {
                Sentiment::Positive
            } else if pct > 2.0 / 3.0 {
                match policy {
                    RankingSentimentPolicy::Legacy => Sentiment::Positive,
                    RankingSentimentPolicy::Symmetric => Sentiment::Negative,
                }
            } else {
                Sentiment::Neutral
            }
        }
    }
}
