// Elo rating calculation.
//
// Fixed K-factor, float ratings. Used directly for 1v1 results and, via the
// emulated pair decomposition in `ffa`, for free-for-all games.

use serde::{Deserialize, Serialize};

pub const STARTING_RATING: f64 = 1200.0;
pub const K_FACTOR: f64 = 32.0;

/// Match outcome from the perspective of one player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Loss => 0.0,
        }
    }
}

/// Expected score for player A against player B.
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((rating_b - rating_a) / 400.0))
}

/// Rating after a game, given the pre-game expectation and the actual score.
pub fn updated_rating(old_rating: f64, expected: f64, actual_score: f64) -> f64 {
    old_rating + K_FACTOR * (actual_score - expected)
}

/// Before/after ratings of one decisive pairwise result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub winner_before: f64,
    pub winner_after: f64,
    pub loser_before: f64,
    pub loser_after: f64,
}

impl RatingChange {
    /// Whether the winner was at least as highly rated as the loser going in.
    pub fn expected(&self) -> bool {
        self.winner_before >= self.loser_before
    }
}

/// Apply one decisive result. Both expectations are taken from the pre-game
/// ratings, so the update is zero-sum.
pub fn decisive_result(winner_rating: f64, loser_rating: f64) -> RatingChange {
    let expected_w = expected_score(winner_rating, loser_rating);
    let expected_l = expected_score(loser_rating, winner_rating);
    RatingChange {
        winner_before: winner_rating,
        winner_after: updated_rating(winner_rating, expected_w, Outcome::Win.score()),
        loser_before: loser_rating,
        loser_after: updated_rating(loser_rating, expected_l, Outcome::Loss.score()),
    }
}
