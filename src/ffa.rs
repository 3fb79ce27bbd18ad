// Free-for-all support: decomposing a ranking into emulated 1v1 results,
// tie handling and ranking validation.
//
// Each player is paired against the players within two ranks of them, which
// keeps the number of emulated games at O(2N). Elo updates do not commute, so
// the pairs are ordered centre-first: pairs whose midpoint lies closest to the
// middle of the ranking are processed before pairs near the top and bottom.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::elo::{self, RatingChange};
use crate::error::EngineError;

/// Widest rank gap that still produces an emulated game.
pub const MAX_PAIR_RADIUS: usize = 2;

/// Emulated "rank `winner` beats rank `loser`" result. Both fields are
/// indices into the ranking, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatedPair {
    pub winner: usize,
    pub loser: usize,
}

impl EmulatedPair {
    /// Twice the distance between the pair's midpoint and the ranking's
    /// middle. Doubling keeps the value integral.
    fn doubled_center_distance(&self, num_players: usize) -> usize {
        (self.winner + self.loser).abs_diff(num_players - 1)
    }

    fn radius(&self) -> usize {
        self.loser - self.winner
    }
}

/// Generate the ordered emulated 1v1 results for an N-player ranking.
///
/// For 4 players the order is (1,2), (0,2), (1,3), (0,1), (2,3).
pub fn emulated_pairs(num_players: usize) -> Vec<EmulatedPair> {
    let mut pairs = Vec::new();
    for winner in 0..num_players {
        for loser in (winner + 1)..num_players.min(winner + MAX_PAIR_RADIUS + 1) {
            pairs.push(EmulatedPair { winner, loser });
        }
    }

    pairs.sort_by_key(|p| (p.doubled_center_distance(num_players), p.radius(), p.winner));
    pairs
}

/// Same as [`emulated_pairs`] for a player count that has not been checked yet.
pub fn emulated_pairs_for(num_players: i64) -> Result<Vec<EmulatedPair>, EngineError> {
    let n = usize::try_from(num_players).map_err(|_| {
        EngineError::InvalidInput(format!("player count must be non-negative, got {num_players}"))
    })?;
    Ok(emulated_pairs(n))
}

/// One emulated game with the ratings it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatedGame {
    pub pair: EmulatedPair,
    pub change: RatingChange,
}

/// Elo side of an FFA game: the emulated games in processing order and the
/// resulting rating of every ranked player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EloTrace {
    pub games: Vec<EmulatedGame>,
    pub ratings: Vec<f64>,
}

/// Run the emulated games through Elo, threading ratings from one game into
/// the next. `ratings` are the pre-game ratings in ranking order.
pub fn elo_trace(ratings: &[f64]) -> EloTrace {
    emulated_pairs(ratings.len()).into_iter().fold(
        EloTrace {
            games: Vec::new(),
            ratings: ratings.to_vec(),
        },
        |mut trace, pair| {
            let change = elo::decisive_result(trace.ratings[pair.winner], trace.ratings[pair.loser]);
            trace.ratings[pair.winner] = change.winner_after;
            trace.ratings[pair.loser] = change.loser_after;
            trace.games.push(EmulatedGame { pair, change });
            trace
        },
    )
}

/// Number of players sharing first place: the leader plus every player
/// reached by walking forward while the "tied with next" flag is set.
pub fn tied_for_first(draws: &[bool]) -> usize {
    1 + draws.iter().take_while(|tied| **tied).count()
}

/// Competition-style ranks (1-based); tied players share a rank.
pub fn ranks(draws: &[bool]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(draws.len() + 1);
    ranks.push(1);
    for (i, tied) in draws.iter().enumerate() {
        let next = if *tied { ranks[i] } else { i + 2 };
        ranks.push(next);
    }
    ranks
}

/// Human-readable ranking, e.g. `A > B = C > D`.
pub fn ranking_summary(ranking: &[String], draws: &[bool]) -> String {
    let mut summary = String::new();
    for (i, name) in ranking.iter().enumerate() {
        if i > 0 {
            summary.push_str(if draws[i - 1] { " = " } else { " > " });
        }
        summary.push_str(name);
    }
    summary
}

/// Check the shape of a submitted FFA ranking before anything is read or written.
pub fn validate_ranking(ranking: &[String], draws: &[bool]) -> Result<(), EngineError> {
    if ranking.len() < 2 {
        return Err(EngineError::Validation(
            "an FFA game needs at least two players".to_string(),
        ));
    }
    if draws.len() != ranking.len() - 1 {
        return Err(EngineError::Validation(format!(
            "expected {} draw flags for {} players, got {}",
            ranking.len() - 1,
            ranking.len(),
            draws.len()
        )));
    }
    let mut seen = HashSet::new();
    for name in ranking {
        if !seen.insert(name.as_str()) {
            return Err(EngineError::Validation(format!(
                "player {name} appears more than once in the ranking"
            )));
        }
    }
    Ok(())
}
