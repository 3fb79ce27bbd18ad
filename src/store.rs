// Persistence seam for the rating engine.
//
// The engine only talks to storage through `RatingStore`. `Database` is the
// production implementation; tests wrap it to inject failures.

use std::future::Future;

use async_trait::async_trait;

use crate::db::{
    FfaMatchRecord, MatchRecord, NewFfaMatch, NewMatch, Player, PlayerStats, Tournament,
};
use crate::error::{EngineError, StoreError};

/// Default number of attempts for a contended transaction.
pub const DEFAULT_TX_ATTEMPTS: u32 = 3;

/// Filter and order for match log queries.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchQuery {
    pub tournament_id: i64,
    /// Only matches this player won or lost.
    pub player: Option<String>,
    pub limit: Option<i64>,
    pub newest_first: bool,
}

impl MatchQuery {
    /// The whole log of a tournament in commit order. Ids are never reused,
    /// so this is the order in which ratings were built on each other.
    pub fn chronological(tournament_id: i64) -> Self {
        Self {
            tournament_id,
            player: None,
            limit: None,
            newest_first: false,
        }
    }

    /// The `limit` most recent matches, newest first.
    pub fn recent(tournament_id: i64, limit: i64) -> Self {
        Self {
            tournament_id,
            player: None,
            limit: Some(limit),
            newest_first: true,
        }
    }
}

/// Everything one FFA submission writes. `stats` pairs the snapshot each
/// update was computed from with the new values.
#[derive(Debug, Clone, PartialEq)]
pub struct FfaCommit {
    pub record: NewFfaMatch,
    pub emulated: Vec<NewMatch>,
    pub stats: Vec<(PlayerStats, PlayerStats)>,
}

/// Recomputed state of a whole tournament.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayCommit {
    pub stats: Vec<(PlayerStats, PlayerStats)>,
    pub matches: Vec<MatchRecord>,
    pub ffa_matches: Vec<FfaMatchRecord>,
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn create_player(&self, name: &str) -> Result<Player, StoreError>;
    async fn find_player(&self, name: &str) -> Result<Option<Player>, StoreError>;

    async fn create_tournament(&self, name: &str) -> Result<Tournament, StoreError>;
    async fn find_tournament(&self, name: &str) -> Result<Option<Tournament>, StoreError>;
    async fn get_tournament(&self, id: i64) -> Result<Option<Tournament>, StoreError>;
    async fn list_tournaments(&self) -> Result<Vec<Tournament>, StoreError>;

    async fn find_stats(
        &self,
        tournament_id: i64,
        player_id: i64,
    ) -> Result<Option<PlayerStats>, StoreError>;
    async fn find_stats_by_name(
        &self,
        tournament_id: i64,
        name: &str,
    ) -> Result<Option<PlayerStats>, StoreError>;
    /// Create default stats unless they already exist. Returns whether a
    /// row was created; losing a creation race is not an error.
    async fn insert_stats_if_absent(
        &self,
        tournament_id: i64,
        player_id: i64,
    ) -> Result<bool, StoreError>;
    /// All stats of a tournament, highest rating first.
    async fn list_stats(&self, tournament_id: i64) -> Result<Vec<PlayerStats>, StoreError>;
    /// Overwrite `current` with the values of `next`. Fails with
    /// `StoreError::Conflict` if the row changed since `current` was read.
    async fn replace_stats(
        &self,
        current: &PlayerStats,
        next: &PlayerStats,
    ) -> Result<PlayerStats, StoreError>;

    async fn insert_match(&self, m: &NewMatch) -> Result<MatchRecord, StoreError>;
    async fn get_match(&self, id: i64) -> Result<Option<MatchRecord>, StoreError>;
    async fn swap_match_players(&self, id: i64) -> Result<bool, StoreError>;
    async fn delete_match(&self, id: i64) -> Result<bool, StoreError>;
    async fn list_matches(&self, query: &MatchQuery) -> Result<Vec<MatchRecord>, StoreError>;

    /// FFA games of a tournament, oldest first.
    async fn list_ffa_matches(&self, tournament_id: i64) -> Result<Vec<FfaMatchRecord>, StoreError>;
    /// Write an FFA game, its emulated 1v1 records and all participant stats
    /// in one transaction.
    async fn commit_ffa(
        &self,
        commit: &FfaCommit,
    ) -> Result<(FfaMatchRecord, Vec<MatchRecord>, Vec<PlayerStats>), StoreError>;
    /// Write a replayed tournament in one transaction.
    async fn commit_replay(&self, replay: &ReplayCommit) -> Result<(), StoreError>;
}

/// Run a read-compute-write operation, retrying while it fails with a
/// retryable store error. Gives up with `RetryExhausted` after `attempts`.
pub async fn run_with_retry<T, F, Fut>(attempts: u32, mut op: F) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(EngineError::Store(e)) if e.is_retryable() => {
                if attempt >= attempts {
                    tracing::warn!(attempts, "giving up on contended transaction: {e}");
                    return Err(StoreError::RetryExhausted { attempts }.into());
                }
                tracing::warn!(attempt, "transaction conflict, retrying: {e}");
            }
            other => return other,
        }
    }
}
