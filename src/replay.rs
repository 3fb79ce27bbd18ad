// History replay: rebuilds every player's stats in a tournament from the
// match log.
//
// Elo state is replayed from the 1v1 log (which includes the emulated pairs
// written for FFA games) and skill state from the FFA log. The two timelines
// are independent. Stored before/after values are recomputed, never trusted.
//
// Replaying must not overlap with new submissions for the same tournament.
// Nothing locks against that; the revision checks on commit only turn an
// overlap into a retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::types::Json;

use crate::db::{FfaMatchRecord, MatchRecord, PlayerStats};
use crate::error::{EngineError, StoreError};
use crate::latest::LatestMatch;
use crate::metrics;
use crate::recorder::{apply_decisive, apply_ffa_skill};
use crate::skill::SkillModel;
use crate::store::{run_with_retry, MatchQuery, RatingStore, ReplayCommit, DEFAULT_TX_ATTEMPTS};

/// Recomputed state of a tournament.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayOutcome {
    /// Final stats, in the order the players were given.
    pub stats: Vec<PlayerStats>,
    pub matches: Vec<MatchRecord>,
    pub ffa_matches: Vec<FfaMatchRecord>,
}

struct Roster {
    stats: Vec<PlayerStats>,
    index: HashMap<String, usize>,
}

impl Roster {
    fn reset(players: &[PlayerStats]) -> Self {
        let stats: Vec<PlayerStats> = players
            .iter()
            .cloned()
            .map(|mut s| {
                s.reset();
                s
            })
            .collect();
        let index = stats
            .iter()
            .enumerate()
            .map(|(i, s)| (s.player_name.clone(), i))
            .collect();
        Self { stats, index }
    }

    fn position(&self, name: &str, context: &str) -> Result<usize, EngineError> {
        self.index.get(name).copied().ok_or_else(|| {
            EngineError::Integrity(format!("{context} references unknown player {name}"))
        })
    }
}

/// Replay a tournament from scratch. `matches` and `ffa_matches` must be in
/// commit order. A record naming a player outside `players` aborts
/// the whole replay.
pub fn replay_history(
    model: &SkillModel,
    players: &[PlayerStats],
    matches: &[MatchRecord],
    ffa_matches: &[FfaMatchRecord],
) -> Result<ReplayOutcome, EngineError> {
    let mut roster = Roster::reset(players);

    let mut rewritten = Vec::with_capacity(matches.len());
    for m in matches {
        let context = format!("match {}", m.id);
        let w = roster.position(&m.winner, &context)?;
        let l = roster.position(&m.loser, &context)?;
        if w == l {
            return Err(EngineError::Integrity(format!("{context} has {} on both sides", m.winner)));
        }

        let (mut winner, mut loser) = (roster.stats[w].clone(), roster.stats[l].clone());
        let change = apply_decisive(&mut winner, &mut loser);
        roster.stats[w] = winner;
        roster.stats[l] = loser;

        let mut m = m.clone();
        m.set_ratings(&change);
        rewritten.push(m);
    }

    let mut rerated = Vec::with_capacity(ffa_matches.len());
    for f in ffa_matches {
        let context = format!("FFA match {}", f.id);
        let positions = f
            .players
            .iter()
            .map(|name| roster.position(name, &context))
            .collect::<Result<Vec<_>, _>>()?;

        let mut group: Vec<PlayerStats> = positions.iter().map(|&i| roster.stats[i].clone()).collect();
        let (pre_skill, update) = apply_ffa_skill(model, &mut group, &f.draws)
            .map_err(|e| EngineError::Integrity(format!("{context} cannot be re-rated: {e}")))?;
        for (i, s) in positions.into_iter().zip(group) {
            roster.stats[i] = s;
        }

        let mut f = f.clone();
        f.pre_skill = Json(pre_skill);
        f.post_skill = Json(update.posteriors);
        f.outcome_probability = update.outcome_probability;
        rerated.push(f);
    }

    Ok(ReplayOutcome {
        stats: roster.stats,
        matches: rewritten,
        ffa_matches: rerated,
    })
}

/// Runs replays against the store and applies admin edits to the match log.
pub struct HistoryReplayer<S: ?Sized> {
    store: Arc<S>,
    latest: LatestMatch,
    skill: SkillModel,
    retry_attempts: u32,
}

impl<S: ?Sized> Clone for HistoryReplayer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            latest: self.latest.clone(),
            skill: self.skill.clone(),
            retry_attempts: self.retry_attempts,
        }
    }
}

impl<S: RatingStore + ?Sized> HistoryReplayer<S> {
    pub fn new(store: Arc<S>, latest: LatestMatch) -> Self {
        Self {
            store,
            latest,
            skill: SkillModel::new(),
            retry_attempts: DEFAULT_TX_ATTEMPTS,
        }
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Recompute and persist all stats of a tournament. Returns the new
    /// standings.
    pub async fn replay(&self, tournament: &str) -> Result<Vec<PlayerStats>, EngineError> {
        let t = self
            .store
            .find_tournament(tournament)
            .await?
            .ok_or_else(|| EngineError::UnknownTournament(tournament.to_string()))?;
        self.replay_tournament(t.id, &t.name).await
    }

    /// Delete a match, then replay its tournament.
    pub async fn delete_match(&self, id: i64) -> Result<Vec<PlayerStats>, EngineError> {
        let m = self.existing_match(id).await?;
        if !self.store.delete_match(id).await? {
            return Err(StoreError::not_found("match", id).into());
        }
        tracing::info!(match_id = id, winner = %m.winner, loser = %m.loser, "deleted match");
        self.replay_for(m.tournament_id).await
    }

    /// Swap winner and loser of a match, then replay its tournament.
    pub async fn swap_match(&self, id: i64) -> Result<Vec<PlayerStats>, EngineError> {
        let m = self.existing_match(id).await?;
        if !self.store.swap_match_players(id).await? {
            return Err(StoreError::not_found("match", id).into());
        }
        tracing::info!(match_id = id, winner = %m.loser, loser = %m.winner, "swapped match result");
        self.replay_for(m.tournament_id).await
    }

    async fn existing_match(&self, id: i64) -> Result<MatchRecord, EngineError> {
        Ok(self
            .store
            .get_match(id)
            .await?
            .ok_or_else(|| StoreError::not_found("match", id))?)
    }

    async fn replay_for(&self, tournament_id: i64) -> Result<Vec<PlayerStats>, EngineError> {
        let t = self.store.get_tournament(tournament_id).await?.ok_or_else(|| {
            EngineError::Integrity(format!("match references missing tournament {tournament_id}"))
        })?;
        self.replay_tournament(t.id, &t.name).await
    }

    async fn replay_tournament(&self, tournament_id: i64, name: &str) -> Result<Vec<PlayerStats>, EngineError> {
        tracing::info!(tournament = %name, "replaying match history");
        let started = Instant::now();

        let store = self.store.as_ref();
        let model = &self.skill;
        let (matches, ffa_games) = run_with_retry(self.retry_attempts, move || async move {
            let players = store.list_stats(tournament_id).await?;
            let matches = store.list_matches(&MatchQuery::chronological(tournament_id)).await?;
            let ffa_matches = store.list_ffa_matches(tournament_id).await?;

            let outcome = replay_history(model, &players, &matches, &ffa_matches)?;
            let counts = (outcome.matches.len(), outcome.ffa_matches.len());
            let commit = ReplayCommit {
                stats: players.into_iter().zip(outcome.stats).collect(),
                matches: outcome.matches,
                ffa_matches: outcome.ffa_matches,
            };
            store.commit_replay(&commit).await?;
            Ok::<_, EngineError>(counts)
        })
        .await?;

        self.latest.clear();
        metrics::REPLAYS_TOTAL.inc();
        metrics::REPLAY_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());
        tracing::info!(
            tournament = %name,
            matches,
            ffa_games,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "replay finished"
        );

        Ok(self.store.list_stats(tournament_id).await?)
    }
}
