// Match recording: validates submissions, computes the rating updates and
// persists results together with the affected player stats.
//
// The rating math lives in small pure functions (`apply_decisive`,
// `apply_ffa_skill`, `plan_ffa`) shared with the history replayer, so a
// replayed tournament goes through exactly the same updates as live traffic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{FfaMatchRecord, MatchRecord, NewFfaMatch, NewMatch, Player, PlayerStats, Tournament};
use crate::elo::{self, RatingChange};
use crate::error::{EngineError, StoreError};
use crate::ffa::{self, EloTrace};
use crate::latest::LatestMatch;
use crate::metrics;
use crate::saga::Saga;
use crate::skill::{SkillModel, SkillParams, SkillUpdate};
use crate::store::{run_with_retry, FfaCommit, RatingStore, DEFAULT_TX_ATTEMPTS};

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 20;

/// A reported 1v1 result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSubmission {
    pub tournament: String,
    pub winner: String,
    pub loser: String,
    pub note: String,
    pub submitter: String,
    pub played_at: DateTime<Utc>,
}

/// A reported FFA result. `ranking` is best first; `draws[i]` marks a tie
/// between `ranking[i]` and `ranking[i + 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfaSubmission {
    pub tournament: String,
    pub ranking: Vec<String>,
    pub draws: Vec<bool>,
    pub note: String,
    pub submitter: String,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub record: MatchRecord,
    pub winner: PlayerStats,
    pub loser: PlayerStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct FfaOutcome {
    pub record: FfaMatchRecord,
    /// Emulated 1v1 records in processing order.
    pub emulated: Vec<MatchRecord>,
    /// Updated stats in ranking order.
    pub stats: Vec<PlayerStats>,
}

/// Apply one decisive result to both players' stats.
pub fn apply_decisive(winner: &mut PlayerStats, loser: &mut PlayerStats) -> RatingChange {
    let change = elo::decisive_result(winner.rating, loser.rating);
    winner.rating = change.winner_after;
    winner.wins += 1;
    loser.rating = change.loser_after;
    loser.losses += 1;
    change
}

/// Apply the skill side of an FFA game to `stats` (ranking order): posterior
/// beliefs for everyone and an FFA win for every player tied for first.
pub fn apply_ffa_skill(
    model: &SkillModel,
    stats: &mut [PlayerStats],
    draws: &[bool],
) -> Result<(Vec<SkillParams>, SkillUpdate), EngineError> {
    let priors: Vec<SkillParams> = stats.iter().map(PlayerStats::skill).collect();
    let update = model.rate(&priors, draws)?;

    for (s, posterior) in stats.iter_mut().zip(&update.posteriors) {
        s.set_skill(*posterior);
    }
    for s in stats.iter_mut().take(ffa::tied_for_first(draws)) {
        s.ffa_wins += 1;
    }
    Ok((priors, update))
}

/// Everything an FFA game changes, computed without touching storage.
#[derive(Debug, Clone)]
pub struct FfaPlan {
    pub pre_skill: Vec<SkillParams>,
    pub update: SkillUpdate,
    pub trace: EloTrace,
    /// New stats in ranking order.
    pub next: Vec<PlayerStats>,
}

pub fn plan_ffa(
    model: &SkillModel,
    current: &[PlayerStats],
    draws: &[bool],
) -> Result<FfaPlan, EngineError> {
    let mut next = current.to_vec();
    let (pre_skill, update) = apply_ffa_skill(model, &mut next, draws)?;

    let ratings: Vec<f64> = current.iter().map(|s| s.rating).collect();
    let trace = ffa::elo_trace(&ratings);
    for game in &trace.games {
        next[game.pair.winner].wins += 1;
        next[game.pair.loser].losses += 1;
    }
    for (s, rating) in next.iter_mut().zip(&trace.ratings) {
        s.rating = *rating;
    }

    Ok(FfaPlan {
        pre_skill,
        update,
        trace,
        next,
    })
}

/// Player names are 3 to 20 ASCII letters, digits or underscores.
pub fn validate_player_name(name: &str) -> Result<(), EngineError> {
    let valid_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_chars || name.len() < NAME_MIN_LEN || name.len() > NAME_MAX_LEN {
        return Err(EngineError::Validation(format!(
            "player name must be {NAME_MIN_LEN}-{NAME_MAX_LEN} letters, digits or underscores, got {name:?}"
        )));
    }
    Ok(())
}

pub struct MatchRecorder<S: ?Sized> {
    store: Arc<S>,
    latest: LatestMatch,
    skill: SkillModel,
    retry_attempts: u32,
}

impl<S: ?Sized> Clone for MatchRecorder<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            latest: self.latest.clone(),
            skill: self.skill.clone(),
            retry_attempts: self.retry_attempts,
        }
    }
}

impl<S: RatingStore + ?Sized> MatchRecorder<S> {
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

    pub fn latest(&self) -> &LatestMatch {
        &self.latest
    }

    // ── Registration ─────────────────────────────────────────────────

    pub async fn register_player(&self, name: &str) -> Result<Player, EngineError> {
        validate_player_name(name)?;
        if self.store.find_player(name).await?.is_some() {
            return Err(EngineError::Validation(format!("player {name} already exists")));
        }
        let player = self
            .store
            .create_player(name)
            .await
            .map_err(|e| already_exists(e, format!("player {name}")))?;
        tracing::info!(player = %player.name, "player registered");
        Ok(player)
    }

    pub async fn create_tournament(&self, name: &str) -> Result<Tournament, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("tournament name must not be empty".to_string()));
        }
        if self.store.find_tournament(name).await?.is_some() {
            return Err(EngineError::Validation(format!("tournament {name} already exists")));
        }
        let tournament = self
            .store
            .create_tournament(name)
            .await
            .map_err(|e| already_exists(e, format!("tournament {name}")))?;
        tracing::info!(tournament = %tournament.name, "tournament created");
        Ok(tournament)
    }

    /// Find a tournament by name, creating it if it does not exist yet.
    pub async fn ensure_tournament(&self, name: &str) -> Result<Tournament, EngineError> {
        match self.store.find_tournament(name).await? {
            Some(t) => Ok(t),
            None => self.create_tournament(name).await,
        }
    }

    /// Register a player in a tournament with default stats. Joining twice
    /// returns the existing stats.
    pub async fn join_tournament(&self, tournament: &str, name: &str) -> Result<PlayerStats, EngineError> {
        let t = self.tournament(tournament).await?;
        let player = self
            .store
            .find_player(name)
            .await?
            .ok_or_else(|| EngineError::NoSuchPlayer(name.to_string()))?;
        self.get_or_create_stats(&t, &player).await
    }

    /// Read a player's stats, creating the defaults on first use. Losing a
    /// creation race to a concurrent request adopts the winner's row.
    pub async fn get_or_create_stats(
        &self,
        tournament: &Tournament,
        player: &Player,
    ) -> Result<PlayerStats, EngineError> {
        if let Some(stats) = self.store.find_stats(tournament.id, player.id).await? {
            return Ok(stats);
        }
        if self.store.insert_stats_if_absent(tournament.id, player.id).await? {
            tracing::debug!(tournament = %tournament.name, player = %player.name, "created default stats");
        }
        self.store
            .find_stats(tournament.id, player.id)
            .await?
            .ok_or_else(|| {
                EngineError::Integrity(format!(
                    "stats for {} in {} vanished after creation",
                    player.name, tournament.name
                ))
            })
    }

    // ── 1v1 ──────────────────────────────────────────────────────────

    pub async fn record_match(&self, submission: MatchSubmission) -> Result<MatchOutcome, EngineError> {
        let result = self.record_match_inner(submission).await;
        match &result {
            Ok(outcome) => {
                metrics::MATCHES_RECORDED_TOTAL.with_label_values(&["1v1"]).inc();
                tracing::info!(
                    match_id = outcome.record.id,
                    winner = %outcome.record.winner,
                    loser = %outcome.record.loser,
                    "recorded 1v1 match"
                );
            }
            Err(e) => reject(e),
        }
        result
    }

    async fn record_match_inner(&self, submission: MatchSubmission) -> Result<MatchOutcome, EngineError> {
        if submission.winner == submission.loser {
            return Err(EngineError::SamePlayer);
        }
        let t = self.tournament(&submission.tournament).await?;
        let (t, submission) = (&t, &submission);

        // A stale stats read fails the saga with a conflict after it has
        // undone its own writes, so the whole attempt can start over.
        let (record, winner, loser) = run_with_retry(self.retry_attempts, move || async move {
            let winner = self.registered_stats(t, &submission.winner).await?;
            let loser = self.registered_stats(t, &submission.loser).await?;

            let (mut next_winner, mut next_loser) = (winner.clone(), loser.clone());
            let change = apply_decisive(&mut next_winner, &mut next_loser);

            let new_match = NewMatch {
                tournament_id: t.id,
                winner: submission.winner.clone(),
                loser: submission.loser.clone(),
                submitter: submission.submitter.clone(),
                note: submission.note.clone(),
                change,
                played_at: submission.played_at,
            };

            let mut output = Saga::new()
                .insert_match(new_match)
                .replace_stats(winner, next_winner)
                .replace_stats(loser, next_loser)
                .run(self.store.as_ref())
                .await?;

            let (Some(record), Some(loser), Some(winner)) =
                (output.matches.pop(), output.stats.pop(), output.stats.pop())
            else {
                return Err(EngineError::Integrity(
                    "match saga returned incomplete output".to_string(),
                ));
            };
            Ok::<_, EngineError>((record, winner, loser))
        })
        .await?;

        self.latest.set(record.clone());
        Ok(MatchOutcome { record, winner, loser })
    }

    // ── FFA ──────────────────────────────────────────────────────────

    pub async fn record_ffa(&self, submission: FfaSubmission) -> Result<FfaOutcome, EngineError> {
        let result = self.record_ffa_inner(submission).await;
        match &result {
            Ok(outcome) => {
                metrics::MATCHES_RECORDED_TOTAL.with_label_values(&["ffa"]).inc();
                tracing::info!(
                    ffa_match_id = outcome.record.id,
                    summary = %outcome.record.summary,
                    emulated = outcome.emulated.len(),
                    "recorded FFA match"
                );
            }
            Err(e) => reject(e),
        }
        result
    }

    async fn record_ffa_inner(&self, submission: FfaSubmission) -> Result<FfaOutcome, EngineError> {
        ffa::validate_ranking(&submission.ranking, &submission.draws)?;
        let t = self.tournament(&submission.tournament).await?;

        // Resolve every name before the first stats row is created.
        let mut players = Vec::with_capacity(submission.ranking.len());
        for name in &submission.ranking {
            let player = self
                .store
                .find_player(name)
                .await?
                .ok_or_else(|| EngineError::NoSuchPlayer(name.clone()))?;
            players.push(player);
        }
        for player in &players {
            self.get_or_create_stats(&t, player).await?;
        }

        let emulated_note = format!("FFA game ranking: [{}]", submission.ranking.join(", "));
        let summary = ffa::ranking_summary(&submission.ranking, &submission.draws);

        let store = self.store.as_ref();
        let (model, players, t) = (&self.skill, &players, &t);
        let (submission, emulated_note, summary) = (&submission, &emulated_note, &summary);

        let (record, emulated, stats) = run_with_retry(self.retry_attempts, move || async move {
            let mut current = Vec::with_capacity(players.len());
            for player in players {
                let stats = store.find_stats(t.id, player.id).await?.ok_or_else(|| {
                    EngineError::Integrity(format!("stats for {} disappeared", player.name))
                })?;
                current.push(stats);
            }

            let plan = plan_ffa(model, &current, &submission.draws)?;

            let emulated = plan
                .trace
                .games
                .iter()
                .map(|game| NewMatch {
                    tournament_id: t.id,
                    winner: submission.ranking[game.pair.winner].clone(),
                    loser: submission.ranking[game.pair.loser].clone(),
                    submitter: submission.submitter.clone(),
                    note: emulated_note.clone(),
                    change: game.change,
                    played_at: submission.played_at,
                })
                .collect();

            let commit = FfaCommit {
                record: NewFfaMatch {
                    tournament_id: t.id,
                    players: submission.ranking.clone(),
                    draws: submission.draws.clone(),
                    pre_skill: plan.pre_skill,
                    post_skill: plan.update.posteriors,
                    outcome_probability: plan.update.outcome_probability,
                    summary: summary.clone(),
                    note: submission.note.clone(),
                    submitter: submission.submitter.clone(),
                    played_at: submission.played_at,
                },
                emulated,
                stats: current.into_iter().zip(plan.next).collect(),
            };

            Ok::<_, EngineError>(store.commit_ffa(&commit).await?)
        })
        .await?;

        Ok(FfaOutcome { record, emulated, stats })
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn tournament(&self, name: &str) -> Result<Tournament, EngineError> {
        self.store
            .find_tournament(name)
            .await?
            .ok_or_else(|| EngineError::UnknownTournament(name.to_string()))
    }

    async fn registered_stats(&self, tournament: &Tournament, name: &str) -> Result<PlayerStats, EngineError> {
        self.store
            .find_stats_by_name(tournament.id, name)
            .await?
            .ok_or_else(|| EngineError::UnknownPlayer {
                tournament: tournament.name.clone(),
                name: name.to_string(),
            })
    }
}

/// A concurrent insert of the same name surfaces as a UNIQUE violation
/// after the existence check passed.
fn already_exists(e: StoreError, what: String) -> EngineError {
    if e.is_unique_violation() {
        EngineError::Validation(format!("{what} already exists"))
    } else {
        e.into()
    }
}

fn reject(e: &EngineError) {
    metrics::SUBMISSIONS_REJECTED_TOTAL.with_label_values(&[e.reason()]).inc();
    if e.is_client_error() {
        tracing::info!("rejected submission: {e}");
    } else {
        tracing::error!("failed to record submission: {e}");
    }
}
