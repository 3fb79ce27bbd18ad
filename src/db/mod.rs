// Database access layer (SQLite via sqlx).

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{Sqlite, Transaction};

use crate::elo::{self, RatingChange};
use crate::error::StoreError;
use crate::skill::SkillParams;
use crate::store::{FfaCommit, MatchQuery, RatingStore, ReplayCommit};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub id: i64,
    pub name: String,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tournament {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Per (tournament, player) rating state. `revision` is bumped on every
/// write and guards read-modify-write cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlayerStats {
    pub id: i64,
    pub tournament_id: i64,
    pub player_id: i64,
    pub player_name: String,
    pub rating: f64,
    pub wins: i64,
    pub losses: i64,
    pub ffa_wins: i64,
    pub mu: f64,
    pub sigma: f64,
    pub skill_rating: f64,
    pub revision: i64,
}

impl PlayerStats {
    pub fn skill(&self) -> SkillParams {
        SkillParams {
            mu: self.mu,
            sigma: self.sigma,
        }
    }

    pub fn set_skill(&mut self, skill: SkillParams) {
        self.mu = skill.mu;
        self.sigma = skill.sigma;
        self.skill_rating = skill.skill_rating();
    }

    /// Back to the values a freshly registered player starts with.
    pub fn reset(&mut self) {
        self.rating = elo::STARTING_RATING;
        self.wins = 0;
        self.losses = 0;
        self.ffa_wins = 0;
        self.set_skill(SkillParams::default());
    }
}

/// A 1v1 result, either submitted directly or emulated from an FFA game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MatchRecord {
    pub id: i64,
    pub tournament_id: i64,
    pub winner: String,
    pub loser: String,
    pub submitter: String,
    pub note: String,
    pub winner_rating_before: f64,
    pub winner_rating_after: f64,
    pub loser_rating_before: f64,
    pub loser_rating_after: f64,
    pub expected: bool,
    pub played_at: DateTime<Utc>,
    pub ffa_match_id: Option<i64>,
}

impl MatchRecord {
    pub fn set_ratings(&mut self, change: &RatingChange) {
        self.winner_rating_before = change.winner_before;
        self.winner_rating_after = change.winner_after;
        self.loser_rating_before = change.loser_before;
        self.loser_rating_after = change.loser_after;
        self.expected = change.expected();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub tournament_id: i64,
    pub winner: String,
    pub loser: String,
    pub submitter: String,
    pub note: String,
    pub change: RatingChange,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FfaMatchRecord {
    pub id: i64,
    pub tournament_id: i64,
    /// Player names, first place first.
    pub players: Json<Vec<String>>,
    /// `draws[i]` is set when `players[i]` tied with `players[i + 1]`.
    pub draws: Json<Vec<bool>>,
    pub pre_skill: Json<Vec<SkillParams>>,
    pub post_skill: Json<Vec<SkillParams>>,
    pub outcome_probability: f64,
    pub summary: String,
    pub note: String,
    pub submitter: String,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFfaMatch {
    pub tournament_id: i64,
    pub players: Vec<String>,
    pub draws: Vec<bool>,
    pub pre_skill: Vec<SkillParams>,
    pub post_skill: Vec<SkillParams>,
    pub outcome_probability: f64,
    pub summary: String,
    pub note: String,
    pub submitter: String,
    pub played_at: DateTime<Utc>,
}

const STATS_COLUMNS: &str = "s.id, s.tournament_id, s.player_id, p.name AS player_name, s.rating, s.wins, s.losses, s.ffa_wins, s.mu, s.sigma, s.skill_rating, s.revision";
const MATCH_COLUMNS: &str = "id, tournament_id, winner, loser, submitter, note, winner_rating_before, winner_rating_after, loser_rating_before, loser_rating_after, expected, played_at, ffa_match_id";
const FFA_COLUMNS: &str = "id, tournament_id, players, draws, pre_skill, post_skill, outcome_probability, summary, note, submitter, played_at";

/// Fixed-width UTC timestamps so that text order is chronological order.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::connect(database_url, 5).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        // Every connection to an in-memory database sees its own empty
        // database, so those pools are pinned to one long-lived connection.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };
        let pool = options.connect(database_url).await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                joined_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tournaments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS player_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
                player_id INTEGER NOT NULL REFERENCES players(id),
                rating REAL NOT NULL,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                ffa_wins INTEGER NOT NULL DEFAULT 0,
                mu REAL NOT NULL,
                sigma REAL NOT NULL,
                skill_rating REAL NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0,
                UNIQUE(tournament_id, player_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ffa_matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
                players TEXT NOT NULL,
                draws TEXT NOT NULL,
                pre_skill TEXT NOT NULL,
                post_skill TEXT NOT NULL,
                outcome_probability REAL NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                note TEXT NOT NULL DEFAULT '',
                submitter TEXT NOT NULL DEFAULT '',
                played_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tournament_id INTEGER NOT NULL REFERENCES tournaments(id),
                winner TEXT NOT NULL,
                loser TEXT NOT NULL,
                submitter TEXT NOT NULL DEFAULT '',
                note TEXT NOT NULL DEFAULT '',
                winner_rating_before REAL NOT NULL,
                winner_rating_after REAL NOT NULL,
                loser_rating_before REAL NOT NULL,
                loser_rating_after REAL NOT NULL,
                expected INTEGER NOT NULL,
                played_at TEXT NOT NULL,
                ffa_match_id INTEGER REFERENCES ffa_matches(id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_matches_tournament ON matches (tournament_id, id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Transaction helpers ───────────────────────────────────────────

    async fn insert_match_in(
        tx: &mut Transaction<'_, Sqlite>,
        m: &NewMatch,
        ffa_match_id: Option<i64>,
    ) -> Result<MatchRecord, StoreError> {
        let row = sqlx::query_as::<_, MatchRecord>(&format!(
            "INSERT INTO matches (tournament_id, winner, loser, submitter, note, winner_rating_before, winner_rating_after, loser_rating_before, loser_rating_after, expected, played_at, ffa_match_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {MATCH_COLUMNS}"
        ))
        .bind(m.tournament_id)
        .bind(&m.winner)
        .bind(&m.loser)
        .bind(&m.submitter)
        .bind(&m.note)
        .bind(m.change.winner_before)
        .bind(m.change.winner_after)
        .bind(m.change.loser_before)
        .bind(m.change.loser_after)
        .bind(m.change.expected())
        .bind(timestamp(&m.played_at))
        .bind(ffa_match_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(row)
    }

    async fn replace_stats_in(
        tx: &mut Transaction<'_, Sqlite>,
        current: &PlayerStats,
        next: &PlayerStats,
    ) -> Result<PlayerStats, StoreError> {
        let result = sqlx::query(
            "UPDATE player_stats SET rating = ?, wins = ?, losses = ?, ffa_wins = ?, mu = ?, sigma = ?, skill_rating = ?, revision = revision + 1 WHERE id = ? AND revision = ?",
        )
        .bind(next.rating)
        .bind(next.wins)
        .bind(next.losses)
        .bind(next.ffa_wins)
        .bind(next.mu)
        .bind(next.sigma)
        .bind(next.skill_rating)
        .bind(current.id)
        .bind(current.revision)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::conflict("player_stats", current.id));
        }

        Ok(PlayerStats {
            id: current.id,
            tournament_id: current.tournament_id,
            player_id: current.player_id,
            player_name: current.player_name.clone(),
            revision: current.revision + 1,
            ..next.clone()
        })
    }
}

#[async_trait]
impl RatingStore for Database {
    // ── Players & tournaments ─────────────────────────────────────────

    async fn create_player(&self, name: &str) -> Result<Player, StoreError> {
        let row = sqlx::query_as::<_, Player>(
            "INSERT INTO players (name) VALUES (?) RETURNING id, name, joined_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_player(&self, name: &str) -> Result<Option<Player>, StoreError> {
        let row = sqlx::query_as::<_, Player>(
            "SELECT id, name, joined_at FROM players WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_tournament(&self, name: &str) -> Result<Tournament, StoreError> {
        let row = sqlx::query_as::<_, Tournament>(
            "INSERT INTO tournaments (name) VALUES (?) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_tournament(&self, name: &str) -> Result<Option<Tournament>, StoreError> {
        let row = sqlx::query_as::<_, Tournament>(
            "SELECT id, name, created_at FROM tournaments WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_tournament(&self, id: i64) -> Result<Option<Tournament>, StoreError> {
        let row = sqlx::query_as::<_, Tournament>(
            "SELECT id, name, created_at FROM tournaments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_tournaments(&self) -> Result<Vec<Tournament>, StoreError> {
        let rows = sqlx::query_as::<_, Tournament>(
            "SELECT id, name, created_at FROM tournaments ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // ── Player stats ──────────────────────────────────────────────────

    async fn find_stats(
        &self,
        tournament_id: i64,
        player_id: i64,
    ) -> Result<Option<PlayerStats>, StoreError> {
        let row = sqlx::query_as::<_, PlayerStats>(&format!(
            "SELECT {STATS_COLUMNS} FROM player_stats s JOIN players p ON p.id = s.player_id WHERE s.tournament_id = ? AND s.player_id = ?"
        ))
        .bind(tournament_id)
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_stats_by_name(
        &self,
        tournament_id: i64,
        name: &str,
    ) -> Result<Option<PlayerStats>, StoreError> {
        let row = sqlx::query_as::<_, PlayerStats>(&format!(
            "SELECT {STATS_COLUMNS} FROM player_stats s JOIN players p ON p.id = s.player_id WHERE s.tournament_id = ? AND p.name = ?"
        ))
        .bind(tournament_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_stats_if_absent(
        &self,
        tournament_id: i64,
        player_id: i64,
    ) -> Result<bool, StoreError> {
        let initial = SkillParams::default();
        let result = sqlx::query(
            "INSERT INTO player_stats (tournament_id, player_id, rating, mu, sigma, skill_rating) VALUES (?, ?, ?, ?, ?, ?) ON CONFLICT (tournament_id, player_id) DO NOTHING",
        )
        .bind(tournament_id)
        .bind(player_id)
        .bind(elo::STARTING_RATING)
        .bind(initial.mu)
        .bind(initial.sigma)
        .bind(initial.skill_rating())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_stats(&self, tournament_id: i64) -> Result<Vec<PlayerStats>, StoreError> {
        let rows = sqlx::query_as::<_, PlayerStats>(&format!(
            "SELECT {STATS_COLUMNS} FROM player_stats s JOIN players p ON p.id = s.player_id WHERE s.tournament_id = ? ORDER BY s.rating DESC, p.name"
        ))
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn replace_stats(
        &self,
        current: &PlayerStats,
        next: &PlayerStats,
    ) -> Result<PlayerStats, StoreError> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::replace_stats_in(&mut tx, current, next).await?;
        tx.commit().await?;
        Ok(stored)
    }

    // ── 1v1 matches ───────────────────────────────────────────────────

    async fn insert_match(&self, m: &NewMatch) -> Result<MatchRecord, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = Self::insert_match_in(&mut tx, m, None).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn get_match(&self, id: i64) -> Result<Option<MatchRecord>, StoreError> {
        let row = sqlx::query_as::<_, MatchRecord>(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn swap_match_players(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE matches SET winner = loser, loser = winner WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_match(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM matches WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_matches(&self, query: &MatchQuery) -> Result<Vec<MatchRecord>, StoreError> {
        let mut sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE tournament_id = ?");
        if query.player.is_some() {
            sql.push_str(" AND (winner = ? OR loser = ?)");
        }
        sql.push_str(if query.newest_first {
            " ORDER BY id DESC"
        } else {
            " ORDER BY id"
        });
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, MatchRecord>(&sql).bind(query.tournament_id);
        if let Some(player) = &query.player {
            q = q.bind(player).bind(player);
        }
        if let Some(limit) = query.limit {
            q = q.bind(limit);
        }
        Ok(q.fetch_all(&self.pool).await?)
    }

    // ── FFA matches ───────────────────────────────────────────────────

    async fn list_ffa_matches(&self, tournament_id: i64) -> Result<Vec<FfaMatchRecord>, StoreError> {
        let rows = sqlx::query_as::<_, FfaMatchRecord>(&format!(
            "SELECT {FFA_COLUMNS} FROM ffa_matches WHERE tournament_id = ? ORDER BY id"
        ))
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn commit_ffa(
        &self,
        commit: &FfaCommit,
    ) -> Result<(FfaMatchRecord, Vec<MatchRecord>, Vec<PlayerStats>), StoreError> {
        let mut tx = self.pool.begin().await?;

        let m = &commit.record;
        let record = sqlx::query_as::<_, FfaMatchRecord>(&format!(
            "INSERT INTO ffa_matches (tournament_id, players, draws, pre_skill, post_skill, outcome_probability, summary, note, submitter, played_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {FFA_COLUMNS}"
        ))
        .bind(m.tournament_id)
        .bind(Json(&m.players))
        .bind(Json(&m.draws))
        .bind(Json(&m.pre_skill))
        .bind(Json(&m.post_skill))
        .bind(m.outcome_probability)
        .bind(&m.summary)
        .bind(&m.note)
        .bind(&m.submitter)
        .bind(timestamp(&m.played_at))
        .fetch_one(&mut *tx)
        .await?;

        let mut emulated = Vec::with_capacity(commit.emulated.len());
        for game in &commit.emulated {
            emulated.push(Self::insert_match_in(&mut tx, game, Some(record.id)).await?);
        }

        let mut stats = Vec::with_capacity(commit.stats.len());
        for (current, next) in &commit.stats {
            stats.push(Self::replace_stats_in(&mut tx, current, next).await?);
        }

        tx.commit().await?;
        Ok((record, emulated, stats))
    }

    // ── Replay ────────────────────────────────────────────────────────

    async fn commit_replay(&self, replay: &ReplayCommit) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for (current, next) in &replay.stats {
            Self::replace_stats_in(&mut tx, current, next).await?;
        }

        for m in &replay.matches {
            sqlx::query(
                "UPDATE matches SET winner_rating_before = ?, winner_rating_after = ?, loser_rating_before = ?, loser_rating_after = ?, expected = ? WHERE id = ?",
            )
            .bind(m.winner_rating_before)
            .bind(m.winner_rating_after)
            .bind(m.loser_rating_before)
            .bind(m.loser_rating_after)
            .bind(m.expected)
            .bind(m.id)
            .execute(&mut *tx)
            .await?;
        }

        for f in &replay.ffa_matches {
            sqlx::query(
                "UPDATE ffa_matches SET pre_skill = ?, post_skill = ?, outcome_probability = ? WHERE id = ?",
            )
            .bind(&f.pre_skill)
            .bind(&f.post_skill)
            .bind(f.outcome_probability)
            .bind(f.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    async fn seeded(db: &Database, names: &[&str]) -> (Tournament, Vec<PlayerStats>) {
        let t = db.create_tournament("Default").await.unwrap();
        let mut stats = Vec::new();
        for name in names {
            let p = db.create_player(name).await.unwrap();
            db.insert_stats_if_absent(t.id, p.id).await.unwrap();
            stats.push(db.find_stats(t.id, p.id).await.unwrap().unwrap());
        }
        (t, stats)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn new_match(tournament_id: i64, winner: &str, loser: &str, secs: i64) -> NewMatch {
        NewMatch {
            tournament_id,
            winner: winner.into(),
            loser: loser.into(),
            submitter: "tester".into(),
            note: String::new(),
            change: elo::decisive_result(1200.0, 1200.0),
            played_at: at(secs),
        }
    }

    #[tokio::test]
    async fn test_players_and_tournaments() {
        let db = test_db().await;

        let alice = db.create_player("alice").await.unwrap();
        assert_eq!(alice.name, "alice");
        let err = db.create_player("alice").await.unwrap_err();
        assert!(err.is_unique_violation());
        assert!(!err.is_retryable());
        assert_eq!(db.find_player("alice").await.unwrap().unwrap().id, alice.id);
        assert!(db.find_player("nobody").await.unwrap().is_none());

        let t = db.create_tournament("Spring").await.unwrap();
        assert_eq!(db.find_tournament("Spring").await.unwrap().unwrap().id, t.id);
        assert_eq!(db.get_tournament(t.id).await.unwrap().unwrap().name, "Spring");
        assert_eq!(db.list_tournaments().await.unwrap().len(), 1);
        assert!(db.create_tournament("Spring").await.unwrap_err().is_unique_violation());
    }

    #[tokio::test]
    async fn test_stats_created_once_with_defaults() {
        let db = test_db().await;
        let t = db.create_tournament("Default").await.unwrap();
        let p = db.create_player("alice").await.unwrap();

        assert!(db.insert_stats_if_absent(t.id, p.id).await.unwrap());
        assert!(!db.insert_stats_if_absent(t.id, p.id).await.unwrap());

        let stats = db.find_stats_by_name(t.id, "alice").await.unwrap().unwrap();
        assert_eq!(stats.player_name, "alice");
        assert_eq!(stats.rating, 1200.0);
        assert_eq!((stats.wins, stats.losses, stats.ffa_wins), (0, 0, 0));
        assert_eq!(stats.mu, 25.0);
        assert_eq!(stats.revision, 0);
        assert_eq!(db.list_stats(t.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_stats_detects_stale_revision() {
        let db = test_db().await;
        let (_, stats) = seeded(&db, &["alice"]).await;
        let current = stats[0].clone();

        let mut next = current.clone();
        next.rating = 1250.0;
        next.wins = 1;
        let stored = db.replace_stats(&current, &next).await.unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.rating, 1250.0);

        // Writing again from the old snapshot must fail
        let err = db.replace_stats(&current, &next).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_list_matches_order_and_filters() {
        let db = test_db().await;
        let (t, _) = seeded(&db, &["alice", "bob", "carol"]).await;

        let first = db.insert_match(&new_match(t.id, "alice", "bob", 10)).await.unwrap();
        let second = db.insert_match(&new_match(t.id, "carol", "alice", 20)).await.unwrap();
        let third = db.insert_match(&new_match(t.id, "bob", "carol", 20)).await.unwrap();
        assert!(first.expected);
        assert_eq!(first.played_at, at(10));

        // Committed last with an older timestamp: still last in the log
        let late = db.insert_match(&new_match(t.id, "alice", "carol", 5)).await.unwrap();

        let chronological = db.list_matches(&MatchQuery::chronological(t.id)).await.unwrap();
        let ids: Vec<i64> = chronological.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id, late.id]);

        let recent = db.list_matches(&MatchQuery::recent(t.id, 2)).await.unwrap();
        let ids: Vec<i64> = recent.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![late.id, third.id]);

        let mut by_player = MatchQuery::recent(t.id, 10);
        by_player.player = Some("alice".into());
        let alice = db.list_matches(&by_player).await.unwrap();
        assert_eq!(alice.len(), 3);
    }

    #[tokio::test]
    async fn test_swap_and_delete_match() {
        let db = test_db().await;
        let (t, _) = seeded(&db, &["alice", "bob"]).await;
        let m = db.insert_match(&new_match(t.id, "alice", "bob", 0)).await.unwrap();

        assert!(db.swap_match_players(m.id).await.unwrap());
        let swapped = db.get_match(m.id).await.unwrap().unwrap();
        assert_eq!((swapped.winner.as_str(), swapped.loser.as_str()), ("bob", "alice"));

        assert!(db.delete_match(m.id).await.unwrap());
        assert!(!db.delete_match(m.id).await.unwrap());
        assert!(!db.swap_match_players(m.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_ffa_is_all_or_nothing() {
        let db = test_db().await;
        let (t, stats) = seeded(&db, &["alice", "bob"]).await;

        let mut next_alice = stats[0].clone();
        next_alice.ffa_wins = 1;
        let mut stale_bob = stats[1].clone();
        stale_bob.revision = 42;

        let commit = FfaCommit {
            record: NewFfaMatch {
                tournament_id: t.id,
                players: vec!["alice".into(), "bob".into()],
                draws: vec![false],
                pre_skill: vec![SkillParams::default(); 2],
                post_skill: vec![SkillParams::default(); 2],
                outcome_probability: 0.4,
                summary: "alice > bob".into(),
                note: String::new(),
                submitter: "tester".into(),
                played_at: at(0),
            },
            emulated: vec![new_match(t.id, "alice", "bob", 0)],
            stats: vec![
                (stats[0].clone(), next_alice.clone()),
                (stale_bob, stats[1].clone()),
            ],
        };

        let err = db.commit_ffa(&commit).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(db.list_ffa_matches(t.id).await.unwrap().is_empty());
        assert!(db.list_matches(&MatchQuery::chronological(t.id)).await.unwrap().is_empty());
        assert_eq!(db.find_stats_by_name(t.id, "alice").await.unwrap().unwrap().ffa_wins, 0);

        let mut good = commit.clone();
        good.stats[1].0 = stats[1].clone();
        let (record, emulated, stored) = db.commit_ffa(&good).await.unwrap();
        assert_eq!(record.players.0, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(emulated[0].ffa_match_id, Some(record.id));
        assert_eq!(stored[0].ffa_wins, 1);
        assert_eq!(db.list_ffa_matches(t.id).await.unwrap().len(), 1);
    }
}
