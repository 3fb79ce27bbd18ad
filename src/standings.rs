// Read side of the ladder: standings, match history and the head-to-head
// table.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::db::{MatchRecord, PlayerStats, Tournament};
use crate::error::EngineError;
use crate::store::{MatchQuery, RatingStore};

const SILVER: &str = "rgb(192,192,192)";
const WHITE: &str = "rgb(255,255,255)";

/// Results of the row player against the column player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadToHeadCell {
    pub wins: u32,
    pub losses: u32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadToHead {
    pub players: Vec<String>,
    /// `cells[i][j]` is `players[i]` against `players[j]`.
    pub cells: Vec<Vec<HeadToHeadCell>>,
}

/// Display colour of a head-to-head cell: silver on the diagonal, white
/// with no games, gold blending into limegreen as the row player dominates
/// and into tomato as they fall behind.
pub fn cell_color(same_player: bool, wins: u32, losses: u32) -> String {
    if same_player {
        return SILVER.to_string();
    }
    if wins == 0 && losses == 0 {
        return WHITE.to_string();
    }

    let (w, l) = (f64::from(wins), f64::from(losses));
    let (r, g, b) = if wins >= losses {
        let ratio = (w - l) / (w + l);
        (
            50.0 * ratio + 255.0 * (1.0 - ratio),
            205.0 * ratio + 215.0 * (1.0 - ratio),
            50.0 * ratio,
        )
    } else {
        let ratio = 2.0 * w / (w + l);
        (255.0, 215.0 * ratio + 99.0 * (1.0 - ratio), 71.0 * (1.0 - ratio))
    };
    format!("rgb({r:.0},{g:.0},{b:.0})")
}

/// Build the head-to-head table over `players` (in display order). A match
/// naming someone outside `players` is an integrity error.
pub fn head_to_head(players: &[String], matches: &[MatchRecord]) -> Result<HeadToHead, EngineError> {
    let index: HashMap<&str, usize> = players
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let position = |name: &str, id: i64| {
        index.get(name).copied().ok_or_else(|| {
            EngineError::Integrity(format!("match {id} references unregistered player {name}"))
        })
    };

    let n = players.len();
    let mut wins = vec![vec![0u32; n]; n];
    for m in matches {
        let (w, l) = (position(&m.winner, m.id)?, position(&m.loser, m.id)?);
        wins[w][l] += 1;
    }

    let cells = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| HeadToHeadCell {
                    wins: wins[i][j],
                    losses: wins[j][i],
                    color: cell_color(i == j, wins[i][j], wins[j][i]),
                })
                .collect()
        })
        .collect();

    Ok(HeadToHead {
        players: players.to_vec(),
        cells,
    })
}

/// Tournament queries used by the API.
pub struct Leaderboard<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for Leaderboard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RatingStore + ?Sized> Leaderboard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn tournaments(&self) -> Result<Vec<Tournament>, EngineError> {
        Ok(self.store.list_tournaments().await?)
    }

    /// All registered players, highest Elo rating first.
    pub async fn standings(&self, tournament: &str) -> Result<Vec<PlayerStats>, EngineError> {
        let t = self.tournament(tournament).await?;
        Ok(self.store.list_stats(t.id).await?)
    }

    /// The `num` most recent matches, newest first. A missing or
    /// non-positive `num` yields nothing.
    pub async fn recent_matches(&self, tournament: &str, num: Option<i64>) -> Result<Vec<MatchRecord>, EngineError> {
        let t = self.tournament(tournament).await?;
        match num {
            Some(limit) if limit > 0 => Ok(self.store.list_matches(&MatchQuery::recent(t.id, limit)).await?),
            _ => Ok(Vec::new()),
        }
    }

    /// Matches one player won or lost, newest first.
    pub async fn player_matches(
        &self,
        tournament: &str,
        player: &str,
        num: Option<i64>,
    ) -> Result<Vec<MatchRecord>, EngineError> {
        let t = self.tournament(tournament).await?;
        if self.store.find_stats_by_name(t.id, player).await?.is_none() {
            return Err(EngineError::UnknownPlayer {
                tournament: t.name,
                name: player.to_string(),
            });
        }
        let query = MatchQuery {
            tournament_id: t.id,
            player: Some(player.to_string()),
            limit: num.filter(|n| *n > 0),
            newest_first: true,
        };
        Ok(self.store.list_matches(&query).await?)
    }

    pub async fn head_to_head(&self, tournament: &str) -> Result<HeadToHead, EngineError> {
        let t = self.tournament(tournament).await?;
        let players: Vec<String> = self
            .store
            .list_stats(t.id)
            .await?
            .into_iter()
            .map(|s| s.player_name)
            .collect();
        let matches = self.store.list_matches(&MatchQuery::chronological(t.id)).await?;
        head_to_head(&players, &matches)
    }

    async fn tournament(&self, name: &str) -> Result<Tournament, EngineError> {
        self.store
            .find_tournament(name)
            .await?
            .ok_or_else(|| EngineError::UnknownTournament(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::latest::LatestMatch;
    use crate::recorder::{MatchRecorder, MatchSubmission};
    use chrono::Utc;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn decided(id: i64, winner: &str, loser: &str) -> MatchRecord {
        MatchRecord {
            id,
            tournament_id: 1,
            winner: winner.into(),
            loser: loser.into(),
            submitter: String::new(),
            note: String::new(),
            winner_rating_before: 1200.0,
            winner_rating_after: 1216.0,
            loser_rating_before: 1200.0,
            loser_rating_after: 1184.0,
            expected: true,
            played_at: Utc::now(),
            ffa_match_id: None,
        }
    }

    #[test]
    fn test_cell_colors() {
        assert_eq!(cell_color(true, 3, 1), "rgb(192,192,192)");
        assert_eq!(cell_color(false, 0, 0), "rgb(255,255,255)");
        // All wins is limegreen, even record is gold, all losses is tomato
        assert_eq!(cell_color(false, 4, 0), "rgb(50,205,50)");
        assert_eq!(cell_color(false, 2, 2), "rgb(255,215,0)");
        assert_eq!(cell_color(false, 0, 3), "rgb(255,99,71)");
        // 4-1 blends 60% of the way to limegreen
        assert_eq!(cell_color(false, 4, 1), "rgb(132,209,30)");
    }

    #[test]
    fn test_head_to_head_table() {
        let players = names(&["alice", "bob", "carol"]);
        let matches = [
            decided(1, "alice", "bob"),
            decided(2, "alice", "bob"),
            decided(3, "bob", "alice"),
            decided(4, "carol", "alice"),
        ];
        let table = head_to_head(&players, &matches).unwrap();

        assert_eq!((table.cells[0][1].wins, table.cells[0][1].losses), (2, 1));
        assert_eq!((table.cells[1][0].wins, table.cells[1][0].losses), (1, 2));
        assert_eq!((table.cells[0][2].wins, table.cells[0][2].losses), (0, 1));
        assert_eq!(table.cells[1][2].color, "rgb(255,255,255)");
        assert_eq!(table.cells[2][2].color, "rgb(192,192,192)");
    }

    #[test]
    fn test_head_to_head_unregistered_player() {
        let players = names(&["alice", "bob"]);
        let err = head_to_head(&players, &[decided(1, "alice", "eve")]).unwrap_err();
        assert!(matches!(err, EngineError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_queries() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        let recorder = MatchRecorder::new(db.clone(), LatestMatch::new());
        let board = Leaderboard::new(db);

        recorder.create_tournament("Default").await.unwrap();
        for name in ["alice", "bob", "carol"] {
            recorder.register_player(name).await.unwrap();
            recorder.join_tournament("Default", name).await.unwrap();
        }
        for (winner, loser) in [("alice", "bob"), ("alice", "carol"), ("bob", "carol")] {
            recorder
                .record_match(MatchSubmission {
                    tournament: "Default".into(),
                    winner: winner.into(),
                    loser: loser.into(),
                    note: String::new(),
                    submitter: "tester".into(),
                    played_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let standings = board.standings("Default").await.unwrap();
        let order: Vec<&str> = standings.iter().map(|s| s.player_name.as_str()).collect();
        assert_eq!(order, vec!["alice", "bob", "carol"]);

        assert!(board.recent_matches("Default", None).await.unwrap().is_empty());
        assert!(board.recent_matches("Default", Some(0)).await.unwrap().is_empty());
        let recent = board.recent_matches("Default", Some(2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].winner, "bob");

        let carol = board.player_matches("Default", "carol", None).await.unwrap();
        assert_eq!(carol.len(), 2);
        assert!(board.player_matches("Default", "dave", None).await.is_err());

        let table = board.head_to_head("Default").await.unwrap();
        assert_eq!(table.players, names(&["alice", "bob", "carol"]));
        assert_eq!(table.cells[0][1].wins, 1);

        assert!(matches!(
            board.standings("Nope").await,
            Err(EngineError::UnknownTournament(_))
        ));
        assert_eq!(board.tournaments().await.unwrap().len(), 1);
    }
}
