// Error types for the persistence layer and the rating engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("transaction retry exhausted after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
}

impl StoreError {
    pub fn not_found(entity: &str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    pub fn conflict(entity: &str, key: impl ToString) -> Self {
        StoreError::Conflict {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    /// Whether another attempt of the same transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Conflict { .. } => true,
            StoreError::Database(sqlx::Error::Database(db)) => {
                // SQLITE_BUSY, SQLITE_LOCKED and their extended codes
                matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517"))
            }
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    /// Whether the write lost a race against another insert of the same key.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::Database(sqlx::Error::Database(db)) if db.is_unique_violation())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("winner should not be the same as loser")]
    SamePlayer,
    #[error("tournament {0} does not exist")]
    UnknownTournament(String),
    #[error("player {0} does not exist")]
    NoSuchPlayer(String),
    #[error("player {name} is not registered in tournament {tournament}")]
    UnknownPlayer { tournament: String, name: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("integrity error: {0}")]
    Integrity(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Errors caused by the request rather than by the backing store.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EngineError::Store(_) | EngineError::Integrity(_))
    }

    /// Short label used for rejection metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::SamePlayer => "same_player",
            EngineError::UnknownTournament(_) => "unknown_tournament",
            EngineError::NoSuchPlayer(_) | EngineError::UnknownPlayer { .. } => "unknown_player",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::Integrity(_) => "integrity",
            EngineError::Store(StoreError::Conflict { .. })
            | EngineError::Store(StoreError::RetryExhausted { .. }) => "contention",
            EngineError::Store(_) => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_retryable() {
        assert!(StoreError::conflict("player_stats", 7).is_retryable());
        assert!(!StoreError::not_found("matches", 7).is_retryable());
        assert!(!StoreError::RetryExhausted { attempts: 3 }.is_retryable());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(EngineError::SamePlayer.is_client_error());
        assert!(EngineError::Validation("x".into()).is_client_error());
        assert!(!EngineError::Integrity("x".into()).is_client_error());
        assert!(!EngineError::Store(StoreError::RetryExhausted { attempts: 3 }).is_client_error());
    }

    #[test]
    fn test_reason_labels() {
        let err = EngineError::Store(StoreError::conflict("player_stats", 1));
        assert_eq!(err.reason(), "contention");
        assert_eq!(
            EngineError::UnknownPlayer {
                tournament: "Default".into(),
                name: "bob".into()
            }
            .reason(),
            "unknown_player"
        );
    }
}
