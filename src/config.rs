// Application configuration, loaded from environment variables and CLI flags.

use crate::store::DEFAULT_TX_ATTEMPTS;

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Upper bound on pooled database connections.
    pub db_max_connections: u32,
    /// Attempts for a contended rating transaction before giving up.
    pub tx_retry_attempts: u32,
    /// Tournament used when a 1v1 submission names none. Created at startup.
    pub default_tournament: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: "sqlite:ladder.db?mode=rwc".to_string(),
            port: 3000,
            db_max_connections: 5,
            tx_retry_attempts: DEFAULT_TX_ATTEMPTS,
            default_tournament: "Default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:ladder.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `DB_MAX_CONNECTIONS` - connection pool size (default: 5)
    /// - `TX_RETRY_ATTEMPTS` - attempts per contended transaction (default: 3)
    /// - `DEFAULT_TOURNAMENT` - tournament for submissions without one (default: `Default`)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let database_url = env("DATABASE_URL").unwrap_or(defaults.database_url);

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(defaults.port);

        let db_max_connections = env("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.db_max_connections);

        let tx_retry_attempts = env("TX_RETRY_ATTEMPTS")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.tx_retry_attempts);

        let default_tournament = env("DEFAULT_TOURNAMENT")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.default_tournament);

        Config {
            database_url,
            port,
            db_max_connections,
            tx_retry_attempts,
            default_tournament,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}
