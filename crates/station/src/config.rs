use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use mes_core::error::CoreError;
use mes_core::types::DbId;

/// Station configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StationConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Pool size (default: `5`).
    pub db_max_connections: u32,
    /// Machine selected at startup, overriding the persisted selection.
    pub machine_id: Option<DbId>,
    /// Where the client state is persisted between restarts.
    pub state_file: PathBuf,
    /// Phase ticker period (default: one second).
    pub tick: Duration,
}

impl StationConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var              | Default                   |
    /// |----------------------|---------------------------|
    /// | `DATABASE_URL`       | required                  |
    /// | `DB_MAX_CONNECTIONS` | `5`                       |
    /// | `STATION_MACHINE_ID` | none                      |
    /// | `STATION_STATE_FILE` | `.mes-station-state.json` |
    /// | `TIMER_TICK_MS`      | `1000`                    |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| CoreError::Validation("DATABASE_URL is required".into()))?;

        let db_max_connections: u32 = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?;
        if db_max_connections == 0 {
            return Err(CoreError::Validation(
                "DB_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }

        let machine_id = match lookup("STATION_MACHINE_ID") {
            Some(raw) => Some(parse::<DbId>("STATION_MACHINE_ID", &raw)?),
            None => None,
        };

        let state_file = lookup("STATION_STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".mes-station-state.json"));

        let tick_ms: u64 = parse_or(&lookup, "TIMER_TICK_MS", 1000)?;
        if tick_ms == 0 {
            return Err(CoreError::Validation("TIMER_TICK_MS must be positive".into()));
        }

        Ok(Self {
            database_url,
            db_max_connections,
            machine_id,
            state_file,
            tick: Duration::from_millis(tick_ms),
        })
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("{key} has an invalid value: {raw:?}")))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}
