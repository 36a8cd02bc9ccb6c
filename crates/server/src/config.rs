use std::env;

/// Process configuration, loaded from the environment (`.env` via
/// `dotenvy` in development). Ambient concern — no spec.md module owns
/// this, but every real deployment needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub max_db_connections: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let max_db_connections = match env::var("MAX_DB_CONNECTIONS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "MAX_DB_CONNECTIONS",
                value: raw,
            })?,
            Err(_) => 10,
        };

        Ok(Config {
            database_url,
            bind_addr,
            max_db_connections,
        })
    }
}
