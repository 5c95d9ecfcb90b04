use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://lootfair.db?mode=rwc";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind: String,
    pub max_connections: u32,
    /// Pool acquire timeout; bounds every storage call made by a request.
    pub db_timeout: Duration,
    pub roll_max_attempts: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            bind: std::env::var("BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            max_connections: parse_var("DB_MAX_CONNECTIONS", 5)?,
            db_timeout: Duration::from_millis(parse_var("DB_TIMEOUT_MS", 5_000)?),
            roll_max_attempts: parse_var("ROLL_MAX_ATTEMPTS", 8)?,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_uses_default() {
        let v: u32 = parse_var("LOOTFAIR_TEST_SURELY_UNSET", 7).unwrap();
        assert_eq!(v, 7);
    }
}
