use chrono::Duration;
use dotenv::dotenv;
use std::env;

use crate::errors::{ErrorKind, Result};

const DEFAULT_TOKEN_LIFETIME: i64 = 24 * 60 * 60;
const DEFAULT_POOL_SIZE: u32 = 8;

/// Application settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub secret_key: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub pool_size: u32,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Settings> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")?;
        let secret_key = env::var("SECRET_KEY")?;
        if secret_key.is_empty() {
            return Err(ErrorKind::InvalidSetting("SECRET_KEY", "must not be empty".into()).into());
        }

        Ok(Settings {
            database_url,
            secret_key,
            access_token_lifetime: seconds("ACCESS_TOKEN_LIFETIME", DEFAULT_TOKEN_LIFETIME)?,
            refresh_token_lifetime: seconds("REFRESH_TOKEN_LIFETIME", DEFAULT_TOKEN_LIFETIME)?,
            pool_size: optional("DATABASE_POOL_SIZE")?.unwrap_or(DEFAULT_POOL_SIZE),
        })
    }

    /// Settings with default lifetimes, for tooling and tests.
    pub fn new<U: Into<String>, K: Into<String>>(database_url: U, secret_key: K) -> Settings {
        Settings {
            database_url: database_url.into(),
            secret_key: secret_key.into(),
            access_token_lifetime: Duration::seconds(DEFAULT_TOKEN_LIFETIME),
            refresh_token_lifetime: Duration::seconds(DEFAULT_TOKEN_LIFETIME),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

fn optional<T: std::str::FromStr<Err = std::num::ParseIntError>>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value.trim().parse::<T>()?)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn seconds(name: &'static str, default: i64) -> Result<Duration> {
    let secs = optional::<i64>(name)?.unwrap_or(default);
    if secs <= 0 {
        return Err(ErrorKind::InvalidSetting(name, "must be a positive number of seconds".into()).into());
    }
    Ok(Duration::seconds(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_default_lifetimes() {
        let settings = Settings::new("db.sqlite3", "secret");
        assert_eq!(settings.access_token_lifetime, Duration::days(1));
        assert_eq!(settings.refresh_token_lifetime, Duration::days(1));
        assert_eq!(settings.pool_size, 8);
    }
}
