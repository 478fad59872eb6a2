use std::env;
use std::fmt;

use thiserror::Error;

pub const USER_VAR: &str = "DB_USER";
pub const PASSWORD_VAR: &str = "DB_PASSWORD";
pub const TARGET_VAR: &str = "DB_DSN";

#[derive(Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("database credentials are not set: {0} is missing from the environment")]
    Missing(&'static str),
}

/// Database settings, built once at start-up and handed to the connector.
#[derive(Clone, PartialEq)]
pub struct Config {
    pub user: String,
    pub password: String,
    /// Connection target. For the SQLite backend this is the database file.
    pub target: String,
}

impl Config {
    /// Reads the settings from the process environment, after loading a
    /// `.env` file from the working directory if there is one.
    pub fn from_env() -> Result<Config, ConfigError> {
        let _ = dotenvy::dotenv();
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        Ok(Config {
            user: required(USER_VAR)?,
            password: required(PASSWORD_VAR)?,
            target: required(TARGET_VAR)?,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("user", &self.user)
            .field("password", &"********")
            .field("target", &self.target)
            .finish()
    }
}
