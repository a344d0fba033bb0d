use std::time::Duration;

use crate::app::AppError;

const DEFAULT_MAP_URL: &str = "https://ui-map.shellrecharge.com";
const DEFAULT_ACCOUNT_URL: &str = "https://account.shellrecharge.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub http_bind: String,
    pub update_interval: Duration,
    pub http_timeout: Duration,
    pub map_url: String,
    pub account_url: String,
}

impl AppConfig {
    /// Reads the process environment after loading `.env` when present.
    pub fn from_env() -> Result<Self, AppError> {
        if let Err(error) = dotenvy::dotenv()
            && !error.not_found()
        {
            return Err(AppError::config(format!("failed to read .env: {error}")));
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            db_path: string_or_default(&lookup, "DB_PATH", "/var/lib/recharge/recharge.db"),
            http_bind: string_or_default(&lookup, "HTTP_BIND", "0.0.0.0:8080"),
            update_interval: seconds_or_default(&lookup, "UPDATE_INTERVAL_SECS", 60)?,
            http_timeout: seconds_or_default(&lookup, "HTTP_TIMEOUT_SECS", 30)?,
            map_url: string_or_default(&lookup, "RECHARGE_MAP_URL", DEFAULT_MAP_URL),
            account_url: string_or_default(&lookup, "RECHARGE_ACCOUNT_URL", DEFAULT_ACCOUNT_URL),
        })
    }
}

fn string_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn seconds_or_default<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let seconds = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number")))?,
        None => default,
    };

    if seconds == 0 {
        return Err(AppError::config(format!("{key} must be greater than zero")));
    }

    Ok(Duration::from_secs(seconds))
}
