mod config;
pub mod coordinator;
pub mod entities;
mod error;
pub mod integration;
mod logging;
mod runtime;
pub mod services;
pub mod setup_flow;

pub use config::AppConfig;
pub use error::AppError;

fn bootstrap() -> Result<AppConfig, AppError> {
    logging::init()?;

    let config = AppConfig::from_env()?;

    tracing::info!(
        db_path = %config.db_path,
        http_bind = %config.http_bind,
        update_interval_secs = config.update_interval.as_secs(),
        http_timeout_secs = config.http_timeout.as_secs(),
        map_url = %config.map_url,
        account_url = %config.account_url,
        "application bootstrap initialized"
    );

    Ok(config)
}

/// Loads stored entries and serves the HTTP surface until the server stops.
pub fn run() -> Result<(), AppError> {
    let config = bootstrap()?;
    runtime::run(config)
}

/// Loads stored entries and keeps them polling until Ctrl-C.
pub fn run_service() -> Result<(), AppError> {
    let config = bootstrap()?;
    runtime::run_headless(config)
}
