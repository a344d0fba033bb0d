use std::sync::{Arc, Mutex};

use actix_web::{App, HttpServer, web};
use tokio::runtime::{Handle, Runtime};

use crate::adapters::api::{ApiState, configure_routes};
use crate::adapters::recharge_api::RechargeApi;
use crate::adapters::recharge_http::HttpRechargeApi;
use crate::app::config::AppConfig;
use crate::app::error::AppError;
use crate::app::integration::Integration;
use crate::app::services::{EntryStore, SqliteEntryStore};
use crate::app::setup_flow::FlowManager;

struct Components {
    api: Arc<dyn RechargeApi>,
    store: Arc<dyn EntryStore>,
    integration: Arc<Integration>,
}

fn build_components(config: &AppConfig, runtime: Handle) -> Result<Components, AppError> {
    let mut connection =
        crate::adapters::db::open_connection(&config.db_path).map_err(AppError::database_init)?;
    crate::adapters::db::run_migrations(&mut connection).map_err(AppError::database_init)?;

    let store: Arc<dyn EntryStore> =
        Arc::new(SqliteEntryStore::new(Arc::new(Mutex::new(connection))));
    let api: Arc<dyn RechargeApi> = Arc::new(
        HttpRechargeApi::new(&config.map_url, &config.account_url, config.http_timeout)
            .map_err(AppError::runtime)?,
    );
    let integration = Arc::new(Integration::new(
        Arc::clone(&api),
        config.update_interval,
        runtime,
    ));

    Ok(Components {
        api,
        store,
        integration,
    })
}

/// Sets up every stored entry. Entries that fail stay stored and are
/// retried on the next start.
async fn load_stored_entries(components: &Components) -> Result<usize, AppError> {
    let entries = components.store.list_entries().map_err(AppError::database_init)?;

    let mut loaded = 0_usize;
    for entry in &entries {
        if components.integration.setup_entry(entry).await {
            loaded += 1;
        }
    }

    tracing::info!(
        stored = entries.len(),
        loaded,
        "stored config entries processed"
    );
    Ok(loaded)
}

fn polling_runtime() -> Result<Runtime, AppError> {
    tokio::runtime::Builder::new_multi_thread()
        .thread_name("recharge-poll")
        .enable_all()
        .build()
        .map_err(AppError::runtime)
}

/// Poll tasks live on their own runtime so entries created from an HTTP
/// worker keep polling independently of that worker.
pub fn run(config: AppConfig) -> Result<(), AppError> {
    let polling = polling_runtime()?;
    let components = build_components(&config, polling.handle().clone())?;

    actix_web::rt::System::new().block_on(async move {
        load_stored_entries(&components).await?;

        let api_state = ApiState {
            integration: Arc::clone(&components.integration),
            store: Arc::clone(&components.store),
            flows: Arc::new(FlowManager::new(
                Arc::clone(&components.api),
                Arc::clone(&components.store),
                Arc::clone(&components.integration),
            )),
        };

        tracing::info!(bind = %config.http_bind, "http server starting");

        let server_result = match HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(api_state.clone()))
                .configure(configure_routes)
        })
        .bind(&config.http_bind)
        {
            Ok(server) => server.run().await,
            Err(error) => Err(error),
        };

        components.integration.unload_all().await;
        server_result.map_err(AppError::runtime)
    })
}

pub fn run_headless(config: AppConfig) -> Result<(), AppError> {
    let runtime = polling_runtime()?;
    let components = build_components(&config, runtime.handle().clone())?;

    runtime.block_on(async move {
        load_stored_entries(&components).await?;

        tracing::info!("polling stored entries until interrupted");
        let signal_result = tokio::signal::ctrl_c().await;

        tracing::info!("shutdown requested");
        components.integration.unload_all().await;
        signal_result.map_err(AppError::runtime)
    })
}
