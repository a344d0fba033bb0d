use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::adapters::recharge_api::{AccountSession, RechargeApi, RechargeApiError};
use crate::app::coordinator::{CoordinatorError, RefreshCoordinator};
use crate::app::entities::{
    ButtonAction, ChargerSwitch, ChargingButton, Entity, EntryContext, PLATFORMS,
    StationCoordinator, StationSensor,
};
use crate::domain::models::ConfigEntry;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("entry {0} is already loaded")]
    AlreadyLoaded(String),
    #[error(transparent)]
    NotReady(#[from] CoordinatorError),
}

struct LoadedEntry {
    entry: ConfigEntry,
    coordinator: Arc<StationCoordinator>,
    entities: Vec<Entity>,
    poller: JoinHandle<()>,
}

/// Per-installation registry of loaded config entries. Poll tasks run on
/// `runtime` regardless of which runtime loaded the entry.
pub struct Integration {
    api: Arc<dyn RechargeApi>,
    update_interval: Duration,
    runtime: Handle,
    loaded: RwLock<HashMap<String, LoadedEntry>>,
}

impl Integration {
    pub fn new(api: Arc<dyn RechargeApi>, update_interval: Duration, runtime: Handle) -> Self {
        Self {
            api,
            update_interval,
            runtime,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    /// Loads an entry, logging the reason when it cannot be loaded.
    pub async fn setup_entry(&self, entry: &ConfigEntry) -> bool {
        match self.try_setup_entry(entry).await {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(
                    entry_id = %entry.entry_id,
                    charger_id = %entry.data.charger_id,
                    error = %error,
                    "config entry setup failed"
                );
                false
            }
        }
    }

    pub async fn try_setup_entry(&self, entry: &ConfigEntry) -> Result<(), IntegrationError> {
        if self.loaded.read().await.contains_key(&entry.entry_id) {
            return Err(IntegrationError::AlreadyLoaded(entry.entry_id.clone()));
        }

        let coordinator: Arc<StationCoordinator> = Arc::new(RefreshCoordinator::new(
            Arc::clone(&self.api),
            entry.data.charger_id.clone(),
            self.update_interval,
        ));
        coordinator.first_refresh().await?;

        // Station polling does not depend on the account; without a session
        // only the sensor is set up.
        let session = match self.open_session(entry).await {
            Ok(session) => Some(session),
            Err(error) => {
                tracing::warn!(
                    entry_id = %entry.entry_id,
                    charger_id = %entry.data.charger_id,
                    error = %error,
                    "account login failed; switch and buttons not set up"
                );
                None
            }
        };

        let context = EntryContext {
            entry,
            coordinator: &coordinator,
            session: session.as_ref(),
        };
        let mut entities = Vec::new();
        for platform in PLATFORMS {
            platform.setup_entry(&context, &mut |new_entities| entities.extend(new_entities));
        }

        let mut loaded = self.loaded.write().await;
        if loaded.contains_key(&entry.entry_id) {
            return Err(IntegrationError::AlreadyLoaded(entry.entry_id.clone()));
        }

        let poller = Arc::clone(&coordinator).spawn(&self.runtime);
        tracing::info!(
            entry_id = %entry.entry_id,
            charger_id = %entry.data.charger_id,
            entities = entities.len(),
            account_session = session.is_some(),
            update_interval_secs = coordinator.update_interval().as_secs(),
            "config entry loaded"
        );
        loaded.insert(
            entry.entry_id.clone(),
            LoadedEntry {
                entry: entry.clone(),
                coordinator,
                entities,
                poller,
            },
        );

        Ok(())
    }

    /// Stops polling and drops the entities of an entry. Returns false when
    /// the entry was not loaded.
    pub async fn unload_entry(&self, entry_id: &str) -> bool {
        let Some(loaded) = self.loaded.write().await.remove(entry_id) else {
            return false;
        };

        loaded.coordinator.shutdown();
        if let Err(error) = loaded.poller.await {
            tracing::warn!(entry_id, error = %error, "refresh task ended abnormally");
        }

        tracing::info!(
            entry_id,
            charger_id = %loaded.entry.data.charger_id,
            "config entry unloaded"
        );
        true
    }

    pub async fn unload_all(&self) {
        let entry_ids: Vec<String> = self.loaded.read().await.keys().cloned().collect();
        for entry_id in entry_ids {
            self.unload_entry(&entry_id).await;
        }
    }

    pub async fn is_loaded(&self, entry_id: &str) -> bool {
        self.loaded.read().await.contains_key(entry_id)
    }

    pub async fn loaded_entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.loaded.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn coordinator(&self, entry_id: &str) -> Option<Arc<StationCoordinator>> {
        self.loaded
            .read()
            .await
            .get(entry_id)
            .map(|loaded| Arc::clone(&loaded.coordinator))
    }

    pub async fn entities(&self, entry_id: &str) -> Option<Vec<Entity>> {
        self.loaded
            .read()
            .await
            .get(entry_id)
            .map(|loaded| loaded.entities.clone())
    }

    pub async fn sensor(&self, entry_id: &str) -> Option<StationSensor> {
        self.find_entity(entry_id, |entity| match entity {
            Entity::Sensor(sensor) => Some(sensor.clone()),
            _ => None,
        })
        .await
    }

    pub async fn switch(&self, entry_id: &str) -> Option<ChargerSwitch> {
        self.find_entity(entry_id, |entity| match entity {
            Entity::Switch(switch) => Some(switch.clone()),
            _ => None,
        })
        .await
    }

    pub async fn button(&self, entry_id: &str, action: ButtonAction) -> Option<ChargingButton> {
        self.find_entity(entry_id, |entity| match entity {
            Entity::Button(button) if button.action() == action => Some(button.clone()),
            _ => None,
        })
        .await
    }

    async fn find_entity<T>(
        &self,
        entry_id: &str,
        select: impl Fn(&Entity) -> Option<T>,
    ) -> Option<T> {
        self.loaded
            .read()
            .await
            .get(entry_id)
            .and_then(|loaded| loaded.entities.iter().find_map(select))
    }

    async fn open_session(
        &self,
        entry: &ConfigEntry,
    ) -> Result<Arc<dyn AccountSession>, RechargeApiError> {
        let session = self
            .api
            .get_user(&entry.data.email, &entry.data.password)
            .await?;
        session.authenticate().await?;
        Ok(session)
    }
}
