use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::adapters::recharge_api::{RechargeApi, RechargeApiError};
use crate::domain::models::ChargerId;
use crate::domain::station::Location;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("initial refresh for charger {charger_id} failed: {source}")]
    NotReady {
        charger_id: ChargerId,
        #[source]
        source: RechargeApiError,
    },
}

/// Polls one charger on a fixed period and caches the last good reading.
///
/// Empty-location, cancellation and timeout failures are logged and leave the
/// cached reading untouched. Every other failure is returned from
/// [`RefreshCoordinator::refresh`] and counted.
pub struct RefreshCoordinator<A: ?Sized> {
    api: Arc<A>,
    charger_id: ChargerId,
    update_interval: Duration,
    data: watch::Sender<Option<Location>>,
    last_refreshed_at: Mutex<Option<DateTime<Utc>>>,
    last_update_success: AtomicBool,
    consecutive_failures: AtomicU32,
    refresh_lock: tokio::sync::Mutex<()>,
    cancel: watch::Sender<bool>,
}

impl<A> RefreshCoordinator<A>
where
    A: RechargeApi + ?Sized,
{
    pub fn new(api: Arc<A>, charger_id: ChargerId, update_interval: Duration) -> Self {
        let (data, _) = watch::channel(None);
        let (cancel, _) = watch::channel(false);

        Self {
            api,
            charger_id,
            update_interval,
            data,
            last_refreshed_at: Mutex::new(None),
            last_update_success: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            refresh_lock: tokio::sync::Mutex::new(()),
            cancel,
        }
    }

    pub fn charger_id(&self) -> &ChargerId {
        &self.charger_id
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn data(&self) -> Option<Location> {
        self.data.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Location>> {
        self.data.subscribe()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed_at
            .lock()
            .map(|guard| *guard)
            .unwrap_or_default()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Fetches the station once and returns the reading exposed afterwards.
    pub async fn refresh(&self) -> Result<Option<Location>, RechargeApiError> {
        let _serialized = self.refresh_lock.lock().await;

        let fetched = tokio::select! {
            result = self.api.location_by_id(&self.charger_id) => result,
            _ = self.cancelled() => Err(RechargeApiError::Cancelled),
        };

        match fetched {
            Ok(location) => {
                self.record_success();
                self.data.send_replace(Some(location.clone()));
                tracing::debug!(charger_id = %self.charger_id, "station reading refreshed");
                Ok(Some(location))
            }
            Err(error) if error.is_transient_fetch() => {
                self.log_transient(&error);
                Ok(self.data())
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }

    /// Startup refresh; any failure that `refresh` does not absorb blocks the
    /// owning entry from loading.
    pub async fn first_refresh(&self) -> Result<Option<Location>, CoordinatorError> {
        self.refresh()
            .await
            .map_err(|source| CoordinatorError::NotReady {
                charger_id: self.charger_id.clone(),
                source,
            })
    }

    pub fn shutdown(&self) {
        self.cancel.send_replace(true);
    }

    /// Runs the periodic refresh until [`RefreshCoordinator::shutdown`] is called.
    /// The first tick fires one interval from now; startup uses `first_refresh`.
    pub async fn run(self: Arc<Self>) {
        let start = tokio::time::Instant::now() + self.update_interval;
        let mut ticker = tokio::time::interval_at(start, self.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancelled() => break,
            }

            if let Err(error) = self.refresh().await {
                tracing::warn!(
                    charger_id = %self.charger_id,
                    consecutive_failures = self.consecutive_failures(),
                    error = %error,
                    "station refresh failed"
                );
            }
        }

        tracing::debug!(charger_id = %self.charger_id, "refresh loop stopped");
    }

    /// Runs the periodic refresh as a task on `runtime`.
    pub fn spawn(self: Arc<Self>, runtime: &Handle) -> JoinHandle<()>
    where
        A: 'static,
    {
        runtime.spawn(self.run())
    }

    async fn cancelled(&self) {
        let mut receiver = self.cancel.subscribe();
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    fn record_success(&self) {
        if let Ok(mut guard) = self.last_refreshed_at.lock() {
            *guard = Some(Utc::now());
        }

        let was_failing = !self.last_update_success.swap(true, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if was_failing {
            tracing::info!(charger_id = %self.charger_id, "station refresh recovered");
        }
    }

    fn record_failure(&self) {
        self.last_update_success.store(false, Ordering::SeqCst);
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn log_transient(&self, error: &RechargeApiError) {
        match error {
            RechargeApiError::LocationEmpty(_) => tracing::error!(
                charger_id = %self.charger_id,
                "error fetching data for charger {}: not found, or charger_id is invalid",
                self.charger_id
            ),
            RechargeApiError::Cancelled => tracing::error!(
                charger_id = %self.charger_id,
                "fetch cancelled for charger {}",
                self.charger_id
            ),
            _ => tracing::error!(
                charger_id = %self.charger_id,
                error = %error,
                "fetch timed out for charger {}",
                self.charger_id
            ),
        }
    }
}
