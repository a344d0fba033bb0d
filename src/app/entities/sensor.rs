use std::sync::Arc;

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use crate::app::entities::{Entity, EntryContext, StationCoordinator};
use crate::domain::models::entry_title;
use crate::domain::station::station_attributes;

pub const STATUS_OPTIONS: [&str; 4] = ["available", "occupied", "unavailable", "unknown"];

pub fn setup_entry(context: &EntryContext<'_>, add_entities: &mut dyn FnMut(Vec<Entity>)) {
    add_entities(vec![Entity::Sensor(StationSensor::new(Arc::clone(
        context.coordinator,
    )))]);
}

/// Enum sensor reporting the primary EVSE status from the cached reading.
#[derive(Clone)]
pub struct StationSensor {
    coordinator: Arc<StationCoordinator>,
}

impl StationSensor {
    pub fn new(coordinator: Arc<StationCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn unique_id(&self) -> String {
        format!("{}_status", self.coordinator.charger_id())
    }

    pub fn name(&self) -> String {
        entry_title(self.coordinator.charger_id())
    }

    pub fn native_value(&self) -> Option<&'static str> {
        self.coordinator
            .data()
            .and_then(|location| location.status())
            .map(|status| status.as_str())
    }

    pub fn available(&self) -> bool {
        self.coordinator.last_update_success() && self.coordinator.data().is_some()
    }

    pub fn extra_state_attributes(&self) -> Map<String, Value> {
        let mut attributes = self
            .coordinator
            .data()
            .map(|location| station_attributes(&location))
            .unwrap_or_default();

        if let Some(refreshed_at) = self.coordinator.last_refreshed_at() {
            attributes.insert(
                "last_refreshed_at".to_string(),
                Value::from(refreshed_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }

        attributes
    }
}
