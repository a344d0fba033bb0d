//! Entities exposed for one configured charger. Each platform module has a
//! `setup_entry` that registers its entities through the supplied callback.

pub mod button;
pub mod sensor;
pub mod switch;

use std::sync::Arc;

use serde::Serialize;

use crate::adapters::recharge_api::{AccountSession, RechargeApi};
use crate::app::coordinator::RefreshCoordinator;
use crate::domain::models::ConfigEntry;

pub use button::{ButtonAction, ChargingButton};
pub use sensor::StationSensor;
pub use switch::ChargerSwitch;

pub type StationCoordinator = RefreshCoordinator<dyn RechargeApi>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Sensor,
    Switch,
    Button,
}

pub const PLATFORMS: [Platform; 3] = [Platform::Sensor, Platform::Switch, Platform::Button];

/// What a platform needs from a loaded entry to build its entities.
pub struct EntryContext<'a> {
    pub entry: &'a ConfigEntry,
    pub coordinator: &'a Arc<StationCoordinator>,
    /// Absent when the account login failed; only the sensor is set up then.
    pub session: Option<&'a Arc<dyn AccountSession>>,
}

impl Platform {
    pub fn setup_entry(self, context: &EntryContext<'_>, add_entities: &mut dyn FnMut(Vec<Entity>)) {
        match self {
            Self::Sensor => sensor::setup_entry(context, add_entities),
            Self::Switch => switch::setup_entry(context, add_entities),
            Self::Button => button::setup_entry(context, add_entities),
        }
    }
}

#[derive(Clone)]
pub enum Entity {
    Sensor(StationSensor),
    Switch(ChargerSwitch),
    Button(ChargingButton),
}

impl Entity {
    pub fn platform(&self) -> Platform {
        match self {
            Self::Sensor(_) => Platform::Sensor,
            Self::Switch(_) => Platform::Switch,
            Self::Button(_) => Platform::Button,
        }
    }

    pub fn unique_id(&self) -> String {
        match self {
            Self::Sensor(sensor) => sensor.unique_id(),
            Self::Switch(switch) => switch.unique_id(),
            Self::Button(button) => button.unique_id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Sensor(sensor) => sensor.name(),
            Self::Switch(switch) => switch.name(),
            Self::Button(button) => button.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::adapters::recharge_api::{AccountSession, RechargeApi};
    use crate::app::coordinator::RefreshCoordinator;
    use crate::domain::models::{CardRfid, ChargerId, ConfigEntry, EntryData};
    use crate::test_support::{FakeRechargeApi, FakeSession};

    use super::{Entity, EntryContext, PLATFORMS, Platform, StationCoordinator};

    fn entry() -> ConfigEntry {
        ConfigEntry {
            entry_id: "entry-1".to_string(),
            title: "Shell Recharge Charger c-1".to_string(),
            version: 2,
            data: EntryData {
                email: "driver@example.com".to_string(),
                password: "secret".to_string(),
                card_rfid: CardRfid::new("04A2B3"),
                charger_id: ChargerId::new("c-1"),
            },
            created_at: "2026-10-01T10:00:00.000Z".to_string(),
            updated_at: "2026-10-01T10:00:00.000Z".to_string(),
        }
    }

    fn coordinator() -> Arc<StationCoordinator> {
        let api: Arc<dyn RechargeApi> = Arc::new(FakeRechargeApi::new());
        Arc::new(RefreshCoordinator::new(
            api,
            ChargerId::new("c-1"),
            Duration::from_secs(60),
        ))
    }

    fn register(context: &EntryContext<'_>) -> Vec<Entity> {
        let mut registered = Vec::new();
        for platform in PLATFORMS {
            platform.setup_entry(context, &mut |entities| registered.extend(entities));
        }
        registered
    }

    #[test]
    fn every_platform_registers_its_entities() {
        let entry = entry();
        let coordinator = coordinator();
        let session: Arc<dyn AccountSession> = Arc::new(FakeSession::default());
        let registered = register(&EntryContext {
            entry: &entry,
            coordinator: &coordinator,
            session: Some(&session),
        });

        let platforms: Vec<Platform> = registered.iter().map(|entity| entity.platform()).collect();
        assert_eq!(
            platforms,
            vec![
                Platform::Sensor,
                Platform::Switch,
                Platform::Button,
                Platform::Button
            ]
        );
        let ids: Vec<String> = registered.iter().map(|entity| entity.unique_id()).collect();
        assert_eq!(
            ids,
            vec![
                "c-1_status",
                "c-1_switch",
                "c-1_start_charging",
                "c-1_stop_charging"
            ]
        );
        let names: Vec<String> = registered.iter().map(|entity| entity.name()).collect();
        assert_eq!(
            names,
            vec![
                "Shell Recharge Charger c-1",
                "Shell Recharge Charger c-1",
                "Start Charging",
                "Stop Charging"
            ]
        );
    }

    #[test]
    fn only_sensor_is_registered_without_account_session() {
        let entry = entry();
        let coordinator = coordinator();
        let registered = register(&EntryContext {
            entry: &entry,
            coordinator: &coordinator,
            session: None,
        });

        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].platform(), Platform::Sensor);
    }
}
