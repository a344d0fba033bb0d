use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapters::recharge_api::{AccountSession, RechargeApiError};
use crate::app::entities::{Entity, EntryContext};
use crate::domain::models::ChargerId;

pub fn setup_entry(context: &EntryContext<'_>, add_entities: &mut dyn FnMut(Vec<Entity>)) {
    let Some(session) = context.session else {
        return;
    };

    let charger_id = &context.entry.data.charger_id;
    add_entities(vec![
        Entity::Button(ChargingButton::new(
            ButtonAction::Start,
            Arc::clone(session),
            charger_id.clone(),
        )),
        Entity::Button(ChargingButton::new(
            ButtonAction::Stop,
            Arc::clone(session),
            charger_id.clone(),
        )),
    ]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Start,
    Stop,
}

#[derive(Clone)]
pub struct ChargingButton {
    action: ButtonAction,
    session: Arc<dyn AccountSession>,
    charger_id: ChargerId,
}

impl ChargingButton {
    pub fn new(action: ButtonAction, session: Arc<dyn AccountSession>, charger_id: ChargerId) -> Self {
        Self {
            action,
            session,
            charger_id,
        }
    }

    pub fn action(&self) -> ButtonAction {
        self.action
    }

    pub fn name(&self) -> &'static str {
        match self.action {
            ButtonAction::Start => "Start Charging",
            ButtonAction::Stop => "Stop Charging",
        }
    }

    pub fn unique_id(&self) -> String {
        match self.action {
            ButtonAction::Start => format!("{}_start_charging", self.charger_id),
            ButtonAction::Stop => format!("{}_stop_charging", self.charger_id),
        }
    }

    /// Errors are handed back to the caller untouched.
    pub async fn press(&self) -> Result<(), RechargeApiError> {
        match self.action {
            ButtonAction::Start => self.session.start_charging().await,
            ButtonAction::Stop => self.session.stop_charging().await,
        }
    }
}
