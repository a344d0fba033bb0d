use std::sync::Arc;

use tokio::sync::watch;

use crate::adapters::recharge_api::AccountSession;
use crate::app::entities::{Entity, EntryContext};
use crate::domain::models::{CardRfid, ChargerId, entry_title};

pub fn setup_entry(context: &EntryContext<'_>, add_entities: &mut dyn FnMut(Vec<Entity>)) {
    let Some(session) = context.session else {
        return;
    };

    add_entities(vec![Entity::Switch(ChargerSwitch::new(
        Arc::clone(session),
        context.entry.data.charger_id.clone(),
        context.entry.data.card_rfid.clone(),
    ))]);
}

/// Charger on/off switch. A failed toggle is logged and leaves the state
/// as it was.
#[derive(Clone)]
pub struct ChargerSwitch {
    session: Arc<dyn AccountSession>,
    charger_id: ChargerId,
    card_rfid: CardRfid,
    state: Arc<watch::Sender<bool>>,
}

impl ChargerSwitch {
    pub fn new(session: Arc<dyn AccountSession>, charger_id: ChargerId, card_rfid: CardRfid) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            session,
            charger_id,
            card_rfid,
            state: Arc::new(state),
        }
    }

    pub fn unique_id(&self) -> String {
        format!("{}_switch", self.charger_id)
    }

    pub fn name(&self) -> String {
        entry_title(&self.charger_id)
    }

    pub fn is_on(&self) -> bool {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    pub async fn turn_on(&self) {
        self.set_state(true).await;
    }

    pub async fn turn_off(&self) {
        self.set_state(false).await;
    }

    async fn set_state(&self, on: bool) {
        let action = if on { "on" } else { "off" };

        match self
            .session
            .toggle_charger(&self.charger_id, &self.card_rfid, on)
            .await
        {
            Ok(()) => {
                self.state.send_replace(on);
                tracing::info!(charger_id = %self.charger_id, "charger turned {action}");
            }
            Err(error) => {
                tracing::error!(
                    charger_id = %self.charger_id,
                    error = %error,
                    "failed to turn {action} the charger"
                );
            }
        }
    }
}
