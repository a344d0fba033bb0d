//! Account onboarding: `user` -> `select_card` -> `select_charger` -> entry.
//!
//! Each state holds exactly what the next transition needs. A step with no
//! input re-shows its form; a step whose input fails keeps the flow where it
//! is and reports the failure on the form.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::adapters::db::DbError;
use crate::adapters::recharge_api::{AccountSession, RechargeApi, RechargeApiError};
use crate::app::integration::Integration;
use crate::app::services::{EntryStore, ServiceError};
use crate::domain::models::{CardRfid, ChargerId, ConfigEntry, Credentials, EntryData, entry_title};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStep {
    User,
    SelectCard,
    SelectCharger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormError {
    CannotConnect,
    InvalidAuth,
    UnknownError,
    InvalidCard,
    InvalidCharger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    AlreadyConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StepInput {
    Credentials { email: String, password: String },
    Card { card_rfid: CardRfid },
    Charger { charger_id: ChargerId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowForm {
    pub step: SetupStep,
    pub options: Vec<String>,
    pub errors: BTreeMap<&'static str, FormError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    Form(FlowForm),
    CreateEntry {
        title: String,
        #[serde(skip)]
        data: EntryData,
    },
    Abort {
        reason: AbortReason,
    },
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("input does not belong to step {0:?}")]
    UnexpectedInput(SetupStep),
    #[error("flow has already finished")]
    Finished,
    #[error("unknown flow {0}")]
    UnknownFlow(String),
    #[error("entry store failed: {0}")]
    Store(#[from] ServiceError),
}

enum FlowState {
    User,
    SelectCard {
        credentials: Credentials,
        session: Arc<dyn AccountSession>,
        cards: Vec<CardRfid>,
    },
    SelectCharger {
        credentials: Credentials,
        card_rfid: CardRfid,
        chargers: Vec<ChargerId>,
    },
    Finished,
}

pub struct SetupFlow {
    api: Arc<dyn RechargeApi>,
    store: Arc<dyn EntryStore>,
    state: FlowState,
}

impl SetupFlow {
    pub fn new(api: Arc<dyn RechargeApi>, store: Arc<dyn EntryStore>) -> Self {
        Self {
            api,
            store,
            state: FlowState::User,
        }
    }

    pub fn current_step(&self) -> Option<SetupStep> {
        match self.state {
            FlowState::User => Some(SetupStep::User),
            FlowState::SelectCard { .. } => Some(SetupStep::SelectCard),
            FlowState::SelectCharger { .. } => Some(SetupStep::SelectCharger),
            FlowState::Finished => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, FlowState::Finished)
    }

    pub async fn handle(&mut self, input: Option<StepInput>) -> Result<FlowResult, FlowError> {
        let state = std::mem::replace(&mut self.state, FlowState::Finished);

        let (next, result) = match (state, input) {
            (FlowState::Finished, _) => return Err(FlowError::Finished),
            (state, None) => {
                let form = form_for(&state, BTreeMap::new());
                (state, Ok(FlowResult::Form(form)))
            }
            (FlowState::User, Some(StepInput::Credentials { email, password })) => {
                self.step_user(Credentials { email, password }).await
            }
            (
                FlowState::SelectCard {
                    credentials,
                    session,
                    cards,
                },
                Some(StepInput::Card { card_rfid }),
            ) => self.step_select_card(credentials, session, cards, card_rfid).await,
            (
                FlowState::SelectCharger {
                    credentials,
                    card_rfid,
                    chargers,
                },
                Some(StepInput::Charger { charger_id }),
            ) => self.step_select_charger(credentials, card_rfid, chargers, charger_id),
            (state, Some(_)) => {
                let step = step_of(&state);
                (state, Err(FlowError::UnexpectedInput(step)))
            }
        };

        self.state = next;
        result
    }

    async fn step_user(&self, credentials: Credentials) -> (FlowState, Result<FlowResult, FlowError>) {
        let opened = async {
            let session = self
                .api
                .get_user(&credentials.email, &credentials.password)
                .await?;
            session.authenticate().await?;
            let cards = session.get_cards().await?;
            Ok::<_, RechargeApiError>((session, cards))
        }
        .await;

        match opened {
            Ok((session, cards)) => {
                let state = FlowState::SelectCard {
                    credentials,
                    session,
                    cards: cards.into_iter().map(|card| card.rfid).collect(),
                };
                let form = form_for(&state, BTreeMap::new());
                (state, Ok(FlowResult::Form(form)))
            }
            Err(error) => {
                let state = FlowState::User;
                let form = form_for(&state, base_error(classify(&error)));
                (state, Ok(FlowResult::Form(form)))
            }
        }
    }

    async fn step_select_card(
        &self,
        credentials: Credentials,
        session: Arc<dyn AccountSession>,
        cards: Vec<CardRfid>,
        card_rfid: CardRfid,
    ) -> (FlowState, Result<FlowResult, FlowError>) {
        if !cards.contains(&card_rfid) {
            let state = FlowState::SelectCard {
                credentials,
                session,
                cards,
            };
            let form = form_for(&state, field_error("card_rfid", FormError::InvalidCard));
            return (state, Ok(FlowResult::Form(form)));
        }

        match session.get_chargers().await {
            Ok(chargers) => {
                let state = FlowState::SelectCharger {
                    credentials,
                    card_rfid,
                    chargers: chargers.into_iter().map(|charger| charger.id).collect(),
                };
                let form = form_for(&state, BTreeMap::new());
                (state, Ok(FlowResult::Form(form)))
            }
            Err(error) => {
                let state = FlowState::SelectCard {
                    credentials,
                    session,
                    cards,
                };
                let form = form_for(&state, base_error(classify(&error)));
                (state, Ok(FlowResult::Form(form)))
            }
        }
    }

    fn step_select_charger(
        &self,
        credentials: Credentials,
        card_rfid: CardRfid,
        chargers: Vec<ChargerId>,
        charger_id: ChargerId,
    ) -> (FlowState, Result<FlowResult, FlowError>) {
        if !chargers.contains(&charger_id) {
            let state = FlowState::SelectCharger {
                credentials,
                card_rfid,
                chargers,
            };
            let form = form_for(&state, field_error("charger_id", FormError::InvalidCharger));
            return (state, Ok(FlowResult::Form(form)));
        }

        let data = EntryData {
            email: credentials.email,
            password: credentials.password,
            card_rfid,
            charger_id,
        };

        let existing = match self.store.find_by_charger(&data.charger_id) {
            Ok(existing) => existing,
            Err(error) => return (FlowState::Finished, Err(FlowError::from(error))),
        };

        if let Some(existing) = existing {
            if let Err(error) = self.store.update_entry_data(&existing.entry_id, &data) {
                return (FlowState::Finished, Err(FlowError::from(error)));
            }
            tracing::info!(
                entry_id = %existing.entry_id,
                charger_id = %data.charger_id,
                "charger already configured; stored credentials updated"
            );
            return (
                FlowState::Finished,
                Ok(FlowResult::Abort {
                    reason: AbortReason::AlreadyConfigured,
                }),
            );
        }

        (
            FlowState::Finished,
            Ok(FlowResult::CreateEntry {
                title: entry_title(&data.charger_id),
                data,
            }),
        )
    }
}

fn step_of(state: &FlowState) -> SetupStep {
    match state {
        FlowState::User | FlowState::Finished => SetupStep::User,
        FlowState::SelectCard { .. } => SetupStep::SelectCard,
        FlowState::SelectCharger { .. } => SetupStep::SelectCharger,
    }
}

fn form_for(state: &FlowState, errors: BTreeMap<&'static str, FormError>) -> FlowForm {
    let options = match state {
        FlowState::SelectCard { cards, .. } => cards.iter().map(ToString::to_string).collect(),
        FlowState::SelectCharger { chargers, .. } => {
            chargers.iter().map(ToString::to_string).collect()
        }
        FlowState::User | FlowState::Finished => Vec::new(),
    };

    FlowForm {
        step: step_of(state),
        options,
        errors,
    }
}

fn classify(error: &RechargeApiError) -> FormError {
    if error.is_connectivity() {
        return FormError::CannotConnect;
    }
    if *error == RechargeApiError::Unauthorized {
        return FormError::InvalidAuth;
    }

    tracing::error!(error = %error, "unexpected error during account setup");
    FormError::UnknownError
}

fn base_error(error: FormError) -> BTreeMap<&'static str, FormError> {
    field_error("base", error)
}

fn field_error(field: &'static str, error: FormError) -> BTreeMap<&'static str, FormError> {
    BTreeMap::from([(field, error)])
}

/// Flows left untouched this long are dropped with their account session.
pub const DEFAULT_FLOW_IDLE_TIMEOUT_MINUTES: i64 = 30;

struct FlowSlot {
    flow: SetupFlow,
    last_active: DateTime<Utc>,
}

/// In-progress flows keyed by flow id. A created entry is persisted and
/// loaded before the result is returned.
pub struct FlowManager {
    api: Arc<dyn RechargeApi>,
    store: Arc<dyn EntryStore>,
    integration: Arc<Integration>,
    idle_timeout: Duration,
    flows: Mutex<HashMap<String, FlowSlot>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowStepResponse {
    pub flow_id: String,
    #[serde(flatten)]
    pub result: FlowResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl FlowManager {
    pub fn new(
        api: Arc<dyn RechargeApi>,
        store: Arc<dyn EntryStore>,
        integration: Arc<Integration>,
    ) -> Self {
        Self {
            api,
            store,
            integration,
            idle_timeout: Duration::minutes(DEFAULT_FLOW_IDLE_TIMEOUT_MINUTES),
            flows: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub async fn start(&self) -> Result<FlowStepResponse, FlowError> {
        self.evict_idle(Utc::now()).await;

        let flow_id = uuid::Uuid::new_v4().to_string();
        let mut flow = SetupFlow::new(Arc::clone(&self.api), Arc::clone(&self.store));
        let result = flow.handle(None).await?;
        self.flows.lock().await.insert(
            flow_id.clone(),
            FlowSlot {
                flow,
                last_active: Utc::now(),
            },
        );

        Ok(FlowStepResponse {
            flow_id,
            result,
            entry_id: None,
        })
    }

    pub async fn submit(
        &self,
        flow_id: &str,
        input: Option<StepInput>,
    ) -> Result<FlowStepResponse, FlowError> {
        self.evict_idle(Utc::now()).await;

        let FlowSlot { mut flow, .. } = self
            .flows
            .lock()
            .await
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;

        let result = flow.handle(input).await;
        if !flow.is_finished() {
            self.flows.lock().await.insert(
                flow_id.to_string(),
                FlowSlot {
                    flow,
                    last_active: Utc::now(),
                },
            );
        }
        let mut result = result?;

        let mut entry_id = None;
        if let FlowResult::CreateEntry { title, data } = &result {
            match self.store.create_entry(title, data) {
                Ok(entry) => {
                    self.load(&entry).await;
                    entry_id = Some(entry.entry_id);
                }
                // Another flow stored the same charger after this one checked.
                Err(ServiceError::Database(DbError::DuplicateUniqueId(charger_id))) => {
                    tracing::info!(
                        flow_id,
                        charger_id = %charger_id,
                        "charger configured concurrently; flow aborted"
                    );
                    result = FlowResult::Abort {
                        reason: AbortReason::AlreadyConfigured,
                    };
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(FlowStepResponse {
            flow_id: flow_id.to_string(),
            result,
            entry_id,
        })
    }

    /// Drops an in-progress flow together with any session it holds.
    pub async fn abort(&self, flow_id: &str) -> Result<(), FlowError> {
        self.flows
            .lock()
            .await
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;

        tracing::info!(flow_id, "setup flow aborted");
        Ok(())
    }

    /// Removes flows idle for longer than the timeout as of `now`. Returns
    /// how many were removed.
    pub async fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let mut flows = self.flows.lock().await;
        let before = flows.len();
        flows.retain(|_, slot| now - slot.last_active <= self.idle_timeout);
        let evicted = before - flows.len();

        if evicted > 0 {
            tracing::info!(evicted, "idle setup flows removed");
        }
        evicted
    }

    pub async fn in_progress(&self) -> usize {
        self.flows.lock().await.len()
    }

    async fn load(&self, entry: &ConfigEntry) {
        tracing::info!(
            entry_id = %entry.entry_id,
            charger_id = %entry.data.charger_id,
            "config entry created"
        );
        self.integration.setup_entry(entry).await;
    }
}
