use std::sync::Arc;

use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::app::entities::ButtonAction;
use crate::app::entities::sensor::STATUS_OPTIONS;
use crate::app::integration::Integration;
use crate::app::services::{EntryStore, ServiceError};
use crate::app::setup_flow::{FlowError, FlowManager, StepInput};
use crate::domain::models::ConfigEntry;

#[derive(Clone)]
pub struct ApiState {
    pub integration: Arc<Integration>,
    pub store: Arc<dyn EntryStore>,
    pub flows: Arc<FlowManager>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub entry_id: String,
    pub title: String,
    pub version: u32,
    pub email: String,
    pub card_rfid: String,
    pub charger_id: String,
    pub loaded: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl EntryResponse {
    fn new(entry: ConfigEntry, loaded: bool) -> Self {
        Self {
            entry_id: entry.entry_id,
            title: entry.title,
            version: entry.version,
            email: entry.data.email,
            card_rfid: entry.data.card_rfid.to_string(),
            charger_id: entry.data.charger_id.to_string(),
            loaded,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StationResponse {
    pub unique_id: String,
    pub name: String,
    pub state: Option<&'static str>,
    pub available: bool,
    pub options: Vec<&'static str>,
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwitchResponse {
    pub unique_id: String,
    pub name: String,
    pub is_on: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchCommand {
    TurnOn,
    TurnOff,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_entries_endpoint)
        .service(delete_entry_endpoint)
        .service(get_station_endpoint)
        .service(refresh_station_endpoint)
        .service(get_switch_endpoint)
        .service(switch_command_endpoint)
        .service(press_button_endpoint)
        .service(start_flow_endpoint)
        .service(submit_flow_endpoint)
        .service(abort_flow_endpoint);
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

#[get("/entries")]
async fn list_entries_endpoint(state: web::Data<ApiState>) -> impl Responder {
    let entries = match state.store.list_entries() {
        Ok(entries) => entries,
        Err(error) => return service_error_response(error),
    };

    let loaded = state.integration.loaded_entry_ids().await;
    let mapped: Vec<EntryResponse> = entries
        .into_iter()
        .map(|entry| {
            let is_loaded = loaded.contains(&entry.entry_id);
            EntryResponse::new(entry, is_loaded)
        })
        .collect();

    HttpResponse::Ok().json(mapped)
}

#[delete("/entries/{entry_id}")]
async fn delete_entry_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let entry_id = path.into_inner();
    state.integration.unload_entry(&entry_id).await;

    match state.store.remove_entry(&entry_id) {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => entry_not_found(&entry_id),
        Err(error) => service_error_response(error),
    }
}

#[get("/entries/{entry_id}/station")]
async fn get_station_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let entry_id = path.into_inner();
    match state.integration.sensor(&entry_id).await {
        Some(sensor) => HttpResponse::Ok().json(StationResponse {
            unique_id: sensor.unique_id(),
            name: sensor.name(),
            state: sensor.native_value(),
            available: sensor.available(),
            options: STATUS_OPTIONS.to_vec(),
            attributes: sensor.extra_state_attributes(),
        }),
        None => entry_not_loaded(&entry_id),
    }
}

#[post("/entries/{entry_id}/refresh")]
async fn refresh_station_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let entry_id = path.into_inner();
    let Some(coordinator) = state.integration.coordinator(&entry_id).await else {
        return entry_not_loaded(&entry_id);
    };

    match coordinator.refresh().await {
        Ok(location) => HttpResponse::Ok().json(serde_json::json!({
            "state": location.as_ref().and_then(|location| location.status()).map(|status| status.as_str()),
            "lastUpdateSuccess": coordinator.last_update_success(),
        })),
        Err(error) => HttpResponse::BadGateway().json(serde_json::json!({
            "error": format!("refresh failed: {error}")
        })),
    }
}

#[get("/entries/{entry_id}/switch")]
async fn get_switch_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> impl Responder {
    let entry_id = path.into_inner();
    match state.integration.switch(&entry_id).await {
        Some(switch) => HttpResponse::Ok().json(SwitchResponse {
            unique_id: switch.unique_id(),
            name: switch.name(),
            is_on: switch.is_on(),
        }),
        None => entry_not_loaded(&entry_id),
    }
}

/// A failed toggle is not an error here; the unchanged state is returned.
#[post("/entries/{entry_id}/switch/{command}")]
async fn switch_command_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<(String, SwitchCommand)>,
) -> impl Responder {
    let (entry_id, command) = path.into_inner();
    let Some(switch) = state.integration.switch(&entry_id).await else {
        return entry_not_loaded(&entry_id);
    };

    match command {
        SwitchCommand::TurnOn => switch.turn_on().await,
        SwitchCommand::TurnOff => switch.turn_off().await,
    }

    HttpResponse::Ok().json(SwitchResponse {
        unique_id: switch.unique_id(),
        name: switch.name(),
        is_on: switch.is_on(),
    })
}

#[post("/entries/{entry_id}/buttons/{action}/press")]
async fn press_button_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<(String, ButtonAction)>,
) -> impl Responder {
    let (entry_id, action) = path.into_inner();
    let Some(button) = state.integration.button(&entry_id, action).await else {
        return entry_not_loaded(&entry_id);
    };

    match button.press().await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(error) => {
            tracing::warn!(
                entry_id = %entry_id,
                button = %button.unique_id(),
                error = %error,
                "button press failed"
            );
            HttpResponse::BadGateway().json(serde_json::json!({
                "error": format!("{} failed: {error}", button.name())
            }))
        }
    }
}

#[post("/flows")]
async fn start_flow_endpoint(state: web::Data<ApiState>) -> impl Responder {
    match state.flows.start().await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(error) => flow_error_response(error),
    }
}

/// An empty body re-shows the current step's form.
#[post("/flows/{flow_id}")]
async fn submit_flow_endpoint(
    state: web::Data<ApiState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> impl Responder {
    let input = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<StepInput>(&body) {
            Ok(input) => Some(input),
            Err(error) => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": format!("invalid step input: {error}")
                }));
            }
        }
    };

    match state.flows.submit(&path.into_inner(), input).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(error) => flow_error_response(error),
    }
}

#[delete("/flows/{flow_id}")]
async fn abort_flow_endpoint(state: web::Data<ApiState>, path: web::Path<String>) -> impl Responder {
    match state.flows.abort(&path.into_inner()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(error) => flow_error_response(error),
    }
}

fn entry_not_found(entry_id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "error": format!("entry {entry_id} not found")
    }))
}

fn entry_not_loaded(entry_id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "error": format!("entry {entry_id} is not loaded")
    }))
}

fn flow_error_response(error: FlowError) -> HttpResponse {
    match error {
        FlowError::UnknownFlow(_) => HttpResponse::NotFound().json(serde_json::json!({
            "error": error.to_string()
        })),
        FlowError::UnexpectedInput(_) => HttpResponse::BadRequest().json(serde_json::json!({
            "error": error.to_string()
        })),
        FlowError::Finished => HttpResponse::Conflict().json(serde_json::json!({
            "error": error.to_string()
        })),
        FlowError::Store(error) => service_error_response(error),
    }
}

fn service_error_response(error: ServiceError) -> HttpResponse {
    match error {
        ServiceError::DbLockPoisoned => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "database lock poisoned"
            }))
        }
        ServiceError::Database(error) => {
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": format!("database query failed: {error}")
            }))
        }
    }
}
