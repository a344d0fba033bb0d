use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::adapters::recharge_api::{AccountSession, RechargeApi, RechargeApiError};
use crate::domain::models::{Card, CardRfid, Charger, ChargerId, Credentials};
use crate::domain::station::Location;

const USER_AGENT: &str = concat!("recharge_home_api/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpRechargeApi {
    client: Client,
    map_url: Url,
    account_url: Url,
}

impl HttpRechargeApi {
    pub fn new(
        map_url: impl Into<String>,
        account_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RechargeApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| RechargeApiError::Connection(error.to_string()))?;

        Ok(Self {
            client,
            map_url: parse_base(map_url.into())?,
            account_url: parse_base(account_url.into())?,
        })
    }
}

#[async_trait]
impl RechargeApi for HttpRechargeApi {
    async fn location_by_id(&self, charger_id: &ChargerId) -> Result<Location, RechargeApiError> {
        let url = endpoint(
            &self.map_url,
            &["api", "map", "v2", "locations", "search", charger_id.as_str()],
        )?;
        tracing::debug!(%charger_id, %url, "fetching station location");

        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RechargeApiError::LocationEmpty(charger_id.clone()));
        }

        let payload: Vec<Value> = ensure_success(response).await?.json().await?;
        let first = payload
            .into_iter()
            .next()
            .ok_or_else(|| RechargeApiError::LocationEmpty(charger_id.clone()))?;

        serde_json::from_value(first).map_err(|error| RechargeApiError::LocationValidation {
            charger_id: charger_id.clone(),
            reason: error.to_string(),
        })
    }

    async fn get_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Arc<dyn AccountSession>, RechargeApiError> {
        Ok(Arc::new(HttpAccountSession {
            client: self.client.clone(),
            account_url: self.account_url.clone(),
            credentials: Credentials {
                email: email.to_string(),
                password: password.to_string(),
            },
            token: RwLock::new(None),
        }))
    }
}

pub struct HttpAccountSession {
    client: Client,
    account_url: Url,
    credentials: Credentials,
    token: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

impl HttpAccountSession {
    async fn bearer(&self) -> Result<String, RechargeApiError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or(RechargeApiError::NotAuthenticated)
    }

    async fn post_command(&self, segments: &[&str], body: Value) -> Result<(), RechargeApiError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .post(endpoint(&self.account_url, segments)?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountSession for HttpAccountSession {
    async fn authenticate(&self) -> Result<(), RechargeApiError> {
        let response = self
            .client
            .post(endpoint(&self.account_url, &["api", "auth", "login"])?)
            .json(&self.credentials)
            .send()
            .await?;

        let login: LoginResponse = ensure_success(response).await?.json().await?;
        *self.token.write().await = Some(login.token);

        tracing::debug!(email = %self.credentials.email, "account session authenticated");
        Ok(())
    }

    async fn get_cards(&self) -> Result<Vec<Card>, RechargeApiError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .get(endpoint(&self.account_url, &["api", "cards"])?)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn get_chargers(&self) -> Result<Vec<Charger>, RechargeApiError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .get(endpoint(&self.account_url, &["api", "chargers"])?)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn toggle_charger(
        &self,
        charger_id: &ChargerId,
        card_rfid: &CardRfid,
        on: bool,
    ) -> Result<(), RechargeApiError> {
        self.post_command(
            &["api", "chargers", charger_id.as_str(), "toggle"],
            serde_json::json!({ "rfid": card_rfid, "on": on }),
        )
        .await
    }

    async fn start_charging(&self) -> Result<(), RechargeApiError> {
        self.post_command(&["api", "charge-sessions", "start"], serde_json::json!({}))
            .await
    }

    async fn stop_charging(&self) -> Result<(), RechargeApiError> {
        self.post_command(&["api", "charge-sessions", "stop"], serde_json::json!({}))
            .await
    }
}

async fn ensure_success(response: Response) -> Result<Response, RechargeApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RechargeApiError::Unauthorized);
    }

    let message = response.text().await.unwrap_or_default();
    Err(RechargeApiError::Status {
        status: status.as_u16(),
        message,
    })
}

fn parse_base(raw: String) -> Result<Url, RechargeApiError> {
    Url::parse(&raw)
        .map_err(|error| RechargeApiError::Connection(format!("invalid base url {raw}: {error}")))
}

/// Appends `segments` to `base`, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, RechargeApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RechargeApiError::Connection(format!("{base} cannot be a base url")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
